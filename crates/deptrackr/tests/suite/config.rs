use deptrackr::{
    Generation, StoreConfig, StoreError, DEFAULT_SHARD_BITS, DEFAULT_SHARD_CAPACITY,
    MAX_SHARD_CAPACITY,
};
use serde::Deserialize;

use super::file_item;

#[derive(Debug, Deserialize)]
struct BuildToolConfig {
    #[allow(dead_code)]
    jobs: u32,
    #[serde(default)]
    deps: StoreConfig,
}

#[test]
fn store_config_embeds_in_toml() {
    let config: BuildToolConfig = toml::from_str(
        r#"
            jobs = 8

            [deps]
            shard_bits = 10
            shard_capacity = 64
        "#,
    )
    .unwrap();
    assert_eq!(
        config.deps,
        StoreConfig {
            shard_bits: 10,
            shard_capacity: 64,
        }
    );
}

#[test]
fn missing_fields_fall_back_to_defaults() {
    let config: BuildToolConfig = toml::from_str("jobs = 1\n[deps]\nshard_bits = 8\n").unwrap();
    assert_eq!(config.deps.shard_bits, 8);
    assert_eq!(config.deps.shard_capacity, DEFAULT_SHARD_CAPACITY);

    let config: BuildToolConfig = toml::from_str("jobs = 1\n").unwrap();
    assert_eq!(config.deps, StoreConfig::default());
    assert_eq!(config.deps.shard_bits, DEFAULT_SHARD_BITS);
}

#[test]
fn unknown_fields_are_rejected() {
    let result: Result<BuildToolConfig, _> =
        toml::from_str("jobs = 1\n[deps]\nshard_count = 3\n");
    assert!(result.is_err());
}

#[test]
fn invalid_config_is_rejected_by_new() {
    let err = Generation::new(StoreConfig {
        shard_bits: 20,
        shard_capacity: 8,
    })
    .unwrap_err();
    assert!(matches!(err, StoreError::InvalidConfig { .. }), "{err}");

    let err = Generation::new(StoreConfig {
        shard_bits: 1,
        shard_capacity: MAX_SHARD_CAPACITY + 1,
    })
    .unwrap_err();
    assert!(matches!(err, StoreError::InvalidConfig { .. }), "{err}");
}

#[test]
fn largest_bucket_size_accepts_items() {
    let mut generation = Generation::new(StoreConfig {
        shard_bits: 1,
        shard_capacity: MAX_SHARD_CAPACITY,
    })
    .unwrap();
    assert!(generation.add_item(&file_item("a", "1"), &[]));
    assert_eq!(generation.shard_capacity(), MAX_SHARD_CAPACITY);
}

#[test]
fn invalid_config_falls_back_to_defaults_on_load() {
    let tmp = tempfile::tempdir().unwrap();
    let generation = Generation::load_with_config(
        tmp.path(),
        &StoreConfig {
            shard_bits: 0,
            shard_capacity: 0,
        },
    );
    assert_eq!(generation.shard_bits(), DEFAULT_SHARD_BITS);
    assert_eq!(generation.shard_capacity(), DEFAULT_SHARD_CAPACITY);
}
