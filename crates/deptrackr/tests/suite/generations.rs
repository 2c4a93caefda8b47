use deptrackr::{Access, Generation, GenerationStats, ItemState};

use super::{file_item, sha1_hash};

#[test]
fn new_generation_starts_empty_and_writable() {
    let tmp = tempfile::tempdir().unwrap();
    let mut built = Generation::default();
    assert!(built.add_item(&file_item("a", "1"), &[file_item("b", "1")]));
    built.save(tmp.path()).unwrap();

    let old = Generation::load(tmp.path());
    let new = old.new_generation();
    assert_eq!(new.access(), Access::Writable);
    assert_eq!(new.stats(), GenerationStats::default());
    assert_eq!(new.shard_bits(), old.shard_bits());
    assert_eq!(new.shard_capacity(), old.shard_capacity());
}

#[test]
fn building_a_new_generation_never_changes_the_old_one() {
    let tmp = tempfile::tempdir().unwrap();
    let mut built = Generation::default();
    assert!(built.add_item(&file_item("app", "1"), &[file_item("lib", "1")]));
    built.save(tmp.path()).unwrap();

    let mut old = Generation::load(tmp.path());
    let before_stats = old.stats();
    let before_hashes: Vec<_> = old.hashes().collect();

    let mut new = old.new_generation();
    assert!(old.copy_item(&mut new, &sha1_hash("app")));
    assert!(new.add_item(&file_item("extra", "1"), &[file_item("lib", "2")]));
    assert!(new.add_item(&file_item("more", "1"), &[]));
    new.reset_query_state();
    new.query_item(&sha1_hash("app"), true, |_, _| ItemState::OutOfDate);

    assert_eq!(old.stats(), before_stats);
    assert_eq!(old.hashes().collect::<Vec<_>>(), before_hashes);
    assert!(!old.contains(&sha1_hash("extra")));
    assert_eq!(old.state_of(&sha1_hash("app")), ItemState::Unverified);
    assert_eq!(old.get(&sha1_hash("lib")).unwrap().change_data(), b"1");
}

#[test]
fn stats_track_items_dependencies_and_payload_bytes() {
    let mut generation = Generation::default();
    assert!(generation.add_item(&file_item("ab", "123"), &[file_item("c", "4")]));

    let stats = generation.stats();
    assert_eq!(stats.items, 2);
    assert_eq!(stats.dependencies, 1);
    assert_eq!(stats.data_bytes, "ab".len() + "123".len() + "c".len() + "4".len());
    assert!(stats.buckets_in_use >= 1);
    assert!(stats.fullest_bucket >= 1);
}

#[test]
fn query_state_is_not_persisted() {
    let tmp = tempfile::tempdir().unwrap();
    let mut built = Generation::default();
    assert!(built.add_item(&file_item("a", "1"), &[]));
    built.query_item(&sha1_hash("a"), true, |_, _| ItemState::UpToDate);
    assert_eq!(built.state_of(&sha1_hash("a")), ItemState::UpToDate);
    built.save(tmp.path()).unwrap();

    let mut loaded = Generation::load(tmp.path());
    assert_eq!(loaded.state_of(&sha1_hash("a")), ItemState::Unverified);
}
