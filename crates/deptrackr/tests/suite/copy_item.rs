use deptrackr::{Generation, ItemState};

use super::{file_item, sha1_hash};

fn saved_and_loaded(generation: &Generation) -> (tempfile::TempDir, Generation) {
    let tmp = tempfile::tempdir().unwrap();
    generation.save(tmp.path()).unwrap();
    let loaded = Generation::load(tmp.path());
    assert!(loaded.is_read_only());
    (tmp, loaded)
}

#[test]
fn copy_carries_item_payloads_and_dependencies() {
    let mut built = Generation::default();
    assert!(built.add_item(
        &file_item("app", "1").with_flags(3, 4),
        &[file_item("a.o", "2"), file_item("b.o", "3")],
    ));
    let (_tmp, mut old) = saved_and_loaded(&built);

    let mut new = old.new_generation();
    assert!(old.copy_item(&mut new, &sha1_hash("app")));
    assert_eq!(new.len(), 3);

    let view = new.get(&sha1_hash("app")).unwrap();
    assert_eq!(view.id_data(), b"app");
    assert_eq!(view.change_data(), b"1");
    assert_eq!((view.id_flags(), view.change_flags()), (3, 4));
    let deps: Vec<&[u8]> = view.dependencies().map(|dep| dep.change_data()).collect();
    assert_eq!(deps, vec![b"2".as_slice(), b"3"]);
}

#[test]
fn shared_dependencies_are_copied_once() {
    let mut built = Generation::default();
    assert!(built.add_item(&file_item("a.o", "1"), &[file_item("common.h", "1")]));
    assert!(built.add_item(&file_item("b.o", "1"), &[file_item("common.h", "1")]));
    let (_tmp, mut old) = saved_and_loaded(&built);

    let mut new = old.new_generation();
    assert!(old.copy_item(&mut new, &sha1_hash("a.o")));
    assert!(old.copy_item(&mut new, &sha1_hash("b.o")));
    assert_eq!(new.len(), 3);
    assert_eq!(new.stats().dependencies, 2);

    let header = new.get(&sha1_hash("common.h")).unwrap().index();
    for parent in ["a.o", "b.o"] {
        let deps: Vec<u32> = new
            .get(&sha1_hash(parent))
            .unwrap()
            .dependencies()
            .map(|dep| dep.index())
            .collect();
        assert_eq!(deps, vec![header]);
    }
}

#[test]
fn copy_reuses_dependencies_recorded_by_add_item() {
    let mut built = Generation::default();
    assert!(built.add_item(&file_item("a.o", "1"), &[file_item("common.h", "1")]));
    let (_tmp, mut old) = saved_and_loaded(&built);

    let mut new = old.new_generation();
    assert!(new.add_item(&file_item("b.o", "2"), &[file_item("common.h", "2")]));
    assert!(old.copy_item(&mut new, &sha1_hash("a.o")));

    assert_eq!(new.len(), 3);
    // `dst` already held the dependency, so its recording is kept.
    assert_eq!(new.get(&sha1_hash("common.h")).unwrap().change_data(), b"2");
}

#[test]
fn copying_an_item_already_in_destination_is_a_no_op() {
    let mut built = Generation::default();
    assert!(built.add_item(&file_item("a.o", "1"), &[]));
    let (_tmp, mut old) = saved_and_loaded(&built);

    let mut new = old.new_generation();
    assert!(new.add_item(&file_item("a.o", "2"), &[]));
    let before = new.stats();
    assert!(old.copy_item(&mut new, &sha1_hash("a.o")));
    assert_eq!(new.stats(), before);
    assert_eq!(new.get(&sha1_hash("a.o")).unwrap().change_data(), b"2");
}

#[test]
fn copying_an_unknown_item_is_a_no_op() {
    let mut old = Generation::default();
    let mut new = old.new_generation();
    assert!(!old.copy_item(&mut new, &sha1_hash("missing")));
    assert!(new.is_empty());
}

#[test]
fn copy_follows_recorded_dependency_chains() {
    let mut built = Generation::default();
    assert!(built.add_item(&file_item("lib.o", "1"), &[file_item("lib.h", "1")]));
    assert!(built.add_item(&file_item("app", "1"), &[file_item("lib.o", "1")]));
    let (_tmp, mut old) = saved_and_loaded(&built);

    let mut new = old.new_generation();
    assert!(old.copy_item(&mut new, &sha1_hash("app")));
    assert_eq!(new.len(), 3);
    let lib_deps: Vec<_> = new
        .get(&sha1_hash("lib.o"))
        .unwrap()
        .dependencies()
        .map(|dep| dep.id_hash())
        .collect();
    assert_eq!(lib_deps, vec![sha1_hash("lib.h")]);
}

#[test]
fn self_dependency_is_copied_once() {
    let mut looped = Generation::default();
    assert!(looped.add_item(&file_item("x", "1"), &[file_item("x", "1")]));
    let mut dst = looped.new_generation();
    assert!(looped.copy_item(&mut dst, &sha1_hash("x")));
    assert_eq!(dst.len(), 1);
    let view = dst.get(&sha1_hash("x")).unwrap();
    let deps: Vec<u32> = view.dependencies().map(|dep| dep.index()).collect();
    assert_eq!(deps, vec![view.index()]);
}

#[test]
fn copy_into_read_only_generation_is_refused() {
    let mut built = Generation::default();
    assert!(built.add_item(&file_item("a.o", "1"), &[]));
    let (_tmp, mut read_only) = saved_and_loaded(&built);

    let mut source = Generation::default();
    assert!(source.add_item(&file_item("b.o", "1"), &[]));
    assert!(!source.copy_item(&mut read_only, &sha1_hash("b.o")));
    assert_eq!(read_only.len(), 1);
}

#[test]
fn rebuild_loop_keeps_unchanged_items() {
    let tmp = tempfile::tempdir().unwrap();
    let mut first = Generation::load(tmp.path());
    assert!(first.add_item(&file_item("a.o", "1"), &[file_item("a.c", "1")]));
    assert!(first.add_item(&file_item("b.o", "1"), &[file_item("b.c", "1")]));
    first.save(tmp.path()).unwrap();

    let mut old = Generation::load(tmp.path());
    let mut new = old.new_generation();
    let known: Vec<_> = old.hashes().collect();
    for hash in known {
        let state = old.query_item(&hash, false, |_, item| {
            if item.id_data == b"b.c" {
                ItemState::OutOfDate
            } else {
                ItemState::UpToDate
            }
        });
        if state == ItemState::UpToDate {
            old.copy_item(&mut new, &hash);
        }
    }
    assert!(new.add_item(&file_item("b.o", "2"), &[file_item("b.c", "2")]));
    new.save(tmp.path()).unwrap();

    let mut current = Generation::load(tmp.path());
    assert_eq!(current.len(), 4);
    assert_eq!(current.get(&sha1_hash("a.o")).unwrap().change_data(), b"1");
    assert_eq!(current.get(&sha1_hash("b.o")).unwrap().change_data(), b"2");
    assert_eq!(current.get(&sha1_hash("b.c")).unwrap().change_data(), b"2");
}
