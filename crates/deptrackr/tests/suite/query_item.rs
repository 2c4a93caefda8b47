use deptrackr::{Generation, Item, ItemHash, ItemState};

use super::{file_item, sha1_hash};

fn parent_with_two_deps() -> Generation {
    let mut generation = Generation::default();
    assert!(generation.add_item(
        &file_item("app", "1"),
        &[file_item("a.o", "1"), file_item("b.o", "1")],
    ));
    generation
}

#[test]
fn unknown_item_is_out_of_date_without_calling_verify() {
    let mut generation = Generation::default();
    let mut calls = 0;
    let state = generation.query_item(&sha1_hash("nope"), true, |_, _| {
        calls += 1;
        ItemState::UpToDate
    });
    assert_eq!(state, ItemState::OutOfDate);
    assert_eq!(calls, 0);
}

#[test]
fn item_is_verified_before_its_dependencies() {
    let mut generation = parent_with_two_deps();
    let mut seen: Vec<Vec<u8>> = Vec::new();
    let state = generation.query_item(&sha1_hash("app"), true, |current, item| {
        assert_eq!(current, ItemState::Unverified);
        seen.push(item.id_data.to_vec());
        ItemState::UpToDate
    });
    assert_eq!(state, ItemState::UpToDate);
    assert_eq!(seen, vec![b"app".to_vec(), b"a.o".to_vec(), b"b.o".to_vec()]);
}

#[test]
fn out_of_date_item_short_circuits_unless_verify_all() {
    let mut generation = parent_with_two_deps();
    let mut calls = 0;
    let state = generation.query_item(&sha1_hash("app"), false, |_, _| {
        calls += 1;
        ItemState::OutOfDate
    });
    assert_eq!(state, ItemState::OutOfDate);
    assert_eq!(calls, 1);

    generation.reset_query_state();
    let mut calls = 0;
    let state = generation.query_item(&sha1_hash("app"), true, |_, _| {
        calls += 1;
        ItemState::OutOfDate
    });
    assert_eq!(state, ItemState::OutOfDate);
    assert_eq!(calls, 3);
}

#[test]
fn out_of_date_dependency_stops_walk_unless_verify_all() {
    let mut generation = parent_with_two_deps();
    let verify = |_: ItemState, item: &Item<'_>| {
        if item.id_data == b"a.o" {
            ItemState::OutOfDate
        } else {
            ItemState::UpToDate
        }
    };

    assert_eq!(
        generation.query_item(&sha1_hash("app"), false, verify),
        ItemState::OutOfDate
    );
    assert_eq!(generation.state_of(&sha1_hash("b.o")), ItemState::Unverified);

    generation.reset_query_state();
    assert_eq!(
        generation.query_item(&sha1_hash("app"), true, verify),
        ItemState::OutOfDate
    );
    assert_eq!(generation.state_of(&sha1_hash("b.o")), ItemState::UpToDate);
}

#[test]
fn verified_states_are_memoized_until_reset() {
    let mut generation = Generation::default();
    assert!(generation.add_item(&file_item("a.o", "1"), &[file_item("shared.h", "1")]));
    assert!(generation.add_item(&file_item("b.o", "1"), &[file_item("shared.h", "1")]));

    let mut verified: Vec<ItemHash> = Vec::new();
    let mut verify = |_: ItemState, item: &Item<'_>| {
        verified.push(item.id_hash);
        ItemState::UpToDate
    };
    generation.query_item(&sha1_hash("a.o"), true, &mut verify);
    generation.query_item(&sha1_hash("b.o"), true, &mut verify);
    generation.query_item(&sha1_hash("b.o"), true, &mut verify);
    assert_eq!(
        verified,
        vec![sha1_hash("a.o"), sha1_hash("shared.h"), sha1_hash("b.o")]
    );
    assert_eq!(generation.state_of(&sha1_hash("shared.h")), ItemState::UpToDate);

    generation.reset_query_state();
    assert_eq!(generation.state_of(&sha1_hash("shared.h")), ItemState::Unverified);
}

#[test]
fn memoized_out_of_date_dependency_fails_later_parents() {
    let mut generation = Generation::default();
    assert!(generation.add_item(&file_item("a.o", "1"), &[file_item("shared.h", "1")]));
    assert!(generation.add_item(&file_item("b.o", "1"), &[file_item("shared.h", "1")]));

    let first = generation.query_item(&sha1_hash("a.o"), true, |_, item| {
        if item.id_data == b"shared.h" {
            ItemState::OutOfDate
        } else {
            ItemState::UpToDate
        }
    });
    assert_eq!(first, ItemState::OutOfDate);

    let second = generation.query_item(&sha1_hash("b.o"), true, |_, _| ItemState::UpToDate);
    assert_eq!(second, ItemState::OutOfDate);
}

#[test]
fn only_direct_dependencies_are_consulted() {
    let mut generation = Generation::default();
    assert!(generation.add_item(&file_item("lib.o", "1"), &[file_item("lib.h", "1")]));
    assert!(generation.add_item(&file_item("app", "1"), &[file_item("lib.o", "1")]));

    let state = generation.query_item(&sha1_hash("app"), true, |_, item| {
        if item.id_data == b"lib.h" {
            ItemState::OutOfDate
        } else {
            ItemState::UpToDate
        }
    });
    assert_eq!(state, ItemState::UpToDate);
    assert_eq!(generation.state_of(&sha1_hash("lib.h")), ItemState::Unverified);
}

#[test]
fn edited_dependency_invalidates_its_dependent() {
    let tmp = tempfile::tempdir().unwrap();
    let parent = sha1_hash("test/test.cpp");

    let mut first = Generation::load(tmp.path());
    assert!(first.add_item(
        &file_item("test/test.cpp", "1700000000"),
        &[file_item("test/dependency.cpp", "1700000001")],
    ));
    first.save(tmp.path()).unwrap();

    let mut loaded = Generation::load(tmp.path());
    assert!(loaded.is_read_only());
    let known: [&[u8]; 2] = [b"1700000000", b"1700000001"];
    let state = loaded.query_item(&parent, true, |_, item| {
        if known.iter().any(|stamp| *stamp == item.change_data) {
            ItemState::UpToDate
        } else {
            ItemState::OutOfDate
        }
    });
    assert_eq!(state, ItemState::UpToDate);

    // The dependency was edited; the next build records its new timestamp.
    let mut next = loaded.new_generation();
    assert!(next.add_item(
        &file_item("test/test.cpp", "1700000000"),
        &[file_item("test/dependency.cpp", "1700000099")],
    ));
    next.save(tmp.path()).unwrap();

    let mut reloaded = Generation::load(tmp.path());
    let live = |_: ItemState, item: &Item<'_>| {
        if item.change_data == b"1700000099" {
            ItemState::OutOfDate
        } else {
            ItemState::UpToDate
        }
    };
    assert_eq!(reloaded.query_item(&parent, true, live), ItemState::OutOfDate);

    reloaded.reset_query_state();
    assert_eq!(reloaded.query_item(&parent, false, live), ItemState::OutOfDate);
    assert_eq!(reloaded.state_of(&parent), ItemState::UpToDate);
}
