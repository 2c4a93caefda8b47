mod config;
mod copy_item;
mod generations;
mod query_item;

use deptrackr::{Item, ItemHash};
use sha1::{Digest, Sha1};

/// Identity/change hash of a string, the way a build tool hashes paths and
/// timestamps.
pub(crate) fn sha1_hash(text: &str) -> ItemHash {
    ItemHash::from_slice(&Sha1::digest(text.as_bytes())).expect("sha1 digests are 20 bytes")
}

/// An item whose identity and change payloads are the strings it was hashed from.
pub(crate) fn file_item<'a>(path: &'a str, stamp: &'a str) -> Item<'a> {
    Item::new(sha1_hash(path), sha1_hash(stamp))
        .with_id_data(path.as_bytes())
        .with_change_data(stamp.as_bytes())
}
