//! Object-path allocation for items and sessions.
//!
//! A single monotonic counter is shared across both object kinds, per
//! `spec.md` §4.5: "a single monotonic counter... never reset and never
//! reused within one process." The daemon only ever has the one `"default"`
//! collection (see `spec.md` §4.5's `CreateCollection`), published directly
//! at its alias path (`alias_path` below), so there is no counter-allocated
//! collection path to generate.
use std::sync::atomic::{AtomicU64, Ordering};

const SERVICE_PREFIX: &str = "/org/freedesktop/secrets";

#[derive(Debug, Default)]
pub struct PathAllocator {
    counter: AtomicU64,
}

impl PathAllocator {
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }

    fn next(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst)
    }

    pub fn next_item(&self) -> zvariant::OwnedObjectPath {
        self.make_path("item", "i")
    }

    pub fn next_session(&self) -> zvariant::OwnedObjectPath {
        self.make_path("session", "s")
    }

    fn make_path(&self, kind: &str, prefix: &str) -> zvariant::OwnedObjectPath {
        let n = self.next();
        let path = format!("{SERVICE_PREFIX}/{kind}/{prefix}{n}");
        zvariant::ObjectPath::try_from(path)
            .expect("generated object path is well-formed")
            .into()
    }
}

pub fn alias_path(alias: &str) -> zvariant::OwnedObjectPath {
    let path = format!("{SERVICE_PREFIX}/aliases/{alias}");
    zvariant::ObjectPath::try_from(path)
        .expect("generated alias path is well-formed")
        .into()
}

pub fn null_path() -> zvariant::ObjectPath<'static> {
    zvariant::ObjectPath::try_from("/").expect("null object path is well-formed")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_is_shared_across_kinds() {
        let allocator = PathAllocator::new();
        assert_eq!(allocator.next_item().as_str(), "/org/freedesktop/secrets/item/i0");
        assert_eq!(allocator.next_session().as_str(), "/org/freedesktop/secrets/session/s1");
        assert_eq!(allocator.next_item().as_str(), "/org/freedesktop/secrets/item/i2");
    }
}
