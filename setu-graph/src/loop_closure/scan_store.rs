//! Append-only keyed scan storage.

use std::collections::HashMap;
use std::sync::Arc;

use crate::core::{Key, PointCloud};

/// Result of [`ScanStore::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The scan was stored.
    Inserted,
    /// A scan already existed for the key and was kept.
    AlreadyPresent,
}

/// Scans keyed by pose. The first scan stored for a key wins.
#[derive(Debug, Clone, Default)]
pub struct ScanStore {
    scans: HashMap<Key, Arc<PointCloud>>,
}

impl ScanStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a scan unless the key already has one.
    pub fn insert(&mut self, key: Key, scan: impl Into<Arc<PointCloud>>) -> InsertOutcome {
        if self.scans.contains_key(&key) {
            log::debug!("Key {} already has a scan, not adding", key);
            return InsertOutcome::AlreadyPresent;
        }
        self.scans.insert(key, scan.into());
        InsertOutcome::Inserted
    }

    /// Shared handle to a stored scan.
    pub fn get(&self, key: Key) -> Option<Arc<PointCloud>> {
        self.scans.get(&key).cloned()
    }

    /// True if `key` has a scan.
    #[inline]
    pub fn contains(&self, key: Key) -> bool {
        self.scans.contains_key(&key)
    }

    /// Number of stored scans.
    #[inline]
    pub fn len(&self) -> usize {
        self.scans.len()
    }

    /// True if no scan is stored.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.scans.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;

    fn cloud(x: f64) -> PointCloud {
        PointCloud::from_points(vec![Point3::new(x, 0.0, 0.0)])
    }

    #[test]
    fn test_duplicate_insert_is_noop() {
        let mut store = ScanStore::new();
        assert_eq!(store.insert(Key(3), cloud(1.0)), InsertOutcome::Inserted);
        assert_eq!(store.insert(Key(3), cloud(2.0)), InsertOutcome::AlreadyPresent);

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(Key(3)).unwrap().points[0].x, 1.0);
    }

    #[test]
    fn test_get_shares_storage() {
        let mut store = ScanStore::new();
        store.insert(Key(0), Arc::new(cloud(0.5)));
        let a = store.get(Key(0)).unwrap();
        let b = store.get(Key(0)).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(store.get(Key(1)).is_none());
    }
}
