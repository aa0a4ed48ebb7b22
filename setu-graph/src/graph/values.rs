//! Optimized pose estimates.

use std::collections::BTreeMap;

use crate::core::{Key, Pose3};

/// Current best estimate per key.
///
/// Grows by insertion only; a successful optimization replaces it wholesale.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Values {
    poses: BTreeMap<Key, Pose3>,
}

impl Values {
    /// Empty set of values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new value. Returns `false` (and leaves the old value) if the key exists.
    pub fn insert(&mut self, key: Key, pose: Pose3) -> bool {
        if self.poses.contains_key(&key) {
            return false;
        }
        self.poses.insert(key, pose);
        true
    }

    /// Overwrite an existing value. Returns `false` if the key is unknown.
    pub fn update(&mut self, key: Key, pose: Pose3) -> bool {
        match self.poses.get_mut(&key) {
            Some(slot) => {
                *slot = pose;
                true
            }
            None => false,
        }
    }

    /// Estimate for `key`.
    #[inline]
    pub fn get(&self, key: Key) -> Option<&Pose3> {
        self.poses.get(&key)
    }

    /// True if `key` has a value.
    #[inline]
    pub fn contains(&self, key: Key) -> bool {
        self.poses.contains_key(&key)
    }

    /// Number of values.
    #[inline]
    pub fn len(&self) -> usize {
        self.poses.len()
    }

    /// True if empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }

    /// Keys in ascending order.
    pub fn keys(&self) -> impl Iterator<Item = Key> + '_ {
        self.poses.keys().copied()
    }

    /// `(key, pose)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (Key, &Pose3)> {
        self.poses.iter().map(|(k, p)| (*k, p))
    }
}

impl FromIterator<(Key, Pose3)> for Values {
    fn from_iter<I: IntoIterator<Item = (Key, Pose3)>>(iter: I) -> Self {
        Self {
            poses: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_is_not_overwrite() {
        let mut values = Values::new();
        assert!(values.insert(Key(1), Pose3::identity()));
        assert!(!values.insert(Key(1), Pose3::from_translation(5.0, 0.0, 0.0)));
        assert_eq!(values.get(Key(1)), Some(&Pose3::identity()));
        assert!(values.update(Key(1), Pose3::from_translation(5.0, 0.0, 0.0)));
        assert!(!values.update(Key(2), Pose3::identity()));
    }
}
