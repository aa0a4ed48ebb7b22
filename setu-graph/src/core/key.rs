//! Pose-graph keys and their provenance.

use std::fmt;

/// Identifier of a pose in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Key(pub u64);

impl Key {
    /// Raw index.
    #[inline]
    pub fn index(self) -> u64 {
        self.0
    }

    /// The key directly after this one in an odometry chain.
    #[inline]
    pub fn next(self) -> Key {
        Key(self.0 + 1)
    }
}

impl From<u64> for Key {
    fn from(value: u64) -> Self {
        Key(value)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.0)
    }
}

/// Where a new value in an update came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum KeyTag {
    /// Routine dead-reckoning step.
    #[default]
    Odometry,
    /// Created alongside a loop closure (or another non-sequential constraint).
    LoopClosure,
}

/// A key together with the provenance of the value being inserted for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaggedKey {
    /// The pose key.
    pub key: Key,
    /// Provenance.
    pub tag: KeyTag,
}

impl TaggedKey {
    /// Key produced by the odometry front-end.
    #[inline]
    pub fn odometry(key: impl Into<Key>) -> Self {
        Self {
            key: key.into(),
            tag: KeyTag::Odometry,
        }
    }

    /// Key produced together with a loop closure.
    #[inline]
    pub fn loop_closure(key: impl Into<Key>) -> Self {
        Self {
            key: key.into(),
            tag: KeyTag::LoopClosure,
        }
    }

    /// Whether this key was created by a loop closure.
    #[inline]
    pub fn is_loop_closure(&self) -> bool {
        self.tag == KeyTag::LoopClosure
    }
}

impl fmt::Display for TaggedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.tag {
            KeyTag::Odometry => write!(f, "{}", self.key),
            KeyTag::LoopClosure => write!(f, "{}[lc]", self.key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_ordering_and_next() {
        assert!(Key(3) < Key(4));
        assert_eq!(Key(3).next(), Key(4));
    }

    #[test]
    fn test_tagged_key_provenance() {
        assert!(!TaggedKey::odometry(5).is_loop_closure());
        assert!(TaggedKey::loop_closure(5).is_loop_closure());
        assert_eq!(TaggedKey::loop_closure(5).to_string(), "x5[lc]");
    }
}
