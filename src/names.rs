//! Collision-free identifiers for generated symbols.
//!
//! One allocator lives for a whole translation unit so that position names,
//! temporaries and routine names never clash across routines.

use crate::error::PostError;
use std::collections::HashSet;
use tracing::debug;

/// Default number of candidates tried before giving up on a seed.
pub const DEFAULT_ATTEMPT_LIMIT: usize = 100_000;

/// Hands out names that have not been handed out or reserved before.
#[derive(Clone, Debug)]
pub struct NameAllocator {
    used: HashSet<String>,
    limit: usize,
}

impl Default for NameAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_ATTEMPT_LIMIT)
    }
}

impl NameAllocator {
    /// Creates an empty allocator that gives up on a seed after `limit` candidates.
    pub fn new(limit: usize) -> Self {
        Self {
            used: HashSet::new(),
            limit,
        }
    }

    /// Whether `name` is already taken in this unit.
    pub fn contains(&self, name: &str) -> bool {
        self.used.contains(name)
    }

    /// Marks `name` as taken without allocating it.
    ///
    /// Returns false if it was already taken.
    pub fn reserve(&mut self, name: impl Into<String>) -> bool {
        self.used.insert(name.into())
    }

    /// Returns `seed` if it is free, otherwise the first free variant of it.
    ///
    /// Seeds containing `_` lose a trailing `_<digits>` suffix and are tried
    /// as `base_1`, `base_2`, ... . Other seeds are kept whole and tried as
    /// `seed0`, `seed1`, ... so the result always starts with the seed.
    pub fn allocate(&mut self, seed: &str) -> Result<String, PostError> {
        if self.used.insert(seed.to_string()) {
            return Ok(seed.to_string());
        }

        let (base, separator) = if seed.contains('_') {
            (strip_numeric_suffix(seed), "_")
        } else {
            (seed, "")
        };
        let first = if separator.is_empty() { 0 } else { 1 };

        for i in (first..).take(self.limit) {
            let candidate = format!("{base}{separator}{i}");
            if self.used.insert(candidate.clone()) {
                debug!(seed, name = %candidate, "renamed colliding identifier");
                return Ok(candidate);
            }
        }

        Err(PostError::NamesExhausted {
            seed: seed.to_string(),
            limit: self.limit,
        })
    }
}

/// `Move_12` -> `Move`. Seeds whose tail after the last `_` is not all digits
/// are returned unchanged.
fn strip_numeric_suffix(seed: &str) -> &str {
    match seed.rsplit_once('_') {
        Some((base, digits))
            if !base.is_empty()
                && !digits.is_empty()
                && digits.bytes().all(|b| b.is_ascii_digit()) =>
        {
            base
        }
        _ => seed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_keeps_prefix_for_plain_seeds() {
        let mut names = NameAllocator::default();
        let first = names.allocate("P1").unwrap();
        let second = names.allocate("P1").unwrap();
        let third = names.allocate("P1").unwrap();
        assert_eq!(first, "P1");
        assert_eq!(second, "P10");
        assert_eq!(third, "P11");
        assert!(second.starts_with("P1") && third.starts_with("P1"));
    }

    #[test]
    fn test_allocate_skips_reserved_candidates() {
        let mut names = NameAllocator::default();
        names.reserve("P");
        names.reserve("P0");
        assert_eq!(names.allocate("P").unwrap(), "P1");
    }

    #[test]
    fn test_underscore_seeds_count_from_base() {
        let mut names = NameAllocator::default();
        assert_eq!(names.allocate("Move_3").unwrap(), "Move_3");
        assert_eq!(names.allocate("Move_3").unwrap(), "Move_1");
        assert_eq!(names.allocate("Move_3").unwrap(), "Move_2");
        assert_eq!(names.allocate("Move_3").unwrap(), "Move_4");
    }

    #[test]
    fn test_exhaustion_is_an_error() {
        let mut names = NameAllocator::new(3);
        for name in ["X", "X0", "X1", "X2"] {
            names.reserve(name);
        }
        assert!(matches!(
            names.allocate("X"),
            Err(PostError::NamesExhausted { limit: 3, .. })
        ));
    }

    #[test]
    fn test_strip_numeric_suffix() {
        assert_eq!(strip_numeric_suffix("Path_12"), "Path");
        assert_eq!(strip_numeric_suffix("Path_A"), "Path_A");
        assert_eq!(strip_numeric_suffix("_12"), "_12");
    }
}
