//! Correlation refs for control requests.

use std::sync::atomic::{AtomicU64, Ordering};

/// Produces the `ref` attached to open and close requests.
pub trait RefGenerator: Send + Sync {
    fn next_ref(&self) -> String;
}

/// Random refs, rendered in base 36.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomRefs;

impl RefGenerator for RandomRefs {
    fn next_ref(&self) -> String {
        to_base36(rand::random::<u64>())
    }
}

/// Monotonic refs starting at 1, rendered in base 36.
#[derive(Debug)]
pub struct SequentialRefs {
    next: AtomicU64,
}

impl SequentialRefs {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }
}

impl Default for SequentialRefs {
    fn default() -> Self {
        Self::new()
    }
}

impl RefGenerator for SequentialRefs {
    fn next_ref(&self) -> String {
        to_base36(self.next.fetch_add(1, Ordering::SeqCst))
    }
}

const BASE36_DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Renders `value` in lowercase base 36.
pub fn to_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::with_capacity(13);
    while value > 0 {
        digits.push(BASE36_DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    digits.iter().rev().map(|&d| d as char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base36() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
        assert_eq!(to_base36(1_295), "zz");
        assert_eq!(to_base36(u64::MAX), "3w5e11264sgsf");
    }

    #[test]
    fn test_sequential_refs() {
        let refs = SequentialRefs::starting_at(35);
        assert_eq!(refs.next_ref(), "z");
        assert_eq!(refs.next_ref(), "10");
        assert_eq!(refs.next_ref(), "11");
    }

    #[test]
    fn test_random_refs_are_base36() {
        let refs = RandomRefs;
        for _ in 0..32 {
            let r = refs.next_ref();
            assert!(!r.is_empty() && r.len() <= 13);
            assert!(r.bytes().all(|b| b.is_ascii_digit() || b.is_ascii_lowercase()));
        }
    }
}
