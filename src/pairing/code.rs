//! Pairing code allocation.

use std::ops::Range;

use rand::Rng;

use crate::error::SessionError;

/// Generates fixed-width numeric codes that are unique within a key set.
#[derive(Debug, Clone, Copy)]
pub struct CodeAllocator {
    digits: u32,
}

impl CodeAllocator {
    /// Allocator for `digits`-wide codes, e.g. 6 digits covers 100000..=999999.
    pub fn new(digits: u32) -> Self {
        Self { digits }
    }

    /// Range of numeric values a code is drawn from.
    pub fn range(&self) -> Range<u64> {
        let low = 10u64.pow(self.digits.saturating_sub(1));
        low..low * 10
    }

    /// Number of distinct codes this allocator can produce.
    pub fn capacity(&self) -> usize {
        let range = self.range();
        (range.end - range.start) as usize
    }

    /// Draw codes until one is not already taken.
    pub fn allocate<F>(&self, is_taken: F, taken_count: usize) -> Result<String, SessionError>
    where
        F: Fn(&str) -> bool,
    {
        self.allocate_with(&mut rand::thread_rng(), is_taken, taken_count)
    }

    /// Same as [`allocate`](Self::allocate) with an explicit random source.
    pub fn allocate_with<R, F>(
        &self,
        rng: &mut R,
        is_taken: F,
        taken_count: usize,
    ) -> Result<String, SessionError>
    where
        R: Rng,
        F: Fn(&str) -> bool,
    {
        let capacity = self.capacity();
        if taken_count >= capacity {
            return Err(SessionError::CodeSpaceExhausted { capacity });
        }

        let range = self.range();
        loop {
            let candidate = rng.gen_range(range.clone()).to_string();
            if !is_taken(&candidate) {
                return Ok(candidate);
            }
            tracing::trace!(candidate = %candidate, "Pairing code collision, retrying");
        }
    }
}

impl Default for CodeAllocator {
    fn default() -> Self {
        Self::new(6)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn test_default_codes_are_six_digits() {
        let allocator = CodeAllocator::default();
        for _ in 0..100 {
            let code = allocator.allocate(|_| false, 0).unwrap();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
            let num: u64 = code.parse().unwrap();
            assert!((100_000..1_000_000).contains(&num));
        }
    }

    #[test]
    fn test_allocation_skips_taken_codes() {
        // One-digit codes: 1..=9. Leave only "7" free.
        let allocator = CodeAllocator::new(1);
        let taken: HashSet<String> = (1..10)
            .filter(|n| *n != 7)
            .map(|n: u64| n.to_string())
            .collect();
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..20 {
            let code = allocator
                .allocate_with(&mut rng, |c| taken.contains(c), taken.len())
                .unwrap();
            assert_eq!(code, "7");
        }
    }

    #[test]
    fn test_sequential_allocations_never_collide() {
        let allocator = CodeAllocator::new(2);
        let mut taken = HashSet::new();
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..allocator.capacity() {
            let code = allocator
                .allocate_with(&mut rng, |c| taken.contains(c), taken.len())
                .unwrap();
            assert!(taken.insert(code), "allocator returned a taken code");
        }
        assert_eq!(taken.len(), 90);
    }

    #[test]
    fn test_exhausted_code_space_is_an_error() {
        let allocator = CodeAllocator::new(1);
        let err = allocator.allocate(|_| true, 9).unwrap_err();
        assert!(matches!(
            err,
            SessionError::CodeSpaceExhausted { capacity: 9 }
        ));
    }

    #[test]
    fn test_range_matches_width() {
        assert_eq!(CodeAllocator::new(4).range(), 1_000..10_000);
        assert_eq!(CodeAllocator::new(6).capacity(), 900_000);
    }
}
