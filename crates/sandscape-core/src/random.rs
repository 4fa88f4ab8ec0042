//! Seeded random source shared by every stochastic rule.
//!
//! Backed by ChaCha8 so the stream is portable and can be resumed from a
//! `(seed, word position)` pair stored in snapshots.

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Reproducible pseudo-random stream: the same seed yields the same sequence.
#[derive(Debug, Clone)]
pub struct RandomSource {
    seed: u64,
    rng: ChaCha8Rng,
}

impl RandomSource {
    /// Create a stream starting at the beginning of `seed`'s sequence.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Create a stream from an entropy-derived seed.
    #[must_use]
    pub fn from_entropy() -> Self {
        let seed: u64 = rand::random();
        Self::new(seed)
    }

    /// Resume a stream previously captured with [`RandomSource::word_pos`].
    #[must_use]
    pub fn restore(seed: u64, word_pos: u128) -> Self {
        let mut source = Self::new(seed);
        source.rng.set_word_pos(word_pos);
        source
    }

    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    /// Current position in the underlying keystream.
    #[must_use]
    pub fn word_pos(&self) -> u128 {
        self.rng.get_word_pos()
    }

    /// Uniform float in `[0, 1)`.
    pub fn next_float(&mut self) -> f32 {
        self.rng.random::<f32>()
    }

    /// Uniform integer in `[0, bound)`; a zero bound yields zero without drawing.
    pub fn next_int(&mut self, bound: u32) -> u32 {
        if bound == 0 {
            return 0;
        }
        self.rng.random_range(0..bound)
    }

    /// Returns `true` with probability `p`.
    pub fn chance(&mut self, p: f32) -> bool {
        if p <= 0.0 {
            return false;
        }
        self.next_float() < p
    }

    pub fn coin(&mut self) -> bool {
        self.next_int(2) == 0
    }

    /// Either `-1` or `1`.
    pub fn sign(&mut self) -> i32 {
        if self.coin() { -1 } else { 1 }
    }

    /// Shuffle `items` in place, drawing from this stream.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        items.shuffle(&mut self.rng);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_stream() {
        let mut a = RandomSource::new(7);
        let mut b = RandomSource::new(7);
        for _ in 0..64 {
            assert_eq!(a.next_int(1000), b.next_int(1000));
            assert_eq!(a.next_float().to_bits(), b.next_float().to_bits());
        }
    }

    #[test]
    fn restore_resumes_mid_stream() {
        let mut a = RandomSource::new(99);
        for _ in 0..17 {
            a.next_float();
        }
        let mut b = RandomSource::restore(a.seed(), a.word_pos());
        for _ in 0..32 {
            assert_eq!(a.next_int(u32::MAX), b.next_int(u32::MAX));
        }
    }

    #[test]
    fn ranges_are_respected() {
        let mut rng = RandomSource::new(3);
        for _ in 0..500 {
            let f = rng.next_float();
            assert!((0.0..1.0).contains(&f));
            assert!(rng.next_int(5) < 5);
            assert!(matches!(rng.sign(), -1 | 1));
        }
        assert_eq!(rng.next_int(0), 0);
        assert!(!rng.chance(0.0));
    }

    #[test]
    fn shuffle_is_a_permutation() {
        let mut rng = RandomSource::new(11);
        let mut items: Vec<u32> = (0..32).collect();
        rng.shuffle(&mut items);
        let mut sorted = items.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..32).collect::<Vec<_>>());

        let mut again: Vec<u32> = (0..32).collect();
        RandomSource::new(11).shuffle(&mut again);
        assert_eq!(items, again);
    }
}
