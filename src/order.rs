//! Per-fixture randomization of contender execution order.
//!
//! Running contenders in a fixed order lets drift (frequency scaling, cache state
//! left behind by the previous contender) land on the same contender every time.
//! Shuffling per fixture turns it into noise that averages out.

use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

use crate::harness::fixture_rng;

/// Seedable source of per-fixture permutations.
#[derive(Clone, Copy, Debug)]
pub struct Shuffler {
    seed: u64,
}

impl Shuffler {
    pub fn seeded(seed: u64) -> Self {
        Self { seed }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// RNG for fixture `index`; independent across fixtures.
    pub fn rng_for(&self, index: usize) -> ChaCha8Rng {
        fixture_rng(self.seed, index)
    }

    /// Uniform in-place permutation for fixture `index`.
    pub fn shuffle<T>(&self, index: usize, items: &mut [T]) {
        items.shuffle(&mut self.rng_for(index));
    }

    /// Shuffled order of `0..len` for fixture `index`.
    pub fn order(&self, index: usize, len: usize) -> Vec<usize> {
        let mut idx: Vec<usize> = (0..len).collect();
        self.shuffle(index, &mut idx);
        idx
    }
}
