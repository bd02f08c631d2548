//! Random command batches for the batch-injection strategy.

use std::ops::RangeInclusive;

use rand::seq::SliceRandom;
use rand::Rng;

/// Commands injected when no vocabulary is configured.
pub const DEFAULT_VOCABULARY: [&str; 4] = ["ps", "ls", "cat a.cpp", "time"];

/// Number of commands in one batch.
pub const BATCH_LEN: RangeInclusive<usize> = 1..=5;

/// Draws command batches from a fixed vocabulary.
#[derive(Debug, Clone)]
pub struct BatchGenerator {
    vocabulary: Vec<String>,
}

impl BatchGenerator {
    /// Create a generator over `vocabulary`. Returns `None` if it is empty.
    pub fn new(vocabulary: Vec<String>) -> Option<Self> {
        if vocabulary.is_empty() {
            return None;
        }
        Some(Self { vocabulary })
    }

    /// Draw the next batch.
    ///
    /// The length is uniform over [`BATCH_LEN`] and each command is picked
    /// uniformly with replacement.
    pub fn next_batch<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<String> {
        let len = rng.gen_range(BATCH_LEN);
        let mut batch = Vec::with_capacity(len);
        for _ in 0..len {
            if let Some(cmd) = self.vocabulary.choose(&mut *rng) {
                batch.push(cmd.clone());
            }
        }
        batch
    }
}

impl Default for BatchGenerator {
    fn default() -> Self {
        Self {
            vocabulary: DEFAULT_VOCABULARY.iter().map(|s| s.to_string()).collect(),
        }
    }
}
