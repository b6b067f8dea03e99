//! Deterministic random number generation for the match simulator.
//!
//! RULE: The simulator never calls a platform RNG.
//! Every stream is derived from one master seed, so the same seed
//! always produces the same ledger.
//!
//! Each innings gets its own stream, seeded from
//! (master_seed XOR stream_index * golden ratio). Playing a shorter
//! first innings never shifts the deliveries of the second.

use rand::{RngCore, SeedableRng};
use rand_pcg::Pcg64Mcg;

pub struct DeliveryRng {
    inner: Pcg64Mcg,
}

impl DeliveryRng {
    /// The index must never change meaning once assigned.
    pub fn new(master_seed: u64, stream_index: u64) -> Self {
        let derived_seed = master_seed ^ (stream_index.wrapping_mul(0x9e37_79b9_7f4a_7c15));
        Self { inner: Pcg64Mcg::seed_from_u64(derived_seed) }
    }

    /// Roll a float in [0.0, 1.0).
    pub fn next_f64(&mut self) -> f64 {
        let bits = self.inner.next_u64();
        (bits >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Roll a usize in [0, n). `n` must be positive.
    pub fn below(&mut self, n: usize) -> usize {
        debug_assert!(n > 0, "n must be > 0");
        (self.inner.next_u64() % n.max(1) as u64) as usize
    }

    /// Bernoulli trial: returns true with probability p.
    pub fn chance(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }

    /// Index into `weights`, drawn in proportion to each weight.
    pub fn weighted(&mut self, weights: &[f64]) -> usize {
        let total: f64 = weights.iter().sum();
        let mut roll = self.next_f64() * total;
        for (i, w) in weights.iter().enumerate() {
            if roll < *w {
                return i;
            }
            roll -= w;
        }
        weights.len().saturating_sub(1)
    }
}
