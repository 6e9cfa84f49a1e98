// src/rng.rs
//
// Deterministic, seeded PRNG for the `random`/`random_2d`/`random_3d`
// (IGSOA) and `random_perturbation` (SATP) profiles. Property 2 in SS8
// requires two `create_engine + random(seed=k)` sequences to produce
// bit-identical `get_state` arrays, so a fixed, versioned algorithm
// (ChaCha8) is used rather than the platform default, which is
// unspecified and may change across `rand` releases.

use rand::Rng;
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha8Rng;

pub struct SeededRng(ChaCha8Rng);

impl SeededRng {
    pub fn new(seed: u64) -> Self {
        Self(ChaCha8Rng::seed_from_u64(seed))
    }

    /// Uniform sample in `[-amplitude, amplitude]`.
    pub fn next_amplitude(&mut self, amplitude: f64) -> f64 {
        self.0.gen_range(-amplitude..=amplitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_yields_identical_sequence() {
        let mut a = SeededRng::new(42);
        let mut b = SeededRng::new(42);
        for _ in 0..64 {
            assert_eq!(a.next_amplitude(1.0), b.next_amplitude(1.0));
        }
    }

    #[test]
    fn samples_stay_within_amplitude() {
        let mut rng = SeededRng::new(7);
        for _ in 0..1000 {
            let v = rng.next_amplitude(3.0);
            assert!((-3.0..=3.0).contains(&v));
        }
    }
}
