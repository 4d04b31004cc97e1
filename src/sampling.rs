//! Random sampling for secrets, errors and masks
//!
//! Every generator is a `ChaCha20Rng`, seeded either from OS entropy or from a
//! caller-supplied [`Seed`] so key and ciphertext generation can be replayed.

use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::math::{Basis, RnsPoly};

/// Standard deviation of the discrete Gaussian error
pub const ERROR_STD_DEV: f64 = 3.2;

/// Errors are clipped to this many standard deviations
const ERROR_TAIL_CUT: f64 = 6.0;

/// 32-byte seed for reproducible randomness
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Seed(pub [u8; 32]);

impl Seed {
    /// Seed derived from a `u64` (tests and examples)
    pub fn from_u64(value: u64) -> Self {
        let mut bytes = [0u8; 32];
        ChaCha20Rng::seed_from_u64(value).fill(&mut bytes);
        Seed(bytes)
    }

    pub fn rng(&self) -> ChaCha20Rng {
        ChaCha20Rng::from_seed(self.0)
    }
}

/// Generator seeded from `seed`, or from OS entropy when absent
pub fn make_rng(seed: Option<Seed>) -> ChaCha20Rng {
    match seed {
        Some(seed) => seed.rng(),
        None => ChaCha20Rng::from_entropy(),
    }
}

/// Ternary vector of length n with exactly `h` nonzero entries of random sign
pub fn ternary_fixed_weight<R: Rng + ?Sized>(n: usize, h: usize, rng: &mut R) -> Vec<i8> {
    let mut out = vec![0i8; n];
    for pos in index::sample(rng, n, h.min(n)) {
        out[pos] = if rng.gen::<bool>() { 1 } else { -1 };
    }
    out
}

/// Ternary vector with P(0) = 1/2 and P(±1) = 1/4, used as the encryption mask
pub fn ternary_zo<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Vec<i64> {
    (0..n)
        .map(|_| match rng.gen_range(0..4u8) {
            0 => 1,
            1 => -1,
            _ => 0,
        })
        .collect()
}

/// Rounded Gaussian error vector, clipped at 6σ
pub fn gaussian<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Vec<i64> {
    // σ > 0 is a constant, so construction cannot fail
    let normal = Normal::new(0.0, ERROR_STD_DEV).unwrap_or_else(|_| unreachable!());
    let bound = ERROR_STD_DEV * ERROR_TAIL_CUT;
    (0..n)
        .map(|_| normal.sample(rng).clamp(-bound, bound).round() as i64)
        .collect()
}

/// Gaussian error polynomial in NTT form over `basis`
pub fn gaussian_poly<R: Rng + ?Sized>(n: usize, basis: &Basis, rng: &mut R) -> RnsPoly {
    RnsPoly::from_signed(&gaussian(n, rng), basis).into_ntt(basis)
}

/// Uniform polynomial, sampled directly in NTT form (uniform either way)
pub fn uniform_poly<R: Rng + ?Sized>(n: usize, basis: &Basis, rng: &mut R) -> RnsPoly {
    let limbs = basis
        .iter()
        .map(|ntt| (0..n).map(|_| rng.gen_range(0..ntt.q)).collect())
        .collect();
    RnsPoly {
        limbs,
        is_ntt: true,
    }
}
