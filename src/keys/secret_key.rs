//! Ternary secret keys

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::error::{HeError, Result};
use crate::math::{Basis, RnsPoly};
use crate::sampling::{make_rng, ternary_fixed_weight, Seed};

/// Secret key s with coefficients in {-1, 0, 1} and a fixed Hamming weight
///
/// Never part of a [`KeyPack`](super::KeyPack). Coefficients are stored as small
/// integers and lifted to any RNS basis on demand.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretKey {
    coeffs: Vec<i8>,
}

impl SecretKey {
    /// Sample a key of the context's Hamming weight from OS entropy
    pub fn new(context: &Context) -> Self {
        Self::sample(context, None)
    }

    /// Sample a key deterministically from `seed`
    pub fn from_seed(context: &Context, seed: Seed) -> Self {
        Self::sample(context, Some(seed))
    }

    fn sample(context: &Context, seed: Option<Seed>) -> Self {
        let mut rng = make_rng(seed);
        Self {
            coeffs: ternary_fixed_weight(context.dimension(), context.hamming_weight(), &mut rng),
        }
    }

    /// Key with explicit coefficients
    ///
    /// # Errors
    /// `InvalidParameter` when the length differs from N or a coefficient is not ternary.
    pub fn from_coefficients(context: &Context, coeffs: &[i8]) -> Result<Self> {
        if coeffs.len() != context.dimension() {
            return Err(HeError::InvalidParameter(format!(
                "secret key has {} coefficients, expected {}",
                coeffs.len(),
                context.dimension()
            )));
        }
        if coeffs.iter().any(|c| !(-1..=1).contains(c)) {
            return Err(HeError::InvalidParameter(
                "secret key coefficients must be ternary".into(),
            ));
        }
        Ok(Self {
            coeffs: coeffs.to_vec(),
        })
    }

    pub fn coefficients(&self) -> &[i8] {
        &self.coeffs
    }

    pub fn dimension(&self) -> usize {
        self.coeffs.len()
    }

    pub fn hamming_weight(&self) -> usize {
        self.coeffs.iter().filter(|&&c| c != 0).count()
    }

    /// s in coefficient form over `basis`
    pub(crate) fn to_coeff_poly(&self, basis: &Basis) -> RnsPoly {
        let wide: Vec<i64> = self.coeffs.iter().map(|&c| i64::from(c)).collect();
        RnsPoly::from_signed(&wide, basis)
    }

    /// s in NTT form over `basis`
    pub(crate) fn to_ntt_poly(&self, basis: &Basis) -> RnsPoly {
        self.to_coeff_poly(basis).into_ntt(basis)
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretKey")
            .field("dimension", &self.dimension())
            .field("hamming_weight", &self.hamming_weight())
            .finish_non_exhaustive()
    }
}
