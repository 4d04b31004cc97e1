//! RNS polynomials: one residue vector ("limb") per prime
//!
//! A polynomial of Z_Q[X]/(X^N + 1) with Q = q_0 · q_1 ⋯ q_k is stored as k+1
//! residue vectors, limb i holding the coefficients (or NTT evaluations) mod q_i.
//! The primes themselves live in the [`Context`](crate::Context); every operation
//! takes the matching slice of [`NttContext`]s, so a polynomial carries no
//! modulus data of its own.
//!
//! **Layout:** limb-major (`limbs[i][j]` = coefficient j mod prime i), which keeps
//! each per-prime loop contiguous and lets rayon split the work across primes.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::modular::BarrettReducer;
use super::ntt::NttContext;

/// Polynomial in residue-number-system form
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RnsPoly {
    /// limbs[i][j]: coefficient (or evaluation) j modulo prime i
    pub limbs: Vec<Vec<u64>>,

    /// true when the limbs hold NTT evaluations
    pub is_ntt: bool,
}

/// A list of primes with their NTT tables, in limb order
pub type Basis<'a> = [&'a NttContext];

impl RnsPoly {
    /// Zero polynomial with `num_limbs` limbs of dimension `n`
    pub fn zero(n: usize, num_limbs: usize, is_ntt: bool) -> Self {
        Self {
            limbs: vec![vec![0u64; n]; num_limbs],
            is_ntt,
        }
    }

    /// Coefficient-form polynomial from signed integer coefficients
    pub fn from_signed(coeffs: &[i64], basis: &Basis) -> Self {
        let limbs = basis
            .par_iter()
            .map(|ntt| {
                let r = ntt.reducer();
                coeffs.iter().map(|&c| r.reduce_i64(c)).collect()
            })
            .collect();
        Self { limbs, is_ntt: false }
    }

    /// Coefficient-form polynomial from wide signed coefficients
    pub fn from_signed_wide(coeffs: &[i128], basis: &Basis) -> Self {
        let limbs = basis
            .par_iter()
            .map(|ntt| {
                let r = ntt.reducer();
                coeffs.iter().map(|&c| r.reduce_i128(c)).collect()
            })
            .collect();
        Self { limbs, is_ntt: false }
    }

    /// Coefficient-form polynomial whose coefficients are `coeffs` rounded to integers
    pub fn from_rounded(coeffs: &[f64], basis: &Basis) -> Self {
        let limbs = basis
            .par_iter()
            .map(|ntt| {
                let r = ntt.reducer();
                coeffs.iter().map(|&c| r.reduce_f64(c)).collect()
            })
            .collect();
        Self { limbs, is_ntt: false }
    }

    /// Ring dimension
    pub fn dimension(&self) -> usize {
        self.limbs.first().map_or(0, Vec::len)
    }

    /// Number of limbs (primes)
    pub fn num_limbs(&self) -> usize {
        self.limbs.len()
    }

    /// Convert to evaluation form (no-op if already there)
    pub fn to_ntt(&mut self, basis: &Basis) {
        if self.is_ntt {
            return;
        }
        debug_assert_eq!(self.limbs.len(), basis.len());
        self.limbs
            .par_iter_mut()
            .zip(basis.par_iter())
            .for_each(|(limb, ntt)| ntt.forward(limb));
        self.is_ntt = true;
    }

    /// Convert to coefficient form (no-op if already there)
    pub fn to_coeff(&mut self, basis: &Basis) {
        if !self.is_ntt {
            return;
        }
        debug_assert_eq!(self.limbs.len(), basis.len());
        self.limbs
            .par_iter_mut()
            .zip(basis.par_iter())
            .for_each(|(limb, ntt)| ntt.inverse(limb));
        self.is_ntt = false;
    }

    /// Consuming variant of [`to_ntt`](Self::to_ntt)
    pub fn into_ntt(mut self, basis: &Basis) -> Self {
        self.to_ntt(basis);
        self
    }

    /// Consuming variant of [`to_coeff`](Self::to_coeff)
    pub fn into_coeff(mut self, basis: &Basis) -> Self {
        self.to_coeff(basis);
        self
    }

    /// self += other
    pub fn add_assign(&mut self, other: &Self, basis: &Basis) {
        debug_assert_eq!(self.is_ntt, other.is_ntt);
        self.zip_apply(other, basis, |r, a, b| r.add(a, b));
    }

    /// self -= other
    pub fn sub_assign(&mut self, other: &Self, basis: &Basis) {
        debug_assert_eq!(self.is_ntt, other.is_ntt);
        self.zip_apply(other, basis, |r, a, b| r.sub(a, b));
    }

    /// self *= other, pointwise (both in NTT form)
    pub fn mul_assign(&mut self, other: &Self, basis: &Basis) {
        debug_assert!(self.is_ntt && other.is_ntt);
        self.zip_apply(other, basis, |r, a, b| r.mul(a, b));
    }

    /// self += a * b, pointwise (all in NTT form)
    pub fn add_product(&mut self, a: &Self, b: &Self, basis: &Basis) {
        debug_assert!(self.is_ntt && a.is_ntt && b.is_ntt);
        self.limbs
            .par_iter_mut()
            .zip(a.limbs.par_iter().zip(b.limbs.par_iter()))
            .zip(basis.par_iter())
            .for_each(|((acc, (x, y)), ntt)| {
                let r = ntt.reducer();
                for ((c, &u), &v) in acc.iter_mut().zip(x).zip(y) {
                    *c = r.add(*c, r.mul(u, v));
                }
            });
    }

    /// Pointwise product, returning a new polynomial
    pub fn mul(&self, other: &Self, basis: &Basis) -> Self {
        let mut out = self.clone();
        out.mul_assign(other, basis);
        out
    }

    /// self = -self
    pub fn negate(&mut self, basis: &Basis) {
        self.limbs
            .par_iter_mut()
            .zip(basis.par_iter())
            .for_each(|(limb, ntt)| {
                let r = ntt.reducer();
                for x in limb.iter_mut() {
                    *x = r.neg(*x);
                }
            });
    }

    /// Multiply limb i by scalars[i] (a scalar given by its residues)
    pub fn mul_scalar_residues(&mut self, scalars: &[u64], basis: &Basis) {
        self.limbs
            .par_iter_mut()
            .zip(scalars.par_iter())
            .zip(basis.par_iter())
            .for_each(|((limb, &s), ntt)| {
                let r = ntt.reducer();
                for x in limb.iter_mut() {
                    *x = r.mul(*x, s);
                }
            });
    }

    /// Multiply by a signed integer
    pub fn mul_integer(&mut self, k: i64, basis: &Basis) {
        let scalars: Vec<u64> = basis.iter().map(|ntt| ntt.reducer().reduce_i64(k)).collect();
        self.mul_scalar_residues(&scalars, basis);
    }

    /// Add a constant to every NTT evaluation or every coefficient
    ///
    /// In NTT form this adds the constant polynomial c; in coefficient form it adds
    /// c to every coefficient, so callers use it on evaluation-form data only.
    pub fn add_scalar_residues(&mut self, scalars: &[u64], basis: &Basis) {
        self.limbs
            .par_iter_mut()
            .zip(scalars.par_iter())
            .zip(basis.par_iter())
            .for_each(|((limb, &s), ntt)| {
                let r = ntt.reducer();
                for x in limb.iter_mut() {
                    *x = r.add(*x, s);
                }
            });
    }

    /// Keep only the first `num_limbs` limbs
    pub fn truncate(&mut self, num_limbs: usize) {
        self.limbs.truncate(num_limbs);
    }

    /// Multiply by the monomial X^k (coefficient form), k in [0, 2N)
    pub fn mul_monomial(&self, k: usize, basis: &Basis) -> Self {
        debug_assert!(!self.is_ntt);
        let n = self.dimension();
        let two_n = 2 * n;
        let limbs = self
            .limbs
            .par_iter()
            .zip(basis.par_iter())
            .map(|(limb, ntt)| {
                let r = ntt.reducer();
                let mut out = vec![0u64; n];
                for (j, &c) in limb.iter().enumerate() {
                    let idx = (j + k) % two_n;
                    if idx < n {
                        out[idx] = c;
                    } else {
                        out[idx - n] = r.neg(c);
                    }
                }
                out
            })
            .collect();
        Self { limbs, is_ntt: false }
    }

    /// Apply the ring automorphism X → X^g (coefficient form, g odd)
    pub fn automorphism(&self, g: usize, basis: &Basis) -> Self {
        debug_assert!(!self.is_ntt);
        debug_assert!(g % 2 == 1);
        let n = self.dimension();
        let two_n = 2 * n;
        let limbs = self
            .limbs
            .par_iter()
            .zip(basis.par_iter())
            .map(|(limb, ntt)| {
                let r = ntt.reducer();
                let mut out = vec![0u64; n];
                for (j, &c) in limb.iter().enumerate() {
                    let idx = (j * g) % two_n;
                    if idx < n {
                        out[idx] = c;
                    } else {
                        out[idx - n] = r.neg(c);
                    }
                }
                out
            })
            .collect();
        Self { limbs, is_ntt: false }
    }

    /// Divide by the last prime with rounding and drop its limb
    ///
    /// For every remaining prime q_i computes (c - [c]_{q_last}) · q_last^(-1) mod q_i,
    /// where [c]_{q_last} is the centered residue, i.e. round(c / q_last).
    /// `basis` covers all limbs including the one being dropped.
    pub fn divide_by_last_prime(&mut self, basis: &Basis) {
        let last = self.limbs.len() - 1;
        let was_ntt = self.is_ntt;
        let mut top = match self.limbs.pop() {
            Some(limb) => limb,
            None => return,
        };
        let q_last = basis[last];
        if was_ntt {
            q_last.inverse(&mut top);
        }
        let r_last = q_last.reducer();
        let centered: Vec<i64> = top.iter().map(|&c| r_last.center(c)).collect();

        self.limbs
            .par_iter_mut()
            .zip(basis[..last].par_iter())
            .for_each(|(limb, ntt)| {
                let r = ntt.reducer();
                let mut correction: Vec<u64> = centered.iter().map(|&c| r.reduce_i64(c)).collect();
                if was_ntt {
                    ntt.forward(&mut correction);
                }
                let q_inv = r.inv(r.reduce(q_last.q));
                for (x, &c) in limb.iter_mut().zip(&correction) {
                    *x = r.mul(r.sub(*x, c), q_inv);
                }
            });
    }

    fn zip_apply<F>(&mut self, other: &Self, basis: &Basis, f: F)
    where
        F: Fn(&BarrettReducer, u64, u64) -> u64 + Sync,
    {
        debug_assert!(self.limbs.len() <= other.limbs.len());
        self.limbs
            .par_iter_mut()
            .zip(other.limbs.par_iter())
            .zip(basis.par_iter())
            .for_each(|((a, b), ntt)| {
                let r = ntt.reducer();
                for (x, &y) in a.iter_mut().zip(b) {
                    *x = f(r, *x, y);
                }
            });
    }
}
