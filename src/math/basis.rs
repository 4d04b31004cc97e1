//! RNS basis conversion and CRT reconstruction
//!
//! **Fast basis conversion** (Bajard et al., HPS): for x given by residues over a
//! basis B = {b_0, ..., b_{k-1}}, computes
//!
//! ```text
//! Conv_{B→C}(x) = Σ_i [x_i · (B/b_i)^(-1)]_{b_i} · (B/b_i)  mod c
//! ```
//!
//! for every target prime c. The result equals x + u·B for some 0 ≤ u < k, which
//! is exactly the slack that hybrid key switching tolerates: mod-up absorbs it in
//! the gadget structure and mod-down turns it into a rounding error of size k.
//!
//! **CRT reconstruction** uses `num-bigint` because Q spans hundreds of bits.

use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};
use rayon::prelude::*;

use super::rns_poly::Basis;

/// Precomputed constants for converting residues from one basis to another
#[derive(Clone, Debug)]
pub struct BasisConverter {
    /// (B/b_i)^(-1) mod b_i
    qhat_inv: Vec<u64>,
    /// qhat_mod_target[k][i] = (B/b_i) mod c_k
    qhat_mod_target: Vec<Vec<u64>>,
}

impl BasisConverter {
    /// Precompute the conversion constants from `from` to `to`
    pub fn new(from: &Basis, to: &Basis) -> Self {
        let qhat_inv = from
            .iter()
            .enumerate()
            .map(|(i, ntt)| {
                let r = ntt.reducer();
                let prod = from
                    .iter()
                    .enumerate()
                    .filter(|&(j, _)| j != i)
                    .fold(1u64, |acc, (_, other)| r.mul(acc, r.reduce(other.q)));
                r.inv(prod)
            })
            .collect();

        let qhat_mod_target = to
            .iter()
            .map(|target| {
                let r = target.reducer();
                (0..from.len())
                    .map(|i| {
                        from.iter()
                            .enumerate()
                            .filter(|&(j, _)| j != i)
                            .fold(1u64, |acc, (_, other)| r.mul(acc, r.reduce(other.q)))
                    })
                    .collect()
            })
            .collect();

        Self {
            qhat_inv,
            qhat_mod_target,
        }
    }

    /// Convert coefficient-form limbs over `from` into limbs over `to`
    pub fn convert(&self, input: &[Vec<u64>], from: &Basis, to: &Basis) -> Vec<Vec<u64>> {
        debug_assert_eq!(input.len(), from.len());
        let n = input.first().map_or(0, Vec::len);

        let scaled: Vec<Vec<u64>> = input
            .par_iter()
            .zip(from.par_iter())
            .zip(self.qhat_inv.par_iter())
            .map(|((limb, ntt), &inv)| {
                let r = ntt.reducer();
                limb.iter().map(|&x| r.mul(x, inv)).collect()
            })
            .collect();

        to.par_iter()
            .zip(self.qhat_mod_target.par_iter())
            .map(|(target, qhat)| {
                let r = target.reducer();
                let mut out = vec![0u64; n];
                for (y, &h) in scaled.iter().zip(qhat) {
                    for (o, &v) in out.iter_mut().zip(y) {
                        *o = r.add(*o, r.mul(r.reduce(v), h));
                    }
                }
                out
            })
            .collect()
    }
}

/// Exact CRT reconstruction modulo Q = Π q_i
#[derive(Clone, Debug)]
pub struct CrtReconstructor {
    modulus: BigUint,
    half_modulus: BigUint,
    /// (Q/q_i) · [(Q/q_i)^(-1)]_{q_i}, the CRT idempotents
    idempotents: Vec<BigUint>,
}

impl CrtReconstructor {
    /// Precompute CRT idempotents for `basis`
    pub fn new(basis: &Basis) -> Self {
        let modulus = basis
            .iter()
            .fold(BigUint::from(1u32), |acc, ntt| acc * ntt.q);
        let idempotents = basis
            .iter()
            .map(|ntt| {
                let qi = BigUint::from(ntt.q);
                let qhat = &modulus / &qi;
                let qhat_mod = (&qhat % &qi).to_u64().unwrap_or(0);
                let inv = ntt.reducer().inv(qhat_mod);
                qhat * inv
            })
            .collect();
        let half_modulus = &modulus >> 1u32;

        Self {
            modulus,
            half_modulus,
            idempotents,
        }
    }

    /// Centered value in (-Q/2, Q/2] of the residues, as f64
    pub fn reconstruct_f64(&self, residues: &[u64]) -> f64 {
        let mut acc = BigUint::zero();
        for (&x, e) in residues.iter().zip(&self.idempotents) {
            acc += e * x;
        }
        let value = acc % &self.modulus;
        if value > self.half_modulus {
            -(&self.modulus - value).to_f64().unwrap_or(f64::INFINITY)
        } else {
            value.to_f64().unwrap_or(f64::INFINITY)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::ntt::NttContext;

    const PRIMES: [u64; 4] = [1099511678977, 1099511683073, 1152921504606584833, 1099511795713];

    #[test]
    fn test_conversion_is_exact_up_to_multiple() {
        let n = 8;
        let tables: Vec<NttContext> = PRIMES.iter().map(|&q| NttContext::new(n, q)).collect();
        let from: Vec<&NttContext> = tables[..2].iter().collect();
        let to: Vec<&NttContext> = tables[2..].iter().collect();

        let values: [u64; 8] = [0, 1, 2, 123456789, 987654321012, 5, 77, 1 << 39];
        let input: Vec<Vec<u64>> = from
            .iter()
            .map(|ntt| values.iter().map(|&v| v % ntt.q).collect())
            .collect();

        let conv = BasisConverter::new(&from, &to);
        let out = conv.convert(&input, &from, &to);

        let b = PRIMES[0] as u128 * PRIMES[1] as u128;
        for (k, target) in to.iter().enumerate() {
            for (j, &v) in values.iter().enumerate() {
                let c = target.q as u128;
                let got = out[k][j] as u128;
                // got ≡ v + u·B (mod c) with u ∈ {0, 1}
                let ok = (0..2u128).any(|u| (v as u128 + u * (b % c)) % c == got);
                assert!(ok, "coefficient {} mismatch for prime {}", j, target.q);
            }
        }
    }

    #[test]
    fn test_crt_reconstruct_signed() {
        let tables: Vec<NttContext> = PRIMES[..3].iter().map(|&q| NttContext::new(8, q)).collect();
        let basis: Vec<&NttContext> = tables.iter().collect();
        let crt = CrtReconstructor::new(&basis);

        for &v in &[0i64, 1, -1, 4_000_000_000_000, -123_456_789_012_345] {
            let residues: Vec<u64> = basis.iter().map(|t| t.reducer().reduce_i64(v)).collect();
            assert_eq!(crt.reconstruct_f64(&residues), v as f64);
        }
    }
}
