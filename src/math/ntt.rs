//! Negacyclic Number Theoretic Transform over Z_q[X]/(X^N + 1)
//!
//! **Algorithm:** merged-twist NTT (Longa & Naehrig 2016)
//! - Forward: Cooley-Tukey butterflies, normal order in, bit-reversed order out
//! - Inverse: Gentleman-Sande butterflies, bit-reversed order in, normal order out
//! - The 2N-th root psi is folded into the twiddles, so no separate pre/post twist
//!
//! Pointwise products in the evaluation domain are negacyclic convolutions in the
//! coefficient domain, which is all the ring arithmetic of the engine needs.
//! Automorphisms are applied in the coefficient domain, so the bit-reversed output
//! order never leaks out of this module.
//!
//! **References:**
//! - Longa, P. & Naehrig, M. "Speeding up the Number Theoretic Transform" (2016)
//! - Harvey, D. "Faster arithmetic for number-theoretic transforms" (2014)

use super::modular::{pow_mod, BarrettReducer};

/// Precomputed twiddle factors for one prime
#[derive(Clone, Debug)]
pub struct NttContext {
    /// Ring dimension N (power of two)
    pub n: usize,

    /// Prime modulus, q ≡ 1 mod 2N
    pub q: u64,

    /// Primitive 2N-th root of unity mod q
    pub psi: u64,

    /// log2(N)
    pub log_n: usize,

    /// N^(-1) mod q
    pub n_inv: u64,

    /// psi^(bitrev(i)) for the forward butterflies
    psi_powers_br: Vec<u64>,

    /// psi^(-bitrev(i)) for the inverse butterflies
    psi_inv_powers_br: Vec<u64>,

    reducer: BarrettReducer,
}

impl NttContext {
    /// Create the twiddle tables for ring dimension `n` and prime `q`.
    ///
    /// # Panics
    /// Panics if `n` is not a power of two or q ≢ 1 mod 2n. Primes are generated
    /// by the context, which guarantees both.
    pub fn new(n: usize, q: u64) -> Self {
        assert!(n.is_power_of_two() && n >= 2, "Ring dimension must be a power of 2");
        assert!((q - 1) % (2 * n as u64) == 0, "Modulus must satisfy q ≡ 1 mod 2n");

        let log_n = n.trailing_zeros() as usize;
        let reducer = BarrettReducer::new(q);
        let psi = find_primitive_root(n, q);
        let psi_inv = reducer.inv(psi);

        let mut psi_powers_br = vec![0u64; n];
        let mut psi_inv_powers_br = vec![0u64; n];
        let mut pow = 1u64;
        let mut pow_inv = 1u64;
        for i in 0..n {
            let r = bit_reverse(i, log_n);
            psi_powers_br[r] = pow;
            psi_inv_powers_br[r] = pow_inv;
            pow = reducer.mul(pow, psi);
            pow_inv = reducer.mul(pow_inv, psi_inv);
        }

        Self {
            n,
            q,
            psi,
            log_n,
            n_inv: reducer.inv(n as u64),
            psi_powers_br,
            psi_inv_powers_br,
            reducer,
        }
    }

    /// Barrett reducer for this prime
    #[inline]
    pub fn reducer(&self) -> &BarrettReducer {
        &self.reducer
    }

    /// Forward transform in place (coefficients → evaluations)
    pub fn forward(&self, a: &mut [u64]) {
        debug_assert_eq!(a.len(), self.n);
        let r = &self.reducer;

        let mut t = self.n;
        let mut m = 1;
        while m < self.n {
            t >>= 1;
            for i in 0..m {
                let j1 = 2 * i * t;
                let s = self.psi_powers_br[m + i];
                for j in j1..j1 + t {
                    let u = a[j];
                    let v = r.mul(a[j + t], s);
                    a[j] = r.add(u, v);
                    a[j + t] = r.sub(u, v);
                }
            }
            m <<= 1;
        }
    }

    /// Inverse transform in place (evaluations → coefficients)
    pub fn inverse(&self, a: &mut [u64]) {
        debug_assert_eq!(a.len(), self.n);
        let r = &self.reducer;

        let mut t = 1;
        let mut m = self.n;
        while m > 1 {
            let h = m >> 1;
            let mut j1 = 0;
            for i in 0..h {
                let s = self.psi_inv_powers_br[h + i];
                for j in j1..j1 + t {
                    let u = a[j];
                    let v = a[j + t];
                    a[j] = r.add(u, v);
                    a[j + t] = r.mul(r.sub(u, v), s);
                }
                j1 += 2 * t;
            }
            t <<= 1;
            m = h;
        }

        for x in a.iter_mut() {
            *x = r.mul(*x, self.n_inv);
        }
    }

    /// Negacyclic product of two coefficient vectors (used by tests and keygen checks)
    pub fn multiply_polynomials(&self, a: &[u64], b: &[u64]) -> Vec<u64> {
        let mut a_ntt = a.to_vec();
        let mut b_ntt = b.to_vec();
        self.forward(&mut a_ntt);
        self.forward(&mut b_ntt);
        for (x, y) in a_ntt.iter_mut().zip(&b_ntt) {
            *x = self.reducer.mul(*x, *y);
        }
        self.inverse(&mut a_ntt);
        a_ntt
    }
}

/// Smallest g^((q-1)/2n) that is a primitive 2n-th root of unity.
///
/// Deterministic, so two contexts built from the same primes share twiddles.
fn find_primitive_root(n: usize, q: u64) -> u64 {
    let two_n = 2 * n as u64;
    let exponent = (q - 1) / two_n;
    for g in 2..q {
        let psi = pow_mod(g, exponent, q);
        // psi has order dividing 2n; it is primitive iff psi^n = -1
        if pow_mod(psi, n as u64, q) == q - 1 {
            return psi;
        }
    }
    unreachable!("q ≡ 1 mod 2n always has a primitive 2n-th root")
}

/// Reverse the lowest `log_n` bits of `x`
pub fn bit_reverse(mut x: usize, log_n: usize) -> usize {
    let mut result = 0;
    for _ in 0..log_n {
        result = (result << 1) | (x & 1);
        x >>= 1;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha20Rng;

    // 2^40 < q, q ≡ 1 mod 2^12
    const Q: u64 = 1099511678977;

    fn schoolbook_negacyclic(a: &[u64], b: &[u64], q: u64) -> Vec<u64> {
        let n = a.len();
        let mut out = vec![0u128; n];
        let q128 = q as u128;
        for i in 0..n {
            for j in 0..n {
                let prod = (a[i] as u128 * b[j] as u128) % q128;
                let k = i + j;
                if k < n {
                    out[k] = (out[k] + prod) % q128;
                } else {
                    out[k - n] = (out[k - n] + q128 - prod) % q128;
                }
            }
        }
        out.into_iter().map(|x| x as u64).collect()
    }

    #[test]
    fn test_forward_inverse_roundtrip() {
        let ctx = NttContext::new(1024, Q);
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let original: Vec<u64> = (0..1024).map(|_| rng.gen_range(0..Q)).collect();

        let mut a = original.clone();
        ctx.forward(&mut a);
        assert_ne!(a, original);
        ctx.inverse(&mut a);
        assert_eq!(a, original);
    }

    #[test]
    fn test_psi_is_primitive() {
        let ctx = NttContext::new(64, Q);
        assert_eq!(pow_mod(ctx.psi, 64, Q), Q - 1);
        assert_eq!(pow_mod(ctx.psi, 128, Q), 1);
    }

    #[test]
    fn test_multiplication_matches_schoolbook() {
        let n = 32;
        let ctx = NttContext::new(n, Q);
        let mut rng = ChaCha20Rng::seed_from_u64(11);
        let a: Vec<u64> = (0..n).map(|_| rng.gen_range(0..Q)).collect();
        let b: Vec<u64> = (0..n).map(|_| rng.gen_range(0..Q)).collect();

        assert_eq!(ctx.multiply_polynomials(&a, &b), schoolbook_negacyclic(&a, &b, Q));
    }

    #[test]
    fn test_x_to_the_n_is_minus_one() {
        // X^(n-1) * X = X^n = -1
        let n = 16;
        let ctx = NttContext::new(n, Q);
        let mut a = vec![0u64; n];
        let mut b = vec![0u64; n];
        a[n - 1] = 1;
        b[1] = 1;
        let c = ctx.multiply_polynomials(&a, &b);
        assert_eq!(c[0], Q - 1);
        assert!(c[1..].iter().all(|&x| x == 0));
    }

    #[test]
    fn test_bit_reverse() {
        assert_eq!(bit_reverse(1, 3), 4);
        assert_eq!(bit_reverse(6, 3), 3);
        assert_eq!(bit_reverse(0, 10), 0);
    }
}
