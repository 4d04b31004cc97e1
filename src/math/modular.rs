//! Word-sized modular arithmetic with Barrett reduction
//!
//! All primes in the modulus chain are below 2^61, so residues fit a `u64` with
//! room for one lazy addition, and products fit a `u128`.
//!
//! **Barrett reduction:** for a b-bit modulus q we precompute
//!   mu = floor(2^(2b) / q)
//! and reduce x < q² as
//!   x - q * floor(floor(x / 2^(b-1)) * mu / 2^(b+1))
//! followed by at most two conditional subtractions.

use num_traits::Float;

/// Precomputed Barrett constants for one prime modulus
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BarrettReducer {
    /// Modulus q (< 2^61)
    pub q: u64,
    /// mu = floor(2^(2b) / q)
    mu: u128,
    /// Bit length b of q
    bits: u32,
}

impl BarrettReducer {
    /// Creates a reducer for modulus q.
    ///
    /// # Panics
    /// Panics if q < 2 or q ≥ 2^61 (prime generation never produces such values)
    pub fn new(q: u64) -> Self {
        assert!(q > 1, "Modulus must be > 1");
        assert!(q < (1u64 << 61), "Modulus must be < 2^61");

        let bits = 64 - q.leading_zeros();
        let mu = (1u128 << (2 * bits)) / q as u128;
        Self { q, mu, bits }
    }

    /// Reduces a 64-bit value modulo q.
    #[inline]
    pub fn reduce(&self, x: u64) -> u64 {
        if x < self.q {
            x
        } else {
            x % self.q
        }
    }

    /// Reduces x < q² modulo q (the product of two reduced residues).
    #[inline]
    pub fn reduce_u128(&self, x: u128) -> u64 {
        let q1 = x >> (self.bits - 1);
        let q3 = (q1 * self.mu) >> (self.bits + 1);
        let mut r = (x - q3 * self.q as u128) as u64;
        while r >= self.q {
            r -= self.q;
        }
        r
    }

    /// Reduces an arbitrary 128-bit accumulator modulo q.
    #[inline]
    pub fn reduce_wide(&self, x: u128) -> u64 {
        (x % self.q as u128) as u64
    }

    /// Reduces a signed value into [0, q).
    #[inline]
    pub fn reduce_i64(&self, x: i64) -> u64 {
        let r = self.reduce(x.unsigned_abs());
        if x < 0 && r != 0 {
            self.q - r
        } else {
            r
        }
    }

    /// Reduces a signed 128-bit value into [0, q).
    #[inline]
    pub fn reduce_i128(&self, x: i128) -> u64 {
        let r = self.reduce_wide(x.unsigned_abs());
        if x < 0 && r != 0 {
            self.q - r
        } else {
            r
        }
    }

    /// Residue of the integer nearest to `x`, for arbitrarily large finite `x`
    ///
    /// Beyond 2^63 the value is split as mantissa · 2^exponent, which is exact
    /// because every such f64 is already an integer.
    pub fn reduce_f64(&self, x: f64) -> u64 {
        let x = x.round();
        if x.abs() < 9.0e18 {
            return self.reduce_i64(x as i64);
        }
        let (mantissa, exponent, sign) = Float::integer_decode(x);
        let shift = self.pow(2, exponent.max(0) as u64);
        let v = self.mul(self.reduce(mantissa), shift);
        if sign < 0 {
            self.neg(v)
        } else {
            v
        }
    }

    /// (a + b) mod q for a, b in [0, q)
    #[inline]
    pub fn add(&self, a: u64, b: u64) -> u64 {
        let sum = a + b;
        if sum >= self.q {
            sum - self.q
        } else {
            sum
        }
    }

    /// (a - b) mod q for a, b in [0, q)
    #[inline]
    pub fn sub(&self, a: u64, b: u64) -> u64 {
        if a >= b {
            a - b
        } else {
            self.q - (b - a)
        }
    }

    /// -a mod q for a in [0, q)
    #[inline]
    pub fn neg(&self, a: u64) -> u64 {
        if a == 0 {
            0
        } else {
            self.q - a
        }
    }

    /// (a * b) mod q for a, b in [0, q)
    #[inline]
    pub fn mul(&self, a: u64, b: u64) -> u64 {
        self.reduce_u128(a as u128 * b as u128)
    }

    /// a^exp mod q by square-and-multiply
    pub fn pow(&self, a: u64, mut exp: u64) -> u64 {
        let mut result = 1u64;
        let mut base = self.reduce(a);
        while exp > 0 {
            if exp & 1 == 1 {
                result = self.mul(result, base);
            }
            base = self.mul(base, base);
            exp >>= 1;
        }
        result
    }

    /// a^(-1) mod q via Fermat's little theorem (q prime, a ≠ 0 mod q)
    pub fn inv(&self, a: u64) -> u64 {
        self.pow(a, self.q - 2)
    }

    /// Centered representative of a residue: value in (-q/2, q/2]
    #[inline]
    pub fn center(&self, a: u64) -> i64 {
        if a > self.q / 2 {
            a as i64 - self.q as i64
        } else {
            a as i64
        }
    }
}

/// (a * b) mod m without precomputation, for one-off computations
#[inline]
pub fn mul_mod(a: u64, b: u64, m: u64) -> u64 {
    ((a as u128 * b as u128) % m as u128) as u64
}

/// a^exp mod m without precomputation
pub fn pow_mod(a: u64, mut exp: u64, m: u64) -> u64 {
    let mut result = 1u64 % m;
    let mut base = a % m;
    while exp > 0 {
        if exp & 1 == 1 {
            result = mul_mod(result, base, m);
        }
        base = mul_mod(base, base, m);
        exp >>= 1;
    }
    result
}

/// Deterministic Miller–Rabin primality test for 64-bit integers
pub fn is_prime(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    const WITNESSES: [u64; 12] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37];
    for &p in WITNESSES.iter() {
        if n % p == 0 {
            return n == p;
        }
    }

    let mut d = n - 1;
    let mut s = 0;
    while d % 2 == 0 {
        d /= 2;
        s += 1;
    }

    'witness: for &a in WITNESSES.iter() {
        let mut x = pow_mod(a, d, n);
        if x == 1 || x == n - 1 {
            continue;
        }
        for _ in 1..s {
            x = mul_mod(x, x, n);
            if x == n - 1 {
                continue 'witness;
            }
        }
        return false;
    }
    true
}
