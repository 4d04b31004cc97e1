//! Deterministic generation of NTT-friendly primes
//!
//! Every prime satisfies q ≡ 1 (mod 2N) so that a primitive 2N-th root of unity
//! exists. The search is fully deterministic: identical inputs give identical
//! chains, which makes contexts built from the same parameters interchangeable.

use super::modular::is_prime;

/// Largest value a prime may take (Barrett constants are sized for 61 bits)
pub const MAX_PRIME: u64 = (1u64 << 61) - 1;

/// Largest `bits`-bit prime q ≡ 1 mod 2n that is not in `exclude`
pub fn largest_prime(bits: u32, n: usize, exclude: &[u64]) -> Option<u64> {
    descending_primes(bits, n).find(|q| !exclude.contains(q))
}

/// `count` primes q ≡ 1 mod 2n taken alternately just above and just below 2^bits
///
/// Alternating keeps the running product close to 2^(bits·count), so the
/// per-level scale factors stay close to 2^bits.
pub fn primes_around(bits: u32, n: usize, count: usize, exclude: &[u64]) -> Option<Vec<u64>> {
    let step = 2 * n as u64;
    let center = 1u64 << bits;
    let mut above = (1..)
        .map(move |k| center + 1 + k * step)
        .take_while(|&q| q <= MAX_PRIME)
        .filter(|&q| is_prime(q));
    let mut below = (1..)
        .map(move |k| center + 1 - k * step)
        .take_while(|&q| q > center / 2)
        .filter(|&q| is_prime(q));

    let mut out = Vec::with_capacity(count);
    let mut take_above = true;
    while out.len() < count {
        let next = if take_above {
            above.next().or_else(|| below.next())
        } else {
            below.next().or_else(|| above.next())
        };
        let q = next?;
        if !exclude.contains(&q) && !out.contains(&q) {
            out.push(q);
            take_above = !take_above;
        }
    }
    Some(out)
}

/// `count` largest `bits`-bit primes q ≡ 1 mod 2n not in `exclude`
pub fn largest_primes(bits: u32, n: usize, count: usize, exclude: &[u64]) -> Option<Vec<u64>> {
    let out: Vec<u64> = descending_primes(bits, n)
        .filter(|q| !exclude.contains(q))
        .take(count)
        .collect();
    (out.len() == count).then_some(out)
}

fn descending_primes(bits: u32, n: usize) -> impl Iterator<Item = u64> {
    let step = 2 * n as u64;
    let top = if bits >= 61 { MAX_PRIME } else { (1u64 << bits) - 1 };
    let floor = 1u64 << (bits - 1);
    // largest value ≡ 1 mod step that is ≤ top
    let start = top - ((top - 1) % step);
    (0..)
        .map(move |k| start.wrapping_sub(k * step))
        .take_while(move |&q| q >= floor && q <= start)
        .filter(|&q| is_prime(q))
}
