//! Chebyshev series: interpolation, scalar evaluation and homomorphic evaluation

use std::f64::consts::PI;

use rustfft::num_complex::Complex64;

use crate::ciphertext::Ciphertext;
use crate::error::{precondition, Result};
use crate::evaluator::HomEvaluator;

/// Coefficients c_0 ... c_degree of the interpolant of `f` at the Chebyshev
/// nodes of [-1, 1], so that f(x) ≈ Σ c_k T_k(x)
pub fn interpolate(f: impl Fn(f64) -> f64, degree: usize) -> Vec<f64> {
    let m = degree + 1;
    let values: Vec<f64> = (0..m)
        .map(|j| f((PI * (j as f64 + 0.5) / m as f64).cos()))
        .collect();

    (0..m)
        .map(|k| {
            let sum: f64 = values
                .iter()
                .enumerate()
                .map(|(j, v)| v * (PI * k as f64 * (j as f64 + 0.5) / m as f64).cos())
                .sum();
            let c = 2.0 * sum / m as f64;
            if k == 0 {
                c / 2.0
            } else {
                c
            }
        })
        .collect()
}

/// Clenshaw recurrence for Σ c_k T_k(x)
pub fn evaluate(coeffs: &[f64], x: f64) -> f64 {
    let (mut b1, mut b2) = (0.0, 0.0);
    for &c in coeffs.iter().skip(1).rev() {
        let b0 = 2.0 * x * b1 - b2 + c;
        b2 = b1;
        b1 = b0;
    }
    x * b1 - b2 + coeffs.first().copied().unwrap_or(0.0)
}

/// T_1(x) ... T_degree(x) of the encrypted x; entry k-1 holds T_k
///
/// Even indices use T_2k = 2T_k² - 1, odd ones T_(a+b) = 2T_a·T_b - T_(a-b)
/// with a the largest power of two below k, so T_k sits ⌈log2(k+1)⌉ - 1 levels
/// below x.
pub fn power_basis(eval: &HomEvaluator, x: &Ciphertext, degree: usize) -> Result<Vec<Ciphertext>> {
    let minus_one = Complex64::new(-1.0, 0.0);
    let mut basis: Vec<Ciphertext> = Vec::with_capacity(degree);
    basis.push(x.clone());
    for k in 2..=degree {
        let t = if k % 2 == 0 {
            let squared = eval.square(&basis[k / 2 - 1])?;
            eval.add_const(&eval.mult_integer(&squared, 2), minus_one)?
        } else {
            let a = 1usize << (usize::BITS - 1 - k.leading_zeros());
            let b = k - a;
            let product = eval.mult(&basis[a - 1], &basis[b - 1])?;
            eval.sub(&eval.mult_integer(&product, 2), &basis[a - b - 1])?
        };
        basis.push(t);
    }
    Ok(basis)
}

/// Σ c_k T_k(x) for an encrypted x with real slots
///
/// All T_k are brought to the deepest level of the basis, weighted with one
/// constant multiplication each and rescaled once, so the series costs one level
/// on top of the basis.
pub fn evaluate_series(eval: &HomEvaluator, x: &Ciphertext, coeffs: &[f64]) -> Result<Ciphertext> {
    if coeffs.len() < 2 {
        precondition!("a Chebyshev series needs degree at least 1");
    }
    let basis = power_basis(eval, x, coeffs.len() - 1)?;
    let bottom = basis.iter().map(Ciphertext::level).min().unwrap_or(x.level);

    let mut acc: Option<Ciphertext> = None;
    for (t, &c) in basis.iter().zip(&coeffs[1..]) {
        let t = eval.level_down(t, bottom)?;
        let term = eval.mult_const_without_rescale(&t, Complex64::new(c, 0.0))?;
        acc = Some(match acc {
            Some(sum) => eval.add(&sum, &term)?,
            None => term,
        });
    }
    let Some(acc) = acc else {
        precondition!("a Chebyshev series needs degree at least 1");
    };
    let acc = eval.rescale(&acc)?;
    eval.add_const(&acc, Complex64::new(coeffs[0], 0.0))
}
