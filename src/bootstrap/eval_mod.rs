//! Approximate modular reduction
//!
//! After CoeffToSlot a slot holds u = x / B with x = t/q_0 + I, |I| ≤ K and
//! B = K + 1. Since sin(2πx) = sin(2π·t/q_0) ≈ 2π·t/q_0 for small t/q_0, the
//! integer part disappears. The sine is evaluated as
//!
//! ```text
//! cos(2π(x - 1/4)) = double^r( cos(2π(B·u - 1/4) / 2^r) ),   double(c) = 2c² - 1
//! ```
//!
//! where the inner cosine is a degree-31 Chebyshev interpolant on [-1, 1]. The
//! 2^r division keeps its argument within a few radians.

use std::f64::consts::PI;

use rustfft::num_complex::Complex64;
use tracing::instrument;

use super::chebyshev;
use crate::ciphertext::Ciphertext;
use crate::error::Result;
use crate::evaluator::HomEvaluator;
use crate::params::BootstrapShape;

/// Sample points per unit of input range used to measure the approximation error
const ERROR_GRID_DENSITY: usize = 1024;

#[derive(Clone, Debug)]
pub struct EvalModPoly {
    coeffs: Vec<f64>,
    range: f64,
    double_angle: u32,
}

impl EvalModPoly {
    pub fn new(shape: &BootstrapShape) -> Self {
        let range = shape.input_range();
        let double_angle = shape.double_angle;
        let divisor = f64::from(1u32 << double_angle);
        let coeffs = chebyshev::interpolate(
            |u| (2.0 * PI * (range * u - 0.25) / divisor).cos(),
            shape.cheb_degree,
        );
        Self {
            coeffs,
            range,
            double_angle,
        }
    }

    /// Half-width B of the input interval in units of q_0
    pub fn range(&self) -> f64 {
        self.range
    }

    /// Unencrypted evaluation at x ∈ [-B, B]; approximates sin(2πx)
    pub fn evaluate_plain(&self, x: f64) -> f64 {
        let c = chebyshev::evaluate(&self.coeffs, x / self.range);
        (0..self.double_angle).fold(c, |c, _| 2.0 * c * c - 1.0)
    }

    /// sup |evaluate_plain(x) - sin(2πx)| on a dense grid over [-B, B]
    pub fn approximation_error(&self) -> f64 {
        let points = (2.0 * self.range) as usize * ERROR_GRID_DENSITY;
        (0..=points)
            .map(|i| -self.range + 2.0 * self.range * i as f64 / points as f64)
            .map(|x| (self.evaluate_plain(x) - (2.0 * PI * x).sin()).abs())
            .fold(0.0, f64::max)
    }

    /// Homomorphic evaluation on a ciphertext whose slots are u = x / B
    #[instrument(level = "debug", skip_all, fields(level = ctxt.level))]
    pub fn evaluate(&self, eval: &HomEvaluator, ctxt: &Ciphertext) -> Result<Ciphertext> {
        let minus_one = Complex64::new(-1.0, 0.0);
        let mut c = chebyshev::evaluate_series(eval, ctxt, &self.coeffs)?;
        for _ in 0..self.double_angle {
            let squared = eval.square(&c)?;
            c = eval.add_const(&eval.mult_integer(&squared, 2), minus_one)?;
        }
        Ok(c)
    }
}
