//! Slot-wise linear maps as products of sparse diagonal factors
//!
//! A matrix acts on a slot vector z as (Mz)_p = Σ_d D_d[p]·z_(p+d) with
//! D_d[p] = M[p][(p+d) mod n]. The butterfly factors of an FFT have three
//! diagonals each, repeating with the butterfly length, so a transform keeps
//! its factors and multiplies them out only while it is being evaluated.
//!
//! A [`TransformStep`] is one product of factors, evaluated baby-step
//! giant-step with one plaintext per diagonal of the product. Writing d = G + b,
//!
//! ```text
//! Mz = Σ_G rot_G( Σ_b rot_(-G)(D_(G+b)) ⊙ rot_b(z) )
//! ```
//!
//! Each step consumes `rescales` levels.

use std::collections::{BTreeMap, BTreeSet};

use rayon::prelude::*;
use rustfft::num_complex::Complex64;
use serde::{Deserialize, Serialize};
use tracing::{instrument, trace};

use crate::ciphertext::Ciphertext;
use crate::error::{precondition, HeError, Result};
use crate::evaluator::HomEvaluator;

/// Square slot matrix stored by its nonzero diagonals
///
/// `diagonals[d][p mod period]` is the entry in row p, column (p + d) mod slots.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiagonalMatrix {
    slots: usize,
    period: usize,
    diagonals: BTreeMap<usize, Vec<Complex64>>,
}

impl DiagonalMatrix {
    /// `period` must divide `slots`
    pub fn zero(slots: usize, period: usize) -> Self {
        debug_assert!(period > 0 && slots % period == 0);
        Self {
            slots,
            period,
            diagonals: BTreeMap::new(),
        }
    }

    pub fn identity(slots: usize) -> Self {
        let mut id = Self::zero(slots, 1);
        id.add_entry(0, 0, Complex64::new(1.0, 0.0));
        id
    }

    pub fn slots(&self) -> usize {
        self.slots
    }

    /// Add `value` to every row congruent to `row` modulo the period
    pub fn add_entry(&mut self, offset: usize, row: usize, value: Complex64) {
        let period = self.period;
        self.diagonal_mut(offset)[row % period] += value;
    }

    pub fn entry(&self, offset: usize, row: usize) -> Complex64 {
        self.diagonals
            .get(&(offset % self.slots))
            .map_or(Complex64::new(0.0, 0.0), |diagonal| diagonal[row % self.period])
    }

    pub fn offsets(&self) -> impl Iterator<Item = usize> + '_ {
        self.diagonals.keys().copied()
    }

    /// Stored complex values
    pub fn num_values(&self) -> usize {
        self.diagonals.len() * self.period
    }

    fn diagonal_mut(&mut self, offset: usize) -> &mut Vec<Complex64> {
        let period = self.period;
        self.diagonals
            .entry(offset % self.slots)
            .or_insert_with(|| vec![Complex64::new(0.0, 0.0); period])
    }

    /// self · rhs, so rhs acts first
    pub fn compose(&self, rhs: &Self) -> Self {
        let period = self.period.max(rhs.period);
        let mut out = Self::zero(self.slots, period);
        for (&d, a) in &self.diagonals {
            for (&e, b) in &rhs.diagonals {
                let target = out.diagonal_mut(d + e);
                for (p, value) in target.iter_mut().enumerate() {
                    *value += a[p % self.period] * b[(p + d) % rhs.period];
                }
            }
        }
        out
    }

    /// Conjugate transpose
    pub fn adjoint(&self) -> Self {
        let mut out = Self::zero(self.slots, self.period);
        for (&d, diagonal) in &self.diagonals {
            let shift = self.period - d % self.period;
            let target = out.diagonal_mut(self.slots - d);
            for (q, value) in target.iter_mut().enumerate() {
                *value += diagonal[(q + shift) % self.period].conj();
            }
        }
        out
    }

    pub fn scaled(&self, factor: f64) -> Self {
        let diagonals = self
            .diagonals
            .iter()
            .map(|(&d, diagonal)| (d, diagonal.iter().map(|x| x * factor).collect()))
            .collect();
        Self {
            slots: self.slots,
            period: self.period,
            diagonals,
        }
    }

    /// M·z for an unencrypted slot vector
    #[cfg(test)]
    pub(crate) fn apply(&self, z: &[Complex64]) -> Vec<Complex64> {
        (0..self.slots)
            .map(|p| {
                self.diagonals
                    .iter()
                    .map(|(&d, diagonal)| diagonal[p % self.period] * z[(p + d) % self.slots])
                    .sum()
            })
            .collect()
    }
}

/// Split of diagonal offsets into giant and baby rotation amounts
///
/// Offsets are read as signed values in (-n/2, n/2] and divided by their
/// common power-of-two stride, so a banded matrix gets about √(band width)
/// rotations of each kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct BsgsLayout {
    slots: usize,
    stride: usize,
    baby: usize,
}

impl BsgsLayout {
    fn new(slots: usize, offsets: impl IntoIterator<Item = usize>) -> Self {
        let signed: Vec<i64> = offsets
            .into_iter()
            .map(|d| signed_offset(d, slots))
            .collect();
        let stride = signed
            .iter()
            .filter(|&&s| s != 0)
            .map(|s| 1usize << s.unsigned_abs().trailing_zeros())
            .min()
            .unwrap_or(1);
        let (lo, hi) = signed
            .iter()
            .map(|s| s / stride as i64)
            .fold((0i64, 0i64), |(lo, hi), k| (lo.min(k), hi.max(k)));
        let span = (hi - lo + 1) as f64;
        let baby = (span.sqrt().ceil() as usize).next_power_of_two();
        Self { slots, stride, baby }
    }

    /// (giant, baby) rotation amounts with giant + baby ≡ offset (mod n)
    fn split(&self, offset: usize) -> (usize, usize) {
        let n = self.slots as i64;
        let stride = self.stride as i64;
        let k = signed_offset(offset, self.slots) / stride;
        let b = k.rem_euclid(self.baby as i64);
        let g = k - b;
        (
            (g * stride).rem_euclid(n) as usize,
            (b * stride).rem_euclid(n) as usize,
        )
    }
}

fn signed_offset(d: usize, slots: usize) -> i64 {
    let d = d % slots;
    if 2 * d > slots {
        d as i64 - slots as i64
    } else {
        d as i64
    }
}

/// One product of factors and its plaintext scale
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransformStep {
    /// In application order: `factors[0]` acts first
    factors: Vec<DiagonalMatrix>,
    scale: f64,
    rescales: i32,
}

impl TransformStep {
    pub fn new(factors: Vec<DiagonalMatrix>, scale: f64, rescales: i32) -> Self {
        Self {
            factors,
            scale,
            rescales,
        }
    }

    /// scale · factors[last] ⋯ factors[0]
    pub fn matrix(&self, slots: usize) -> DiagonalMatrix {
        self.factors
            .iter()
            .fold(DiagonalMatrix::identity(slots), |acc, factor| factor.compose(&acc))
            .scaled(self.scale)
    }

    /// Diagonal offsets of [`matrix`](Self::matrix), without multiplying it out
    fn offsets(&self, slots: usize) -> BTreeSet<usize> {
        self.factors.iter().fold(BTreeSet::from([0]), |acc, factor| {
            acc.iter()
                .flat_map(|&e| factor.offsets().map(move |d| (d + e) % slots))
                .collect()
        })
    }

    fn layout(&self, slots: usize) -> BsgsLayout {
        BsgsLayout::new(slots, self.offsets(slots))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinearTransform {
    log_slots: u32,
    steps: Vec<TransformStep>,
}

impl LinearTransform {
    /// Transform applying `steps` in order to 2^log_slots slots
    pub fn new(log_slots: u32, steps: Vec<TransformStep>) -> Self {
        Self { log_slots, steps }
    }

    pub fn log_slots(&self) -> u32 {
        self.log_slots
    }

    fn slots(&self) -> usize {
        1usize << self.log_slots
    }

    /// Levels consumed by [`evaluate`](Self::evaluate)
    pub fn depth(&self) -> usize {
        self.steps.iter().map(|step| step.rescales as usize).sum()
    }

    /// Complex values held by the stored factors
    pub fn num_stored_values(&self) -> usize {
        self.steps
            .iter()
            .flat_map(|step| &step.factors)
            .map(DiagonalMatrix::num_values)
            .sum()
    }

    /// Rotation amounts the evaluation needs keys for
    pub fn rotations(&self) -> BTreeSet<usize> {
        let slots = self.slots();
        let mut amounts = BTreeSet::new();
        for step in &self.steps {
            let layout = step.layout(slots);
            for offset in step.offsets(slots) {
                let (giant, baby) = layout.split(offset);
                amounts.extend([giant, baby].into_iter().filter(|&k| k != 0));
            }
        }
        amounts
    }

    /// Apply the transform: (k, 0) → (k - depth, 0)
    ///
    /// # Errors
    /// `Precondition` on a nonzero counter, a slot count other than the
    /// transform's, or too few levels. `MissingKey` when a rotation key is absent.
    pub fn evaluate(&self, eval: &HomEvaluator, ctxt: &Ciphertext) -> Result<Ciphertext> {
        self.evaluate_scaled(eval, ctxt, 1.0)
    }

    /// [`evaluate`](Self::evaluate) with every output slot multiplied by `factor`
    #[instrument(level = "debug", skip_all, fields(level = ctxt.level, log_slots = self.log_slots))]
    pub fn evaluate_scaled(&self, eval: &HomEvaluator, ctxt: &Ciphertext, factor: f64) -> Result<Ciphertext> {
        if ctxt.rescale_counter != 0 {
            precondition!(
                "linear transform requires rescale counter 0, found {}",
                ctxt.rescale_counter
            );
        }
        if ctxt.log_slots != self.log_slots {
            precondition!(
                "linear transform is built for 2^{} slots, ciphertext has 2^{}",
                self.log_slots,
                ctxt.log_slots
            );
        }
        if ctxt.level < self.depth() {
            precondition!(
                "linear transform needs {} levels, ciphertext is at level {}",
                self.depth(),
                ctxt.level
            );
        }

        let last = self.steps.len().saturating_sub(1);
        let mut current = ctxt.clone();
        for (i, step) in self.steps.iter().enumerate() {
            let extra = if i == last { factor } else { 1.0 };
            current = self.evaluate_step(eval, &current, step, extra)?;
        }
        Ok(current)
    }

    fn evaluate_step(
        &self,
        eval: &HomEvaluator,
        ctxt: &Ciphertext,
        step: &TransformStep,
        extra: f64,
    ) -> Result<Ciphertext> {
        let slots = self.slots();
        let matrix = step.matrix(slots);
        let layout = step.layout(slots);
        let context = eval.context();
        let level = ctxt.level;
        let scale = context.scale(level, step.rescales) / context.scale_factor(level);

        let mut groups: BTreeMap<usize, Vec<(usize, usize)>> = BTreeMap::new();
        for offset in matrix.offsets() {
            let (giant, baby) = layout.split(offset);
            groups.entry(giant).or_default().push((offset, baby));
        }
        let babies: BTreeSet<usize> = groups.values().flatten().map(|&(_, baby)| baby).collect();
        trace!(
            diagonals = matrix.offsets().count(),
            babies = babies.len(),
            giants = groups.len(),
            "transform step"
        );

        let rotated: BTreeMap<usize, Ciphertext> = babies
            .into_par_iter()
            .map(|baby| eval.left_rotate(ctxt, baby).map(|rotated| (baby, rotated)))
            .collect::<Result<_>>()?;

        let partials: Vec<Ciphertext> = groups
            .par_iter()
            .map(|(&giant, terms)| {
                let mut acc: Option<Ciphertext> = None;
                for &(offset, baby) in terms {
                    let input = rotated.get(&baby).ok_or_else(|| {
                        HeError::Precondition(format!("baby rotation {} was not computed", baby))
                    })?;
                    let diagonal: Vec<Complex64> = (0..slots)
                        .map(|q| matrix.entry(offset, q + slots - giant) * extra)
                        .collect();
                    let ptxt = eval.encoder().encode_slots(&diagonal, level, scale, true);
                    let term = eval.mult_poly_raw(input, &ptxt);
                    acc = Some(match acc {
                        Some(sum) => eval.add(&sum, &term)?,
                        None => term,
                    });
                }
                let Some(mut acc) = acc else {
                    precondition!("giant step {} has no diagonals", giant);
                };
                acc.rescale_counter = step.rescales;
                eval.left_rotate(&acc, giant)
            })
            .collect::<Result<_>>()?;

        let mut partials = partials.into_iter();
        let Some(mut sum) = partials.next() else {
            precondition!("linear transform step has no diagonals");
        };
        for partial in partials {
            sum = eval.add(&sum, &partial)?;
        }
        for _ in 0..step.rescales {
            sum = eval.rescale(&sum)?;
        }
        Ok(sum)
    }

    /// The transform on an unencrypted slot vector
    #[cfg(test)]
    pub(crate) fn apply(&self, z: &[Complex64]) -> Vec<Complex64> {
        self.steps
            .iter()
            .fold(z.to_vec(), |x, step| step.matrix(x.len()).apply(&x))
    }
}
