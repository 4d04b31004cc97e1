//! Boot constants: the CoeffToSlot and SlotToCoeff transforms for one slot count
//!
//! For n = 2^L slots the subring polynomial with real coefficients
//! t_0 ... t_(2n-1) decodes to z = U₀·w with w_k = t_k + i·t_(k+n) and
//!
//! ```text
//! U₀[j][k] = ζ^(k·5^j mod 4n),   ζ = exp(2πi / 4n),   U₀ᴴU₀ = n·I
//! ```
//!
//! U₀ factors as S_L ⋯ S_1 · P with P the bit-reversal permutation and S_s the
//! butterflies of length 2^s. EvalMod works slot by slot, so the transforms
//! drop P and the slots stay bit-reversed between them:
//! - CoeffToSlot = c · S_1ᴴ ⋯ S_Lᴴ with c = Δ_k / (B·q₀·N), giving P·(c·U₀ᴴ·z)
//! - SlotToCoeff = q₀ / (2π·Δ₀) · S_L ⋯ S_1, undoing the sin(2πx) ≈ 2πx gain
//!
//! The butterflies are grouped into a low group of ⌈2L/3⌉ stages and a top
//! group. SlotToCoeff spends one level per group; the top group of
//! CoeffToSlot carries c and takes two, so CoeffToSlot costs 3 levels and
//! SlotToCoeff 2.

use std::collections::BTreeSet;
use std::f64::consts::PI;

use rustfft::num_complex::Complex64;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::linear_transform::{DiagonalMatrix, LinearTransform, TransformStep};
use crate::context::Context;
use crate::device::Device;
use crate::encoding::rotation_group;
use crate::error::{precondition, Result};
use crate::params::BootstrapShape;

/// Transforms for one `log_slots`, optionally loaded onto a device
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BootConstants {
    log_slots: u32,
    pub(crate) coeff_to_slot: LinearTransform,
    pub(crate) slot_to_coeff: LinearTransform,
    #[serde(skip)]
    device: Option<Device>,
}

impl BootConstants {
    /// Compute the transforms for `log_slots` slots
    ///
    /// # Errors
    /// `Precondition` when `log_slots` exceeds the context's full slot count.
    pub fn new(context: &Context, shape: &BootstrapShape, log_slots: u32) -> Result<Self> {
        if log_slots > context.log_full_slots() {
            precondition!(
                "log_slots {} exceeds the full slot count 2^{}",
                log_slots,
                context.log_full_slots()
            );
        }
        let q0 = context.primes()[0] as f64;
        let top = context.scale_factor(context.max_level());
        let cts_factor = top / (shape.input_range() * q0 * context.dimension() as f64);
        let stc_factor = q0 / (2.0 * PI * context.scale_factor(0));

        let coeff_to_slot = coeff_to_slot(log_slots, cts_factor);
        let slot_to_coeff = slot_to_coeff(log_slots, stc_factor);
        debug!(
            log_slots,
            cts_factor,
            stc_factor,
            stored = coeff_to_slot.num_stored_values() + slot_to_coeff.num_stored_values(),
            "boot constants computed"
        );
        Ok(Self {
            log_slots,
            coeff_to_slot,
            slot_to_coeff,
            device: None,
        })
    }

    pub fn log_slots(&self) -> u32 {
        self.log_slots
    }

    /// Device the constants were loaded onto, if any
    pub fn device(&self) -> Option<Device> {
        self.device
    }

    pub(crate) fn loaded_on(&self, device: Device) -> Self {
        Self {
            device: Some(device),
            ..self.clone()
        }
    }

    /// Levels consumed by the two linear transforms together
    pub fn linear_depth(&self) -> usize {
        self.coeff_to_slot.depth() + self.slot_to_coeff.depth()
    }

    /// Rotation amounts both transforms need keys for
    pub fn rotations(&self) -> BTreeSet<usize> {
        let mut amounts = self.coeff_to_slot.rotations();
        amounts.extend(self.slot_to_coeff.rotations());
        amounts
    }
}

/// Butterfly stages S_1 ... S_L in application order
///
/// In S_s (length len = 2^s, h = len/2) with t = p mod len and
/// r_t = exp(2πi·(5^t mod 4·len) / 4·len):
/// - t < h: y_p = x_p + r_t·x_(p+h)
/// - t ≥ h: y_p = x_(p-h) - r_(t-h)·x_p
pub(crate) fn fft_stages(log_slots: u32) -> Vec<DiagonalMatrix> {
    let n = 1usize << log_slots;
    let one = Complex64::new(1.0, 0.0);
    (1..=log_slots)
        .map(|s| {
            let len = 1usize << s;
            let h = len / 2;
            let m = (4 * len) as f64;
            let mut stage = DiagonalMatrix::zero(n, len);
            for (t, e) in rotation_group(len).take(h).enumerate() {
                let twiddle = Complex64::from_polar(1.0, 2.0 * PI * e as f64 / m);
                stage.add_entry(0, t, one);
                stage.add_entry(h, t, twiddle);
                stage.add_entry(0, t + h, -twiddle);
                stage.add_entry(n - h, t + h, one);
            }
            stage
        })
        .collect()
}

/// Stages in the low group: ⌈2L/3⌉
fn low_stage_count(log_slots: u32) -> usize {
    (2 * log_slots as usize + 2) / 3
}

fn split_stages(log_slots: u32) -> (Vec<DiagonalMatrix>, Vec<DiagonalMatrix>) {
    let mut low = fft_stages(log_slots);
    let top = low.split_off(low_stage_count(log_slots));
    (low, top)
}

/// factor · S_L ⋯ S_1 on bit-reversed slots
pub(crate) fn slot_to_coeff(log_slots: u32, factor: f64) -> LinearTransform {
    let (low, top) = split_stages(log_slots);
    LinearTransform::new(
        log_slots,
        vec![
            TransformStep::new(low, 1.0, 1),
            TransformStep::new(top, factor, 1),
        ],
    )
}

/// factor · S_1ᴴ ⋯ S_Lᴴ, leaving the slots bit-reversed
pub(crate) fn coeff_to_slot(log_slots: u32, factor: f64) -> LinearTransform {
    let (low, top) = split_stages(log_slots);
    let adjoint = |group: &[DiagonalMatrix]| -> Vec<DiagonalMatrix> {
        group.iter().rev().map(DiagonalMatrix::adjoint).collect()
    };
    LinearTransform::new(
        log_slots,
        vec![
            TransformStep::new(adjoint(&top), factor, 2),
            TransformStep::new(adjoint(&low), 1.0, 1),
        ],
    )
}

/// Rotation amounts of both transforms at `log_slots`
pub(crate) fn transform_rotations(log_slots: u32) -> BTreeSet<usize> {
    let mut amounts = coeff_to_slot(log_slots, 1.0).rotations();
    amounts.extend(slot_to_coeff(log_slots, 1.0).rotations());
    amounts
}

/// U₀[j][k] = ζ^(k·5^j), ζ = exp(2πi / 4n)
#[cfg(test)]
pub(crate) fn slot_matrix(n: usize) -> Vec<Vec<Complex64>> {
    let m = 4 * n;
    rotation_group(n)
        .map(|e| {
            (0..n)
                .map(|k| Complex64::from_polar(1.0, 2.0 * PI * ((k * e) % m) as f64 / m as f64))
                .collect()
        })
        .collect()
}
