//! Homomorphic evaluator
//!
//! **Level/scale rules** enforced by every operation:
//! - binary operations require equal devices and equal slot counts
//! - add/sub require equal rescale counters; differing levels are aligned by
//!   levelling the higher operand down to the lower one
//! - multiplication requires counter 0 on both operands
//! - `mult` = tensor + relinearize + rescale; `mult_without_rescale` leaves the
//!   result at counter 1 for the caller to rescale
//! - integer (and Gaussian-integer) constants multiply for free; any other
//!   constant costs one level
//!
//! Operations are value-returning: on error nothing is produced and the inputs
//! are untouched.
//!
//! - [`arithmetic`]: add, sub, mult, constants, tensor, relinearize
//! - [`key_switch`]: hybrid key switching (mod-up, inner product, mod-down)
//! - [`rotation`]: rotations, rotate-and-sum, conjugation
//! - [`level`]: rescale, inverse rescale, level down

pub mod arithmetic;
pub mod key_switch;
pub mod level;
pub mod rotation;

use std::sync::Arc;

use crate::ciphertext::Ciphertext;
use crate::context::Context;
use crate::device::check_same_device;
use crate::encoding::EnDecoder;
use crate::error::{precondition, state_mismatch, Result};
use crate::keys::KeyPack;

/// Evaluator bound to one context and one key pack
#[derive(Clone)]
pub struct HomEvaluator {
    pub(crate) context: Context,
    pub(crate) keys: Arc<KeyPack>,
    pub(crate) encoder: EnDecoder,
}

impl HomEvaluator {
    pub fn new(context: &Context, keys: Arc<KeyPack>) -> Self {
        Self {
            context: context.clone(),
            keys,
            encoder: EnDecoder::new(context),
        }
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn key_pack(&self) -> &Arc<KeyPack> {
        &self.keys
    }

    pub fn encoder(&self) -> &EnDecoder {
        &self.encoder
    }

    /// Devices and slot counts must match
    fn check_compatible(&self, a: &Ciphertext, b: &Ciphertext) -> Result<()> {
        check_same_device(a.device, b.device)?;
        if a.log_slots != b.log_slots {
            precondition!(
                "operands encode different slot counts (2^{} vs 2^{})",
                a.log_slots,
                b.log_slots
            );
        }
        Ok(())
    }

    /// Both operands at the lower of their levels, counters required equal
    fn align_levels(&self, a: &Ciphertext, b: &Ciphertext) -> Result<(Ciphertext, Ciphertext)> {
        if a.rescale_counter != b.rescale_counter {
            state_mismatch!(
                "operands have different rescale counters ({} vs {})",
                a.rescale_counter,
                b.rescale_counter
            );
        }
        if a.level == b.level {
            return Ok((a.clone(), b.clone()));
        }
        if a.rescale_counter != 0 {
            state_mismatch!(
                "operands at levels {} and {} cannot be aligned with rescale counter {}",
                a.level,
                b.level,
                a.rescale_counter
            );
        }
        let level = a.level.min(b.level);
        Ok((self.level_down(a, level)?, self.level_down(b, level)?))
    }

    fn check_counter_zero(&self, ctxt: &Ciphertext, op: &str) -> Result<()> {
        if ctxt.rescale_counter != 0 {
            precondition!(
                "{} requires rescale counter 0, found {}",
                op,
                ctxt.rescale_counter
            );
        }
        Ok(())
    }

    fn check_key_device(&self, ctxt: &Ciphertext) -> Result<()> {
        check_same_device(ctxt.device, self.keys.device())
    }
}
