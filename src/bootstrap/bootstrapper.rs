//! Bootstrapper state machine and entry points
//!
//! Per slot count the constants go NotReady → ConstantsComputed
//! ([`make_boot_constants`](Bootstrapper::make_boot_constants)) → Ready
//! ([`load_boot_constants`](Bootstrapper::load_boot_constants)). A bootstrap call
//! on a slot count that is not ready on the ciphertext's device loads the
//! constants itself.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use rustfft::num_complex::Complex64;
use tracing::{debug, info, instrument, warn};

use super::constants::BootConstants;
use super::eval_mod::EvalModPoly;
use super::mod_raise::mod_raise;
use crate::ciphertext::Ciphertext;
use crate::context::{subsum_rotations, Context, SparseContextPair, MIN_LEVEL_FOR_BOOTSTRAP, MIN_LEVEL_FOR_EXTENDED_BOOTSTRAP};
use crate::device::{check_same_device, Device};
use crate::error::{precondition, HeError, Result};
use crate::evaluator::key_switch::switch_key_in;
use crate::evaluator::HomEvaluator;
use crate::params::BootstrapShape;

/// Magnitude divided out before, and multiplied back after, the coarse pass of
/// an extended bootstrap
const EXTENDED_RANGE_LOG: u32 = 20;

/// Approximation error above which diagnostics warn
const DIAGNOSTIC_ERROR_BOUND: f64 = 1.0 / (1u64 << 20) as f64;

pub struct Bootstrapper {
    eval: HomEvaluator,
    sparse: Option<SparseContextPair>,
    shape: BootstrapShape,
    eval_mod: EvalModPoly,
    approximation_error: f64,
    constants: RwLock<HashMap<u32, Arc<BootConstants>>>,
    diagnostics: AtomicBool,
}

impl Bootstrapper {
    /// Bootstrapper over the evaluator's context and key pack
    ///
    /// # Errors
    /// `InvalidParameter` when the context is not bootstrappable.
    pub fn new(eval: &HomEvaluator) -> Result<Self> {
        let shape = eval.context().bootstrap_shape().ok_or_else(|| {
            HeError::InvalidParameter(format!(
                "parameter {:?} is not bootstrappable",
                eval.context().preset()
            ))
        })?;
        Ok(Self::build(eval, None, shape))
    }

    /// Bootstrapper that switches to the sparse secret of `pair` around mod-raise
    ///
    /// The overflow bound, and with it the EvalMod circuit, follows the sparse
    /// secret's Hamming weight. Outputs still land on the context's
    /// [`level_after_full_slot_bootstrap`](Context::level_after_full_slot_bootstrap).
    ///
    /// # Errors
    /// `InvalidParameter` when `pair` was derived from another context, the
    /// context is not bootstrappable, or the sparse circuit is deeper than the
    /// dense one.
    pub fn with_sparse(eval: &HomEvaluator, pair: SparseContextPair) -> Result<Self> {
        if !pair.dense().is_compatible(eval.context()) {
            return Err(HeError::InvalidParameter(
                "sparse context pair was derived from a different context".into(),
            ));
        }
        if !eval.context().is_bootstrappable() {
            return Err(HeError::InvalidParameter(format!(
                "parameter {:?} is not bootstrappable",
                eval.context().preset()
            )));
        }
        let shape = BootstrapShape::for_hamming_weight(pair.sparse().hamming_weight());
        let dense_depth = eval
            .context()
            .bootstrap_shape()
            .map_or(0, |dense| dense.depth());
        if shape.depth() > dense_depth {
            return Err(HeError::InvalidParameter(format!(
                "sparse bootstrap needs {} levels, more than the {} of the dense circuit",
                shape.depth(),
                dense_depth
            )));
        }
        Ok(Self::build(eval, Some(pair), shape))
    }

    /// [`new`](Self::new) followed by [`make_boot_constants`](Self::make_boot_constants)
    pub fn with_log_slots(eval: &HomEvaluator, log_slots: u32) -> Result<Self> {
        let boot = Self::new(eval)?;
        boot.make_boot_constants(log_slots)?;
        Ok(boot)
    }

    fn build(eval: &HomEvaluator, sparse: Option<SparseContextPair>, shape: BootstrapShape) -> Self {
        let eval_mod = EvalModPoly::new(&shape);
        let approximation_error = eval_mod.approximation_error();
        info!(
            overflow_bound = shape.overflow_bound,
            double_angle = shape.double_angle,
            approximation_error,
            sparse = sparse.is_some(),
            "bootstrapper ready"
        );
        Self {
            eval: eval.clone(),
            sparse,
            shape,
            eval_mod,
            approximation_error,
            constants: RwLock::new(HashMap::new()),
            diagnostics: AtomicBool::new(false),
        }
    }

    pub fn evaluator(&self) -> &HomEvaluator {
        &self.eval
    }

    fn context(&self) -> &Context {
        self.eval.context()
    }

    pub fn shape(&self) -> &BootstrapShape {
        &self.shape
    }

    // ---- constants ----

    /// Compute the constants for `log_slots` if they are absent
    ///
    /// # Errors
    /// `Precondition` when `log_slots` exceeds the full slot count.
    #[instrument(skip(self))]
    pub fn make_boot_constants(&self, log_slots: u32) -> Result<()> {
        if self.cached(log_slots).is_some() {
            return Ok(());
        }
        let constants = BootConstants::new(self.context(), &self.shape, log_slots)?;
        self.write_constants()
            .entry(log_slots)
            .or_insert_with(|| Arc::new(constants));
        Ok(())
    }

    /// Make the constants for `log_slots` available on `device`; idempotent
    pub fn load_boot_constants(&self, log_slots: u32, device: Device) -> Result<()> {
        self.make_boot_constants(log_slots)?;
        let mut constants = self.write_constants();
        if let Some(current) = constants.get(&log_slots) {
            if current.device() != Some(device) {
                let loaded = Arc::new(current.loaded_on(device));
                constants.insert(log_slots, loaded);
                debug!(log_slots, %device, "boot constants loaded");
            }
        }
        Ok(())
    }

    /// Constants for `log_slots` have been computed and loaded onto a device
    pub fn is_bootstrap_ready(&self, log_slots: u32) -> bool {
        self.cached(log_slots)
            .is_some_and(|constants| constants.device().is_some())
    }

    fn cached(&self, log_slots: u32) -> Option<Arc<BootConstants>> {
        self.constants
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&log_slots)
            .cloned()
    }

    fn write_constants(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<u32, Arc<BootConstants>>> {
        self.constants
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn constants_on(&self, log_slots: u32, device: Device) -> Result<Arc<BootConstants>> {
        match self.cached(log_slots) {
            Some(constants) if constants.device() == Some(device) => Ok(constants),
            _ => {
                self.load_boot_constants(log_slots, device)?;
                self.cached(log_slots).ok_or_else(|| {
                    HeError::Precondition(format!("boot constants for log_slots {} are unavailable", log_slots))
                })
            }
        }
    }

    // ---- levels and diagnostics ----

    /// Level of every bootstrap output, the context's figure for its own secret
    pub fn level_after_full_slot_bootstrap(&self) -> usize {
        self.context()
            .level_after_full_slot_bootstrap()
            .unwrap_or_else(|| self.context().max_level() - self.shape.depth())
    }

    pub fn min_level_for_bootstrap(&self) -> usize {
        MIN_LEVEL_FOR_BOOTSTRAP
    }

    pub fn min_level_for_extended_bootstrap(&self) -> usize {
        MIN_LEVEL_FOR_EXTENDED_BOOTSTRAP
    }

    /// Sup-norm error of the EvalMod polynomial against sin(2πx) over its input range
    pub fn approximation_error(&self) -> f64 {
        self.approximation_error
    }

    /// Warn on every bootstrap whose approximation error exceeds 2^-20
    pub fn set_diagnostics(&self, enabled: bool) {
        self.diagnostics.store(enabled, Ordering::Relaxed);
    }

    // ---- bootstrap ----

    /// Refresh `ctxt` to [`level_after_full_slot_bootstrap`](Self::level_after_full_slot_bootstrap)
    ///
    /// Slot values must lie in the unit disc. With `is_complex` false the
    /// imaginary part of the output is cleared.
    ///
    /// # Errors
    /// `Precondition` below level 3 or with a nonzero rescale counter,
    /// `MissingKey` when a rotation, conjugation, multiplication or sparse
    /// encapsulation key is absent.
    #[instrument(skip_all, fields(level = ctxt.level, log_slots = ctxt.log_slots))]
    pub fn bootstrap(&self, ctxt: &Ciphertext, is_complex: bool) -> Result<Ciphertext> {
        self.check_input(ctxt, MIN_LEVEL_FOR_BOOTSTRAP)?;
        let constants = self.constants_on(ctxt.log_slots, ctxt.device)?;
        let refreshed = self.refresh_slots(ctxt, &constants)?;
        let out = if is_complex {
            constants.slot_to_coeff.evaluate(&self.eval, &refreshed)?
        } else {
            let half = constants.slot_to_coeff.evaluate_scaled(&self.eval, &refreshed, 0.5)?;
            self.eval.add(&half, &self.eval.conjugate(&half)?)?
        };
        self.settle(&out)
    }

    /// Real and imaginary parts of the refreshed slots as two ciphertexts
    #[instrument(skip_all, fields(level = ctxt.level, log_slots = ctxt.log_slots))]
    pub fn bootstrap_two_outputs(&self, ctxt: &Ciphertext) -> Result<(Ciphertext, Ciphertext)> {
        self.check_input(ctxt, MIN_LEVEL_FOR_BOOTSTRAP)?;
        let constants = self.constants_on(ctxt.log_slots, ctxt.device)?;
        let refreshed = self.refresh_slots(ctxt, &constants)?;
        let half = constants.slot_to_coeff.evaluate_scaled(&self.eval, &refreshed, 0.5)?;
        let (re, im) = separate(&self.eval, &half)?;
        Ok((self.settle(&re)?, self.settle(&im)?))
    }

    /// Bootstrap for slot values up to 2^20 in magnitude
    ///
    /// A coarse bootstrap of ctxt·2^-20 is scaled back, and the residual
    /// ctxt - coarse is bootstrapped again and added, recovering the precision
    /// the down-scaling lost. Costs one extra input level.
    ///
    /// # Errors
    /// As [`bootstrap`](Self::bootstrap), with level 4 as the minimum, plus
    /// `Precondition` when the parameter does not support extended bootstrap.
    #[instrument(skip_all, fields(level = ctxt.level, log_slots = ctxt.log_slots))]
    pub fn bootstrap_extended(&self, ctxt: &Ciphertext, is_complex: bool) -> Result<Ciphertext> {
        self.check_extended(ctxt)?;
        let scaled = self.eval.mult_const(ctxt, Complex64::new(extended_scale(), 0.0))?;
        let coarse = self.bootstrap(&scaled, is_complex)?;
        let coarse = self.eval.mult_integer(&coarse, 1 << EXTENDED_RANGE_LOG);

        let residual = self.eval.sub(ctxt, &coarse)?;
        let fine = self.bootstrap(&residual, is_complex)?;
        self.eval.add(&coarse, &fine)
    }

    /// Two-output form of [`bootstrap_extended`](Self::bootstrap_extended)
    #[instrument(skip_all, fields(level = ctxt.level, log_slots = ctxt.log_slots))]
    pub fn bootstrap_extended_two_outputs(&self, ctxt: &Ciphertext) -> Result<(Ciphertext, Ciphertext)> {
        self.check_extended(ctxt)?;
        let scaled = self.eval.mult_const(ctxt, Complex64::new(extended_scale(), 0.0))?;
        let (re, im) = self.bootstrap_two_outputs(&scaled)?;
        let re = self.eval.mult_integer(&re, 1 << EXTENDED_RANGE_LOG);
        let im = self.eval.mult_integer(&im, 1 << EXTENDED_RANGE_LOG);

        let coarse = self.eval.add(&re, &self.eval.mult_imag_unit(&im))?;
        let residual = self.eval.sub(ctxt, &coarse)?;
        let (fine_re, fine_im) = self.bootstrap_two_outputs(&residual)?;
        Ok((self.eval.add(&re, &fine_re)?, self.eval.add(&im, &fine_im)?))
    }

    fn check_input(&self, ctxt: &Ciphertext, min_level: usize) -> Result<()> {
        if ctxt.level < min_level {
            precondition!(
                "bootstrap requires level at least {}, found {}",
                min_level,
                ctxt.level
            );
        }
        if ctxt.rescale_counter != 0 {
            precondition!(
                "bootstrap requires rescale counter 0, found {}",
                ctxt.rescale_counter
            );
        }
        if ctxt.size() != 2 {
            precondition!("bootstrap requires a size-2 ciphertext, found size {}", ctxt.size());
        }
        check_same_device(ctxt.device, self.eval.key_pack().device())?;
        if self.diagnostics.load(Ordering::Relaxed) && self.approximation_error > DIAGNOSTIC_ERROR_BOUND {
            warn!(
                approximation_error = self.approximation_error,
                bound = DIAGNOSTIC_ERROR_BOUND,
                "EvalMod approximation error exceeds the diagnostic bound"
            );
        }
        Ok(())
    }

    fn check_extended(&self, ctxt: &Ciphertext) -> Result<()> {
        if !self.context().is_extended_bootstrap_supported() {
            precondition!(
                "parameter {:?} does not support extended bootstrap",
                self.context().preset()
            );
        }
        self.check_input(ctxt, MIN_LEVEL_FOR_EXTENDED_BOOTSTRAP)
    }

    /// Everything up to SlotToCoeff: slots of the result are 2π·Δ₀/q₀ · w
    fn refresh_slots(&self, ctxt: &Ciphertext, constants: &BootConstants) -> Result<Ciphertext> {
        let raised = self.raise(ctxt)?;
        let projected = self.subsum(&raised)?;

        let slots = constants.coeff_to_slot.evaluate(&self.eval, &projected)?;
        debug!(level = slots.level, "coeff to slot done");
        let (lo, hi) = separate(&self.eval, &slots)?;

        let (f_lo, f_hi) = rayon::join(
            || self.eval_mod.evaluate(&self.eval, &lo),
            || self.eval_mod.evaluate(&self.eval, &hi),
        );
        let (f_lo, f_hi) = (f_lo?, f_hi?);
        debug!(level = f_lo.level, "eval mod done");
        self.eval.add(&f_lo, &self.eval.mult_imag_unit(&f_hi))
    }

    /// A shallower sparse circuit leaves spare levels; drop them
    fn settle(&self, out: &Ciphertext) -> Result<Ciphertext> {
        let target = self.level_after_full_slot_bootstrap();
        if out.level > target {
            self.eval.level_down(out, target)
        } else {
            Ok(out.clone())
        }
    }

    /// Level down to 0, mod-raise, with the sparse secret detour when configured
    fn raise(&self, ctxt: &Ciphertext) -> Result<Ciphertext> {
        let bottom = self.eval.level_down(ctxt, 0)?;
        let Some(pair) = &self.sparse else {
            return mod_raise(self.context(), &bottom);
        };
        let keys = self.eval.key_pack();
        let encapsulation = keys
            .get_sparse_encapsulation_key()
            .ok_or_else(|| HeError::MissingKey("sparse secret encapsulation key".into()))?;
        let decapsulation = keys
            .get_sparse_decapsulation_key()
            .ok_or_else(|| HeError::MissingKey("sparse secret decapsulation key".into()))?;

        let sparse = switch_key_in(pair.sparse(), &bottom, &encapsulation);
        let raised = mod_raise(self.context(), &sparse)?;
        self.eval.switch_key(&raised, &decapsulation)
    }

    /// Trace onto the n-slot subring; multiplies the coefficients by N/2n
    fn subsum(&self, raised: &Ciphertext) -> Result<Ciphertext> {
        let context = self.context();
        let slots = 1usize << raised.log_slots;
        let mut acc = raised.clone();
        for amount in subsum_rotations(slots, context.num_full_slots()) {
            let key = self
                .eval
                .key_pack()
                .get_left_rot_key(amount)
                .ok_or_else(|| HeError::MissingKey(format!("left rotation key for {}", amount)))?;
            let rotated = self
                .eval
                .apply_galois(&acc, context.left_rotation_galois(amount), &key)?;
            acc = self.eval.add(&acc, &rotated)?;
        }
        Ok(acc)
    }
}

fn extended_scale() -> f64 {
    1.0 / f64::from(1u32 << EXTENDED_RANGE_LOG)
}

/// (y + ȳ, i(ȳ - y)) = (2·Re y, 2·Im y)
fn separate(eval: &HomEvaluator, y: &Ciphertext) -> Result<(Ciphertext, Ciphertext)> {
    let conj = eval.conjugate(y)?;
    let lo = eval.add(y, &conj)?;
    let hi = eval.mult_imag_unit(&eval.sub(&conj, y)?);
    Ok((lo, hi))
}

impl std::fmt::Debug for Bootstrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bootstrapper")
            .field("shape", &self.shape)
            .field("sparse", &self.sparse.is_some())
            .field("approximation_error", &self.approximation_error)
            .finish()
    }
}
