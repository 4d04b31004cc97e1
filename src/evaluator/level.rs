//! Level and rescale bookkeeping
//!
//! - `rescale`: (k, r) → (k-1, r-1), divides by q_k with rounding
//! - `inverse_rescale`: (k, r) → (k+1, r+1), multiplies by q_{k+1}
//! - `level_down`: (k, 0) → (k', 0) for k' ≤ k without changing the encrypted value
//!
//! Dropping a prime alone would leave the residues at scale Δ_k while level k-1
//! expects Δ_{k-1}, so one level-down step multiplies by round(Δ_{k-1}·q_k / Δ_k)
//! before dividing by q_k.

use tracing::trace;

use super::HomEvaluator;
use crate::ciphertext::Ciphertext;
use crate::context::Context;
use crate::error::{precondition, Result};
use crate::math::RnsPoly;
use crate::plaintext::Plaintext;

/// Divide every polynomial by q_level and drop its limb
pub(crate) fn rescale_polys(context: &Context, polys: &mut [RnsPoly], level: usize) {
    let basis = context.q_basis(level);
    for poly in polys.iter_mut() {
        poly.divide_by_last_prime(&basis);
    }
}

/// Append a zero limb for q_{level+1} and multiply the others by q_{level+1}
pub(crate) fn inverse_rescale_polys(context: &Context, polys: &mut [RnsPoly], level: usize) {
    let basis = context.q_basis(level + 1);
    let q_next = basis[level + 1].q;
    let scalars: Vec<u64> = basis[..=level]
        .iter()
        .map(|ntt| ntt.reducer().reduce(q_next))
        .collect();
    for poly in polys.iter_mut() {
        poly.mul_scalar_residues(&scalars, &basis[..=level]);
        poly.limbs.push(vec![0u64; context.dimension()]);
    }
}

/// Multiply by round(Δ_{level-1}·q_level / Δ_level) and divide by q_level
pub(crate) fn level_down_one_polys(context: &Context, polys: &mut [RnsPoly], level: usize) {
    let factor = context.scale_factor(level - 1) * context.primes()[level] as f64
        / context.scale_factor(level);
    let basis = context.q_basis(level);
    let scalars: Vec<u64> = basis
        .iter()
        .map(|ntt| ntt.reducer().reduce_f64(factor))
        .collect();
    for poly in polys.iter_mut() {
        poly.mul_scalar_residues(&scalars, &basis);
        poly.divide_by_last_prime(&basis);
    }
}

pub(crate) fn rescale_ciphertext(context: &Context, ctxt: &Ciphertext) -> Result<Ciphertext> {
    if ctxt.level == 0 {
        precondition!("cannot rescale a ciphertext at level 0");
    }
    let mut polys = ctxt.polys.clone();
    rescale_polys(context, &mut polys, ctxt.level);
    let mut out = ctxt.with_polys(polys);
    out.level -= 1;
    out.rescale_counter -= 1;
    out.is_mod_up = false;
    trace!(level = out.level, counter = out.rescale_counter, "rescaled");
    Ok(out)
}

pub(crate) fn level_down_ciphertext(
    context: &Context,
    ctxt: &Ciphertext,
    target: usize,
) -> Result<Ciphertext> {
    if target > ctxt.level {
        precondition!(
            "cannot level down from {} to a higher level {}",
            ctxt.level,
            target
        );
    }
    if ctxt.rescale_counter != 0 {
        precondition!(
            "level down requires rescale counter 0, found {}",
            ctxt.rescale_counter
        );
    }
    let mut polys = ctxt.polys.clone();
    for level in (target + 1..=ctxt.level).rev() {
        level_down_one_polys(context, &mut polys, level);
    }
    let mut out = ctxt.with_polys(polys);
    out.level = target;
    Ok(out)
}

impl HomEvaluator {
    /// Divide by the top prime: (k, r) → (k-1, r-1)
    ///
    /// # Errors
    /// `Precondition` at level 0 or with a negative rescale counter.
    pub fn rescale(&self, ctxt: &Ciphertext) -> Result<Ciphertext> {
        if ctxt.rescale_counter < 0 {
            precondition!(
                "rescale requires a non-negative rescale counter, found {}",
                ctxt.rescale_counter
            );
        }
        rescale_ciphertext(&self.context, ctxt)
    }

    /// Multiply by the next prime: (k, r) → (k+1, r+1)
    pub fn inverse_rescale(&self, ctxt: &Ciphertext) -> Result<Ciphertext> {
        if ctxt.level >= self.context.max_level() {
            precondition!(
                "inverse rescale requires level below {}, found {}",
                self.context.max_level(),
                ctxt.level
            );
        }
        let mut polys = ctxt.polys.clone();
        inverse_rescale_polys(&self.context, &mut polys, ctxt.level);
        let mut out = ctxt.with_polys(polys);
        out.level += 1;
        out.rescale_counter += 1;
        Ok(out)
    }

    /// Bring a counter-0 ciphertext down to `target` without changing its value
    pub fn level_down(&self, ctxt: &Ciphertext, target: usize) -> Result<Ciphertext> {
        level_down_ciphertext(&self.context, ctxt, target)
    }

    pub fn level_down_one(&self, ctxt: &Ciphertext) -> Result<Ciphertext> {
        if ctxt.level == 0 {
            precondition!("cannot level down a ciphertext at level 0");
        }
        self.level_down(ctxt, ctxt.level - 1)
    }

    /// Bring `ctxt` to the level of `reference`
    pub fn relevel(&self, ctxt: &Ciphertext, reference: &Ciphertext) -> Result<Ciphertext> {
        self.level_down(ctxt, reference.level)
    }

    pub fn rescale_plain(&self, ptxt: &Plaintext) -> Result<Plaintext> {
        if ptxt.level == 0 {
            precondition!("cannot rescale a plaintext at level 0");
        }
        if ptxt.rescale_counter < 0 {
            precondition!(
                "rescale requires a non-negative rescale counter, found {}",
                ptxt.rescale_counter
            );
        }
        let mut polys = [ptxt.poly.clone()];
        rescale_polys(&self.context, &mut polys, ptxt.level);
        let [poly] = polys;
        Ok(Plaintext::from_parts(
            poly,
            ptxt.level - 1,
            ptxt.rescale_counter - 1,
            ptxt.log_slots,
            ptxt.device,
        ))
    }

    pub fn inverse_rescale_plain(&self, ptxt: &Plaintext) -> Result<Plaintext> {
        if ptxt.level >= self.context.max_level() {
            precondition!(
                "inverse rescale requires level below {}, found {}",
                self.context.max_level(),
                ptxt.level
            );
        }
        let mut polys = [ptxt.poly.clone()];
        inverse_rescale_polys(&self.context, &mut polys, ptxt.level);
        let [poly] = polys;
        Ok(Plaintext::from_parts(
            poly,
            ptxt.level + 1,
            ptxt.rescale_counter + 1,
            ptxt.log_slots,
            ptxt.device,
        ))
    }

    pub fn level_down_plain(&self, ptxt: &Plaintext, target: usize) -> Result<Plaintext> {
        if target > ptxt.level {
            precondition!(
                "cannot level down from {} to a higher level {}",
                ptxt.level,
                target
            );
        }
        if ptxt.rescale_counter != 0 {
            precondition!(
                "level down requires rescale counter 0, found {}",
                ptxt.rescale_counter
            );
        }
        let basis = self.context.q_basis(ptxt.level);
        let mut polys = [ptxt.poly.clone()];
        polys[0].to_ntt(&basis);
        for level in (target + 1..=ptxt.level).rev() {
            level_down_one_polys(&self.context, &mut polys, level);
        }
        let [poly] = polys;
        Ok(Plaintext::from_parts(
            poly,
            target,
            0,
            ptxt.log_slots,
            ptxt.device,
        ))
    }

    pub fn level_down_one_plain(&self, ptxt: &Plaintext) -> Result<Plaintext> {
        if ptxt.level == 0 {
            precondition!("cannot level down a plaintext at level 0");
        }
        self.level_down_plain(ptxt, ptxt.level - 1)
    }

    /// Move a counter-0 plaintext to any `target` up to the max level
    ///
    /// Lowering is a level down. A plaintext holds no secret, so raising it
    /// decodes and re-encodes at `target`.
    ///
    /// # Errors
    /// `Precondition` with a nonzero counter or a target above the max level.
    pub fn relevel_plain(&self, ptxt: &Plaintext, target: usize) -> Result<Plaintext> {
        if target > self.context.max_level() {
            precondition!(
                "relevel target {} exceeds max level {}",
                target,
                self.context.max_level()
            );
        }
        if target <= ptxt.level {
            return self.level_down_plain(ptxt, target);
        }
        if ptxt.rescale_counter != 0 {
            precondition!(
                "relevel requires rescale counter 0, found {}",
                ptxt.rescale_counter
            );
        }
        let msg = self.encoder.decode(ptxt)?;
        let mut raised = self.encoder.encode_at(&msg, target, 0)?;
        raised.device = ptxt.device;
        Ok(raised)
    }
}
