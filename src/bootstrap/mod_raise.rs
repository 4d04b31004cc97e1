//! Modulus raising
//!
//! A ciphertext at level 0 decrypts to t = c_0 + c_1·s mod q_0. Lifting the
//! centered residues of c_0 and c_1 to every prime of the chain yields a
//! ciphertext over the full modulus that decrypts to t + q_0·I, where the integer
//! polynomial I has coefficients bounded by roughly the Hamming weight of s.
//! The following steps remove I.

use tracing::debug;

use crate::ciphertext::Ciphertext;
use crate::context::Context;
use crate::error::{precondition, Result};
use crate::math::RnsPoly;

/// Lift a level-0 ciphertext to the top level of `context`
///
/// # Errors
/// `Precondition` unless the input is a size-2 ciphertext at level 0 with
/// counter 0.
pub fn mod_raise(context: &Context, ctxt: &Ciphertext) -> Result<Ciphertext> {
    if ctxt.level != 0 || ctxt.rescale_counter != 0 {
        precondition!(
            "mod raise expects level 0 with counter 0, found level {} counter {}",
            ctxt.level,
            ctxt.rescale_counter
        );
    }
    if ctxt.size() != 2 {
        precondition!("mod raise expects a size-2 ciphertext, found size {}", ctxt.size());
    }
    let base = context.q_basis(0);
    let reducer = base[0].reducer();
    let top = context.max_level();
    let basis = context.q_basis(top);

    let polys = ctxt
        .polys
        .iter()
        .map(|poly| {
            let coeffs = poly.clone().into_coeff(&base);
            let centered: Vec<i64> = coeffs.limbs[0].iter().map(|&c| reducer.center(c)).collect();
            RnsPoly::from_signed(&centered, &basis).into_ntt(&basis)
        })
        .collect();

    let mut raised = Ciphertext::from_parts(polys, top, 0, ctxt.log_slots, ctxt.device);
    raised.is_mod_up = true;
    debug!(level = top, "mod raised");
    Ok(raised)
}
