//! Hybrid key switching
//!
//! For d over Q_k = q_0 ⋯ q_k, encrypted "under" s' (i.e. the caller needs d·s'),
//! produces (u_0, u_1) over Q_k with u_0 + u_1·s ≈ d·s':
//!
//! 1. **Mod-up:** for every gadget piece j active at level k, take the residues of
//!    d on the piece's primes and extend them to the remaining primes of Q_k and to
//!    the temporary primes P by fast basis conversion.
//! 2. **Inner product:** accumulate Σ_j d̃_j · (b_j, a_j) over Q_k·P.
//! 3. **Mod-down:** divide by P, i.e. x ↦ (x - Conv_{P→Q}([x]_P)) · P^(-1) mod Q_k.
//!
//! The key error is multiplied by d̃_j (bounded by the piece modulus) and then
//! divided by P, which is why the temporary primes must cover the largest piece.
//! An undersized P degrades precision; it never raises an error.

use rayon::prelude::*;
use tracing::instrument;

use super::HomEvaluator;
use crate::ciphertext::Ciphertext;
use crate::context::Context;
use crate::error::Result;
use crate::keys::SwitchingKey;
use crate::math::{BasisConverter, RnsPoly};

/// Key switch `d` (coefficient form, `level + 1` limbs) with `key`; returns
/// (u_0, u_1) in NTT form over q_0 ... q_level
#[instrument(level = "debug", skip_all, fields(level))]
pub(crate) fn key_switch(
    context: &Context,
    level: usize,
    d: &RnsPoly,
    key: &SwitchingKey,
) -> [RnsPoly; 2] {
    debug_assert!(!d.is_ntt);
    let n = context.dimension();
    let chain_len = context.chain_length();
    let q_basis = context.q_basis(level);
    let p_basis = context.p_basis();
    let qp_basis = context.qp_basis(level);
    let num_limbs = qp_basis.len();

    // key limb holding qp_basis[t]
    let key_limb = |t: usize| if t <= level { t } else { chain_len + t - level - 1 };

    let mut acc = [RnsPoly::zero(n, num_limbs, true), RnsPoly::zero(n, num_limbs, true)];

    for (j, piece) in context.gadget_pieces(level).into_iter().enumerate() {
        let from: Vec<_> = q_basis[piece.clone()].to_vec();
        let to: Vec<_> = (0..=level)
            .filter(|i| !piece.contains(i))
            .map(|i| q_basis[i])
            .chain(p_basis.iter().copied())
            .collect();
        let conv = BasisConverter::new(&from, &to);
        let mut extended = conv.convert(&d.limbs[piece.clone()], &from, &to).into_iter();

        let mut limbs = Vec::with_capacity(num_limbs);
        for i in 0..=level {
            if piece.contains(&i) {
                limbs.push(d.limbs[i].clone());
            } else if let Some(limb) = extended.next() {
                limbs.push(limb);
            }
        }
        limbs.extend(extended);
        let lifted = RnsPoly {
            limbs,
            is_ntt: false,
        }
        .into_ntt(&qp_basis);

        let [b, a] = &key.pieces[j];
        for (acc_poly, key_poly) in acc.iter_mut().zip([b, a]) {
            acc_poly
                .limbs
                .par_iter_mut()
                .enumerate()
                .for_each(|(t, out)| {
                    let r = qp_basis[t].reducer();
                    for ((o, &x), &k) in out
                        .iter_mut()
                        .zip(&lifted.limbs[t])
                        .zip(&key_poly.limbs[key_limb(t)])
                    {
                        *o = r.add(*o, r.mul(x, k));
                    }
                });
        }
    }

    acc.map(|poly| mod_down(context, level, poly))
}

/// Divide an NTT-form polynomial over Q_level·P by P, returning NTT form over Q_level
fn mod_down(context: &Context, level: usize, mut poly: RnsPoly) -> RnsPoly {
    let q_basis = context.q_basis(level);
    let p_basis = context.p_basis();

    let mut p_part = RnsPoly {
        limbs: poly.limbs.split_off(level + 1),
        is_ntt: true,
    };
    p_part.to_coeff(&p_basis);

    let conv = BasisConverter::new(&p_basis, &q_basis);
    let correction = RnsPoly {
        limbs: conv.convert(&p_part.limbs, &p_basis, &q_basis),
        is_ntt: false,
    }
    .into_ntt(&q_basis);

    poly.limbs
        .par_iter_mut()
        .zip(correction.limbs.par_iter())
        .zip(q_basis.par_iter())
        .for_each(|((x, c), ntt)| {
            let r = ntt.reducer();
            let p_inv = r.inv(
                context
                    .temp_primes()
                    .iter()
                    .fold(1u64, |acc, &p| r.mul(acc, r.reduce(p))),
            );
            for (v, &w) in x.iter_mut().zip(c) {
                *v = r.mul(r.sub(*v, w), p_inv);
            }
        });
    poly
}

impl HomEvaluator {
    /// Switch a size-2 ciphertext (c_0, c_1) decrypting under s' to one decrypting
    /// under s, given the key s' → s
    pub(crate) fn switch_key(&self, ctxt: &Ciphertext, key: &SwitchingKey) -> Result<Ciphertext> {
        self.check_key_device(ctxt)?;
        Ok(switch_key_in(&self.context, ctxt, key))
    }
}

/// Key switch of a size-2 ciphertext in an arbitrary context (used for the sparse
/// companion context as well)
pub(crate) fn switch_key_in(context: &Context, ctxt: &Ciphertext, key: &SwitchingKey) -> Ciphertext {
    let basis = context.q_basis(ctxt.level);
    let c1 = ctxt.polys[1].clone().into_coeff(&basis);
    let [mut u0, u1] = key_switch(context, ctxt.level, &c1, key);
    u0.add_assign(&ctxt.polys[0], &basis);
    ctxt.with_polys(vec![u0, u1])
}
