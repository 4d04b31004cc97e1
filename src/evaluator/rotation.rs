//! Slot rotations and complex conjugation
//!
//! Both are Galois automorphisms X → X^g followed by a key switch from σ_g(s)
//! back to s. Left rotation by k uses g = 5^k mod 2N, conjugation g = 2N - 1.
//! Right rotations reuse the left key for N/2 - k.
//!
//! Rotations act on the slot vector as a whole, so they are legal at any
//! rescale counter and consume no level.

use rustfft::num_complex::Complex64;
use tracing::instrument;

use super::key_switch::key_switch;
use super::HomEvaluator;
use crate::ciphertext::Ciphertext;
use crate::error::{precondition, HeError, Result};
use crate::keys::SwitchingKey;
use crate::message::Message;
use crate::plaintext::Plaintext;

impl HomEvaluator {
    /// out[i] = in[(i + k) mod n]
    ///
    /// # Errors
    /// `MissingKey` when the key pack holds no left rotation key for k mod n.
    #[instrument(level = "debug", skip(self, ctxt))]
    pub fn left_rotate(&self, ctxt: &Ciphertext, k: usize) -> Result<Ciphertext> {
        let slots = 1usize << ctxt.log_slots;
        let k = k % slots;
        if k == 0 {
            return Ok(ctxt.clone());
        }
        let key = self
            .keys
            .get_left_rot_key(k)
            .ok_or_else(|| HeError::MissingKey(format!("left rotation key for {}", k)))?;
        self.apply_galois(ctxt, self.context.left_rotation_galois(k), &key)
    }

    /// out[i] = in[(i - k) mod n]
    pub fn right_rotate(&self, ctxt: &Ciphertext, k: usize) -> Result<Ciphertext> {
        let slots = 1usize << ctxt.log_slots;
        let k = k % slots;
        if k == 0 {
            return Ok(ctxt.clone());
        }
        // A sparse ciphertext repeats every n slots, so either left amount works.
        // The amount is applied as is: N/2 - k must not be reduced mod n again.
        let full = self.context.num_full_slots();
        for amount in [full - k, slots - k] {
            if let Some(key) = self.keys.get_left_rot_key(amount) {
                return self.apply_galois(ctxt, self.context.left_rotation_galois(amount), &key);
            }
        }
        Err(HeError::MissingKey(format!("right rotation key for {}", k)))
    }

    pub fn left_rotate_message(&self, msg: &Message, k: usize) -> Message {
        msg.rotated_left(k)
    }

    pub fn right_rotate_message(&self, msg: &Message, k: usize) -> Message {
        let n = msg.len();
        msg.rotated_left(n - k % n)
    }

    /// Left rotation of an unencrypted plaintext; needs no key
    pub fn left_rotate_plain(&self, ptxt: &Plaintext, k: usize) -> Plaintext {
        let slots = 1usize << ptxt.log_slots;
        self.permute_plain(ptxt, self.context.left_rotation_galois(k % slots))
    }

    pub fn right_rotate_plain(&self, ptxt: &Plaintext, k: usize) -> Plaintext {
        let slots = 1usize << ptxt.log_slots;
        let full = self.context.num_full_slots();
        self.permute_plain(ptxt, self.context.left_rotation_galois(full - k % slots))
    }

    pub fn conjugate_plain(&self, ptxt: &Plaintext) -> Plaintext {
        self.permute_plain(ptxt, self.context.conjugation_galois())
    }

    /// X → X^g on the plaintext polynomial, keeping its form and state
    fn permute_plain(&self, ptxt: &Plaintext, galois: usize) -> Plaintext {
        let basis = self.context.q_basis(ptxt.level);
        let permuted = ptxt
            .poly
            .clone()
            .into_coeff(&basis)
            .automorphism(galois, &basis);
        let poly = if ptxt.poly.is_ntt {
            permuted.into_ntt(&basis)
        } else {
            permuted
        };
        Plaintext::from_parts(poly, ptxt.level, ptxt.rescale_counter, ptxt.log_slots, ptxt.device)
    }

    /// Σ_i left_rotate(ctxts[i], amounts[i])
    ///
    /// # Errors
    /// `Precondition` when the slices differ in length, are empty, or the
    /// ciphertexts sit at different levels.
    pub fn rot_sum(&self, ctxts: &[Ciphertext], amounts: &[usize]) -> Result<Ciphertext> {
        if ctxts.len() != amounts.len() {
            precondition!(
                "rot_sum got {} ciphertexts but {} rotation amounts",
                ctxts.len(),
                amounts.len()
            );
        }
        let Some(first) = ctxts.first() else {
            precondition!("rot_sum needs at least one ciphertext");
        };
        if let Some(other) = ctxts.iter().find(|c| c.level != first.level) {
            precondition!(
                "rot_sum operands must share a level, found {} and {}",
                first.level,
                other.level
            );
        }
        let mut acc = self.left_rotate(first, amounts[0])?;
        for (ctxt, &k) in ctxts.iter().zip(amounts).skip(1) {
            acc = self.add(&acc, &self.left_rotate(ctxt, k)?)?;
        }
        Ok(acc)
    }

    /// Σ_{j < count} left_rotate(ctxt, j·gap)
    ///
    /// Power-of-two counts use log2(count) rotate-and-add doublings, others
    /// rotate each term separately.
    pub fn left_rotate_reduce(&self, ctxt: &Ciphertext, gap: usize, count: usize) -> Result<Ciphertext> {
        self.rotate_reduce(ctxt, gap, count, |c, k| self.left_rotate(c, k))
    }

    /// Σ_{j < count} right_rotate(ctxt, j·gap)
    pub fn right_rotate_reduce(&self, ctxt: &Ciphertext, gap: usize, count: usize) -> Result<Ciphertext> {
        self.rotate_reduce(ctxt, gap, count, |c, k| self.right_rotate(c, k))
    }

    fn rotate_reduce<F>(&self, ctxt: &Ciphertext, gap: usize, count: usize, rotate: F) -> Result<Ciphertext>
    where
        F: Fn(&Ciphertext, usize) -> Result<Ciphertext>,
    {
        if count == 0 {
            precondition!("rotate-reduce needs a positive term count");
        }
        if count.is_power_of_two() {
            let mut acc = ctxt.clone();
            let mut step = gap;
            for _ in 0..count.trailing_zeros() {
                acc = self.add(&acc, &rotate(&acc, step)?)?;
                step *= 2;
            }
            return Ok(acc);
        }
        let mut acc = ctxt.clone();
        for j in 1..count {
            acc = self.add(&acc, &rotate(ctxt, j * gap)?)?;
        }
        Ok(acc)
    }

    /// Complex conjugate of every slot
    ///
    /// # Errors
    /// `MissingKey` without a conjugation key.
    #[instrument(level = "debug", skip_all)]
    pub fn conjugate(&self, ctxt: &Ciphertext) -> Result<Ciphertext> {
        let key = self
            .keys
            .get_conj_key()
            .ok_or_else(|| HeError::MissingKey("conjugation key".into()))?;
        self.apply_galois(ctxt, self.context.conjugation_galois(), &key)
    }

    pub fn conjugate_message(&self, msg: &Message) -> Message {
        msg.map(|z| z.conj())
    }

    /// Real part of every slot, (x + conj(x)) / 2
    ///
    /// The halving is a constant multiplication and consumes one level.
    pub fn kill_imag(&self, ctxt: &Ciphertext) -> Result<Ciphertext> {
        let sum = self.add(ctxt, &self.conjugate(ctxt)?)?;
        self.mult_const(&sum, Complex64::new(0.5, 0.0))
    }

    /// (c_0, c_1) → (σ_g(c_0), 0) + key_switch(σ_g(c_1))
    pub(crate) fn apply_galois(&self, ctxt: &Ciphertext, galois: usize, key: &SwitchingKey) -> Result<Ciphertext> {
        self.check_key_device(ctxt)?;
        if ctxt.size() != 2 {
            precondition!(
                "automorphisms require a size-2 ciphertext, found size {}",
                ctxt.size()
            );
        }
        let basis = self.context.q_basis(ctxt.level);
        let c0 = ctxt.polys[0]
            .clone()
            .into_coeff(&basis)
            .automorphism(galois, &basis)
            .into_ntt(&basis);
        let c1 = ctxt.polys[1]
            .clone()
            .into_coeff(&basis)
            .automorphism(galois, &basis);

        let [mut u0, u1] = key_switch(&self.context, ctxt.level, &c1, key);
        u0.add_assign(&c0, &basis);
        Ok(ctxt.with_polys(vec![u0, u1]))
    }
}
