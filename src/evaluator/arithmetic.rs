//! Addition, multiplication and constant arithmetic

use rustfft::num_complex::Complex64;
use tracing::instrument;

use super::key_switch::key_switch;
use super::HomEvaluator;
use crate::ciphertext::Ciphertext;
use crate::device::check_same_device;
use crate::error::{precondition, state_mismatch, HeError, Result};
use crate::math::RnsPoly;
use crate::message::Message;
use crate::plaintext::Plaintext;

/// Tolerance under which a constant counts as a Gaussian integer
const INTEGER_TOLERANCE: f64 = 1e-8;

impl HomEvaluator {
    // ---- ciphertext ± ciphertext ----

    pub fn add(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
        self.combine(a, b, |x, y, basis| x.add_assign(y, basis))
    }

    pub fn sub(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
        self.combine(a, b, |x, y, basis| x.sub_assign(y, basis))
    }

    pub fn negate(&self, a: &Ciphertext) -> Ciphertext {
        let basis = self.context.q_basis(a.level);
        let polys = a
            .polys
            .iter()
            .map(|p| {
                let mut p = p.clone();
                p.negate(&basis);
                p
            })
            .collect();
        a.with_polys(polys)
    }

    fn combine<F>(&self, a: &Ciphertext, b: &Ciphertext, op: F) -> Result<Ciphertext>
    where
        F: Fn(&mut RnsPoly, &RnsPoly, &[&crate::math::NttContext]),
    {
        self.check_compatible(a, b)?;
        let (a, b) = self.align_levels(a, b)?;
        let basis = self.context.q_basis(a.level);
        let n = self.context.dimension();
        let size = a.size().max(b.size());
        let zero = RnsPoly::zero(n, a.level + 1, true);

        let polys = (0..size)
            .map(|i| {
                let mut x = a.polys.get(i).cloned().unwrap_or_else(|| zero.clone());
                op(&mut x, b.polys.get(i).unwrap_or(&zero), &basis);
                x
            })
            .collect();
        Ok(a.with_polys(polys))
    }

    // ---- ciphertext ± plaintext / message / constant ----

    pub fn add_plain(&self, a: &Ciphertext, p: &Plaintext) -> Result<Ciphertext> {
        self.combine_plain(a, p, |x, y, basis| x.add_assign(y, basis))
    }

    pub fn sub_plain(&self, a: &Ciphertext, p: &Plaintext) -> Result<Ciphertext> {
        self.combine_plain(a, p, |x, y, basis| x.sub_assign(y, basis))
    }

    fn combine_plain<F>(&self, a: &Ciphertext, p: &Plaintext, op: F) -> Result<Ciphertext>
    where
        F: Fn(&mut RnsPoly, &RnsPoly, &[&crate::math::NttContext]),
    {
        let (a, poly) = self.align_plain(a, p)?;
        let basis = self.context.q_basis(a.level);
        let mut polys = a.polys.clone();
        op(&mut polys[0], &poly, &basis);
        Ok(a.with_polys(polys))
    }

    /// Ciphertext and plaintext polynomial (NTT form) at a common level
    fn align_plain(&self, a: &Ciphertext, p: &Plaintext) -> Result<(Ciphertext, RnsPoly)> {
        check_same_device(a.device, p.device)?;
        if a.rescale_counter != p.rescale_counter {
            state_mismatch!(
                "ciphertext and plaintext have different rescale counters ({} vs {})",
                a.rescale_counter,
                p.rescale_counter
            );
        }
        let p = if p.level > a.level {
            self.level_down_plain(p, a.level)?
        } else {
            p.clone()
        };
        let a = if a.level > p.level {
            self.level_down(a, p.level)?
        } else {
            a.clone()
        };
        let basis = self.context.q_basis(a.level);
        Ok((a, p.poly.into_ntt(&basis)))
    }

    /// Encode `m` at the ciphertext's level and counter, then add
    pub fn add_message(&self, a: &Ciphertext, m: &Message) -> Result<Ciphertext> {
        let p = self.encoder.encode_at(m, a.level, a.rescale_counter)?;
        self.add_plain(a, &p)
    }

    pub fn sub_message(&self, a: &Ciphertext, m: &Message) -> Result<Ciphertext> {
        let p = self.encoder.encode_at(m, a.level, a.rescale_counter)?;
        self.sub_plain(a, &p)
    }

    /// Add `c` to every slot
    ///
    /// # Errors
    /// `Precondition` unless the rescale counter is 0 (the constant would land at
    /// the wrong scale).
    pub fn add_const(&self, a: &Ciphertext, c: Complex64) -> Result<Ciphertext> {
        self.check_counter_zero(a, "constant addition")?;
        let basis = self.context.q_basis(a.level);
        let constant = self
            .encoder
            .constant_poly(c, a.level, self.context.scale_factor(a.level));
        let mut polys = a.polys.clone();
        polys[0].add_assign(&constant, &basis);
        Ok(a.with_polys(polys))
    }

    pub fn sub_const(&self, a: &Ciphertext, c: Complex64) -> Result<Ciphertext> {
        self.add_const(a, -c)
    }

    // ---- plaintext ± × constant ----

    /// Add `c` to every slot of a plaintext
    ///
    /// # Errors
    /// `Precondition` unless the rescale counter is 0.
    pub fn add_const_plain(&self, p: &Plaintext, c: Complex64) -> Result<Plaintext> {
        if p.rescale_counter != 0 {
            precondition!(
                "constant addition requires rescale counter 0, found {}",
                p.rescale_counter
            );
        }
        let basis = self.context.q_basis(p.level);
        let constant = self
            .encoder
            .constant_poly(c, p.level, self.context.scale_factor(p.level));
        let mut poly = p.poly.clone().into_ntt(&basis);
        poly.add_assign(&constant, &basis);
        Ok(Plaintext::from_parts(poly, p.level, 0, p.log_slots, p.device))
    }

    pub fn sub_const_plain(&self, p: &Plaintext, c: Complex64) -> Result<Plaintext> {
        self.add_const_plain(p, -c)
    }

    /// Multiply a plaintext by a constant; Gaussian integers are free, others
    /// cost one level as for ciphertexts
    pub fn mult_const_plain(&self, p: &Plaintext, c: Complex64) -> Result<Plaintext> {
        if p.rescale_counter != 0 {
            precondition!(
                "constant multiplication requires rescale counter 0, found {}",
                p.rescale_counter
            );
        }
        let basis = self.context.q_basis(p.level);
        if let Some((re, im)) = gaussian_integer(c) {
            let mut real_part = p.poly.clone().into_ntt(&basis);
            real_part.mul_integer(re, &basis);
            if im != 0 {
                let mut imag_part = p
                    .poly
                    .clone()
                    .into_coeff(&basis)
                    .mul_monomial(self.context.dimension() / 2, &basis)
                    .into_ntt(&basis);
                imag_part.mul_integer(im, &basis);
                real_part.add_assign(&imag_part, &basis);
            }
            return Ok(Plaintext::from_parts(real_part, p.level, 0, p.log_slots, p.device));
        }
        if p.level == 0 {
            precondition!("multiplication needs a level to consume, operand is at level 0");
        }
        let constant = self
            .encoder
            .constant_poly(c, p.level, self.context.scale_factor(p.level));
        let product = p.poly.clone().into_ntt(&basis).mul(&constant, &basis);
        self.rescale_plain(&Plaintext::from_parts(product, p.level, 1, p.log_slots, p.device))
    }

    // ---- multiplication ----

    /// Tensor, relinearize and rescale: (k, 0) × (k, 0) → (k-1, 0)
    #[instrument(level = "debug", skip_all)]
    pub fn mult(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
        let product = self.mult_without_rescale(a, b)?;
        self.rescale(&product)
    }

    pub fn square(&self, a: &Ciphertext) -> Result<Ciphertext> {
        self.mult(a, a)
    }

    /// Tensor and relinearize, leaving the result at counter 1
    pub fn mult_without_rescale(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
        self.check_compatible(a, b)?;
        if a.rescale_counter != 0 || b.rescale_counter != 0 {
            state_mismatch!(
                "multiplication requires rescale counter 0 on both operands ({} and {})",
                a.rescale_counter,
                b.rescale_counter
            );
        }
        let (a, b) = self.align_levels(a, b)?;
        if a.level == 0 {
            precondition!("multiplication needs a level to consume, operands are at level 0");
        }
        let tensored = self.tensor(&a, &b)?;
        self.relinearize(&tensored)
    }

    /// (a_0, a_1) ⊗ (b_0, b_1) = (a_0b_0, a_0b_1 + a_1b_0, a_1b_1) with three products
    pub fn tensor(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
        self.check_compatible(a, b)?;
        if a.level != b.level || a.rescale_counter != 0 || b.rescale_counter != 0 {
            state_mismatch!(
                "tensor requires equal levels and counter 0, found (level {}, counter {}) and (level {}, counter {})",
                a.level,
                a.rescale_counter,
                b.level,
                b.rescale_counter
            );
        }
        if a.size() != 2 || b.size() != 2 {
            precondition!("tensor requires size-2 ciphertexts, found {} and {}", a.size(), b.size());
        }
        // counter 1 at level 0 has no prime to divide by
        if a.level == 0 {
            precondition!("tensor needs a level to consume, operands are at level 0");
        }
        let basis = self.context.q_basis(a.level);
        let (a0, a1) = (&a.polys[0], &a.polys[1]);
        let (b0, b1) = (&b.polys[0], &b.polys[1]);

        let d0 = a0.mul(b0, &basis);
        let d2 = a1.mul(b1, &basis);
        let mut sum_a = a0.clone();
        sum_a.add_assign(a1, &basis);
        let mut sum_b = b0.clone();
        sum_b.add_assign(b1, &basis);
        let mut d1 = sum_a.mul(&sum_b, &basis);
        d1.sub_assign(&d0, &basis);
        d1.sub_assign(&d2, &basis);

        let mut out = a.with_polys(vec![d0, d1, d2]);
        out.rescale_counter = 1;
        Ok(out)
    }

    /// Size 3 → size 2 with the multiplication key
    ///
    /// # Errors
    /// `MissingKey` when the key pack has no multiplication key.
    #[instrument(level = "debug", skip_all)]
    pub fn relinearize(&self, a: &Ciphertext) -> Result<Ciphertext> {
        if a.size() == 2 {
            return Ok(a.clone());
        }
        if a.size() != 3 {
            precondition!("cannot relinearize a size-{} ciphertext", a.size());
        }
        self.check_key_device(a)?;
        let key = self
            .keys
            .get_mult_key()
            .ok_or_else(|| HeError::MissingKey("multiplication key".into()))?;
        let basis = self.context.q_basis(a.level);
        let d2 = a.polys[2].clone().into_coeff(&basis);
        let [u0, u1] = key_switch(&self.context, a.level, &d2, &key);

        let mut c0 = a.polys[0].clone();
        c0.add_assign(&u0, &basis);
        let mut c1 = a.polys[1].clone();
        c1.add_assign(&u1, &basis);
        Ok(a.with_polys(vec![c0, c1]))
    }

    pub fn mult_plain(&self, a: &Ciphertext, p: &Plaintext) -> Result<Ciphertext> {
        let product = self.mult_plain_without_rescale(a, p)?;
        self.rescale(&product)
    }

    pub fn mult_plain_without_rescale(&self, a: &Ciphertext, p: &Plaintext) -> Result<Ciphertext> {
        if a.rescale_counter != 0 || p.rescale_counter != 0 {
            state_mismatch!(
                "multiplication requires rescale counter 0 on both operands ({} and {})",
                a.rescale_counter,
                p.rescale_counter
            );
        }
        let (a, poly) = self.align_plain(a, p)?;
        if a.level == 0 {
            precondition!("multiplication needs a level to consume, operands are at level 0");
        }
        let mut out = self.mult_poly_raw(&a, &poly);
        out.rescale_counter = 1;
        Ok(out)
    }

    pub fn mult_message(&self, a: &Ciphertext, m: &Message) -> Result<Ciphertext> {
        let p = self.encoder.encode_at(m, a.level, 0)?;
        self.mult_plain(a, &p)
    }

    /// Multiply by a complex constant
    ///
    /// Gaussian integers (within 1e-8) go through [`mult_integer`](Self::mult_integer)
    /// and [`mult_imag_unit`](Self::mult_imag_unit) and consume no level; any
    /// other constant costs one level.
    pub fn mult_const(&self, a: &Ciphertext, c: Complex64) -> Result<Ciphertext> {
        if let Some((re, im)) = gaussian_integer(c) {
            let real_part = self.mult_integer(a, re);
            if im == 0 {
                return Ok(real_part);
            }
            let imag_part = self.mult_imag_unit(&self.mult_integer(a, im));
            return self.add(&real_part, &imag_part);
        }
        let product = self.mult_const_without_rescale(a, c)?;
        self.rescale(&product)
    }

    /// Multiply by round(c·Δ_k), leaving the result at counter 1
    pub fn mult_const_without_rescale(&self, a: &Ciphertext, c: Complex64) -> Result<Ciphertext> {
        self.check_counter_zero(a, "constant multiplication")?;
        if a.level == 0 {
            precondition!("multiplication needs a level to consume, operand is at level 0");
        }
        let constant = self
            .encoder
            .constant_poly(c, a.level, self.context.scale_factor(a.level));
        let mut out = self.mult_poly_raw(a, &constant);
        out.rescale_counter = 1;
        Ok(out)
    }

    /// Exact integer multiple; consumes no level
    pub fn mult_integer(&self, a: &Ciphertext, k: i64) -> Ciphertext {
        let basis = self.context.q_basis(a.level);
        let polys = a
            .polys
            .iter()
            .map(|p| {
                let mut p = p.clone();
                p.mul_integer(k, &basis);
                p
            })
            .collect();
        a.with_polys(polys)
    }

    /// Multiply every slot by i, i.e. by the monomial X^(N/2); consumes no level
    pub fn mult_imag_unit(&self, a: &Ciphertext) -> Ciphertext {
        let basis = self.context.q_basis(a.level);
        let half = self.context.dimension() / 2;
        let polys = a
            .polys
            .iter()
            .map(|p| {
                p.clone()
                    .into_coeff(&basis)
                    .mul_monomial(half, &basis)
                    .into_ntt(&basis)
            })
            .collect();
        a.with_polys(polys)
    }

    /// Every component times an NTT-form polynomial; state left to the caller
    pub(crate) fn mult_poly_raw(&self, a: &Ciphertext, poly: &RnsPoly) -> Ciphertext {
        let basis = self.context.q_basis(a.level);
        let polys = a.polys.iter().map(|p| p.mul(poly, &basis)).collect();
        a.with_polys(polys)
    }

    // ---- message and plaintext containers ----

    pub fn add_messages(&self, a: &Message, b: &Message) -> Result<Message> {
        a.zip_map(b, |x, y| x + y)
    }

    pub fn sub_messages(&self, a: &Message, b: &Message) -> Result<Message> {
        a.zip_map(b, |x, y| x - y)
    }

    pub fn mult_messages(&self, a: &Message, b: &Message) -> Result<Message> {
        a.zip_map(b, |x, y| x * y)
    }

    pub fn negate_message(&self, a: &Message) -> Message {
        a.map(|x| -x)
    }

    pub fn add_const_message(&self, a: &Message, c: Complex64) -> Message {
        a.map(|x| x + c)
    }

    pub fn sub_const_message(&self, a: &Message, c: Complex64) -> Message {
        a.map(|x| x - c)
    }

    pub fn mult_const_message(&self, a: &Message, c: Complex64) -> Message {
        a.map(|x| x * c)
    }

    pub fn add_plaintexts(&self, a: &Plaintext, b: &Plaintext) -> Result<Plaintext> {
        let (a, b) = self.align_plaintexts(a, b)?;
        let basis = self.context.q_basis(a.level);
        let mut poly = a.poly.clone();
        poly.add_assign(&b.poly, &basis);
        Ok(Plaintext::from_parts(poly, a.level, a.rescale_counter, a.log_slots, a.device))
    }

    pub fn sub_plaintexts(&self, a: &Plaintext, b: &Plaintext) -> Result<Plaintext> {
        let (a, b) = self.align_plaintexts(a, b)?;
        let basis = self.context.q_basis(a.level);
        let mut poly = a.poly.clone();
        poly.sub_assign(&b.poly, &basis);
        Ok(Plaintext::from_parts(poly, a.level, a.rescale_counter, a.log_slots, a.device))
    }

    /// Slot-wise product of two counter-0 plaintexts, rescaled: (k, 0) → (k-1, 0)
    pub fn mult_plaintexts(&self, a: &Plaintext, b: &Plaintext) -> Result<Plaintext> {
        if a.rescale_counter != 0 || b.rescale_counter != 0 {
            state_mismatch!(
                "multiplication requires rescale counter 0 on both operands ({} and {})",
                a.rescale_counter,
                b.rescale_counter
            );
        }
        let (a, b) = self.align_plaintexts(a, b)?;
        if a.level == 0 {
            precondition!("multiplication needs a level to consume, operands are at level 0");
        }
        let basis = self.context.q_basis(a.level);
        let product = a.poly.mul(&b.poly, &basis);
        let product = Plaintext::from_parts(product, a.level, 1, a.log_slots, a.device);
        self.rescale_plain(&product)
    }

    /// Both plaintexts in NTT form at their common lower level
    fn align_plaintexts(&self, a: &Plaintext, b: &Plaintext) -> Result<(Plaintext, Plaintext)> {
        check_same_device(a.device, b.device)?;
        if a.log_slots != b.log_slots {
            precondition!(
                "plaintexts encode different slot counts (2^{} vs 2^{})",
                a.log_slots,
                b.log_slots
            );
        }
        if a.rescale_counter != b.rescale_counter {
            state_mismatch!(
                "plaintexts have different rescale counters ({} vs {})",
                a.rescale_counter,
                b.rescale_counter
            );
        }
        let level = a.level.min(b.level);
        let to_level = |p: &Plaintext| -> Result<Plaintext> {
            let mut p = if p.level > level {
                self.level_down_plain(p, level)?
            } else {
                p.clone()
            };
            p.poly.to_ntt(&self.context.q_basis(level));
            Ok(p)
        };
        Ok((to_level(a)?, to_level(b)?))
    }
}

/// (re, im) when `c` is within tolerance of a Gaussian integer
fn gaussian_integer(c: Complex64) -> Option<(i64, i64)> {
    let (re, im) = (c.re.round(), c.im.round());
    let close = (c.re - re).abs() < INTEGER_TOLERANCE && (c.im - im).abs() < INTEGER_TOLERANCE;
    let fits = re.abs() < i64::MAX as f64 && im.abs() < i64::MAX as f64;
    (close && fits).then_some((re as i64, im as i64))
}
