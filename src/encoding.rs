//! Canonical embedding between slot vectors and ring elements
//!
//! A message of n = 2^log_slots complex slots is packed into a polynomial of the
//! subring Z[Y], Y = X^gap with gap = N / 2n, of degree < 2n. Slot j is the value
//! of the polynomial at the root ω^(5^j mod 4n), ω = exp(2πi / 4n), so the Galois
//! automorphism X → X^(5^r) rotates the slots left by r and X → X^(2N-1)
//! conjugates them. A sparse message therefore reads back replicated N/2n times
//! when decoded with the full slot count.
//!
//! **Encoding** (z → t): place z_j at index 5^j mod 4n of a length-4n vector,
//! take a forward FFT, and split w_k / n (k < n) into real part t_k and imaginary
//! part t_{k+n}. **Decoding** (t → z) is a length-4n inverse FFT of the zero-padded
//! coefficients read at the same indices.
//!
//! Both directions use `rustfft`; coefficients are scaled by S(level, counter),
//! rounded and reduced into RNS residues.

use rustfft::num_complex::Complex64;
use rustfft::FftPlanner;

use crate::context::Context;
use crate::error::{precondition, Result};
use crate::math::{CrtReconstructor, RnsPoly};
use crate::message::Message;
use crate::plaintext::Plaintext;

/// Encoder and decoder bound to one context
#[derive(Clone, Debug)]
pub struct EnDecoder {
    context: Context,
}

impl EnDecoder {
    pub fn new(context: &Context) -> Self {
        Self {
            context: context.clone(),
        }
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Encode at the encryption level with counter 0
    pub fn encode(&self, msg: &Message) -> Result<Plaintext> {
        self.encode_at(msg, self.context.encryption_level(), 0)
    }

    /// Encode at an explicit level and rescale counter (NTT form)
    ///
    /// # Errors
    /// `Precondition` when the message is longer than N/2, or unless
    /// 0 ≤ rescale_counter ≤ level ≤ max_level.
    pub fn encode_at(&self, msg: &Message, level: usize, rescale_counter: i32) -> Result<Plaintext> {
        let mut ptxt = self.encode_without_ntt(msg, level, rescale_counter)?;
        ptxt.poly.to_ntt(&self.context.q_basis(level));
        Ok(ptxt)
    }

    /// Encode in coefficient form; callers convert to NTT form themselves
    pub fn encode_without_ntt(
        &self,
        msg: &Message,
        level: usize,
        rescale_counter: i32,
    ) -> Result<Plaintext> {
        self.check_slots(msg.len())?;
        self.check_range(level, rescale_counter)?;
        let scale = self.context.scale(level, rescale_counter);
        let poly = self.encode_slots(msg.slots(), level, scale, false);
        Ok(Plaintext::from_parts(
            poly,
            level,
            rescale_counter,
            msg.log_slots(),
            self.context.current_device(),
        ))
    }

    /// Plaintext whose every slot equals `value` (full slot count, NTT form)
    pub fn encode_constant(&self, value: Complex64, level: usize) -> Result<Plaintext> {
        self.check_range(level, 0)?;
        let poly = self.constant_poly(value, level, self.context.scale_factor(level));
        Ok(Plaintext::from_parts(
            poly,
            level,
            0,
            self.context.log_full_slots(),
            self.context.current_device(),
        ))
    }

    /// Decode a plaintext back into its slot vector
    pub fn decode(&self, ptxt: &Plaintext) -> Result<Message> {
        if ptxt.level > self.context.max_level() {
            precondition!(
                "plaintext level {} exceeds max level {}",
                ptxt.level,
                self.context.max_level()
            );
        }
        let scale = self.context.scale(ptxt.level, ptxt.rescale_counter);
        let slots = self.decode_poly(&ptxt.poly, ptxt.level, ptxt.log_slots, scale);
        Ok(Message::with_slots(ptxt.log_slots, slots, ptxt.device))
    }

    /// Scaled, rounded RNS polynomial of `slots` over q_0 ... q_level
    pub(crate) fn encode_slots(
        &self,
        slots: &[Complex64],
        level: usize,
        scale: f64,
        ntt: bool,
    ) -> RnsPoly {
        let n = self.context.dimension();
        let gap = n / (2 * slots.len());
        let mut coeffs = vec![0.0; n];
        for (k, t) in embed_inverse(slots).into_iter().enumerate() {
            coeffs[k * gap] = t * scale;
        }
        let basis = self.context.q_basis(level);
        let poly = RnsPoly::from_rounded(&coeffs, &basis);
        if ntt {
            poly.into_ntt(&basis)
        } else {
            poly
        }
    }

    /// NTT-form constant polynomial round(Re c·scale) + round(Im c·scale)·X^(N/2)
    pub(crate) fn constant_poly(&self, value: Complex64, level: usize, scale: f64) -> RnsPoly {
        let n = self.context.dimension();
        let mut coeffs = vec![0.0; n];
        coeffs[0] = value.re * scale;
        coeffs[n / 2] = value.im * scale;
        let basis = self.context.q_basis(level);
        RnsPoly::from_rounded(&coeffs, &basis).into_ntt(&basis)
    }

    /// Slot values of a polynomial over q_0 ... q_level divided by `scale`
    pub(crate) fn decode_poly(
        &self,
        poly: &RnsPoly,
        level: usize,
        log_slots: u32,
        scale: f64,
    ) -> Vec<Complex64> {
        let basis = self.context.q_basis(level);
        let coeff_form;
        let poly = if poly.is_ntt {
            coeff_form = poly.clone().into_coeff(&basis);
            &coeff_form
        } else {
            poly
        };

        let n = self.context.dimension();
        let slots = 1usize << log_slots;
        let gap = n / (2 * slots);
        let crt = (level > 0).then(|| CrtReconstructor::new(&basis));
        let reducer = basis[0].reducer();

        let coeffs: Vec<f64> = (0..2 * slots)
            .map(|k| {
                let idx = k * gap;
                let value = match &crt {
                    Some(crt) => {
                        let residues: Vec<u64> = poly.limbs.iter().map(|limb| limb[idx]).collect();
                        crt.reconstruct_f64(&residues)
                    }
                    None => reducer.center(poly.limbs[0][idx]) as f64,
                };
                value / scale
            })
            .collect();
        embed_forward(&coeffs)
    }

    fn check_slots(&self, len: usize) -> Result<()> {
        if len == 0 || !len.is_power_of_two() || len > self.context.num_full_slots() {
            precondition!(
                "message length {} must be a power of two no larger than N/2 = {}",
                len,
                self.context.num_full_slots()
            );
        }
        Ok(())
    }

    fn check_range(&self, level: usize, rescale_counter: i32) -> Result<()> {
        if level > self.context.max_level() {
            precondition!(
                "level {} exceeds max level {}",
                level,
                self.context.max_level()
            );
        }
        if rescale_counter < 0 || rescale_counter as usize > level {
            precondition!(
                "rescale counter {} must lie in [0, level = {}]",
                rescale_counter,
                level
            );
        }
        Ok(())
    }
}

/// Exponents 5^j mod 4n for j < n
pub(crate) fn rotation_group(n: usize) -> impl Iterator<Item = usize> {
    let m = 4 * n;
    std::iter::successors(Some(1usize), move |&e| Some(e * 5 % m)).take(n)
}

/// Real coefficients t (length 2n) of the subring polynomial holding `slots`
pub(crate) fn embed_inverse(slots: &[Complex64]) -> Vec<f64> {
    let n = slots.len();
    let m = 4 * n;
    let mut v = vec![Complex64::new(0.0, 0.0); m];
    for (z, e) in slots.iter().zip(rotation_group(n)) {
        v[e] = *z;
    }
    FftPlanner::new().plan_fft_forward(m).process(&mut v);

    let inv_n = 1.0 / n as f64;
    let mut t = vec![0.0; 2 * n];
    for k in 0..n {
        t[k] = v[k].re * inv_n;
        t[k + n] = v[k].im * inv_n;
    }
    t
}

/// Slot values of the subring polynomial with real coefficients `coeffs`
pub(crate) fn embed_forward(coeffs: &[f64]) -> Vec<Complex64> {
    let n = coeffs.len() / 2;
    let m = 4 * n;
    let mut u = vec![Complex64::new(0.0, 0.0); m];
    for (dst, &c) in u.iter_mut().zip(coeffs) {
        dst.re = c;
    }
    FftPlanner::new().plan_fft_inverse(m).process(&mut u);
    rotation_group(n).map(|e| u[e]).collect()
}
