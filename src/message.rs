//! Unencrypted slot vectors

use rand::Rng;
use rustfft::num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::device::Device;
use crate::error::{precondition, Result};

/// A vector of 2^log_slots complex numbers
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    log_slots: u32,
    slots: Vec<Complex64>,
    #[serde(skip)]
    device: Device,
}

impl Message {
    /// All-zero message
    pub fn zero(log_slots: u32) -> Self {
        Self {
            log_slots,
            slots: vec![Complex64::new(0.0, 0.0); 1 << log_slots],
            device: Device::cpu(),
        }
    }

    /// Message with real and imaginary parts uniform in [-1, 1)
    pub fn random<R: Rng + ?Sized>(log_slots: u32, rng: &mut R) -> Self {
        let slots = (0..1usize << log_slots)
            .map(|_| Complex64::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)))
            .collect();
        Self {
            log_slots,
            slots,
            device: Device::cpu(),
        }
    }

    /// Message holding a copy of `values`
    ///
    /// # Errors
    /// `Precondition` unless `values.len()` is a nonzero power of two.
    pub fn from_slice(values: &[Complex64]) -> Result<Self> {
        if values.is_empty() || !values.len().is_power_of_two() {
            precondition!("message length {} is not a power of two", values.len());
        }
        Ok(Self {
            log_slots: values.len().trailing_zeros(),
            slots: values.to_vec(),
            device: Device::cpu(),
        })
    }

    /// Message from real values
    pub fn from_reals(values: &[f64]) -> Result<Self> {
        let slots: Vec<Complex64> = values.iter().map(|&x| Complex64::new(x, 0.0)).collect();
        Self::from_slice(&slots)
    }

    pub fn log_slots(&self) -> u32 {
        self.log_slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[Complex64] {
        &self.slots
    }

    pub fn slots_mut(&mut self) -> &mut [Complex64] {
        &mut self.slots
    }

    pub fn device(&self) -> Device {
        self.device
    }

    /// Retag the slot buffer with `device`
    pub fn to(&mut self, device: Device) {
        self.device = device;
    }

    /// Largest |self_i - other_i|, or infinity when the lengths differ
    pub fn max_error(&self, other: &Message) -> f64 {
        if self.len() != other.len() {
            return f64::INFINITY;
        }
        self.slots
            .iter()
            .zip(&other.slots)
            .map(|(a, b)| (a - b).norm())
            .fold(0.0, f64::max)
    }

    pub(crate) fn with_slots(log_slots: u32, slots: Vec<Complex64>, device: Device) -> Self {
        debug_assert_eq!(slots.len(), 1 << log_slots);
        Self {
            log_slots,
            slots,
            device,
        }
    }

    pub(crate) fn map(&self, f: impl Fn(Complex64) -> Complex64) -> Self {
        Self {
            log_slots: self.log_slots,
            slots: self.slots.iter().map(|&z| f(z)).collect(),
            device: self.device,
        }
    }

    pub(crate) fn zip_map(
        &self,
        other: &Message,
        f: impl Fn(Complex64, Complex64) -> Complex64,
    ) -> Result<Self> {
        if self.log_slots != other.log_slots {
            precondition!(
                "messages have different slot counts (2^{} vs 2^{})",
                self.log_slots,
                other.log_slots
            );
        }
        crate::device::check_same_device(self.device, other.device)?;
        Ok(Self {
            log_slots: self.log_slots,
            slots: self
                .slots
                .iter()
                .zip(&other.slots)
                .map(|(&a, &b)| f(a, b))
                .collect(),
            device: self.device,
        })
    }

    /// out[i] = self[(i + k) mod n]
    pub(crate) fn rotated_left(&self, k: usize) -> Self {
        let n = self.len();
        let mut slots = self.slots.clone();
        slots.rotate_left(k % n);
        Self {
            log_slots: self.log_slots,
            slots,
            device: self.device,
        }
    }
}

impl std::ops::Index<usize> for Message {
    type Output = Complex64;

    fn index(&self, i: usize) -> &Complex64 {
        &self.slots[i]
    }
}

impl std::ops::IndexMut<usize> for Message {
    fn index_mut(&mut self, i: usize) -> &mut Complex64 {
        &mut self.slots[i]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn test_length_must_be_power_of_two() {
        assert!(Message::from_reals(&[1.0, 2.0, 3.0]).is_err());
        assert!(Message::from_reals(&[]).is_err());
        let m = Message::from_reals(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(m.log_slots(), 2);
    }

    #[test]
    fn test_random_is_bounded_and_seeded() {
        let a = Message::random(5, &mut ChaCha20Rng::seed_from_u64(1));
        let b = Message::random(5, &mut ChaCha20Rng::seed_from_u64(1));
        assert_eq!(a, b);
        assert!(a.slots().iter().all(|z| z.re.abs() <= 1.0 && z.im.abs() <= 1.0));
    }

    #[test]
    fn test_rotation_and_error() {
        let m = Message::from_reals(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        let r = m.rotated_left(1);
        assert_eq!(r[0].re, 2.0);
        assert_eq!(r[3].re, 1.0);
        assert_eq!(m.max_error(&m), 0.0);
        assert_eq!(m.max_error(&Message::zero(3)), f64::INFINITY);
    }
}
