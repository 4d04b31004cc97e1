//! Encoded, unencrypted polynomials

use serde::{Deserialize, Serialize};

use crate::device::Device;
use crate::math::RnsPoly;

/// A single RNS polynomial with its level, rescale counter and slot count
///
/// The polynomial has `level + 1` limbs and is kept in NTT form unless it was
/// produced by [`EnDecoder::encode_without_ntt`](crate::EnDecoder::encode_without_ntt).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Plaintext {
    pub(crate) poly: RnsPoly,
    pub(crate) level: usize,
    pub(crate) rescale_counter: i32,
    pub(crate) log_slots: u32,
    #[serde(skip)]
    pub(crate) device: Device,
}

impl Plaintext {
    pub(crate) fn from_parts(
        poly: RnsPoly,
        level: usize,
        rescale_counter: i32,
        log_slots: u32,
        device: Device,
    ) -> Self {
        debug_assert_eq!(poly.num_limbs(), level + 1);
        Self {
            poly,
            level,
            rescale_counter,
            log_slots,
            device,
        }
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn rescale_counter(&self) -> i32 {
        self.rescale_counter
    }

    pub fn log_slots(&self) -> u32 {
        self.log_slots
    }

    pub fn device(&self) -> Device {
        self.device
    }

    /// Whether the polynomial is in NTT (evaluation) form
    pub fn is_ntt(&self) -> bool {
        self.poly.is_ntt
    }

    /// True when every residue is zero
    pub fn is_zero(&self) -> bool {
        self.poly.limbs.iter().all(|limb| limb.iter().all(|&x| x == 0))
    }

    /// Read access to the RNS polynomial
    pub fn poly(&self) -> &RnsPoly {
        &self.poly
    }

    /// Retag the polynomial buffer with `device`
    pub fn to(&mut self, device: Device) {
        self.device = device;
    }
}
