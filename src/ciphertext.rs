//! Leveled, scaled ciphertexts

use serde::{Deserialize, Serialize};

use crate::device::Device;
use crate::math::RnsPoly;

/// Vector of RNS polynomials (c_0, c_1[, c_2]) decrypting to Σ c_i · s^i
///
/// Polynomials are held in NTT form over q_0 ... q_level. A size-3 ciphertext is
/// the output of a tensor product before relinearization.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ciphertext {
    pub(crate) polys: Vec<RnsPoly>,
    pub(crate) level: usize,
    pub(crate) rescale_counter: i32,
    pub(crate) log_slots: u32,
    /// Set between mod-raise and the first rescale of a bootstrap
    pub(crate) is_mod_up: bool,
    #[serde(skip)]
    pub(crate) device: Device,
}

impl Ciphertext {
    pub(crate) fn from_parts(
        polys: Vec<RnsPoly>,
        level: usize,
        rescale_counter: i32,
        log_slots: u32,
        device: Device,
    ) -> Self {
        debug_assert!(polys.iter().all(|p| p.num_limbs() == level + 1));
        Self {
            polys,
            level,
            rescale_counter,
            log_slots,
            is_mod_up: false,
            device,
        }
    }

    /// Same state as `self`, different polynomials
    pub(crate) fn with_polys(&self, polys: Vec<RnsPoly>) -> Self {
        Self {
            polys,
            level: self.level,
            rescale_counter: self.rescale_counter,
            log_slots: self.log_slots,
            is_mod_up: self.is_mod_up,
            device: self.device,
        }
    }

    /// Number of polynomials (2, or 3 before relinearization)
    pub fn size(&self) -> usize {
        self.polys.len()
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

    pub fn is_mod_up(&self) -> bool {
        self.is_mod_up
    }

    /// Read access to the component polynomials
    pub fn polys(&self) -> &[RnsPoly] {
        &self.polys
    }

    /// Retag every polynomial buffer with `device`
    pub fn to(&mut self, device: Device) {
        self.device = device;
    }
}
