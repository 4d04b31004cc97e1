//! Parameter presets, custom parameter validation and the security table
//!
//! A parameter set fixes:
//! - N = 2^log_dim, the ring dimension (N/2 complex slots)
//! - chain_length primes q_0 ... q_{L-1}: one `bpsize`-bit base prime followed by
//!   `qpsize`-bit quantization primes
//! - gadget_rank g: the chain is split into g pieces for key switching, each
//!   covered by ceil(L/g) `tpsize`-bit temporary primes
//! - the Hamming weight of the ternary secret
//!
//! **Preset naming:** first letter F = bootstrappable, S = somewhat (leveled only);
//! second letter gives log N: V = 17, G = 16, T = 15, S = 14, D = 13. `FX` is a
//! small bootstrappable parameter (log N = 10) meant for tests.

use std::f64::consts::PI;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{HeError, Result};

/// Named parameter sets
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParameterPreset {
    /// Depth optimal FV parameter
    FVa,
    /// High precision FV parameter
    FVb,
    /// Precision optimal FV parameter
    FVc,
    /// Precision optimal FG parameter
    FGa,
    /// Depth optimal FG parameter
    FGb,
    /// Depth optimal FT parameter
    FTa,
    /// Precision optimal FT parameter
    FTb,
    ST19,
    ST14,
    ST11,
    ST8,
    ST7,
    SS7,
    SD3,
    /// Small bootstrappable parameter for tests
    FX,
    /// FG parameter with sparse secret encapsulation support
    FGd,
    /// Zero-depth parameter sharing the base prime of FGd
    SGd0,
}

impl ParameterPreset {
    /// Every preset, in declaration order
    pub const ALL: [ParameterPreset; 17] = [
        Self::FVa,
        Self::FVb,
        Self::FVc,
        Self::FGa,
        Self::FGb,
        Self::FTa,
        Self::FTb,
        Self::ST19,
        Self::ST14,
        Self::ST11,
        Self::ST8,
        Self::ST7,
        Self::SS7,
        Self::SD3,
        Self::FX,
        Self::FGd,
        Self::SGd0,
    ];

    /// Numeric parameters of the preset
    pub fn params(self) -> CustomParams {
        use ParameterPreset::*;
        let (log_dim, chain_length, bpsize, qpsize, tpsize, gadget_rank) = match self {
            FVa => (17, 40, 58, 42, 58, 4),
            FVb => (17, 30, 60, 50, 60, 3),
            FVc => (17, 34, 60, 48, 60, 2),
            FGa => (16, 24, 58, 42, 58, 3),
            FGb => (16, 25, 58, 42, 58, 5),
            FTa => (15, 20, 58, 42, 58, 4),
            FTb => (15, 20, 58, 48, 58, 4),
            ST19 => (15, 20, 50, 42, 50, 4),
            ST14 => (15, 15, 50, 42, 50, 3),
            ST11 => (15, 12, 50, 42, 50, 3),
            ST8 => (15, 9, 50, 42, 50, 3),
            ST7 => (15, 8, 50, 42, 50, 2),
            SS7 => (14, 8, 50, 40, 50, 2),
            SD3 => (13, 4, 50, 40, 50, 1),
            FX => (10, 24, 52, 42, 52, 3),
            FGd => (16, 24, 58, 42, 58, 3),
            SGd0 => (16, 1, 58, 42, 58, 1),
        };
        let hamming_weight = match self {
            FX => 32,
            SGd0 => 32,
            _ => 192,
        };
        CustomParams {
            log_dim,
            chain_length,
            bpsize,
            qpsize,
            tpsize,
            gadget_rank,
            hamming_weight: Some(hamming_weight),
        }
    }

    /// Whether the preset belongs to the bootstrappable (F) family
    pub fn is_bootstrappable(self) -> bool {
        use ParameterPreset::*;
        matches!(self, FVa | FVb | FVc | FGa | FGb | FTa | FTb | FX | FGd)
    }

    /// Whether sparse secret encapsulation can be used during bootstrap
    pub fn supports_sparse_secret_encapsulation(self) -> bool {
        matches!(self, ParameterPreset::FGd | ParameterPreset::FX)
    }

    /// Whether the wide-range ([-2^20, 2^20]) bootstrap is offered
    pub fn supports_extended_bootstrap(self) -> bool {
        use ParameterPreset::*;
        matches!(self, FVa | FGb | FTa | FX)
    }
}

impl fmt::Display for ParameterPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Companion preset used for sparse secret encapsulation
///
/// # Errors
/// `InvalidParameter` for presets without a sparse companion.
pub fn sparse_preset_for(preset: ParameterPreset) -> Result<ParameterPreset> {
    match preset {
        ParameterPreset::FGd => Ok(ParameterPreset::SGd0),
        other => Err(HeError::InvalidParameter(format!(
            "preset {} has no sparse companion parameter",
            other
        ))),
    }
}

/// User-supplied parameter set
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomParams {
    /// log2 of the ring dimension, in [10, 20]
    pub log_dim: u32,
    /// Number of primes in the chain, at most 50
    pub chain_length: usize,
    /// Bit size of the base prime q_0
    pub bpsize: u32,
    /// Bit size of the quantization primes q_1 ... q_{L-1}
    pub qpsize: u32,
    /// Bit size of the temporary key-switching primes
    pub tpsize: u32,
    /// Number of gadget pieces used in key switching
    pub gadget_rank: usize,
    /// Hamming weight of the secret; N/16 capped to 192 when absent
    pub hamming_weight: Option<usize>,
}

/// Largest supported chain length
pub const MAX_CHAIN_LENGTH: usize = 50;
/// Largest supported prime size
pub const MAX_PRIME_BITS: u32 = 61;

impl CustomParams {
    /// Ring dimension N
    pub fn dimension(&self) -> usize {
        1usize << self.log_dim
    }

    /// Number of temporary primes: ceil(chain_length / gadget_rank)
    pub fn num_temp_primes(&self) -> usize {
        (self.chain_length + self.gadget_rank - 1) / self.gadget_rank.max(1)
    }

    /// Hamming weight of the secret key
    pub fn hamming_weight(&self) -> usize {
        self.hamming_weight
            .unwrap_or_else(|| (self.dimension() / 16).min(192))
    }

    /// Check every bound, reporting the first violation.
    ///
    /// # Errors
    /// `InvalidParameter` naming the offending field.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(HeError::InvalidParameter(msg));

        if !(10..=20).contains(&self.log_dim) {
            return invalid(format!("log_dim {} is outside [10, 20]", self.log_dim));
        }
        if self.chain_length == 0 || self.chain_length > MAX_CHAIN_LENGTH {
            return invalid(format!(
                "chain_length {} is outside [1, {}]",
                self.chain_length, MAX_CHAIN_LENGTH
            ));
        }
        if self.bpsize > MAX_PRIME_BITS {
            return invalid(format!("bpsize {} exceeds {}", self.bpsize, MAX_PRIME_BITS));
        }
        if self.qpsize < 20 || self.qpsize > self.bpsize {
            return invalid(format!(
                "qpsize {} must lie in [20, bpsize = {}]",
                self.qpsize, self.bpsize
            ));
        }
        if self.gadget_rank == 0 || self.gadget_rank > self.chain_length {
            return invalid(format!(
                "gadget_rank {} must lie in [1, chain_length = {}]",
                self.gadget_rank, self.chain_length
            ));
        }
        if self.tpsize > MAX_PRIME_BITS || self.tpsize < self.qpsize {
            return invalid(format!(
                "tpsize {} must lie in [qpsize = {}, {}]",
                self.tpsize, self.qpsize, MAX_PRIME_BITS
            ));
        }
        // The temporary modulus must cover the largest gadget piece (the one holding q_0)
        let num_tp = self.num_temp_primes() as u32;
        let piece_bits = self.bpsize + (num_tp.min(self.chain_length as u32) - 1) * self.qpsize;
        if num_tp * self.tpsize < piece_bits {
            return invalid(format!(
                "{} temporary primes of {} bits cannot cover a {}-bit gadget piece",
                num_tp, self.tpsize, piece_bits
            ));
        }
        let h = self.hamming_weight();
        if h == 0 || h > self.dimension() {
            return invalid(format!(
                "hamming_weight {} is outside [1, N = {}]",
                h,
                self.dimension()
            ));
        }
        Ok(())
    }

    /// Total modulus size log2(Q·P) in bits (approximate, from the bit sizes)
    pub fn total_modulus_bits(&self) -> u32 {
        self.bpsize
            + (self.chain_length as u32 - 1) * self.qpsize
            + self.num_temp_primes() as u32 * self.tpsize
    }
}

/// Security estimate against the best known attacks on ternary-secret LWE
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SecurityLevel {
    /// Below 128 bits: test parameters only
    NotSecure,
    /// ~128-bit security
    Bit128,
    /// ~192-bit security
    Bit192,
    /// ~256-bit security
    Bit256,
}

/// Maximum log2(Q·P) for (128, 192, 256)-bit security, ternary secret
///
/// Values up to N = 2^15 follow the homomorphic encryption standard; larger
/// dimensions double the budget per doubling of N.
fn max_modulus_bits(log_dim: u32) -> (u32, u32, u32) {
    match log_dim {
        0..=10 => (27, 19, 14),
        11 => (54, 37, 29),
        12 => (109, 75, 58),
        13 => (218, 152, 118),
        14 => (438, 305, 237),
        15 => (881, 611, 476),
        d => {
            let factor = 1u32 << (d - 15).min(5);
            (881 * factor, 611 * factor, 476 * factor)
        }
    }
}

/// Table lookup of the security level for a parameter set
pub fn security_level(params: &CustomParams) -> SecurityLevel {
    let bits = params.total_modulus_bits();
    let (b128, b192, b256) = max_modulus_bits(params.log_dim);
    if bits <= b256 {
        SecurityLevel::Bit256
    } else if bits <= b192 {
        SecurityLevel::Bit192
    } else if bits <= b128 {
        SecurityLevel::Bit128
    } else {
        SecurityLevel::NotSecure
    }
}

/// Shape of the bootstrapping circuit, derived from the secret's Hamming weight
///
/// After mod-raise the coefficient phase is Δ·m + e + q_0·I with |I| ≤ K, where
/// K is a high-probability bound on a sum of h+1 centered uniform variables.
/// EvalMod approximates sin(2πy) on [-(K+1), K+1] as cos(2π(y - 1/4)/2^r)
/// followed by r double-angle steps, with a fixed-degree Chebyshev polynomial.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BootstrapShape {
    /// Bound K on the mod-raise overflow |I|
    pub overflow_bound: usize,
    /// Number of double-angle steps r
    pub double_angle: u32,
    /// Degree of the Chebyshev approximation
    pub cheb_degree: usize,
}

/// Largest argument (radians) handed to the Chebyshev approximation of cos
const MAX_COS_ARGUMENT: f64 = 6.0;

impl BootstrapShape {
    /// Circuit shape for a ternary secret of Hamming weight `h`
    pub fn for_hamming_weight(h: usize) -> Self {
        let sigma = ((h as f64 + 1.0) / 12.0).sqrt();
        let overflow_bound = ((7.0 * sigma).ceil() as usize).max(2);
        let range = overflow_bound as f64 + 1.0;

        let mut double_angle = 0;
        while 2.0 * PI * (range + 0.25) / f64::from(1u32 << double_angle) > MAX_COS_ARGUMENT {
            double_angle += 1;
        }

        Self {
            overflow_bound,
            double_angle,
            cheb_degree: 31,
        }
    }

    /// Half-width K + 1 of the EvalMod input interval
    pub fn input_range(&self) -> f64 {
        self.overflow_bound as f64 + 1.0
    }

    /// Levels consumed by EvalMod: Chebyshev basis, linear combination, double angles
    pub fn eval_mod_depth(&self) -> usize {
        let basis_depth = (usize::BITS - self.cheb_degree.leading_zeros()) as usize;
        basis_depth + 1 + self.double_angle as usize
    }

    /// Levels consumed by a full bootstrap: CoeffToSlot (3), EvalMod, SlotToCoeff (2)
    pub fn depth(&self) -> usize {
        3 + self.eval_mod_depth() + 2
    }
}
