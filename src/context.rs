//! Immutable parameter and modulus-chain registry
//!
//! A [`Context`] owns everything derived from a parameter set: the prime chain
//! q_0 ... q_{L-1}, the temporary primes used by key switching, the NTT tables
//! for both, and the per-level scale factors. It is built once, never mutated
//! (apart from the current-device tag) and shared by cloning an `Arc`.
//!
//! **Scale model:** the scale of an object is a function of its level and rescale
//! counter, never stored alongside it:
//!
//! ```text
//! S(k, 0) = Δ_k,   Δ_0 = 2^qpsize,   Δ_k = sqrt(Δ_{k-1} · q_k)
//! S(k, r) = S(k-1, r-1) · q_k           (r > 0)
//! S(k, r) = S(k+1, r+1) / q_{k+1}       (r < 0)
//! ```
//!
//! so that Δ_k² / q_k = Δ_{k-1}: a product at level k rescales exactly onto the
//! canonical scale of level k-1.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::ops::Range;
use std::path::Path;
use std::sync::{Arc, Mutex};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::bootstrap::constants::transform_rotations;
use crate::device::Device;
use crate::error::{precondition, HeError, Result};
use crate::math::{primes, NttContext};
use crate::params::{security_level, BootstrapShape, CustomParams, ParameterPreset, SecurityLevel};

/// Minimum input level of [`Bootstrapper::bootstrap`](crate::Bootstrapper::bootstrap)
pub const MIN_LEVEL_FOR_BOOTSTRAP: usize = 3;

/// Minimum input level of the extended (wide-range) bootstrap
pub const MIN_LEVEL_FOR_EXTENDED_BOOTSTRAP: usize = 4;

/// Gap kept between base and quantization prime sizes for a custom parameter
/// to count as bootstrappable
const MIN_BOOT_PRECISION_GAP: u32 = 8;

/// Hamming weight cap of the sparse companion secret
const SPARSE_HAMMING_WEIGHT: usize = 32;

/// Parameters persisted by [`Context::save_to_file`]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextParams {
    pub preset: Option<ParameterPreset>,
    pub params: CustomParams,
}

/// Shared handle to an immutable parameter set
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    preset: Option<ParameterPreset>,
    params: CustomParams,
    primes: Vec<u64>,
    temp_primes: Vec<u64>,
    q_tables: Vec<NttContext>,
    p_tables: Vec<NttContext>,
    scale_factors: Vec<f64>,
    boot_shape: Option<BootstrapShape>,
    current_device: Mutex<Device>,
}

/// Build a context from a named preset
pub fn make_context(preset: ParameterPreset) -> Result<Context> {
    Context::build(Some(preset), preset.params())
}

/// Build a context from user-supplied parameters
///
/// # Errors
/// `InvalidParameter` when any bound of [`CustomParams::validate`] is violated.
pub fn make_context_custom(params: CustomParams) -> Result<Context> {
    Context::build(None, params)
}

impl Context {
    fn build(preset: Option<ParameterPreset>, params: CustomParams) -> Result<Self> {
        params.validate()?;
        let n = params.dimension();

        let no_prime = |what: &str| {
            HeError::InvalidParameter(format!(
                "not enough {} primes congruent to 1 mod 2N for the requested sizes",
                what
            ))
        };
        let base = primes::largest_prime(params.bpsize, n, &[]).ok_or_else(|| no_prime("base"))?;
        let mut chain = vec![base];
        if params.chain_length > 1 {
            let quant = primes::primes_around(params.qpsize, n, params.chain_length - 1, &[base])
                .ok_or_else(|| no_prime("quantization"))?;
            chain.extend(quant);
        }
        let temp_primes =
            primes::largest_primes(params.tpsize, n, params.num_temp_primes(), &chain)
                .ok_or_else(|| no_prime("temporary"))?;

        let q_tables: Vec<NttContext> = chain.par_iter().map(|&q| NttContext::new(n, q)).collect();
        let p_tables: Vec<NttContext> =
            temp_primes.par_iter().map(|&p| NttContext::new(n, p)).collect();

        let mut scale_factors = Vec::with_capacity(chain.len());
        scale_factors.push(2f64.powi(params.qpsize as i32));
        for &q in &chain[1..] {
            let prev = scale_factors[scale_factors.len() - 1];
            scale_factors.push((prev * q as f64).sqrt());
        }

        let shape = BootstrapShape::for_hamming_weight(params.hamming_weight());
        let max_level = chain.len() - 1;
        let bootstrappable = match preset {
            Some(p) => p.is_bootstrappable(),
            None => {
                params.bpsize >= params.qpsize + MIN_BOOT_PRECISION_GAP
                    && max_level >= shape.depth() + MIN_LEVEL_FOR_BOOTSTRAP
            }
        };
        let boot_shape = bootstrappable.then_some(shape);

        info!(
            preset = ?preset,
            log_dim = params.log_dim,
            chain_length = params.chain_length,
            temp_primes = temp_primes.len(),
            bootstrappable,
            "context built"
        );
        debug!(base_prime = base, ?temp_primes, "prime chain derived");

        Ok(Self {
            inner: Arc::new(ContextInner {
                preset,
                params,
                primes: chain,
                temp_primes,
                q_tables,
                p_tables,
                scale_factors,
                boot_shape,
                current_device: Mutex::new(Device::cpu()),
            }),
        })
    }

    /// Rebuild a context from a file written by [`save_to_file`](Self::save_to_file)
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| HeError::io(path, e))?;
        let saved: ContextParams = bincode::deserialize_from(BufReader::new(file))?;
        Self::build(saved.preset, saved.params)
    }

    /// Persist the parameter set; primes are re-derived on load
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| HeError::io(path, e))?;
        bincode::serialize_into(BufWriter::new(file), &self.context_params())?;
        Ok(())
    }

    pub fn context_params(&self) -> ContextParams {
        ContextParams {
            preset: self.inner.preset,
            params: self.inner.params,
        }
    }

    pub fn preset(&self) -> Option<ParameterPreset> {
        self.inner.preset
    }

    pub fn params(&self) -> &CustomParams {
        &self.inner.params
    }

    /// Ring dimension N
    pub fn dimension(&self) -> usize {
        self.inner.params.dimension()
    }

    pub fn log_dimension(&self) -> u32 {
        self.inner.params.log_dim
    }

    /// log2 of the number of complex slots, log N - 1
    pub fn log_full_slots(&self) -> u32 {
        self.inner.params.log_dim - 1
    }

    pub fn num_full_slots(&self) -> usize {
        self.dimension() / 2
    }

    pub fn chain_length(&self) -> usize {
        self.inner.primes.len()
    }

    pub fn max_level(&self) -> usize {
        self.inner.primes.len() - 1
    }

    /// Level of fresh ciphertexts; top levels are reserved for bootstrapping
    pub fn encryption_level(&self) -> usize {
        self.level_after_full_slot_bootstrap()
            .unwrap_or_else(|| self.max_level())
    }

    pub fn gadget_rank(&self) -> usize {
        self.inner.params.gadget_rank
    }

    pub fn num_temp_primes(&self) -> usize {
        self.inner.temp_primes.len()
    }

    pub fn primes(&self) -> &[u64] {
        &self.inner.primes
    }

    pub fn temp_primes(&self) -> &[u64] {
        &self.inner.temp_primes
    }

    pub fn hamming_weight(&self) -> usize {
        self.inner.params.hamming_weight()
    }

    /// Canonical scale Δ_level
    pub fn scale_factor(&self, level: usize) -> f64 {
        self.inner.scale_factors[level.min(self.max_level())]
    }

    pub fn scale_factors(&self) -> &[f64] {
        &self.inner.scale_factors
    }

    /// Scale S(level, rescale_counter) of an object in the given state
    pub fn scale(&self, level: usize, rescale_counter: i32) -> f64 {
        let primes = &self.inner.primes;
        if rescale_counter >= 0 {
            let r = (rescale_counter as usize).min(level);
            primes[level - r + 1..=level]
                .iter()
                .fold(self.scale_factor(level - r), |s, &q| s * q as f64)
        } else {
            let top = (level + rescale_counter.unsigned_abs() as usize).min(self.max_level());
            primes[level + 1..=top]
                .iter()
                .fold(self.scale_factor(top), |s, &q| s / q as f64)
        }
    }

    pub fn security_level(&self) -> SecurityLevel {
        security_level(&self.inner.params)
    }

    pub fn is_bootstrappable(&self) -> bool {
        self.inner.boot_shape.is_some()
    }

    pub fn is_extended_bootstrap_supported(&self) -> bool {
        self.is_bootstrappable()
            && self
                .inner
                .preset
                .is_some_and(ParameterPreset::supports_extended_bootstrap)
    }

    pub fn is_sparse_secret_encapsulation_supported(&self) -> bool {
        self.is_bootstrappable()
            && self
                .inner
                .preset
                .is_some_and(ParameterPreset::supports_sparse_secret_encapsulation)
    }

    /// Shape of the bootstrap circuit for this parameter's own secret
    pub fn bootstrap_shape(&self) -> Option<BootstrapShape> {
        self.inner.boot_shape
    }

    /// Level of a ciphertext coming out of a full-slot bootstrap
    pub fn level_after_full_slot_bootstrap(&self) -> Option<usize> {
        self.inner
            .boot_shape
            .map(|shape| self.max_level() - shape.depth())
    }

    pub fn min_level_for_bootstrap(&self) -> usize {
        MIN_LEVEL_FOR_BOOTSTRAP
    }

    pub fn min_level_for_extended_bootstrap(&self) -> usize {
        MIN_LEVEL_FOR_EXTENDED_BOOTSTRAP
    }

    /// Left-rotation amounts whose keys a bootstrap at `log_slots` needs
    ///
    /// # Errors
    /// `Precondition` when `log_slots` exceeds the full slot count.
    pub fn rot_indices_for_bootstrap(&self, log_slots: u32) -> Result<Vec<usize>> {
        if log_slots > self.log_full_slots() {
            precondition!(
                "log_slots {} exceeds the full slot count 2^{}",
                log_slots,
                self.log_full_slots()
            );
        }
        let n = 1usize << log_slots;
        let mut indices = transform_rotations(log_slots);
        indices.extend(subsum_rotations(n, self.num_full_slots()));
        Ok(indices.into_iter().collect())
    }

    /// Galois element 5^k mod 2N of a left rotation by k
    pub fn left_rotation_galois(&self, k: usize) -> usize {
        let two_n = 2 * self.dimension() as u64;
        let k = (k % self.num_full_slots()) as u64;
        crate::math::modular::pow_mod(5, k, two_n) as usize
    }

    /// Galois element 2N - 1 of complex conjugation
    pub fn conjugation_galois(&self) -> usize {
        2 * self.dimension() - 1
    }

    /// Device new objects are tagged with
    pub fn current_device(&self) -> Device {
        *self
            .inner
            .current_device
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn replace_current_device(&self, device: Device) -> Device {
        let mut guard = self
            .inner
            .current_device
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::replace(&mut *guard, device)
    }

    /// NTT tables of q_0 ... q_level
    pub(crate) fn q_basis(&self, level: usize) -> Vec<&NttContext> {
        self.inner.q_tables[..=level].iter().collect()
    }

    /// NTT tables of the temporary primes
    pub(crate) fn p_basis(&self) -> Vec<&NttContext> {
        self.inner.p_tables.iter().collect()
    }

    /// NTT tables of q_0 ... q_level followed by the temporary primes
    pub(crate) fn qp_basis(&self, level: usize) -> Vec<&NttContext> {
        self.inner.q_tables[..=level]
            .iter()
            .chain(self.inner.p_tables.iter())
            .collect()
    }

    /// Chain indices of each gadget piece that is active at `level`
    pub(crate) fn gadget_pieces(&self, level: usize) -> Vec<Range<usize>> {
        let alpha = self.num_temp_primes();
        (0..self.gadget_rank())
            .map(|j| j * alpha..((j + 1) * alpha).min(level + 1))
            .filter(|r| r.start < r.end)
            .collect()
    }

    /// Same parameters (and therefore same primes)
    pub fn is_compatible(&self, other: &Context) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
            || (self.inner.params == other.inner.params && self.inner.primes == other.inner.primes)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("preset", &self.inner.preset)
            .field("params", &self.inner.params)
            .field("primes", &self.inner.primes)
            .field("temp_primes", &self.inner.temp_primes)
            .finish()
    }
}

/// Rotations n, 2n, 4n, ... (below the full slot count) that project a dense
/// polynomial onto the subring of an n-slot encoding
pub(crate) fn subsum_rotations(n: usize, full_slots: usize) -> impl Iterator<Item = usize> {
    std::iter::successors(Some(n), |&k| Some(2 * k)).take_while(move |&k| k < full_slots)
}

/// A dense context paired with its sparse-secret companion
///
/// The companion shares N and the base prime q_0 with the dense context, has a
/// single level and a small Hamming weight. `new` is the only way to obtain a
/// pair, so the structural relation between the two always holds.
#[derive(Clone, Debug)]
pub struct SparseContextPair {
    dense: Context,
    sparse: Context,
}

impl SparseContextPair {
    /// Derive the sparse companion of `dense`
    ///
    /// # Errors
    /// `InvalidParameter` when the dense parameter does not support sparse secret
    /// encapsulation.
    pub fn new(dense: &Context) -> Result<Self> {
        if !dense.is_sparse_secret_encapsulation_supported() {
            return Err(HeError::InvalidParameter(format!(
                "parameter {:?} does not support sparse secret encapsulation",
                dense.preset()
            )));
        }
        let p = dense.params();
        let sparse_params = CustomParams {
            log_dim: p.log_dim,
            chain_length: 1,
            bpsize: p.bpsize,
            qpsize: p.qpsize,
            tpsize: p.tpsize,
            gadget_rank: 1,
            hamming_weight: Some(SPARSE_HAMMING_WEIGHT.min(p.hamming_weight() / 2).max(1)),
        };
        let sparse_preset = match dense.preset() {
            Some(ParameterPreset::FGd) => Some(ParameterPreset::SGd0),
            _ => None,
        };
        let sparse = Context::build(sparse_preset, sparse_params)?;
        debug_assert_eq!(sparse.primes()[0], dense.primes()[0]);

        Ok(Self {
            dense: dense.clone(),
            sparse,
        })
    }

    pub fn dense(&self) -> &Context {
        &self.dense
    }

    pub fn sparse(&self) -> &Context {
        &self.sparse
    }
}
