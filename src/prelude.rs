// src/prelude.rs
//! The “everything” import for ckks-engine.
//!
//! Brings you the types needed to set up a context, generate keys, encrypt,
//! evaluate and bootstrap with one glob:
//! ```rust
//! use ckks_engine::prelude::*;
//! ```

// parameters and context
pub use crate::context::{make_context, make_context_custom, Context, SparseContextPair};
pub use crate::device::{Device, ScopedDeviceSelector};
pub use crate::params::{CustomParams, ParameterPreset};

// data types
pub use crate::ciphertext::Ciphertext;
pub use crate::message::Message;
pub use crate::plaintext::Plaintext;

// keys and scheme operations
pub use crate::bootstrap::Bootstrapper;
pub use crate::encoding::EnDecoder;
pub use crate::encryptor::{Decryptor, Encryptor};
pub use crate::evaluator::HomEvaluator;
pub use crate::keys::{KeyGenerator, KeyPack, SecretKey};
pub use crate::sampling::Seed;
pub use crate::serialize::Persist;

pub use crate::error::{HeError, Result};
pub use rustfft::num_complex::Complex64;
