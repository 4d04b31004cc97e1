//! # ckks-engine Quickstart
//!
//! ```rust
//! use ckks_engine::prelude::*;
//!
//! let ctx = make_context(ParameterPreset::FX).unwrap();
//! let sk = SecretKey::from_seed(&ctx, Seed::from_u64(1));
//! let mut keygen = KeyGenerator::with_seed(&ctx, &sk, Seed::from_u64(2));
//! keygen.gen_encryption_key();
//! keygen.gen_multiplication_key();
//! let keys = keygen.key_pack();
//!
//! let msg = Message::from_reals(&[1.0, 2.0]).unwrap();
//! let ct = Encryptor::with_seed(&ctx, Seed::from_u64(3)).encrypt(&msg, &keys).unwrap();
//!
//! let eval = HomEvaluator::new(&ctx, keys);
//! let squared = eval.square(&ct).unwrap();
//! assert_eq!(squared.level(), ct.level() - 1);
//!
//! let out = Decryptor::new(&ctx).decrypt(&sk, &squared).unwrap();
//! assert!((out[0].re - 1.0).abs() < 1e-6);
//! assert!((out[1].re - 4.0).abs() < 1e-6);
//! ```
//!
#![doc = include_str!("../README.md")]

// Parameters and shared state
pub mod context;
pub mod device;
pub mod error;
pub mod params;

// Arithmetic core
pub mod math;
pub mod sampling;

// Data types
pub mod ciphertext;
pub mod message;
pub mod plaintext;

// Scheme
pub mod bootstrap;
pub mod encoding;
pub mod encryptor;
pub mod evaluator;
pub mod keys;
pub mod prelude;
pub mod serialize;

// --- Public API exports ---

pub use context::{make_context, make_context_custom, Context, ContextParams, SparseContextPair};
pub use device::{Device, DeviceKind, ScopedDeviceSelector};
pub use error::{HeError, Result};
pub use params::{sparse_preset_for, BootstrapShape, CustomParams, ParameterPreset, SecurityLevel};

pub use ciphertext::Ciphertext;
pub use message::Message;
pub use plaintext::Plaintext;

pub use bootstrap::{BootConstants, Bootstrapper};
pub use encoding::EnDecoder;
pub use encryptor::{Decryptor, Encryptor};
pub use evaluator::HomEvaluator;
pub use keys::{EncryptionKey, KeyGenerator, KeyKind, KeyPack, SecretKey, SwitchingKey};
pub use sampling::Seed;
pub use serialize::Persist;

pub use rustfft::num_complex::Complex64;
