//! Secret, public and evaluation keys
//!
//! - [`SecretKey`]: ternary secret with fixed Hamming weight
//! - [`EncryptionKey`]: public key for encryption
//! - [`SwitchingKey`]: gadget-decomposed key switching material
//! - [`KeyPack`]: purpose → key mapping with lazy loading from disk
//! - [`KeyGenerator`]: derives all of the above from a secret key

mod key_generator;
mod key_pack;
mod secret_key;
mod switching_key;

pub use key_generator::KeyGenerator;
pub use key_pack::{KeyKind, KeyPack};
pub use secret_key::SecretKey;
pub use switching_key::{EncryptionKey, SwitchingKey};
