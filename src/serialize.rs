//! Binary persistence for ciphertexts, plaintexts, messages and keys
//!
//! The layout is `bincode` over the serde representation: level, rescale
//! counter, slot count and the RNS residue arrays. Device tags are not stored;
//! loaded objects live on the host CPU.
//!
//! Loading does not check the data against a context. Reading an object saved
//! under different parameters yields garbage, not an error.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::bootstrap::BootConstants;
use crate::ciphertext::Ciphertext;
use crate::error::{HeError, Result};
use crate::keys::{EncryptionKey, SecretKey, SwitchingKey};
use crate::message::Message;
use crate::plaintext::Plaintext;

/// Save to and load from any byte stream
pub trait Persist: Serialize + DeserializeOwned {
    fn save<W: Write>(&self, writer: W) -> Result<()> {
        bincode::serialize_into(writer, self)?;
        Ok(())
    }

    fn load<R: Read>(reader: R) -> Result<Self> {
        Ok(bincode::deserialize_from(reader)?)
    }

    fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| HeError::io(path, e))?;
        let mut writer = BufWriter::new(file);
        self.save(&mut writer)?;
        writer.flush().map_err(|e| HeError::io(path, e))
    }

    fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| HeError::io(path, e))?;
        Self::load(BufReader::new(file))
    }
}

impl Persist for Ciphertext {}
impl Persist for Plaintext {}
impl Persist for Message {}
impl Persist for SecretKey {}
impl Persist for EncryptionKey {}
impl Persist for SwitchingKey {}
impl Persist for BootConstants {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::make_context;
    use crate::encoding::EnDecoder;
    use crate::params::ParameterPreset;
    use crate::sampling::Seed;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn test_plaintext_stream_roundtrip() {
        let ctx = make_context(ParameterPreset::FX).unwrap();
        let msg = Message::random(3, &mut ChaCha20Rng::seed_from_u64(1));
        let ptxt = EnDecoder::new(&ctx).encode_at(&msg, 4, 1).unwrap();

        let mut bytes = Vec::new();
        ptxt.save(&mut bytes).unwrap();
        let loaded = Plaintext::load(bytes.as_slice()).unwrap();
        assert_eq!(loaded, ptxt);
        assert_eq!(loaded.level(), 4);
        assert_eq!(loaded.rescale_counter(), 1);
    }

    #[test]
    fn test_secret_key_file_roundtrip() {
        let ctx = make_context(ParameterPreset::FX).unwrap();
        let sk = SecretKey::from_seed(&ctx, Seed::from_u64(2));
        let path = std::env::temp_dir().join("ckks_engine_serialize_sk.bin");
        sk.save_to_file(&path).unwrap();
        let loaded = SecretKey::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, sk);
    }

    #[test]
    fn test_truncated_stream_is_serialization_error() {
        let ctx = make_context(ParameterPreset::FX).unwrap();
        let ptxt = EnDecoder::new(&ctx).encode(&Message::zero(2)).unwrap();
        let mut bytes = Vec::new();
        ptxt.save(&mut bytes).unwrap();
        bytes.truncate(bytes.len() / 2);
        let err = Plaintext::load(bytes.as_slice()).unwrap_err();
        assert!(matches!(err, HeError::Serialization(_)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = Message::load_from_file("/definitely/not/here.bin").unwrap_err();
        assert!(matches!(err, HeError::Io { .. }));
    }
}
