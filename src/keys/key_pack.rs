//! Key pack: the public/evaluation keys a server works with
//!
//! Each accessor first checks the in-memory slot, then tries the configured key
//! directory (`<dir>/PK/<name>.bin`), and otherwise returns `None`. A missing key
//! is never an error here; operations that need it raise `MissingKey`.
//!
//! Slots sit behind an `RwLock`, so a pack shared through an `Arc` can be read
//! by many evaluators while keys are being loaded.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use super::switching_key::{EncryptionKey, SwitchingKey};
use crate::context::Context;
use crate::device::Device;
use crate::error::{HeError, Result};

/// Purpose of a stored key
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyKind {
    Encryption,
    Multiplication,
    Conjugation,
    /// Left rotation by the given amount (mod N/2)
    LeftRotation(usize),
    /// Dense → sparse switch, defined over the sparse companion context
    SparseEncapsulation,
    /// Sparse → dense switch, defined over the dense context
    SparseDecapsulation,
}

impl KeyKind {
    /// File name under `<dir>/PK/`
    pub fn file_name(&self) -> String {
        match self {
            KeyKind::Encryption => "EncKey.bin".into(),
            KeyKind::Multiplication => "MultKey.bin".into(),
            KeyKind::Conjugation => "ConjKey.bin".into(),
            KeyKind::LeftRotation(k) => format!("RotKey_{}.bin", k),
            KeyKind::SparseEncapsulation => "SSEncKey.bin".into(),
            KeyKind::SparseDecapsulation => "SSDecKey.bin".into(),
        }
    }
}

#[derive(Default)]
struct KeySlots {
    encryption: Option<Arc<EncryptionKey>>,
    switching: BTreeMap<KeyKind, Arc<SwitchingKey>>,
}

/// Mapping from key purpose to key, bound to one context
pub struct KeyPack {
    context: Context,
    key_dir: RwLock<Option<PathBuf>>,
    slots: RwLock<KeySlots>,
    device: RwLock<Device>,
}

impl KeyPack {
    /// Empty pack without a key directory
    pub fn new(context: &Context) -> Self {
        Self {
            context: context.clone(),
            key_dir: RwLock::new(None),
            slots: RwLock::new(KeySlots::default()),
            device: RwLock::new(context.current_device()),
        }
    }

    /// Empty pack that lazily loads keys from `dir`
    pub fn with_key_dir(context: &Context, dir: impl AsRef<Path>) -> Self {
        let pack = Self::new(context);
        pack.set_key_dir_path(dir);
        pack
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn set_key_dir_path(&self, dir: impl AsRef<Path>) {
        *write(&self.key_dir) = Some(dir.as_ref().to_path_buf());
    }

    pub fn key_dir_path(&self) -> Option<PathBuf> {
        read(&self.key_dir).clone()
    }

    pub fn device(&self) -> Device {
        *read(&self.device)
    }

    /// Retag every key with `device`
    pub fn to(&self, device: Device) {
        *write(&self.device) = device;
    }

    // ---- encryption key ----

    pub fn get_enc_key(&self) -> Option<Arc<EncryptionKey>> {
        if let Some(key) = read(&self.slots).encryption.clone() {
            return Some(key);
        }
        let key: Arc<EncryptionKey> = Arc::new(self.read_from_dir(KeyKind::Encryption).ok()?);
        write(&self.slots).encryption = Some(key.clone());
        Some(key)
    }

    pub fn is_enc_key_loaded(&self) -> bool {
        read(&self.slots).encryption.is_some()
    }

    /// Load the encryption key from the key directory into memory
    pub fn load_enc_key(&self) -> Result<()> {
        let key: EncryptionKey = self.read_from_dir(KeyKind::Encryption)?;
        write(&self.slots).encryption = Some(Arc::new(key));
        Ok(())
    }

    pub(crate) fn insert_enc_key(&self, key: EncryptionKey) {
        write(&self.slots).encryption = Some(Arc::new(key));
    }

    // ---- switching keys ----

    pub fn get_mult_key(&self) -> Option<Arc<SwitchingKey>> {
        self.get_switching(KeyKind::Multiplication)
    }

    pub fn get_conj_key(&self) -> Option<Arc<SwitchingKey>> {
        self.get_switching(KeyKind::Conjugation)
    }

    pub fn get_left_rot_key(&self, k: usize) -> Option<Arc<SwitchingKey>> {
        self.get_switching(KeyKind::LeftRotation(self.normalize_rotation(k)))
    }

    /// Right rotation by k is the left rotation by N/2 - k
    pub fn get_right_rot_key(&self, k: usize) -> Option<Arc<SwitchingKey>> {
        self.get_left_rot_key(self.right_to_left(k))
    }

    pub fn get_sparse_encapsulation_key(&self) -> Option<Arc<SwitchingKey>> {
        self.get_switching(KeyKind::SparseEncapsulation)
    }

    pub fn get_sparse_decapsulation_key(&self) -> Option<Arc<SwitchingKey>> {
        self.get_switching(KeyKind::SparseDecapsulation)
    }

    pub fn is_mult_key_loaded(&self) -> bool {
        self.is_loaded(KeyKind::Multiplication)
    }

    pub fn is_conj_key_loaded(&self) -> bool {
        self.is_loaded(KeyKind::Conjugation)
    }

    pub fn is_left_rot_key_loaded(&self, k: usize) -> bool {
        self.is_loaded(KeyKind::LeftRotation(self.normalize_rotation(k)))
    }

    pub fn is_right_rot_key_loaded(&self, k: usize) -> bool {
        self.is_left_rot_key_loaded(self.right_to_left(k))
    }

    pub fn is_sparse_secret_encapsulation_key_loaded(&self) -> bool {
        self.is_loaded(KeyKind::SparseEncapsulation) && self.is_loaded(KeyKind::SparseDecapsulation)
    }

    pub fn load_mult_key(&self) -> Result<()> {
        self.load_switching(KeyKind::Multiplication)
    }

    pub fn load_conj_key(&self) -> Result<()> {
        self.load_switching(KeyKind::Conjugation)
    }

    pub fn load_left_rot_key(&self, k: usize) -> Result<()> {
        self.load_switching(KeyKind::LeftRotation(self.normalize_rotation(k)))
    }

    pub fn load_right_rot_key(&self, k: usize) -> Result<()> {
        self.load_left_rot_key(self.right_to_left(k))
    }

    pub fn load_sparse_secret_encapsulation_keys(&self) -> Result<()> {
        self.load_switching(KeyKind::SparseEncapsulation)?;
        self.load_switching(KeyKind::SparseDecapsulation)
    }

    /// Rotation amounts of every left-rotation key currently in memory
    pub fn loaded_rotation_indices(&self) -> Vec<usize> {
        read(&self.slots)
            .switching
            .keys()
            .filter_map(|kind| match kind {
                KeyKind::LeftRotation(k) => Some(*k),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn insert_switching(&self, kind: KeyKind, key: SwitchingKey) {
        let kind = match kind {
            KeyKind::LeftRotation(k) => KeyKind::LeftRotation(self.normalize_rotation(k)),
            other => other,
        };
        write(&self.slots).switching.insert(kind, Arc::new(key));
    }

    /// Drop every key held in memory (files in the key directory are kept)
    pub fn clear(&self) {
        *write(&self.slots) = KeySlots::default();
    }

    /// Write every key held in memory to `<dir>/PK/`
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<()> {
        let pk_dir = dir.as_ref().join("PK");
        fs::create_dir_all(&pk_dir).map_err(|e| HeError::io(&pk_dir, e))?;

        let slots = read(&self.slots);
        if let Some(key) = &slots.encryption {
            write_key(&pk_dir.join(KeyKind::Encryption.file_name()), key.as_ref())?;
        }
        for (kind, key) in &slots.switching {
            write_key(&pk_dir.join(kind.file_name()), key.as_ref())?;
        }
        info!(
            dir = %pk_dir.display(),
            switching_keys = slots.switching.len(),
            "key pack saved"
        );
        Ok(())
    }

    fn get_switching(&self, kind: KeyKind) -> Option<Arc<SwitchingKey>> {
        if let Some(key) = read(&self.slots).switching.get(&kind) {
            return Some(key.clone());
        }
        let key: Arc<SwitchingKey> = Arc::new(self.read_from_dir(kind).ok()?);
        write(&self.slots).switching.insert(kind, key.clone());
        Some(key)
    }

    fn is_loaded(&self, kind: KeyKind) -> bool {
        read(&self.slots).switching.contains_key(&kind)
    }

    fn load_switching(&self, kind: KeyKind) -> Result<()> {
        let key: SwitchingKey = self.read_from_dir(kind)?;
        write(&self.slots).switching.insert(kind, Arc::new(key));
        Ok(())
    }

    fn read_from_dir<T: DeserializeOwned>(&self, kind: KeyKind) -> Result<T> {
        let dir = self
            .key_dir_path()
            .ok_or_else(|| HeError::MissingKey(format!("{:?}: no key directory configured", kind)))?;
        let path = dir.join("PK").join(kind.file_name());
        let file = File::open(&path).map_err(|e| HeError::io(&path, e))?;
        let key = bincode::deserialize_from(BufReader::new(file))?;
        debug!(?kind, path = %path.display(), "key loaded from directory");
        Ok(key)
    }

    fn normalize_rotation(&self, k: usize) -> usize {
        k % self.context.num_full_slots()
    }

    fn right_to_left(&self, k: usize) -> usize {
        let half = self.context.num_full_slots();
        (half - k % half) % half
    }
}

fn write_key<T: Serialize>(path: &Path, key: &T) -> Result<()> {
    let file = File::create(path).map_err(|e| HeError::io(path, e))?;
    bincode::serialize_into(BufWriter::new(file), key)?;
    Ok(())
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
