//! Key generation, saving and lazy loading through a key directory
//!
//! Run with: cargo test --release --test key_pack

mod common;

use std::path::PathBuf;
use std::sync::Arc;

use ckks_engine::prelude::*;
use ckks_engine::KeyKind;
use common::{assert_close, init_tracing, random_message};

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("ckks_engine_{}_{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

#[test]
fn test_saved_keys_load_lazily() {
    init_tracing();
    let ctx = make_context(ParameterPreset::FX).unwrap();
    let sk = SecretKey::from_seed(&ctx, Seed::from_u64(1));
    let dir = scratch_dir("lazy");
    {
        let mut keygen = KeyGenerator::with_seed(&ctx, &sk, Seed::from_u64(2));
        keygen.gen_encryption_key();
        keygen.gen_multiplication_key();
        keygen.gen_left_rotation_key(1);
        keygen.save(&dir).unwrap();
        keygen.flush();
        assert!(!keygen.key_pack().is_mult_key_loaded());
    }
    assert!(dir.join("PK").join(KeyKind::Multiplication.file_name()).exists());

    let pack = Arc::new(KeyPack::with_key_dir(&ctx, &dir));
    assert_eq!(pack.key_dir_path(), Some(dir.clone()));
    assert!(!pack.is_enc_key_loaded());
    assert!(!pack.is_mult_key_loaded());

    // the first access pulls the key from disk
    let msg = random_message(3, 3);
    let ct = Encryptor::with_seed(&ctx, Seed::from_u64(4))
        .encrypt(&msg, &pack)
        .unwrap();
    assert!(pack.is_enc_key_loaded());

    let eval = HomEvaluator::new(&ctx, pack.clone());
    let sq = eval.square(&ct).unwrap();
    assert!(pack.is_mult_key_loaded());
    let expected = eval.mult_messages(&msg, &msg).unwrap();
    assert_close(&Decryptor::new(&ctx).decrypt(&sk, &sq).unwrap(), &expected, 1e-6);

    pack.load_left_rot_key(1).unwrap();
    assert!(pack.is_left_rot_key_loaded(1));
    assert_eq!(pack.loaded_rotation_indices(), vec![1]);

    // absent from disk: no key, and explicit loading reports the file
    assert!(pack.get_conj_key().is_none());
    assert!(matches!(pack.load_conj_key(), Err(HeError::Io { .. })));

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_pack_without_directory_reports_missing_keys() {
    init_tracing();
    let ctx = make_context(ParameterPreset::FX).unwrap();
    let pack = KeyPack::new(&ctx);
    assert!(pack.get_mult_key().is_none());
    assert!(matches!(pack.load_mult_key(), Err(HeError::MissingKey(_))));
}

#[test]
fn test_right_rotation_key_is_a_left_key() {
    init_tracing();
    let ctx = make_context(ParameterPreset::FX).unwrap();
    let sk = SecretKey::from_seed(&ctx, Seed::from_u64(5));
    let mut keygen = KeyGenerator::with_seed(&ctx, &sk, Seed::from_u64(6));
    keygen.gen_right_rotation_key(3);
    let pack = keygen.key_pack();
    assert!(pack.is_right_rot_key_loaded(3));
    assert!(pack.is_left_rot_key_loaded(ctx.num_full_slots() - 3));
    assert!(!pack.is_left_rot_key_loaded(3));
}

#[test]
fn test_bootstrap_rotation_keys_cover_the_required_indices() {
    init_tracing();
    let ctx = make_context(ParameterPreset::FX).unwrap();
    let sk = SecretKey::from_seed(&ctx, Seed::from_u64(7));
    let mut keygen = KeyGenerator::with_seed(&ctx, &sk, Seed::from_u64(8));
    keygen.gen_rot_keys_for_bootstrap(3).unwrap();
    let pack = keygen.key_pack();

    for k in ctx.rot_indices_for_bootstrap(3).unwrap() {
        assert!(pack.is_left_rot_key_loaded(k), "rotation key {} missing", k);
    }
    assert!(pack.is_conj_key_loaded());
    assert!(keygen
        .gen_rot_keys_for_bootstrap(ctx.log_full_slots() + 1)
        .is_err());
}
