//! Persisting ciphertexts, messages, keys and contexts
//!
//! Run with: cargo test --release --test serialization

mod common;

use ckks_engine::prelude::*;
use ckks_engine::{EncryptionKey, SwitchingKey};
use common::{assert_close, random_message, Fixture};

fn scratch_file(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("ckks_engine_{}_{}.bin", name, std::process::id()))
}

#[test]
fn test_ciphertext_survives_a_file_roundtrip() {
    let fx = Fixture::common();
    let eval = fx.evaluator();
    let msg = random_message(4, 1);
    let ct = eval.mult_without_rescale(&fx.encrypt(&msg), &fx.encrypt(&msg)).unwrap();

    let path = scratch_file("ciphertext");
    ct.save_to_file(&path).unwrap();
    let loaded = Ciphertext::load_from_file(&path).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(loaded.level(), ct.level());
    assert_eq!(loaded.rescale_counter(), 1);
    assert_eq!(loaded.log_slots(), ct.log_slots());
    assert_eq!(loaded.device(), Device::cpu());

    let rescaled = eval.rescale(&loaded).unwrap();
    let expected = eval.mult_messages(&msg, &msg).unwrap();
    assert_close(&fx.decrypt(&rescaled), &expected, 1e-6);
}

#[test]
fn test_message_stream_roundtrip_drops_device() {
    let mut msg = random_message(5, 2);
    msg.to(Device::gpu(0));
    let mut bytes = Vec::new();
    msg.save(&mut bytes).unwrap();
    let loaded = Message::load(bytes.as_slice()).unwrap();
    assert_eq!(loaded.slots(), msg.slots());
    assert_eq!(loaded.device(), Device::cpu());
}

#[test]
fn test_saved_keys_still_work() {
    let fx = Fixture::common();
    let enc_key = fx.keys.get_enc_key().unwrap();
    let mult_key = fx.keys.get_mult_key().unwrap();

    let mut bytes = Vec::new();
    enc_key.save(&mut bytes).unwrap();
    let enc_key = EncryptionKey::load(bytes.as_slice()).unwrap();

    let mut bytes = Vec::new();
    mult_key.save(&mut bytes).unwrap();
    let mult_key = SwitchingKey::load(bytes.as_slice()).unwrap();
    assert_eq!(mult_key.rank(), fx.ctx.gadget_rank());

    let msg = random_message(3, 3);
    let ct = Encryptor::with_seed(&fx.ctx, Seed::from_u64(4))
        .encrypt_with_key(&msg, &enc_key)
        .unwrap();
    assert_close(&fx.decrypt(&ct), &msg, 1e-6);
}

#[test]
fn test_context_file_roundtrip() {
    let fx = Fixture::common();
    let path = scratch_file("context");
    fx.ctx.save_to_file(&path).unwrap();
    let loaded = Context::from_file(&path).unwrap();
    std::fs::remove_file(&path).ok();

    assert!(loaded.is_compatible(&fx.ctx));
    assert_eq!(loaded.preset(), Some(ParameterPreset::FX));
    assert_eq!(loaded.primes(), fx.ctx.primes());

    // ciphertexts made under the original context decrypt under the reloaded one
    let msg = random_message(3, 5);
    let ct = fx.encrypt(&msg);
    let out = Decryptor::new(&loaded).decrypt(&fx.sk, &ct).unwrap();
    assert_close(&out, &msg, 1e-6);
}
