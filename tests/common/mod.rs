//! Shared setup for the integration tests

#![allow(dead_code)]

use std::sync::{Arc, Once};

use ckks_engine::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

static TRACING: Once = Once::new();

/// Route `tracing` output to the test harness, filtered by `RUST_LOG`
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Context, secret key and a key pack over FX
pub struct Fixture {
    pub ctx: Context,
    pub sk: SecretKey,
    pub keys: Arc<KeyPack>,
}

impl Fixture {
    /// Encryption, multiplication, conjugation and power-of-two rotation keys
    pub fn common() -> Self {
        init_tracing();
        let ctx = make_context(ParameterPreset::FX).unwrap();
        let sk = SecretKey::from_seed(&ctx, Seed::from_u64(11));
        let keys = {
            let mut keygen = KeyGenerator::with_seed(&ctx, &sk, Seed::from_u64(12));
            keygen.gen_common_keys();
            keygen.key_pack()
        };
        Self { ctx, sk, keys }
    }

    /// Common keys plus the rotation keys of a bootstrap at `log_slots`
    pub fn bootstrappable(log_slots: u32) -> Self {
        init_tracing();
        let ctx = make_context(ParameterPreset::FX).unwrap();
        let sk = SecretKey::from_seed(&ctx, Seed::from_u64(21));
        let keys = {
            let mut keygen = KeyGenerator::with_seed(&ctx, &sk, Seed::from_u64(22));
            keygen.gen_encryption_key();
            keygen.gen_multiplication_key();
            keygen.gen_rot_keys_for_bootstrap(log_slots).unwrap();
            keygen.key_pack()
        };
        Self { ctx, sk, keys }
    }

    pub fn evaluator(&self) -> HomEvaluator {
        HomEvaluator::new(&self.ctx, self.keys.clone())
    }

    pub fn encrypt(&self, msg: &Message) -> Ciphertext {
        Encryptor::with_seed(&self.ctx, Seed::from_u64(31))
            .encrypt(msg, &self.keys)
            .unwrap()
    }

    pub fn encrypt_at(&self, msg: &Message, level: usize) -> Ciphertext {
        Encryptor::with_seed(&self.ctx, Seed::from_u64(32))
            .encrypt_at(msg, &self.keys, level)
            .unwrap()
    }

    pub fn decrypt(&self, ctxt: &Ciphertext) -> Message {
        Decryptor::new(&self.ctx).decrypt(&self.sk, ctxt).unwrap()
    }
}

pub fn random_message(log_slots: u32, seed: u64) -> Message {
    Message::random(log_slots, &mut ChaCha20Rng::seed_from_u64(seed))
}

pub fn reals(values: &[f64]) -> Message {
    Message::from_reals(values).unwrap()
}

pub fn assert_close(actual: &Message, expected: &Message, tolerance: f64) {
    let err = actual.max_error(expected);
    assert!(
        err < tolerance,
        "max slot error {:e} exceeds {:e}",
        err,
        tolerance
    );
}
