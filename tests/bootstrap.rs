//! Bootstrapping at the FX parameter, mostly with 8 slots
//!
//! Run with: cargo test --release --test bootstrap

mod common;

use ckks_engine::prelude::*;
use ckks_engine::{BootConstants, SparseContextPair};
use common::{assert_close, init_tracing, random_message, Fixture};

const LOG_SLOTS: u32 = 3;
const BOOT_TOLERANCE: f64 = 1e-3;
const EXTENDED_TOLERANCE: f64 = 1e-2;

fn real_part(msg: &Message) -> Message {
    let slots: Vec<Complex64> = msg.slots().iter().map(|z| Complex64::new(z.re, 0.0)).collect();
    Message::from_slice(&slots).unwrap()
}

fn imag_part(msg: &Message) -> Message {
    let slots: Vec<Complex64> = msg.slots().iter().map(|z| Complex64::new(z.im, 0.0)).collect();
    Message::from_slice(&slots).unwrap()
}

fn scaled(msg: &Message, factor: f64) -> Message {
    let slots: Vec<Complex64> = msg.slots().iter().map(|z| z * factor).collect();
    Message::from_slice(&slots).unwrap()
}

#[test]
fn test_complex_bootstrap_restores_levels() {
    let fx = Fixture::bootstrappable(LOG_SLOTS);
    let eval = fx.evaluator();
    let boot = Bootstrapper::with_log_slots(&eval, LOG_SLOTS).unwrap();

    let msg = random_message(LOG_SLOTS, 1);
    let ct = fx.encrypt_at(&msg, boot.min_level_for_bootstrap());
    let refreshed = boot.bootstrap(&ct, true).unwrap();

    assert_eq!(refreshed.level(), boot.level_after_full_slot_bootstrap());
    assert_eq!(refreshed.level(), fx.ctx.level_after_full_slot_bootstrap().unwrap());
    assert_eq!(refreshed.rescale_counter(), 0);
    assert_eq!(refreshed.log_slots(), LOG_SLOTS);
    assert!(!refreshed.is_mod_up());
    assert_close(&fx.decrypt(&refreshed), &msg, BOOT_TOLERANCE);
}

#[test]
fn test_real_bootstrap_clears_imaginary_part() {
    let fx = Fixture::bootstrappable(LOG_SLOTS);
    let eval = fx.evaluator();
    let boot = Bootstrapper::new(&eval).unwrap();

    let msg = random_message(LOG_SLOTS, 2);
    let ct = fx.encrypt_at(&msg, 5);
    let refreshed = boot.bootstrap(&ct, false).unwrap();
    assert_eq!(refreshed.level(), boot.level_after_full_slot_bootstrap());
    assert_close(&fx.decrypt(&refreshed), &real_part(&msg), BOOT_TOLERANCE);

    // the refreshed ciphertext supports further multiplication
    let sq = eval.square(&refreshed).unwrap();
    let expected = eval.mult_messages(&real_part(&msg), &real_part(&msg)).unwrap();
    assert_close(&fx.decrypt(&sq), &expected, 2.0 * BOOT_TOLERANCE);
}

#[test]
fn test_two_output_bootstrap() {
    let fx = Fixture::bootstrappable(LOG_SLOTS);
    let eval = fx.evaluator();
    let boot = Bootstrapper::new(&eval).unwrap();

    let msg = random_message(LOG_SLOTS, 3);
    let ct = fx.encrypt_at(&msg, 4);
    let (re, im) = boot.bootstrap_two_outputs(&ct).unwrap();
    assert_eq!(re.level(), boot.level_after_full_slot_bootstrap());
    assert_eq!(im.level(), boot.level_after_full_slot_bootstrap());
    assert_close(&fx.decrypt(&re), &real_part(&msg), BOOT_TOLERANCE);
    assert_close(&fx.decrypt(&im), &imag_part(&msg), BOOT_TOLERANCE);
}

#[test]
fn test_full_slot_bootstrap() {
    let fx = Fixture::bootstrappable(fx_full_slots());
    let eval = fx.evaluator();
    let log_slots = fx.ctx.log_full_slots();
    let boot = Bootstrapper::with_log_slots(&eval, log_slots).unwrap();

    let msg = random_message(log_slots, 9);
    let ct = fx.encrypt_at(&msg, boot.min_level_for_bootstrap());
    let refreshed = boot.bootstrap(&ct, true).unwrap();
    assert_eq!(refreshed.level(), fx.ctx.level_after_full_slot_bootstrap().unwrap());
    assert_eq!(refreshed.log_slots(), log_slots);
    assert_close(&fx.decrypt(&refreshed), &msg, BOOT_TOLERANCE);
}

fn fx_full_slots() -> u32 {
    make_context(ParameterPreset::FX).unwrap().log_full_slots()
}

#[test]
fn test_bootstrap_rejects_low_level_and_pending_rescale() {
    let fx = Fixture::bootstrappable(LOG_SLOTS);
    let eval = fx.evaluator();
    let boot = Bootstrapper::new(&eval).unwrap();
    let msg = random_message(LOG_SLOTS, 4);

    let low = fx.encrypt_at(&msg, boot.min_level_for_bootstrap() - 1);
    assert!(matches!(boot.bootstrap(&low, true), Err(HeError::Precondition(_))));

    let ct = fx.encrypt_at(&msg, 6);
    let pending = eval.mult_without_rescale(&ct, &ct).unwrap();
    assert!(matches!(boot.bootstrap(&pending, true), Err(HeError::Precondition(_))));
}

#[test]
fn test_bootstrap_without_rotation_keys_fails() {
    let fx = Fixture::common();
    let eval = fx.evaluator();
    let boot = Bootstrapper::new(&eval).unwrap();
    let ct = fx.encrypt_at(&random_message(LOG_SLOTS, 5), 5);
    // the power-of-two bundle lacks the odd baby-step rotations
    assert!(matches!(boot.bootstrap(&ct, true), Err(HeError::MissingKey(_))));
}

#[test]
fn test_extended_bootstrap_handles_large_values() {
    let fx = Fixture::bootstrappable(LOG_SLOTS);
    let eval = fx.evaluator();
    let boot = Bootstrapper::new(&eval).unwrap();
    assert!(fx.ctx.is_extended_bootstrap_supported());

    let msg = scaled(&random_message(LOG_SLOTS, 6), 700.0);
    let ct = fx.encrypt_at(&msg, boot.min_level_for_extended_bootstrap());
    let refreshed = boot.bootstrap_extended(&ct, true).unwrap();
    assert_eq!(refreshed.level(), boot.level_after_full_slot_bootstrap());
    assert_close(&fx.decrypt(&refreshed), &msg, EXTENDED_TOLERANCE);

    let low = fx.encrypt_at(&msg, boot.min_level_for_extended_bootstrap() - 1);
    assert!(matches!(boot.bootstrap_extended(&low, true), Err(HeError::Precondition(_))));
}

#[test]
fn test_extended_two_output_bootstrap() {
    let fx = Fixture::bootstrappable(LOG_SLOTS);
    let eval = fx.evaluator();
    let boot = Bootstrapper::new(&eval).unwrap();

    let msg = scaled(&random_message(LOG_SLOTS, 7), 500.0);
    let ct = fx.encrypt_at(&msg, 6);
    let (re, im) = boot.bootstrap_extended_two_outputs(&ct).unwrap();
    assert_close(&fx.decrypt(&re), &real_part(&msg), EXTENDED_TOLERANCE);
    assert_close(&fx.decrypt(&im), &imag_part(&msg), EXTENDED_TOLERANCE);
}

#[test]
fn test_sparse_secret_encapsulation_bootstrap() {
    init_tracing();
    let ctx = make_context(ParameterPreset::FX).unwrap();
    let pair = SparseContextPair::new(&ctx).unwrap();
    assert_eq!(pair.sparse().dimension(), ctx.dimension());
    assert_eq!(pair.sparse().primes()[0], ctx.primes()[0]);
    assert!(pair.sparse().hamming_weight() < ctx.hamming_weight());

    let sk = SecretKey::from_seed(&ctx, Seed::from_u64(41));
    let mut keygen = KeyGenerator::with_seed(&ctx, &sk, Seed::from_u64(42));
    keygen.gen_encryption_key();
    keygen.gen_multiplication_key();
    keygen.gen_rot_keys_for_bootstrap(LOG_SLOTS).unwrap();

    // encapsulation keys are still absent
    let eval = HomEvaluator::new(&ctx, keygen.key_pack());
    let boot = Bootstrapper::with_sparse(&eval, pair.clone()).unwrap();
    let msg = random_message(LOG_SLOTS, 43);
    let ct = Encryptor::with_seed(&ctx, Seed::from_u64(44))
        .encrypt_at(&msg, &keygen.key_pack(), 5)
        .unwrap();
    assert!(matches!(boot.bootstrap(&ct, true), Err(HeError::MissingKey(_))));

    keygen.gen_sparse_secret_encapsulation_key(&pair).unwrap();
    assert!(keygen.key_pack().is_sparse_secret_encapsulation_key_loaded());
    let refreshed = boot.bootstrap(&ct, true).unwrap();
    assert_eq!(refreshed.level(), boot.level_after_full_slot_bootstrap());
    let out = Decryptor::new(&ctx).decrypt(&sk, &refreshed).unwrap();
    assert_close(&out, &msg, BOOT_TOLERANCE);

    // a shallower sparse circuit still hands back the context's output level
    let dense_level = ctx.level_after_full_slot_bootstrap().unwrap();
    assert!(boot.shape().depth() <= ctx.bootstrap_shape().unwrap().depth());
    assert_eq!(boot.level_after_full_slot_bootstrap(), dense_level);
    let (re, im) = boot.bootstrap_two_outputs(&ct).unwrap();
    assert_eq!(re.level(), dense_level);
    assert_eq!(im.level(), dense_level);
    let decryptor = Decryptor::new(&ctx);
    assert_close(&decryptor.decrypt(&sk, &re).unwrap(), &real_part(&msg), BOOT_TOLERANCE);
    assert_close(&decryptor.decrypt(&sk, &im).unwrap(), &imag_part(&msg), BOOT_TOLERANCE);
}

#[test]
fn test_sparse_pair_from_foreign_context_is_rejected() {
    init_tracing();
    let ctx = make_context(ParameterPreset::FX).unwrap();
    let pair = SparseContextPair::new(&ctx).unwrap();
    let sparse_eval = HomEvaluator::new(pair.sparse(), std::sync::Arc::new(KeyPack::new(pair.sparse())));
    assert!(matches!(
        Bootstrapper::with_sparse(&sparse_eval, pair),
        Err(HeError::InvalidParameter(_))
    ));
}

#[test]
fn test_constants_state_and_persistence() {
    let fx = Fixture::bootstrappable(LOG_SLOTS);
    let eval = fx.evaluator();
    let boot = Bootstrapper::new(&eval).unwrap();

    assert!(!boot.is_bootstrap_ready(LOG_SLOTS));
    boot.make_boot_constants(LOG_SLOTS).unwrap();
    assert!(!boot.is_bootstrap_ready(LOG_SLOTS));
    boot.load_boot_constants(LOG_SLOTS, Device::cpu()).unwrap();
    assert!(boot.is_bootstrap_ready(LOG_SLOTS));
    boot.load_boot_constants(LOG_SLOTS, Device::cpu()).unwrap();
    assert!(boot.is_bootstrap_ready(LOG_SLOTS));

    assert!(matches!(
        boot.make_boot_constants(fx.ctx.log_full_slots() + 1),
        Err(HeError::Precondition(_))
    ));

    let constants = BootConstants::new(&fx.ctx, boot.shape(), LOG_SLOTS).unwrap();
    let mut bytes = Vec::new();
    constants.save(&mut bytes).unwrap();
    let loaded = BootConstants::load(bytes.as_slice()).unwrap();
    assert_eq!(loaded.log_slots(), LOG_SLOTS);
    assert_eq!(loaded.device(), None);
    assert_eq!(loaded.linear_depth(), constants.linear_depth());
}

#[test]
fn test_diagnostics_and_approximation_error() {
    let fx = Fixture::bootstrappable(LOG_SLOTS);
    let eval = fx.evaluator();
    let boot = Bootstrapper::new(&eval).unwrap();
    assert!(boot.approximation_error() > 0.0);
    assert!(boot.approximation_error() < 1e-6);

    boot.set_diagnostics(true);
    let msg = random_message(LOG_SLOTS, 8);
    let ct = fx.encrypt_at(&msg, 3);
    let refreshed = boot.bootstrap(&ct, true).unwrap();
    assert_close(&fx.decrypt(&refreshed), &msg, BOOT_TOLERANCE);
}

#[test]
fn test_non_bootstrappable_context_is_rejected() {
    init_tracing();
    let ctx = make_context_custom(CustomParams {
        log_dim: 10,
        chain_length: 5,
        bpsize: 52,
        qpsize: 40,
        tpsize: 52,
        gadget_rank: 2,
        hamming_weight: None,
    })
    .unwrap();
    let eval = HomEvaluator::new(&ctx, std::sync::Arc::new(KeyPack::new(&ctx)));
    assert!(matches!(Bootstrapper::new(&eval), Err(HeError::InvalidParameter(_))));
}
