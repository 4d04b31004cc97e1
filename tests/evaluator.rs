//! Homomorphic arithmetic, rotations and level management end to end
//!
//! Run with: cargo test --release --test evaluator

mod common;

use ckks_engine::prelude::*;
use common::{assert_close, random_message, reals, Fixture};

fn complex(re: f64, im: f64) -> Complex64 {
    Complex64::new(re, im)
}

// ---- arithmetic scenarios ----

#[test]
fn test_add_doubles_message() {
    let fx = Fixture::common();
    let eval = fx.evaluator();
    let ct = fx.encrypt(&reals(&[1.0, 2.0]));
    let sum = eval.add(&ct, &ct).unwrap();
    assert_eq!(sum.level(), ct.level());
    assert_close(&fx.decrypt(&sum), &reals(&[2.0, 4.0]), 1e-6);
}

#[test]
fn test_square_consumes_one_level() {
    let fx = Fixture::common();
    let eval = fx.evaluator();
    let ct = fx.encrypt(&reals(&[1.0, 2.0]));
    let sq = eval.square(&ct).unwrap();
    assert_eq!(sq.level(), ct.level() - 1);
    assert_eq!(sq.rescale_counter(), 0);
    assert_close(&fx.decrypt(&sq), &reals(&[1.0, 4.0]), 1e-6);
}

#[test]
fn test_sum_square_and_cube() {
    let fx = Fixture::common();
    let eval = fx.evaluator();
    let a = fx.encrypt(&reals(&[1.0, 2.0]));
    let b = fx.encrypt(&reals(&[2.0, 3.0]));

    let sum = eval.add(&a, &b).unwrap();
    assert_close(&fx.decrypt(&sum), &reals(&[3.0, 5.0]), 1e-6);

    let sq = eval.mult(&sum, &sum).unwrap();
    assert_close(&fx.decrypt(&sq), &reals(&[9.0, 25.0]), 1e-5);

    // operands at different levels are aligned before multiplying
    let cube = eval.mult(&sq, &sum).unwrap();
    assert_eq!(cube.level(), sum.level() - 2);
    assert_close(&fx.decrypt(&cube), &reals(&[27.0, 125.0]), 1e-4);
}

#[test]
fn test_sub_and_negate() {
    let fx = Fixture::common();
    let eval = fx.evaluator();
    let ma = random_message(3, 1);
    let mb = random_message(3, 2);
    let a = fx.encrypt(&ma);
    let b = fx.encrypt(&mb);

    let diff = eval.sub(&a, &b).unwrap();
    assert_close(&fx.decrypt(&diff), &eval.sub_messages(&ma, &mb).unwrap(), 1e-6);

    let neg = eval.negate(&a);
    assert_close(&fx.decrypt(&neg), &eval.negate_message(&ma), 1e-6);
}

#[test]
fn test_message_and_plaintext_operands() {
    let fx = Fixture::common();
    let eval = fx.evaluator();
    let ma = random_message(4, 3);
    let mb = random_message(4, 4);
    let ct = fx.encrypt(&ma);

    let added = eval.add_message(&ct, &mb).unwrap();
    assert_close(&fx.decrypt(&added), &eval.add_messages(&ma, &mb).unwrap(), 1e-6);

    let subbed = eval.sub_message(&ct, &mb).unwrap();
    assert_close(&fx.decrypt(&subbed), &eval.sub_messages(&ma, &mb).unwrap(), 1e-6);

    let product = eval.mult_message(&ct, &mb).unwrap();
    assert_eq!(product.level(), ct.level() - 1);
    assert_close(&fx.decrypt(&product), &eval.mult_messages(&ma, &mb).unwrap(), 1e-6);

    let ptxt = EnDecoder::new(&fx.ctx).encode_at(&mb, ct.level(), 0).unwrap();
    let product = eval.mult_plain(&ct, &ptxt).unwrap();
    assert_close(&fx.decrypt(&product), &eval.mult_messages(&ma, &mb).unwrap(), 1e-6);
}

#[test]
fn test_constants() {
    let fx = Fixture::common();
    let eval = fx.evaluator();
    let msg = random_message(3, 5);
    let ct = fx.encrypt(&msg);

    let shifted = eval.add_const(&ct, complex(0.5, -0.25)).unwrap();
    assert_eq!(shifted.level(), ct.level());
    let expected = eval
        .add_messages(&msg, &Message::from_slice(&[complex(0.5, -0.25); 8]).unwrap())
        .unwrap();
    assert_close(&fx.decrypt(&shifted), &expected, 1e-6);

    // Gaussian integers are free
    let tripled = eval.mult_const(&ct, complex(3.0, 0.0)).unwrap();
    assert_eq!(tripled.level(), ct.level());
    let rotated = eval.mult_const(&ct, complex(0.0, 1.0)).unwrap();
    assert_eq!(rotated.level(), ct.level());
    let times_i = Message::from_slice(&msg.slots().iter().map(|z| z * complex(0.0, 1.0)).collect::<Vec<_>>()).unwrap();
    assert_close(&fx.decrypt(&rotated), &times_i, 1e-6);

    // anything else costs a level
    let scaled = eval.mult_const(&ct, complex(0.3, 0.1)).unwrap();
    assert_eq!(scaled.level(), ct.level() - 1);
    let expected = Message::from_slice(&msg.slots().iter().map(|z| z * complex(0.3, 0.1)).collect::<Vec<_>>()).unwrap();
    assert_close(&fx.decrypt(&scaled), &expected, 1e-6);
}

#[test]
fn test_tensor_relinearize_rescale_matches_mult() {
    let fx = Fixture::common();
    let eval = fx.evaluator();
    let ma = random_message(3, 6);
    let mb = random_message(3, 7);
    let a = fx.encrypt(&ma);
    let b = fx.encrypt(&mb);

    let tensored = eval.tensor(&a, &b).unwrap();
    assert_eq!(tensored.size(), 3);
    assert_eq!(tensored.rescale_counter(), 1);
    let expected = eval.mult_messages(&ma, &mb).unwrap();
    // size-3 ciphertexts decrypt directly
    assert_close(&fx.decrypt(&tensored), &expected, 1e-6);

    let relinearized = eval.relinearize(&tensored).unwrap();
    assert_eq!(relinearized.size(), 2);
    let rescaled = eval.rescale(&relinearized).unwrap();
    assert_eq!(rescaled.level(), a.level() - 1);
    assert_close(&fx.decrypt(&rescaled), &expected, 1e-6);
}

#[test]
fn test_state_errors() {
    let fx = Fixture::common();
    let eval = fx.evaluator();
    let ct = fx.encrypt(&random_message(3, 8));

    let pending = eval.mult_without_rescale(&ct, &ct).unwrap();
    assert_eq!(pending.rescale_counter(), 1);
    assert!(matches!(eval.mult(&pending, &ct), Err(HeError::StateMismatch(_))));
    assert!(matches!(eval.add(&pending, &ct), Err(HeError::StateMismatch(_))));
    assert!(matches!(
        eval.mult_const(&pending, complex(0.5, 0.0)),
        Err(HeError::Precondition(_))
    ));

    let bottom = fx.encrypt_at(&random_message(3, 9), 0);
    assert!(matches!(eval.mult(&bottom, &bottom), Err(HeError::Precondition(_))));
    // a level-0 tensor would carry counter 1 with no prime left to rescale by
    assert!(matches!(eval.tensor(&bottom, &bottom), Err(HeError::Precondition(_))));

    let wider = fx.encrypt(&random_message(4, 10));
    assert!(eval.add(&ct, &wider).is_err());
}

#[test]
fn test_multiplication_without_key_fails() {
    let fx = Fixture::common();
    let eval = HomEvaluator::new(&fx.ctx, std::sync::Arc::new(KeyPack::new(&fx.ctx)));
    let ct = fx.encrypt(&reals(&[1.0, 2.0]));
    assert!(matches!(eval.mult(&ct, &ct), Err(HeError::MissingKey(_))));
    // tensoring needs no key
    assert!(eval.tensor(&ct, &ct).is_ok());
}

// ---- levels ----

#[test]
fn test_level_down_and_relevel_keep_the_value() {
    let fx = Fixture::common();
    let eval = fx.evaluator();
    let msg = random_message(5, 11);
    let ct = fx.encrypt(&msg);

    let lowered = eval.level_down(&ct, 2).unwrap();
    assert_eq!(lowered.level(), 2);
    assert_close(&fx.decrypt(&lowered), &msg, 1e-6);

    let one = eval.level_down_one(&ct).unwrap();
    assert_eq!(one.level(), ct.level() - 1);

    let matched = eval.relevel(&ct, &lowered).unwrap();
    assert_eq!(matched.level(), 2);
    assert!(eval.level_down(&lowered, 5).is_err());
}

#[test]
fn test_inverse_rescale_then_rescale_is_identity() {
    let fx = Fixture::common();
    let eval = fx.evaluator();
    let msg = random_message(3, 12);
    let ct = fx.encrypt(&msg);

    let raised = eval.inverse_rescale(&ct).unwrap();
    assert_eq!(raised.level(), ct.level() + 1);
    assert_eq!(raised.rescale_counter(), 1);
    assert_close(&fx.decrypt(&raised), &msg, 1e-6);

    let back = eval.rescale(&raised).unwrap();
    assert_eq!(back.level(), ct.level());
    assert_eq!(back.rescale_counter(), 0);
    assert_close(&fx.decrypt(&back), &msg, 1e-6);
}

#[test]
fn test_levels_never_increase_through_arithmetic() {
    let fx = Fixture::common();
    let eval = fx.evaluator();
    let mut ct = fx.encrypt(&reals(&[0.9, -0.8, 0.7, 0.6]));
    let mut previous = ct.level();
    for _ in 0..4 {
        ct = eval.square(&ct).unwrap();
        assert!(ct.level() < previous);
        previous = ct.level();
        ct = eval.add(&ct, &ct).unwrap();
        assert_eq!(ct.level(), previous);
    }
}

// ---- rotations ----

#[test]
fn test_left_and_right_rotation() {
    let fx = Fixture::common();
    let eval = fx.evaluator();
    let msg = random_message(3, 13);
    let ct = fx.encrypt(&msg);

    let left = eval.left_rotate(&ct, 1).unwrap();
    assert_eq!(left.level(), ct.level());
    assert_close(&fx.decrypt(&left), &eval.left_rotate_message(&msg, 1), 1e-6);

    let right = eval.right_rotate(&ct, 2).unwrap();
    assert_close(&fx.decrypt(&right), &eval.right_rotate_message(&msg, 2), 1e-6);
    assert_eq!(eval.right_rotate_message(&msg, 2)[2], msg[0]);
}

#[test]
fn test_right_rotation_of_sparse_ciphertext_uses_stored_right_key() {
    let fx = Fixture::common();
    let mut keygen = KeyGenerator::with_seed(&fx.ctx, &fx.sk, Seed::from_u64(40));
    keygen.gen_encryption_key();
    keygen.gen_right_rotation_key(1);
    keygen.gen_right_rotation_key(3);
    let keys = keygen.key_pack();
    assert!(keys.is_right_rot_key_loaded(1));
    let eval = HomEvaluator::new(&fx.ctx, keys.clone());

    for log_slots in [2, 3, 5] {
        let msg = random_message(log_slots, 41);
        let n = msg.len();
        assert!(!keys.is_left_rot_key_loaded(n - 1));
        let ct = Encryptor::with_seed(&fx.ctx, Seed::from_u64(42))
            .encrypt(&msg, &keys)
            .unwrap();
        for k in [1, 3] {
            let right = eval.right_rotate(&ct, k).unwrap();
            assert_eq!(right.level(), ct.level());
            assert_close(&fx.decrypt(&right), &eval.right_rotate_message(&msg, k), 1e-6);
        }
    }

    let ct = Encryptor::with_seed(&fx.ctx, Seed::from_u64(43))
        .encrypt(&random_message(3, 44), &keys)
        .unwrap();
    assert!(matches!(eval.right_rotate(&ct, 2), Err(HeError::MissingKey(_))));
}

#[test]
fn test_rotation_is_periodic_in_slot_count() {
    let fx = Fixture::common();
    let eval = fx.evaluator();
    let msg = random_message(3, 14);
    let ct = fx.encrypt(&msg);

    let full_turn = eval.left_rotate(&ct, 8).unwrap();
    assert_close(&fx.decrypt(&full_turn), &msg, 1e-6);

    let nine = eval.left_rotate(&ct, 9).unwrap();
    assert_close(&fx.decrypt(&nine), &eval.left_rotate_message(&msg, 1), 1e-6);

    // rotations compose additively mod the slot count
    let three = eval.left_rotate(&eval.left_rotate(&ct, 1).unwrap(), 2).unwrap();
    assert_close(&fx.decrypt(&three), &eval.left_rotate_message(&msg, 3), 1e-6);
    let around = eval.left_rotate(&eval.left_rotate(&ct, 4).unwrap(), 4).unwrap();
    assert_close(&fx.decrypt(&around), &msg, 1e-6);
}

#[test]
fn test_rotation_without_key_fails() {
    let fx = Fixture::common();
    let eval = fx.evaluator();
    let ct = fx.encrypt(&random_message(3, 15));
    // only power-of-two keys were generated
    assert!(matches!(eval.left_rotate(&ct, 3), Err(HeError::MissingKey(_))));
}

#[test]
fn test_rotate_reduce_and_rot_sum() {
    let fx = Fixture::common();
    let eval = fx.evaluator();
    let msg = reals(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
    let ct = fx.encrypt(&msg);

    let total = eval.left_rotate_reduce(&ct, 1, 8).unwrap();
    assert_close(&fx.decrypt(&total), &reals(&[36.0; 8]), 1e-5);

    // non-power-of-two counts take the term-by-term path
    let pairs = eval.right_rotate_reduce(&ct, 2, 3).unwrap();
    let expected: Vec<f64> = (0..8)
        .map(|i| (0..3).map(|j| msg[(i + 8 - 2 * j) % 8].re).sum())
        .collect();
    assert_close(&fx.decrypt(&pairs), &reals(&expected), 1e-5);

    let summed = eval.rot_sum(&[ct.clone(), ct.clone()], &[0, 4]).unwrap();
    let expected = eval
        .add_messages(&msg, &eval.left_rotate_message(&msg, 4))
        .unwrap();
    assert_close(&fx.decrypt(&summed), &expected, 1e-5);

    assert!(matches!(eval.rot_sum(&[ct], &[1, 2]), Err(HeError::Precondition(_))));
    assert!(matches!(eval.rot_sum(&[], &[]), Err(HeError::Precondition(_))));
}

#[test]
fn test_conjugate_and_kill_imag() {
    let fx = Fixture::common();
    let eval = fx.evaluator();
    let msg = random_message(4, 16);
    let ct = fx.encrypt(&msg);

    let conj = eval.conjugate(&ct).unwrap();
    assert_eq!(conj.level(), ct.level());
    assert_close(&fx.decrypt(&conj), &eval.conjugate_message(&msg), 1e-6);

    let real = eval.kill_imag(&ct).unwrap();
    assert_eq!(real.level(), ct.level() - 1);
    let expected = Message::from_slice(&msg.slots().iter().map(|z| complex(z.re, 0.0)).collect::<Vec<_>>()).unwrap();
    assert_close(&fx.decrypt(&real), &expected, 1e-6);
}

#[test]
fn test_plaintext_container_ops() {
    let fx = Fixture::common();
    let eval = fx.evaluator();
    let encoder = EnDecoder::new(&fx.ctx);
    let ma = random_message(3, 17);
    let mb = random_message(3, 18);
    let pa = encoder.encode_at(&ma, 6, 0).unwrap();
    let pb = encoder.encode_at(&mb, 4, 0).unwrap();

    let sum = eval.add_plaintexts(&pa, &pb).unwrap();
    assert_eq!(sum.level(), 4);
    assert_close(&encoder.decode(&sum).unwrap(), &eval.add_messages(&ma, &mb).unwrap(), 1e-8);

    let product = eval.mult_plaintexts(&pa, &pb).unwrap();
    assert_eq!(product.level(), 3);
    assert_close(&encoder.decode(&product).unwrap(), &eval.mult_messages(&ma, &mb).unwrap(), 1e-8);
}

#[test]
fn test_plaintext_constants() {
    let fx = Fixture::common();
    let eval = fx.evaluator();
    let encoder = EnDecoder::new(&fx.ctx);
    let msg = random_message(3, 19);
    let p = encoder.encode_at(&msg, 5, 0).unwrap();
    let c = complex(0.5, -0.25);

    let shifted = eval.add_const_plain(&p, c).unwrap();
    assert_eq!(shifted.level(), 5);
    assert_close(&encoder.decode(&shifted).unwrap(), &eval.add_const_message(&msg, c), 1e-8);
    let lowered = eval.sub_const_plain(&p, c).unwrap();
    assert_close(&encoder.decode(&lowered).unwrap(), &eval.sub_const_message(&msg, c), 1e-8);

    let tripled = eval.mult_const_plain(&p, complex(-3.0, 2.0)).unwrap();
    assert_eq!(tripled.level(), 5);
    assert_close(
        &encoder.decode(&tripled).unwrap(),
        &eval.mult_const_message(&msg, complex(-3.0, 2.0)),
        1e-8,
    );
    let scaled = eval.mult_const_plain(&p, complex(0.3, 0.1)).unwrap();
    assert_eq!(scaled.level(), 4);
    assert_close(
        &encoder.decode(&scaled).unwrap(),
        &eval.mult_const_message(&msg, complex(0.3, 0.1)),
        1e-8,
    );

    let raised = eval.inverse_rescale_plain(&p).unwrap();
    assert_eq!(raised.rescale_counter(), 1);
    assert!(matches!(eval.add_const_plain(&raised, c), Err(HeError::Precondition(_))));
    assert!(matches!(eval.mult_const_plain(&raised, c), Err(HeError::Precondition(_))));
    let bottom = encoder.encode_at(&msg, 0, 0).unwrap();
    assert!(matches!(
        eval.mult_const_plain(&bottom, complex(0.3, 0.0)),
        Err(HeError::Precondition(_))
    ));
}

#[test]
fn test_message_constants() {
    let fx = Fixture::common();
    let eval = fx.evaluator();
    let msg = Message::from_slice(&[complex(1.0, 2.0), complex(-0.5, 0.0)]).unwrap();
    let c = complex(0.0, 1.0);
    let expect = |slots: &[Complex64]| Message::from_slice(slots).unwrap();

    assert_close(&eval.add_const_message(&msg, c), &expect(&[complex(1.0, 3.0), complex(-0.5, 1.0)]), 1e-12);
    assert_close(&eval.sub_const_message(&msg, c), &expect(&[complex(1.0, 1.0), complex(-0.5, -1.0)]), 1e-12);
    assert_close(&eval.mult_const_message(&msg, c), &expect(&[complex(-2.0, 1.0), complex(0.0, -0.5)]), 1e-12);
}

#[test]
fn test_plaintext_rotation_and_conjugation() {
    let fx = Fixture::common();
    let eval = fx.evaluator();
    let encoder = EnDecoder::new(&fx.ctx);
    for log_slots in [3, fx.ctx.log_full_slots()] {
        let msg = random_message(log_slots, 23);
        let p = encoder.encode_at(&msg, 4, 0).unwrap();
        for k in [1, 3, 5] {
            let left = eval.left_rotate_plain(&p, k);
            assert_eq!(left.level(), 4);
            assert_close(&encoder.decode(&left).unwrap(), &eval.left_rotate_message(&msg, k), 1e-8);
            let right = eval.right_rotate_plain(&p, k);
            assert_close(&encoder.decode(&right).unwrap(), &eval.right_rotate_message(&msg, k), 1e-8);
        }
        let conj = eval.conjugate_plain(&p);
        assert_close(&encoder.decode(&conj).unwrap(), &eval.conjugate_message(&msg), 1e-8);
    }

    // coefficient form stays coefficient form
    let msg = random_message(3, 24);
    let raw = encoder.encode_without_ntt(&msg, 2, 0).unwrap();
    let rotated = eval.left_rotate_plain(&raw, 2);
    assert!(!rotated.is_ntt());
    assert_close(&encoder.decode(&rotated).unwrap(), &eval.left_rotate_message(&msg, 2), 1e-8);
}

#[test]
fn test_relevel_plaintext_in_both_directions() {
    let fx = Fixture::common();
    let eval = fx.evaluator();
    let encoder = EnDecoder::new(&fx.ctx);
    let msg = random_message(4, 25);
    let p = encoder.encode_at(&msg, 3, 0).unwrap();

    let down = eval.relevel_plain(&p, 1).unwrap();
    assert_eq!(down.level(), 1);
    assert_close(&encoder.decode(&down).unwrap(), &msg, 1e-8);

    let top = fx.ctx.max_level();
    let up = eval.relevel_plain(&p, top).unwrap();
    assert_eq!(up.level(), top);
    assert_eq!(up.rescale_counter(), 0);
    assert_close(&encoder.decode(&up).unwrap(), &msg, 1e-8);

    // a raised plaintext multiplies a fresh ciphertext at its level
    let ct = fx.encrypt_at(&msg, top);
    let product = eval.mult_plain(&ct, &up).unwrap();
    assert_close(&fx.decrypt(&product), &eval.mult_messages(&msg, &msg).unwrap(), 1e-6);

    assert!(matches!(eval.relevel_plain(&p, top + 1), Err(HeError::Precondition(_))));
    let counted = eval.inverse_rescale_plain(&p).unwrap();
    assert!(matches!(eval.relevel_plain(&counted, top), Err(HeError::Precondition(_))));
}
