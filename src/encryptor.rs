//! Encryption and decryption
//!
//! **Public-key encryption** of m at level ℓ:
//! ```text
//! v ← ZO(1/2), e_0, e_1 ← χ
//! (c_0, c_1) = (v·b + e_0 + m, v·a + e_1)
//! ```
//! **Secret-key encryption:** (c_0, c_1) = (-a·s + e + m, a) with a uniform.
//!
//! When ℓ is below the top level the message is encoded at (ℓ+1, counter 1) and
//! the ciphertext rescaled once, which divides the fresh noise by q_{ℓ+1}.

use rand_chacha::ChaCha20Rng;
use tracing::instrument;

use crate::ciphertext::Ciphertext;
use crate::context::Context;
use crate::encoding::EnDecoder;
use crate::error::{precondition, HeError, Result};
use crate::evaluator::level::rescale_ciphertext;
use crate::keys::{EncryptionKey, KeyPack, SecretKey};
use crate::math::RnsPoly;
use crate::message::Message;
use crate::plaintext::Plaintext;
use crate::sampling::{gaussian_poly, make_rng, ternary_zo, uniform_poly, Seed};

/// Encrypts messages under a public key or directly under a secret key
pub struct Encryptor {
    context: Context,
    encoder: EnDecoder,
    rng: ChaCha20Rng,
}

impl Encryptor {
    /// Encryptor drawing randomness from OS entropy
    pub fn new(context: &Context) -> Self {
        Self::build(context, None)
    }

    /// Encryptor with reproducible randomness
    pub fn with_seed(context: &Context, seed: Seed) -> Self {
        Self::build(context, Some(seed))
    }

    fn build(context: &Context, seed: Option<Seed>) -> Self {
        Self {
            context: context.clone(),
            encoder: EnDecoder::new(context),
            rng: make_rng(seed),
        }
    }

    /// Encrypt at the encryption level with the key pack's encryption key
    ///
    /// # Errors
    /// `MissingKey` when the pack holds no encryption key.
    pub fn encrypt(&mut self, msg: &Message, pack: &KeyPack) -> Result<Ciphertext> {
        self.encrypt_at(msg, pack, self.context.encryption_level())
    }

    pub fn encrypt_at(&mut self, msg: &Message, pack: &KeyPack, level: usize) -> Result<Ciphertext> {
        let key = pack
            .get_enc_key()
            .ok_or_else(|| HeError::MissingKey("encryption key".into()))?;
        self.encrypt_with_key_at(msg, &key, level)
    }

    pub fn encrypt_with_key(&mut self, msg: &Message, key: &EncryptionKey) -> Result<Ciphertext> {
        self.encrypt_with_key_at(msg, key, self.context.encryption_level())
    }

    #[instrument(level = "debug", skip(self, msg, key))]
    pub fn encrypt_with_key_at(
        &mut self,
        msg: &Message,
        key: &EncryptionKey,
        level: usize,
    ) -> Result<Ciphertext> {
        let ptxt = self.encode_raised(msg, level)?;
        let ctxt = self.public_key_encrypt(&ptxt, key);
        self.finish(ctxt)
    }

    /// Encrypt an already encoded plaintext at its own level and counter
    pub fn encrypt_plaintext(&mut self, ptxt: &Plaintext, pack: &KeyPack) -> Result<Ciphertext> {
        let key = pack
            .get_enc_key()
            .ok_or_else(|| HeError::MissingKey("encryption key".into()))?;
        Ok(self.public_key_encrypt(ptxt, &key))
    }

    /// Encrypt at the encryption level under `secret`
    pub fn encrypt_with_secret(&mut self, msg: &Message, secret: &SecretKey) -> Result<Ciphertext> {
        self.encrypt_with_secret_at(msg, secret, self.context.encryption_level())
    }

    pub fn encrypt_with_secret_at(
        &mut self,
        msg: &Message,
        secret: &SecretKey,
        level: usize,
    ) -> Result<Ciphertext> {
        let ptxt = self.encode_raised(msg, level)?;
        let n = self.context.dimension();
        let basis = self.context.q_basis(ptxt.level);
        let s = secret.to_ntt_poly(&basis);

        let a = uniform_poly(n, &basis, &mut self.rng);
        let mut c0 = gaussian_poly(n, &basis, &mut self.rng);
        c0.sub_assign(&a.mul(&s, &basis), &basis);
        c0.add_assign(&ptxt.poly, &basis);

        let ctxt = Ciphertext::from_parts(
            vec![c0, a],
            ptxt.level,
            ptxt.rescale_counter,
            ptxt.log_slots,
            self.context.current_device(),
        );
        self.finish(ctxt)
    }

    /// Plaintext one level above `level` with counter 1 when possible
    fn encode_raised(&self, msg: &Message, level: usize) -> Result<Plaintext> {
        let max = self.context.max_level();
        if level > max {
            precondition!("cannot encrypt at level {} above max level {}", level, max);
        }
        if level < max {
            self.encoder.encode_at(msg, level + 1, 1)
        } else {
            self.encoder.encode_at(msg, level, 0)
        }
    }

    fn public_key_encrypt(&mut self, ptxt: &Plaintext, key: &EncryptionKey) -> Ciphertext {
        let n = self.context.dimension();
        let basis = self.context.q_basis(ptxt.level);
        let num_limbs = ptxt.level + 1;

        let mut b = key.b.clone();
        b.truncate(num_limbs);
        let mut a = key.a.clone();
        a.truncate(num_limbs);

        let v = RnsPoly::from_signed(&ternary_zo(n, &mut self.rng), &basis).into_ntt(&basis);
        let mut c0 = gaussian_poly(n, &basis, &mut self.rng);
        c0.add_product(&v, &b, &basis);
        let mut message = ptxt.poly.clone();
        message.to_ntt(&basis);
        c0.add_assign(&message, &basis);

        let mut c1 = gaussian_poly(n, &basis, &mut self.rng);
        c1.add_product(&v, &a, &basis);

        Ciphertext::from_parts(
            vec![c0, c1],
            ptxt.level,
            ptxt.rescale_counter,
            ptxt.log_slots,
            self.context.current_device(),
        )
    }

    /// Rescale away the counter added by [`encode_raised`](Self::encode_raised)
    fn finish(&self, ctxt: Ciphertext) -> Result<Ciphertext> {
        if ctxt.rescale_counter > 0 {
            rescale_ciphertext(&self.context, &ctxt)
        } else {
            Ok(ctxt)
        }
    }
}

/// Decrypts ciphertexts of size 2 or 3 with the secret key
#[derive(Clone, Debug)]
pub struct Decryptor {
    context: Context,
    encoder: EnDecoder,
}

impl Decryptor {
    pub fn new(context: &Context) -> Self {
        Self {
            context: context.clone(),
            encoder: EnDecoder::new(context),
        }
    }

    pub fn decrypt(&self, secret: &SecretKey, ctxt: &Ciphertext) -> Result<Message> {
        let ptxt = self.decrypt_to_plaintext(secret, ctxt)?;
        self.encoder.decode(&ptxt)
    }

    /// Σ c_i·s^i as a plaintext at the ciphertext's level and counter
    pub fn decrypt_to_plaintext(&self, secret: &SecretKey, ctxt: &Ciphertext) -> Result<Plaintext> {
        if !(2..=3).contains(&ctxt.size()) {
            precondition!("cannot decrypt a size-{} ciphertext", ctxt.size());
        }
        if ctxt.level > self.context.max_level() {
            precondition!(
                "ciphertext level {} exceeds max level {}",
                ctxt.level,
                self.context.max_level()
            );
        }
        let basis = self.context.q_basis(ctxt.level);
        let s = secret.to_ntt_poly(&basis);

        // Horner: ((c_2·s + c_1)·s + c_0)
        let mut polys = ctxt.polys.iter().rev();
        let mut acc = match polys.next() {
            Some(top) => top.clone(),
            None => precondition!("cannot decrypt an empty ciphertext"),
        };
        for c in polys {
            acc.mul_assign(&s, &basis);
            acc.add_assign(c, &basis);
        }
        Ok(Plaintext::from_parts(
            acc,
            ctxt.level,
            ctxt.rescale_counter,
            ctxt.log_slots,
            ctxt.device,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::make_context;
    use crate::keys::KeyGenerator;
    use crate::params::ParameterPreset;
    use rand::SeedableRng;

    #[test]
    fn test_public_and_secret_key_encryption_roundtrip() {
        let ctx = make_context(ParameterPreset::FX).unwrap();
        let sk = SecretKey::from_seed(&ctx, Seed::from_u64(10));
        let mut keygen = KeyGenerator::with_seed(&ctx, &sk, Seed::from_u64(11));
        keygen.gen_encryption_key();
        let pack = keygen.key_pack();

        let msg = Message::random(4, &mut ChaCha20Rng::seed_from_u64(12));
        let mut enc = Encryptor::with_seed(&ctx, Seed::from_u64(13));
        let dec = Decryptor::new(&ctx);

        let ct = enc.encrypt(&msg, &pack).unwrap();
        assert_eq!(ct.level(), ctx.encryption_level());
        assert_eq!(ct.rescale_counter(), 0);
        assert!(dec.decrypt(&sk, &ct).unwrap().max_error(&msg) < 1e-6);

        let ct = enc.encrypt_with_secret_at(&msg, &sk, 2).unwrap();
        assert_eq!(ct.level(), 2);
        assert!(dec.decrypt(&sk, &ct).unwrap().max_error(&msg) < 1e-6);
    }

    #[test]
    fn test_encrypt_without_key_is_missing_key() {
        let ctx = make_context(ParameterPreset::FX).unwrap();
        let pack = KeyPack::new(&ctx);
        let mut enc = Encryptor::with_seed(&ctx, Seed::from_u64(1));
        let err = enc.encrypt(&Message::zero(2), &pack).unwrap_err();
        assert!(matches!(err, HeError::MissingKey(_)));
    }

    #[test]
    fn test_encrypt_above_max_level_fails() {
        let ctx = make_context(ParameterPreset::FX).unwrap();
        let sk = SecretKey::from_seed(&ctx, Seed::from_u64(1));
        let mut enc = Encryptor::with_seed(&ctx, Seed::from_u64(2));
        let err = enc
            .encrypt_with_secret_at(&Message::zero(2), &sk, ctx.max_level() + 1)
            .unwrap_err();
        assert!(matches!(err, HeError::Precondition(_)));
    }
}
