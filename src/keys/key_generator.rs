//! Key generation from a secret key
//!
//! Every generated key goes straight into the generator's [`KeyPack`], which can
//! be shared with evaluators (`key_pack()`), written to disk (`save`) and
//! emptied (`flush`).

use std::path::Path;
use std::sync::Arc;

use rand_chacha::ChaCha20Rng;
use tracing::{debug, info, instrument};

use super::key_pack::{KeyKind, KeyPack};
use super::secret_key::SecretKey;
use super::switching_key::{EncryptionKey, SwitchingKey};
use crate::context::{Context, SparseContextPair};
use crate::error::{HeError, Result};
use crate::math::RnsPoly;
use crate::sampling::{gaussian_poly, make_rng, ternary_fixed_weight, uniform_poly, Seed};

/// Derives encryption and evaluation keys from one secret key
pub struct KeyGenerator<'a> {
    context: Context,
    secret: &'a SecretKey,
    pack: Arc<KeyPack>,
    rng: ChaCha20Rng,
}

impl<'a> KeyGenerator<'a> {
    /// Generator drawing randomness from OS entropy
    pub fn new(context: &Context, secret: &'a SecretKey) -> Self {
        Self::build(context, secret, None)
    }

    /// Generator whose output is fully determined by `seed`
    pub fn with_seed(context: &Context, secret: &'a SecretKey, seed: Seed) -> Self {
        Self::build(context, secret, Some(seed))
    }

    fn build(context: &Context, secret: &'a SecretKey, seed: Option<Seed>) -> Self {
        Self {
            context: context.clone(),
            secret,
            pack: Arc::new(KeyPack::new(context)),
            rng: make_rng(seed),
        }
    }

    /// Shared handle to the generated keys
    pub fn key_pack(&self) -> Arc<KeyPack> {
        self.pack.clone()
    }

    /// Public key (b, a) = (-a·s + e, a) over the whole chain
    #[instrument(skip_all)]
    pub fn gen_encryption_key(&mut self) {
        let n = self.context.dimension();
        let basis = self.context.q_basis(self.context.max_level());
        let s = self.secret.to_ntt_poly(&basis);

        let a = uniform_poly(n, &basis, &mut self.rng);
        let mut b = gaussian_poly(n, &basis, &mut self.rng);
        let mut a_s = a.mul(&s, &basis);
        a_s.negate(&basis);
        b.add_assign(&a_s, &basis);

        self.pack.insert_enc_key(EncryptionKey { b, a });
        debug!("encryption key generated");
    }

    /// Relinearization key s² → s
    #[instrument(skip_all)]
    pub fn gen_multiplication_key(&mut self) {
        let basis = self.context.qp_basis(self.context.max_level());
        let s = self.secret.to_ntt_poly(&basis);
        let s_squared = s.mul(&s, &basis);
        let key = self.switching_key(&s_squared);
        self.pack.insert_switching(KeyKind::Multiplication, key);
    }

    /// Conjugation key σ_{2N-1}(s) → s
    #[instrument(skip_all)]
    pub fn gen_conjugation_key(&mut self) {
        let galois = self.context.conjugation_galois();
        let key = self.automorphism_key(galois);
        self.pack.insert_switching(KeyKind::Conjugation, key);
    }

    /// Key for a left rotation by `k` slots (σ_{5^k}(s) → s)
    #[instrument(skip(self))]
    pub fn gen_left_rotation_key(&mut self, k: usize) {
        let k = k % self.context.num_full_slots();
        if k == 0 {
            return;
        }
        let galois = self.context.left_rotation_galois(k);
        let key = self.automorphism_key(galois);
        self.pack.insert_switching(KeyKind::LeftRotation(k), key);
    }

    /// Key for a right rotation by `k` slots, stored as the left rotation by N/2 - k
    pub fn gen_right_rotation_key(&mut self, k: usize) {
        let half = self.context.num_full_slots();
        self.gen_left_rotation_key((half - k % half) % half);
    }

    /// Left and right rotation keys for every power of two below N/2
    pub fn gen_rotation_key_bundle(&mut self) {
        let half = self.context.num_full_slots();
        let powers: Vec<usize> = std::iter::successors(Some(1usize), |&k| Some(2 * k))
            .take_while(|&k| k < half)
            .collect();
        for &k in &powers {
            self.gen_left_rotation_key(k);
            self.gen_right_rotation_key(k);
        }
    }

    /// Rotation and conjugation keys needed to bootstrap `log_slots` slots
    ///
    /// # Errors
    /// `Precondition` when `log_slots` exceeds the full slot count.
    #[instrument(skip(self))]
    pub fn gen_rot_keys_for_bootstrap(&mut self, log_slots: u32) -> Result<()> {
        let indices = self.context.rot_indices_for_bootstrap(log_slots)?;
        info!(count = indices.len(), "generating bootstrap rotation keys");
        for k in indices {
            if !self.pack.is_left_rot_key_loaded(k) {
                self.gen_left_rotation_key(k);
            }
        }
        if !self.pack.is_conj_key_loaded() {
            self.gen_conjugation_key();
        }
        Ok(())
    }

    /// Keys switching between the dense secret and a fresh sparse secret
    ///
    /// The encapsulation key (dense → sparse) lives over the sparse companion
    /// context and is used at level 0; the decapsulation key (sparse → dense)
    /// lives over the dense context and is used right after mod-raise.
    ///
    /// # Errors
    /// `InvalidParameter` when `pair` was not derived from this generator's context.
    #[instrument(skip_all)]
    pub fn gen_sparse_secret_encapsulation_key(&mut self, pair: &SparseContextPair) -> Result<()> {
        if !pair.dense().is_compatible(&self.context) {
            return Err(HeError::InvalidParameter(
                "sparse context pair was derived from a different context".into(),
            ));
        }
        let sparse_ctx = pair.sparse();
        let n = self.context.dimension();
        let sparse_secret = SecretKey::from_coefficients(
            sparse_ctx,
            &ternary_fixed_weight(n, sparse_ctx.hamming_weight(), &mut self.rng),
        )?;

        let sparse_basis = sparse_ctx.qp_basis(0);
        let dense_in_sparse = self.secret.to_ntt_poly(&sparse_basis);
        let encapsulation = gen_switching_key(sparse_ctx, &sparse_secret, &dense_in_sparse, &mut self.rng);

        let dense_basis = self.context.qp_basis(self.context.max_level());
        let sparse_in_dense = sparse_secret.to_ntt_poly(&dense_basis);
        let decapsulation = self.switching_key(&sparse_in_dense);

        self.pack.insert_switching(KeyKind::SparseEncapsulation, encapsulation);
        self.pack.insert_switching(KeyKind::SparseDecapsulation, decapsulation);
        info!(sparse_weight = sparse_secret.hamming_weight(), "sparse secret encapsulation keys generated");
        Ok(())
    }

    /// Encryption, multiplication, conjugation and the rotation bundle
    pub fn gen_common_keys(&mut self) {
        self.gen_encryption_key();
        self.gen_multiplication_key();
        self.gen_conjugation_key();
        self.gen_rotation_key_bundle();
    }

    /// Write the generated keys to `<dir>/PK/`
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<()> {
        self.pack.save(dir)
    }

    /// Drop the generated keys from memory
    pub fn flush(&self) {
        self.pack.clear();
    }

    fn automorphism_key(&mut self, galois: usize) -> SwitchingKey {
        let basis = self.context.qp_basis(self.context.max_level());
        let rotated = self
            .secret
            .to_coeff_poly(&basis)
            .automorphism(galois, &basis)
            .into_ntt(&basis);
        self.switching_key(&rotated)
    }

    fn switching_key(&mut self, from: &RnsPoly) -> SwitchingKey {
        gen_switching_key(&self.context, self.secret, from, &mut self.rng)
    }
}

/// Switching key from `from` (NTT form over the full Q·P basis of `context`) to `to`
fn gen_switching_key(
    context: &Context,
    to: &SecretKey,
    from: &RnsPoly,
    rng: &mut ChaCha20Rng,
) -> SwitchingKey {
    let n = context.dimension();
    let max_level = context.max_level();
    let basis = context.qp_basis(max_level);
    let s = to.to_ntt_poly(&basis);

    let pieces = context
        .gadget_pieces(max_level)
        .into_iter()
        .map(|piece| {
            let a = uniform_poly(n, &basis, rng);
            let mut b = gaussian_poly(n, &basis, rng);
            let mut a_s = a.mul(&s, &basis);
            a_s.negate(&basis);
            b.add_assign(&a_s, &basis);

            for i in piece {
                let r = basis[i].reducer();
                let p_mod_q = context
                    .temp_primes()
                    .iter()
                    .fold(1u64, |acc, &p| r.mul(acc, r.reduce(p)));
                for (x, &y) in b.limbs[i].iter_mut().zip(&from.limbs[i]) {
                    *x = r.add(*x, r.mul(p_mod_q, y));
                }
            }
            [b, a]
        })
        .collect();

    SwitchingKey { pieces }
}
