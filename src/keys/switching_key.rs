//! Public encryption keys and gadget-decomposed switching keys

use serde::{Deserialize, Serialize};

use crate::math::RnsPoly;

/// Public key (b, a) = (-a·s + e, a) in NTT form over the whole chain q_0 ... q_{L-1}
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EncryptionKey {
    pub(crate) b: RnsPoly,
    pub(crate) a: RnsPoly,
}

/// Key switching s' → s for one purpose (relinearization, a rotation, conjugation,
/// sparse secret encapsulation)
///
/// Piece j of the gadget covers chain primes [jα, (j+1)α). Its pair is
///
/// ```text
/// b_j = -a_j·s + e_j + P·[Q/Q_j]·[(Q/Q_j)^(-1)]_{Q_j}·s'      a_j uniform
/// ```
///
/// stored in NTT form over q_0 ... q_{L-1}, p_0 ... p_{α-1}. The gadget factor is
/// P mod q_i on the primes of piece j and zero everywhere else.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SwitchingKey {
    pub(crate) pieces: Vec<[RnsPoly; 2]>,
}

impl SwitchingKey {
    /// Gadget rank the key was generated for
    pub fn rank(&self) -> usize {
        self.pieces.len()
    }
}
