//! Bootstrapping
//!
//! Refreshes a ciphertext's level by evaluating its own decryption homomorphically.
//!
//! ## Pipeline
//!
//! ```text
//! ct (level ≥ 3, counter 0)
//!   ↓ level down to 0
//!   ↓ [sparse encapsulation: key switch to a low-weight secret]
//! 1. ModRaise: residues mod q_0 lifted to the whole chain, t + q_0·I
//!   ↓ [sparse decapsulation: key switch back to the dense secret]
//!   ↓ subsum: project onto the n-slot subring (rotations by n, 2n, ...)
//! 2. CoeffToSlot: adjoint FFT butterflies in two BSGS steps, slots = coefficients / (2·q_0·(K+1))
//!   ↓ real/imaginary separation with one conjugation
//! 3. EvalMod: Chebyshev approximation of a scaled cosine + double-angle steps
//!   ↓ recombination
//! 4. SlotToCoeff: the FFT butterflies in two BSGS steps
//!   ↓ [level down when a sparse circuit left spare levels]
//! ct (level_after_full_slot_bootstrap, counter 0)
//! ```
//!
//! ## Components
//!
//! - [`chebyshev`]: interpolation, Clenshaw evaluation, homomorphic Chebyshev series
//! - [`constants`]: the butterfly factorization and the per-`log_slots` transform bundle
//! - [`eval_mod`]: the approximate modular reduction
//! - [`linear_transform`]: sparse diagonal factors evaluated baby-step giant-step
//! - [`mod_raise`]: lifting a level-0 ciphertext to the top of the chain
//! - [`bootstrapper`]: the state machine and the public entry points

pub mod bootstrapper;
pub mod chebyshev;
pub mod constants;
pub mod eval_mod;
pub mod linear_transform;
pub mod mod_raise;

pub use bootstrapper::Bootstrapper;
pub use constants::BootConstants;
