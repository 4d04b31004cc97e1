//! Polynomial-ring arithmetic in residue-number-system form
//!
//! - [`modular`]: word-sized modular arithmetic, Barrett reduction, primality
//! - [`ntt`]: negacyclic NTT per prime
//! - [`rns_poly`]: RNS polynomials and their ring operations
//! - [`basis`]: fast basis conversion (mod-up / mod-down) and CRT reconstruction
//! - [`primes`]: deterministic NTT-friendly prime generation

pub mod basis;
pub mod modular;
pub mod ntt;
pub mod primes;
pub mod rns_poly;

pub use basis::{BasisConverter, CrtReconstructor};
pub use modular::BarrettReducer;
pub use ntt::NttContext;
pub use rns_poly::{Basis, RnsPoly};
