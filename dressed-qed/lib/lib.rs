#![allow(dead_code, non_snake_case, non_upper_case_globals)]

//! Coupled photon + matter eigenproblems for an emitter in a cavity.
//!
//! A solve runs in stages, each with its own module:
//! - [`green`]: spectral Green's function of the vacuum cavity modes
//! - [`roots`]: dressed photon frequencies from `det(I + λ G) = 0`
//! - [`modes`]: normalized dressed mode profiles
//! - [`self_energy`]: photon-induced matter self-energy
//! - [`fixed_point`] / [`mixing`]: self-consistent dressed matter
//!   eigenpairs with Anderson mixing
//! - [`solve`]: sequencing of the above, with diagnostics

pub use num_complex;
pub use ndarray_npy;

pub mod error;
pub mod config;
pub mod utils;
pub mod matter;
pub mod photon;
pub mod green;
pub mod roots;
pub mod modes;
pub mod self_energy;
pub mod mixing;
pub mod fixed_point;
pub mod solve;

pub use error::{ Error, Result };
pub use config::SolverConfig;
pub use matter::{ Eigenpairs, MatterSystem };
pub use photon::PhotonSystem;
pub use solve::{ CouplingParameters, Polarizability, SolveResult, solve };
