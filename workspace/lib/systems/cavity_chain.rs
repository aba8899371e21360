//! Four-site tight-binding chain coupled to a five-mode standing-wave cavity.

use std::f64::consts::PI;
use dressed_qed::{
    CouplingParameters,
    MatterSystem,
    PhotonSystem,
    Polarizability,
    Result,
};

/// Number of chain sites
pub const N_SITES: usize = 4;

/// On-site potential
pub const ONSITE: [f64; N_SITES] = [0.0; N_SITES];

/// Nearest-neighbor tunneling
pub const TUNNELING: f64 = 0.25;

/// Tunneling range in sites
pub const RADIUS: usize = 1;

/// Number of vacuum cavity modes
pub const N_MODES: usize = 5;

/// Cavity length (ω_k = k π / L)
pub const LENGTH: f64 = PI;

/// Number of grid points over [0, L]
pub const N_POINTS: usize = 101;

/// Emitter position; 0.3 L avoids the nodes of the first five modes
pub const EMITTER_X: f64 = 0.3 * LENGTH;

/// Light-matter coupling constant
pub const ALPHA: f64 = 0.01;

/// Fixed polarizability
pub const LAMBDA: f64 = 0.05;

pub fn matter() -> Result<MatterSystem> {
    MatterSystem::tight_binding(&ONSITE, TUNNELING, RADIUS)
}

pub fn photon() -> Result<PhotonSystem> {
    PhotonSystem::standing_wave(N_MODES, LENGTH, N_POINTS)
}

/// Grid index of the emitter.
pub fn emitter(photon: &PhotonSystem) -> usize {
    photon.nearest_point(EMITTER_X)
}

/// Coupling with `α` and either a fixed scalar `λ` or, if `lambda` is
/// `None`, the polarizability of the current matter state.
pub fn coupling(alpha: f64, lambda: Option<f64>) -> CouplingParameters {
    let lambda = lambda.map(Polarizability::Scalar).unwrap_or(Polarizability::FromMatter);
    CouplingParameters::new(alpha, lambda)
}

#[cfg(test)]
mod test {
    use dressed_qed::{ SolverConfig, solve };
    use super::*;

    #[test]
    fn bundled_config_solves_the_chain() {
        let config
            = SolverConfig::from_toml_str(include_str!("../../config/cavity_chain.toml"))
            .unwrap();
        assert_eq!(config.passes, 2);
        let matter = matter().unwrap();
        let photon = photon().unwrap();
        let r0 = emitter(&photon);
        assert_eq!(r0, 30);
        for lambda in [Some(LAMBDA), None] {
            let result = solve(&matter, &photon, r0, &coupling(ALPHA, lambda), config).unwrap();
            assert!(result.converged());
            assert_eq!(result.frequencies().len(), N_MODES);
            assert_eq!(result.energies().len(), N_SITES);
        }
    }
}
