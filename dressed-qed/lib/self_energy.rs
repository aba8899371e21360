//! Photon-induced matter self-energy
//!
//! ```text
//! Σ = α Σ_n Σ_b |F_n(r0)|² p ψ_b ψ_b† p / (ω_n (E_1 - E_b - ω_n))
//! ```
//! assembled as `P diag(c) P†` with `P = p ψ` and one real coefficient `c_b`
//! per matter level, so the result is Hermitian whenever `p` is.

use ndarray as nd;
use num_complex::Complex64 as C64;
use tracing::warn;
use crate::{
    config::{ ReferenceLevel, ResonancePolicy, SolverConfig },
    error::{ Error, Result },
    matter::Eigenpairs,
    utils::adjoint,
};

/// A self-energy term whose denominator `E_1 - E_b - ω_n` was below the
/// resonance threshold, and was skipped or clamped.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ResonanceWarning {
    /// Matter level `b`.
    pub level: usize,
    /// Dressed photon mode `n`.
    pub mode: usize,
    /// The unclamped denominator.
    pub denominator: f64,
}

/// An assembled self-energy operator.
#[derive(Clone, Debug, PartialEq)]
pub struct SelfEnergy {
    pub sigma: nd::Array2<C64>,
    /// Index of the level used as `E_1`.
    pub reference: usize,
    pub warnings: Vec<ResonanceWarning>,
}

/// Builds `Σ` from matter eigenpairs and dressed photon data.
#[derive(Copy, Clone, Debug)]
pub struct SelfEnergyBuilder<'a> {
    momentum: &'a nd::Array2<C64>,
    alpha: f64,
    policy: ResonancePolicy,
    threshold: f64,
    reference: ReferenceLevel,
}

impl<'a> SelfEnergyBuilder<'a> {
    /// Create a new `SelfEnergyBuilder`, taking the resonance and reference
    /// level settings from `config`.
    pub fn new(momentum: &'a nd::Array2<C64>, alpha: f64, config: &SolverConfig)
        -> Self
    {
        Self {
            momentum,
            alpha,
            policy: config.resonance_policy,
            threshold: config.resonance_threshold,
            reference: config.reference,
        }
    }

    /// Return the coupling constant `α`.
    pub fn alpha(&self) -> f64 { self.alpha }

    /// Resolve the reference level against a set of eigenpairs.
    pub fn reference_index(&self, eig: &Eigenpairs) -> Result<usize> {
        match self.reference {
            ReferenceLevel::Lowest => Ok(eig.lowest()),
            ReferenceLevel::Index(i) if i < eig.len() => Ok(i),
            ReferenceLevel::Index(i) => Err(Error::invalid(format!(
                "reference level {i} out of range for {} levels", eig.len()))),
        }
    }

    /// Build `Σ` from `(ω_n, |F_n(r0)|²)` pairs.
    pub fn build_weighted(&self, eig: &Eigenpairs, photons: &[(f64, f64)])
        -> Result<SelfEnergy>
    {
        let n = self.momentum.nrows();
        if eig.states.dim() != (n, eig.len()) {
            return Err(Error::invalid(format!(
                "eigenstates have shape {:?}; expected ({n}, {})",
                eig.states.shape(),
                eig.len(),
            )));
        }
        if let Some((w, _)) = photons.iter().find(|(w, _)| !(w.is_finite() && *w > 0.0)) {
            return Err(Error::invalid(format!(
                "dressed photon frequency {w} must be positive")));
        }
        let reference = self.reference_index(eig)?;
        let e_ref = eig.energies[reference];

        let mut warnings: Vec<ResonanceWarning> = Vec::new();
        let mut coeffs: nd::Array1<f64> = nd::Array1::zeros(eig.len());
        for (b, e_b) in eig.energies.iter().enumerate() {
            for (m, (omega, weight)) in photons.iter().enumerate() {
                let den = e_ref - e_b - omega;
                let den
                    = if den.abs() < self.threshold {
                        let warning = ResonanceWarning { level: b, mode: m, denominator: den };
                        match self.policy {
                            ResonancePolicy::Fail => {
                                return Err(Error::ResonanceFailure {
                                    level: b,
                                    mode: m,
                                    denominator: den,
                                });
                            },
                            ResonancePolicy::Skip => {
                                warn!(level = b, mode = m, denominator = den, "skipping resonant self-energy term");
                                warnings.push(warning);
                                continue;
                            },
                            ResonancePolicy::Clamp => {
                                warn!(level = b, mode = m, denominator = den, "clamping resonant self-energy term");
                                warnings.push(warning);
                                if den > 0.0 { self.threshold } else { -self.threshold }
                            },
                        }
                    } else {
                        den
                    };
                coeffs[b] += self.alpha * weight / (omega * den);
            }
        }

        let p_psi = self.momentum.dot(&eig.states);
        let scaled = &p_psi * &coeffs.mapv(C64::from);
        let sigma = scaled.dot(&adjoint(&p_psi));
        // remove the rounding-level anti-Hermitian part
        let sigma = (&sigma + &adjoint(&sigma)).mapv(|z| z * 0.5);
        Ok(SelfEnergy { sigma, reference, warnings })
    }
}
