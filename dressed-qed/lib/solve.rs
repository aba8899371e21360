//! Sequencing of photon and matter stages into a full dressed solve.
//!
//! One pass computes `λ` from the current matter state, finds the dressed
//! photon frequencies and modes, then runs the matter fixed point against
//! those modes. [`SolverConfig::passes`] bounds the number of passes; each
//! pass starts from the previous pass's matter eigenpairs.

use ndarray as nd;
use num_complex::Complex64 as C64;
use tracing::info;
use crate::{
    config::SolverConfig,
    error::{ Error, Result },
    fixed_point::{ FixedPointDiagnostics, MatterFixedPointSolver },
    green::SpectralGreen,
    matter::{ Eigenpairs, MatterSystem },
    modes::{ DressedMode, PhotonModeReconstructor, sum_rule_violation },
    photon::PhotonSystem,
    roots::{ PhotonRootSolver, RootDiagnostics },
    self_energy::{ SelfEnergy, SelfEnergyBuilder },
};

/// Source of the effective polarizability `λ` in the photon pole equation.
#[derive(Clone, Debug, PartialEq)]
pub enum Polarizability {
    /// Static momentum polarizability of the reference level,
    /// `λ = 2α Σ_{b≠1} |⟨ψ_b|p|ψ_1⟩|² / (E_b - E_1)`, times the identity;
    /// recomputed every pass.
    FromMatter,
    /// Fixed scalar `λ`, times the identity.
    Scalar(f64),
    /// Fixed `d × d` matrix.
    Matrix(nd::Array2<C64>),
}

/// Light-matter coupling: `α` and the rule for `λ`.
#[derive(Clone, Debug, PartialEq)]
pub struct CouplingParameters {
    pub alpha: f64,
    pub lambda: Polarizability,
}

impl CouplingParameters {
    /// Create a new `CouplingParameters`.
    pub fn new(alpha: f64, lambda: Polarizability) -> Self {
        Self { alpha, lambda }
    }

    /// Check that `α` and any fixed `λ` are finite and that a matrix `λ` is
    /// `d × d`.
    pub fn validate(&self, d: usize) -> Result<()> {
        if !self.alpha.is_finite() {
            return Err(Error::invalid(format!("coupling constant α = {} is not finite", self.alpha)));
        }
        match &self.lambda {
            Polarizability::FromMatter => Ok(()),
            Polarizability::Scalar(l) if l.is_finite() => Ok(()),
            Polarizability::Scalar(l) => {
                Err(Error::invalid(format!("scalar λ = {l} is not finite")))
            },
            Polarizability::Matrix(m) => {
                if m.dim() != (d, d) {
                    Err(Error::invalid(format!(
                        "λ matrix has shape {:?}; expected ({d}, {d})", m.shape())))
                } else if m.iter().any(|z| !(z.re.is_finite() && z.im.is_finite())) {
                    Err(Error::invalid("λ matrix has non-finite entries"))
                } else {
                    Ok(())
                }
            },
        }
    }

    /// Evaluate `λ` as a `d × d` matrix for the given matter state.
    pub fn lambda_matrix(
        &self,
        matter: &MatterSystem,
        eig: &Eigenpairs,
        d: usize,
        config: &SolverConfig,
    ) -> Result<nd::Array2<C64>>
    {
        match &self.lambda {
            Polarizability::Scalar(l) => Ok(nd::Array2::eye(d) * C64::from(*l)),
            Polarizability::Matrix(m) => Ok(m.clone()),
            Polarizability::FromMatter => {
                let reference
                    = SelfEnergyBuilder::new(matter.momentum(), self.alpha, config)
                    .reference_index(eig)?;
                let p = matter.momentum_in(eig);
                let e_ref = eig.energies[reference];
                let l: f64
                    = eig.energies.iter().enumerate()
                    .filter(|(b, e_b)| {
                        *b != reference
                            && (**e_b - e_ref).abs() >= config.resonance_threshold
                    })
                    .map(|(b, e_b)| p[[b, reference]].norm_sqr() / (e_b - e_ref))
                    .sum::<f64>()
                    * 2.0 * self.alpha;
                Ok(nd::Array2::eye(d) * C64::from(l))
            },
        }
    }
}

/// Record of one photon → matter pass.
#[derive(Clone, Debug, PartialEq)]
pub struct PassDiagnostics {
    pub lambda: nd::Array2<C64>,
    pub roots: Vec<RootDiagnostics>,
    /// Relative completeness sum-rule violation of the dressed modes.
    pub sum_rule: f64,
    pub matter: FixedPointDiagnostics,
}

/// Output of a full dressed solve.
#[derive(Clone, Debug, PartialEq)]
pub struct SolveResult {
    /// Dressed photon modes, sorted by frequency.
    pub photon_modes: Vec<DressedMode>,
    /// Dressed matter eigenpairs.
    pub matter: Eigenpairs,
    pub self_energy: SelfEnergy,
    /// One entry per pass, in order.
    pub passes: Vec<PassDiagnostics>,
}

impl SolveResult {
    /// Dressed photon frequencies `ω_n`.
    pub fn frequencies(&self) -> nd::Array1<f64> {
        self.photon_modes.iter().map(|mode| mode.frequency).collect()
    }

    /// Dressed matter energies `E_i`.
    pub fn energies(&self) -> &nd::Array1<f64> { &self.matter.energies }

    /// `F_n(r0)` for every dressed mode, as a `N_p × d` array.
    pub fn emitter_amplitudes(&self) -> nd::Array2<C64> {
        let d = self.photon_modes.first().map(|m| m.emitter.len()).unwrap_or(0);
        let mut out: nd::Array2<C64> = nd::Array2::zeros((self.photon_modes.len(), d));
        for (mut row, mode) in out.outer_iter_mut().zip(&self.photon_modes) {
            row.assign(&mode.emitter);
        }
        out
    }

    /// Return `true` if every pass converged.
    pub fn converged(&self) -> bool {
        self.passes.iter().all(|pass| {
            pass.matter.converged && pass.roots.iter().all(|r| r.converged)
        })
    }
}

/// Drives the photon and matter stages for a fixed set of inputs.
#[derive(Clone, Debug)]
pub struct SolveOrchestrator<'a> {
    matter: &'a MatterSystem,
    photon: &'a PhotonSystem,
    emitter: usize,
    coupling: &'a CouplingParameters,
    config: SolverConfig,
}

impl<'a> SolveOrchestrator<'a> {
    /// Create a new `SolveOrchestrator`, validating every input.
    pub fn new(
        matter: &'a MatterSystem,
        photon: &'a PhotonSystem,
        emitter: usize,
        coupling: &'a CouplingParameters,
        config: SolverConfig,
    ) -> Result<Self>
    {
        config.validate()?;
        photon.check_point(emitter)?;
        coupling.validate(photon.dim())?;
        Ok(Self { matter, photon, emitter, coupling, config })
    }

    pub fn config(&self) -> &SolverConfig { &self.config }

    /// Photon stage: `λ`, roots, and modes for a given matter state.
    pub fn photon_stage(&self, state: &Eigenpairs)
        -> Result<(nd::Array2<C64>, Vec<DressedMode>, f64)>
    {
        let lambda
            = self.coupling.lambda_matrix(self.matter, state, self.photon.dim(), &self.config)?;
        let green = SpectralGreen::new(self.photon, self.config.pole_epsilon);
        let roots
            = PhotonRootSolver::new(green, self.emitter, &lambda, &self.config)?
            .solve()?;
        let modes
            = PhotonModeReconstructor::new(green, self.emitter, &lambda, &self.config)?
            .reconstruct_all(&roots)?;
        let sum_rule = sum_rule_violation(&modes, green, self.emitter);
        Ok((lambda, modes, sum_rule))
    }

    /// Run all passes, propagating the first failure.
    pub fn run(&self) -> Result<SolveResult> {
        let fixed_point
            = MatterFixedPointSolver::new(self.matter, self.coupling.alpha, &self.config);
        let mut state = self.matter.bare()?;
        let mut passes: Vec<PassDiagnostics> = Vec::with_capacity(self.config.passes);
        let mut last: Option<(Vec<DressedMode>, SelfEnergy)> = None;
        for pass in 1..=self.config.passes {
            let (lambda, modes, sum_rule) = self.photon_stage(&state)?;
            let photons: Vec<(f64, f64)>
                = modes.iter().map(|mode| (mode.frequency, mode.weight())).collect();
            let solution = fixed_point.solve(&photons, Some(state))?;
            info!(
                pass,
                lambda = lambda[[0, 0]].re,
                sum_rule,
                iterations = solution.diagnostics.iterations,
                "finished solve pass"
            );
            passes.push(PassDiagnostics {
                lambda,
                roots: modes.iter().map(|mode| mode.root).collect(),
                sum_rule,
                matter: solution.diagnostics,
            });
            state = solution.eigenpairs;
            last = Some((modes, solution.self_energy));
        }
        let (photon_modes, self_energy)
            = last.ok_or_else(|| Error::invalid("at least one solve pass is required"))?;
        Ok(SolveResult { photon_modes, matter: state, self_energy, passes })
    }
}

/// Run a full dressed solve with the emitter at grid index `emitter`.
pub fn solve(
    matter: &MatterSystem,
    photon: &PhotonSystem,
    emitter: usize,
    coupling: &CouplingParameters,
    config: SolverConfig,
) -> Result<SolveResult>
{
    SolveOrchestrator::new(matter, photon, emitter, coupling, config)?.run()
}
