//! Self-consistent matter eigenproblem `(H + Σ[E, ψ]) ψ' = E' ψ'`.
//!
//! Each iteration builds `Σ` from the current iterate, diagonalizes `H + Σ`,
//! phase-aligns the new eigenvectors to the old ones, measures the change, and
//! hands the packed vectors `(E, vec ψ)` to an [`AndersonMixer`] for the next
//! iterate.

use ndarray as nd;
use num_complex::Complex64 as C64;
use tracing::{ debug, info };
use crate::{
    config::{ ResidualKind, SolverConfig },
    error::{ Error, Result },
    matter::{ Eigenpairs, MatterSystem },
    mixing::AndersonMixer,
    self_energy::{ ResonanceWarning, SelfEnergy, SelfEnergyBuilder },
};

/// Lower bound on the damping reached by adaptive shrinking.
const MIN_DAMPING: f64 = 0.05;
/// Factor applied to the damping whenever the residual grows.
const DAMPING_SHRINK: f64 = 0.7;

/// Convergence record for one fixed-point solve.
#[derive(Clone, Debug, PartialEq)]
pub struct FixedPointDiagnostics {
    pub iterations: usize,
    pub residual: f64,
    pub converged: bool,
    /// Residual after every iteration, in order.
    pub residual_history: Vec<f64>,
    /// Resonance warnings raised while building the final self-energy.
    pub warnings: Vec<ResonanceWarning>,
    /// Damping in effect at the end of the solve.
    pub damping: f64,
}

/// Converged dressed matter data.
#[derive(Clone, Debug, PartialEq)]
pub struct MatterSolution {
    /// Eigenpairs of the final `H + Σ`; always orthonormal with real
    /// energies.
    pub eigenpairs: Eigenpairs,
    pub self_energy: SelfEnergy,
    pub diagnostics: FixedPointDiagnostics,
}

/// Flatten eigenpairs to `(E, vec ψ)`, with `ψ` in column-major order.
pub fn pack(eig: &Eigenpairs) -> nd::Array1<C64> {
    eig.energies.iter().map(|e| C64::from(*e))
        .chain(eig.states.t().iter().copied())
        .collect()
}

/// Inverse of [`pack`] for `n` levels; energies take the real part.
pub fn unpack(x: &nd::Array1<C64>, n: usize) -> Result<Eigenpairs> {
    if x.len() != n + n * n {
        return Err(Error::invalid(format!(
            "packed iterate has length {}; expected {}", x.len(), n + n * n)));
    }
    let energies: nd::Array1<f64> = x.iter().take(n).map(|z| z.re).collect();
    let states: nd::Array2<C64>
        = nd::Array2::from_shape_fn((n, n), |(i, j)| x[n + j * n + i]);
    Ok(Eigenpairs { energies, states })
}

/// Rotate each column of `candidate` by a global phase so that its overlap
/// with the matching column of `reference` is real and non-negative.
pub fn align_phases(reference: &nd::Array2<C64>, candidate: &mut nd::Array2<C64>) {
    for (old, mut new) in reference.columns().into_iter().zip(candidate.columns_mut()) {
        let overlap: C64 = old.iter().zip(new.iter()).map(|(a, b)| a.conj() * b).sum();
        let norm = overlap.norm();
        if norm > 0.0 {
            let phase = overlap.conj() / norm;
            new.mapv_inplace(|z| z * phase);
        }
    }
}

/// Fixed-point solver for the dressed matter eigenproblem.
#[derive(Copy, Clone, Debug)]
pub struct MatterFixedPointSolver<'a> {
    matter: &'a MatterSystem,
    builder: SelfEnergyBuilder<'a>,
    config: &'a SolverConfig,
}

impl<'a> MatterFixedPointSolver<'a> {
    /// Create a new `MatterFixedPointSolver` with coupling constant `α`.
    pub fn new(matter: &'a MatterSystem, alpha: f64, config: &'a SolverConfig) -> Self {
        let builder = SelfEnergyBuilder::new(matter.momentum(), alpha, config);
        Self { matter, builder, config }
    }

    fn check_iterate(&self, eig: &Eigenpairs) -> Result<()> {
        let n = self.matter.dim();
        if eig.energies.len() != n || eig.states.dim() != (n, n) {
            return Err(Error::invalid(format!(
                "iterate has {} energies and states of shape {:?}; expected {n} and ({n}, {n})",
                eig.energies.len(),
                eig.states.shape(),
            )));
        }
        Ok(())
    }

    /// Apply a single unmixed update: build `Σ` from `current` and diagonalize
    /// `H + Σ`, aligning eigenvector phases with `current`.
    ///
    /// `photons` holds `(ω_n, |F_n(r0)|²)` pairs.
    pub fn step(&self, photons: &[(f64, f64)], current: &Eigenpairs)
        -> Result<(Eigenpairs, SelfEnergy)>
    {
        self.check_iterate(current)?;
        let self_energy = self.builder.build_weighted(current, photons)?;
        let dressed = self.matter.hamiltonian() + &self_energy.sigma;
        let mut candidate = Eigenpairs::from_hermitian(&dressed)?;
        align_phases(&current.states, &mut candidate.states);
        Ok((candidate, self_energy))
    }

    /// Size of the change from `current` to `candidate`, as selected by
    /// [`SolverConfig::residual`].
    pub fn residual(&self, current: &Eigenpairs, candidate: &Eigenpairs) -> f64 {
        match self.config.residual {
            ResidualKind::States => {
                candidate.states.iter().zip(current.states.iter())
                    .map(|(a, b)| (*a - *b).norm_sqr())
                    .sum::<f64>()
                    .sqrt()
            },
            ResidualKind::Energies => {
                candidate.energies.iter().zip(current.energies.iter())
                    .map(|(a, b)| (a - b).powi(2))
                    .sum::<f64>()
                    .sqrt()
            },
        }
    }

    /// Iterate to self-consistency, starting from `init` or the bare
    /// eigenpairs of `H`.
    pub fn solve(&self, photons: &[(f64, f64)], init: Option<Eigenpairs>)
        -> Result<MatterSolution>
    {
        let n = self.matter.dim();
        let mut current
            = match init {
                Some(eig) => { self.check_iterate(&eig)?; eig },
                None => self.matter.bare()?,
            };
        let mut mixer = AndersonMixer::new(self.config.mixing_depth, self.config.damping);
        let mut residual_history: Vec<f64> = Vec::new();
        let mut last_residual = f64::INFINITY;
        for iter in 1..=self.config.fixedpoint_max_iter {
            let (candidate, self_energy) = self.step(photons, &current)?;
            let residual = self.residual(&current, &candidate);
            residual_history.push(residual);
            debug!(iter, residual, damping = mixer.damping(), "matter fixed-point iteration");
            if !residual.is_finite() {
                return Err(Error::NonConvergence { iterations: iter, residual });
            }
            if residual < self.config.fixedpoint_tolerance {
                info!(iterations = iter, residual, "matter fixed point converged");
                let diagnostics = FixedPointDiagnostics {
                    iterations: iter,
                    residual,
                    converged: true,
                    residual_history,
                    warnings: self_energy.warnings.clone(),
                    damping: mixer.damping(),
                };
                return Ok(MatterSolution { eigenpairs: candidate, self_energy, diagnostics });
            }
            if self.config.adaptive_damping && residual > last_residual {
                let damping = (DAMPING_SHRINK * mixer.damping()).max(MIN_DAMPING);
                debug!(iter, damping, "residual grew; reducing damping");
                mixer.set_damping(damping);
            }
            last_residual = residual;
            let next = mixer.mix(&pack(&current), &pack(&candidate));
            current = unpack(&next, n)?;
        }
        Err(Error::NonConvergence {
            iterations: self.config.fixedpoint_max_iter,
            residual: last_residual,
        })
    }

    /// Iterate to self-consistency from a trial set of eigenvectors `x0`
    /// (columns), taking their Rayleigh quotients against `H` as the starting
    /// energies.
    pub fn solve_from_states(&self, photons: &[(f64, f64)], x0: nd::Array2<C64>)
        -> Result<MatterSolution>
    {
        let init = Eigenpairs::from_states(self.matter.hamiltonian(), x0)?;
        self.solve(photons, Some(init))
    }

    /// Apply exactly `iterations` mixed updates from `init`, without any
    /// convergence test, and return the final iterate.
    pub fn iterate_n(&self, photons: &[(f64, f64)], init: Eigenpairs, iterations: usize)
        -> Result<Eigenpairs>
    {
        self.check_iterate(&init)?;
        let n = self.matter.dim();
        let mut mixer = AndersonMixer::new(self.config.mixing_depth, self.config.damping);
        let mut current = init;
        for _ in 0..iterations {
            let (candidate, _) = self.step(photons, &current)?;
            let next = mixer.mix(&pack(&current), &pack(&candidate));
            current = unpack(&next, n)?;
        }
        Ok(current)
    }
}
