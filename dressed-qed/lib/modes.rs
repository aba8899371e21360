//! Dressed photon mode profiles.
//!
//! At a root `ω_n` of `det(I + λ G(r0, r0, ω))`, the emitter-point amplitude
//! `F_n(r0)` lies along the null vector `v` of `A = I + λ G(r0, r0, ω_n)` and the
//! rest of the profile follows from
//! ```text
//! F_n(r) = -λ G(r, r0, ω_n) F_n(r0)
//! ```
//! which reproduces `F_n(r0)` at `r = r0` because `A v = 0`.
//!
//! The scale of `F_n(r0) = s v` is fixed by unit-residue normalization,
//! ```text
//! s² = 2 ω_n / Re(v† λ ∂G/∂ω λ† v)
//! ```
//! which makes `F_n F_n†` the residue (in `ω²`) of the dressed propagator
//! `G (I + λ G)⁻¹`. This reduces to the vacuum profiles as `λ → 0` and
//! preserves the completeness sum rule `Σ_n |F_n(r0)|² = Σ_k |F_k0(r0)|²`.
//!
//! Everything is evaluated with the nearest coupled pole `p` split off,
//! `G = G' + F_p F_p† / x` with `x = ω_p² - ω²`, so roots arbitrarily close
//! to `ω_p` stay finite:
//! ```text
//! s  = |x| √(2 ω_n / N),   N = x² Re(u† ∂G'/∂ω u) + 2 ω_n |F_p(r0)† u|²,   u = λ† v
//! F_n(r) = -(s / x) λ (x G'(r, r0) + F_p(r) F_p(r0)†) v
//! ```
//! Decoupled vacuum modes are returned unchanged.

use ndarray::{ self as nd, s };
use ndarray_linalg::{ EighInto, UPLO };
use num_complex::Complex64 as C64;
use tracing::info;
use crate::{
    config::SolverConfig,
    error::{ Error, Result },
    green::SpectralGreen,
    roots::{ DressedRoot, RootDiagnostics, determinant, partition_modes },
    utils::{ adjoint, outer_prod, vec_norm },
};

/// A dressed photon eigenmode.
#[derive(Clone, Debug, PartialEq)]
pub struct DressedMode {
    pub frequency: f64,
    /// `F_n(r0)`, the amplitude seen by the emitter.
    pub emitter: nd::Array1<C64>,
    /// `F_n(r)` over the full grid, as a `n_points × d` array.
    pub profile: nd::Array2<C64>,
    /// Convergence record of the root this mode was built from.
    pub root: RootDiagnostics,
}

impl DressedMode {
    /// `|F_n(r0)|²`, the weight of this mode in the matter self-energy.
    pub fn weight(&self) -> f64 { vec_norm(&self.emitter).powi(2) }
}

/// Unit null vector of a small matrix, with its largest component made real
/// and positive.
fn null_vector(a: &nd::Array2<C64>) -> Result<nd::Array1<C64>> {
    if a.nrows() == 1 {
        return Ok(nd::array![C64::from(1.0)]);
    }
    let (_, vecs) = adjoint(a).dot(a).eigh_into(UPLO::Lower)?;
    let v = vecs.column(0).to_owned();
    let pivot
        = v.iter()
        .fold(C64::from(0.0), |acc, z| if z.norm() > acc.norm() { *z } else { acc });
    let phase = pivot.conj() / pivot.norm();
    Ok(v.mapv(|z| z * phase))
}

/// Turns converged dressed frequencies into normalized mode profiles.
#[derive(Clone, Debug)]
pub struct PhotonModeReconstructor<'a> {
    green: SpectralGreen<'a>,
    emitter: usize,
    lambda: &'a nd::Array2<C64>,
    coupled: Vec<usize>,
}

impl<'a> PhotonModeReconstructor<'a> {
    /// Create a new `PhotonModeReconstructor`, splitting off decoupled modes
    /// with the same threshold as the root solver.
    pub fn new(
        green: SpectralGreen<'a>,
        emitter: usize,
        lambda: &'a nd::Array2<C64>,
        config: &SolverConfig,
    ) -> Result<Self>
    {
        let d = green.photon().dim();
        if lambda.dim() != (d, d) {
            return Err(Error::invalid(format!(
                "coupling matrix has shape {:?}; expected ({d}, {d})",
                lambda.shape(),
            )));
        }
        green.photon().check_point(emitter)?;
        let (coupled, _)
            = partition_modes(green.photon(), emitter, lambda, config.decoupling_threshold);
        Ok(Self { green, emitter, lambda, coupled })
    }

    fn vacuum_mode(&self, root: &DressedRoot) -> Result<DressedMode> {
        let photon = self.green.photon();
        let k = root.diagnostics.mode;
        if k >= photon.num_modes() {
            return Err(Error::invalid(format!(
                "root refers to vacuum mode {k} of {}", photon.num_modes())));
        }
        let profile = photon.profiles().slice(s![k, .., ..]).to_owned();
        let emitter = profile.row(self.emitter).to_owned();
        Ok(DressedMode {
            frequency: root.frequency,
            emitter,
            profile,
            root: root.diagnostics,
        })
    }

    /// `x = ω_p² - ω²` for a root next to pole `p`.
    ///
    /// `ω_p² - ω²` loses digits as `ω → ω_p`, so `x` is taken from the cleared
    /// pole equation `x det M + det(M + R) - det M = 0` whenever that agrees
    /// with `ω`, and always inside the pole exclusion zone.
    fn pole_offset(&self, p: usize, omega: f64, m: &nd::Array2<C64>, residue: &nd::Array2<C64>)
        -> Result<f64>
    {
        let wp = self.green.photon().frequencies()[p];
        let x = wp * wp - omega * omega;
        let det_m = determinant(m)?;
        let det_mr = determinant(&(m + residue))?;
        let x_eff = -((det_mr - det_m) / det_m).re;
        let near = (omega - wp).abs() <= 2.0 * self.green.pole_epsilon();
        let agrees = (x_eff - x).abs() <= 1e-3 * x.abs();
        Ok(if x_eff.is_finite() && x_eff != 0.0 && (near || agrees) { x_eff } else { x })
    }

    /// Build the normalized dressed mode for one converged root.
    pub fn reconstruct(&self, root: &DressedRoot) -> Result<DressedMode> {
        if root.diagnostics.decoupled || self.coupled.is_empty() {
            return self.vacuum_mode(root);
        }
        let omega = root.frequency;
        let photon = self.green.photon();
        let freqs = photon.frequencies();
        let r0 = self.emitter;
        let d = self.lambda.nrows();
        let p
            = self.coupled.iter().copied()
            .min_by(|a, b| (freqs[*a] - omega).abs().total_cmp(&(freqs[*b] - omega).abs()))
            .ok_or_else(|| Error::invalid("no coupled vacuum modes"))?;
        let rest: Vec<usize> = self.coupled.iter().copied().filter(|k| *k != p).collect();

        let fp = photon.profile(p, r0);
        let residue: nd::Array2<C64> = self.lambda.dot(&outer_prod(&fp, &fp));
        let g = self.green.evaluate_over(&rest, r0, r0, omega)?;
        let m: nd::Array2<C64> = nd::Array2::eye(d) + self.lambda.dot(&g);
        let x = self.pole_offset(p, omega, &m, &residue)?;
        let v = null_vector(&(&m * C64::from(x) + &residue))?;

        let u = adjoint(self.lambda).dot(&v);
        let dg = self.green.derivative_over(&rest, r0, r0, omega)?;
        let smooth: f64
            = u.iter().zip(dg.dot(&u).iter())
            .map(|(a, b)| a.conj() * b)
            .sum::<C64>()
            .re;
        let overlap: C64 = fp.iter().zip(u.iter()).map(|(a, b)| a.conj() * b).sum();
        let norm = x * x * smooth + 2.0 * omega * overlap.norm_sqr();
        if !(norm.is_finite() && norm > 0.0) {
            return Err(Error::DegenerateMode { mode: root.diagnostics.mode, omega, norm });
        }
        // t = s / |x|
        let t = (2.0 * omega / norm).sqrt();
        let emitter: nd::Array1<C64> = v.mapv(|z| z * (x.abs() * t));

        let fp_v: C64 = fp.iter().zip(v.iter()).map(|(a, b)| a.conj() * b).sum();
        let column = self.green.evaluate_column_over(&rest, r0, omega)?;
        let n = photon.num_points();
        let mut profile: nd::Array2<C64> = nd::Array2::zeros((n, d));
        for (r, (g_r, mut row)) in column.outer_iter().zip(profile.outer_iter_mut()).enumerate() {
            let inner = g_r.dot(&v) * C64::from(x) + photon.profile(p, r).mapv(|z| z * fp_v);
            row.assign(&self.lambda.dot(&inner).mapv(|z| z * (-x.signum() * t)));
        }
        Ok(DressedMode { frequency: omega, emitter, profile, root: root.diagnostics })
    }

    /// Build every dressed mode, in the order of `roots`.
    pub fn reconstruct_all(&self, roots: &[DressedRoot]) -> Result<Vec<DressedMode>> {
        let modes: Vec<DressedMode>
            = roots.iter()
            .map(|root| self.reconstruct(root))
            .collect::<Result<_>>()?;
        info!(
            n = modes.len(),
            sum_rule = sum_rule_violation(&modes, self.green, self.emitter),
            "reconstructed dressed photon modes"
        );
        Ok(modes)
    }
}

/// Relative violation of the completeness sum rule at the emitter,
/// `|Σ_n |F_n(r0)|² - Σ_k |F_k0(r0)|²| / Σ_k |F_k0(r0)|²`.
///
/// Returns the absolute violation if the vacuum sum vanishes.
pub fn sum_rule_violation(modes: &[DressedMode], green: SpectralGreen, emitter: usize)
    -> f64
{
    let photon = green.photon();
    let dressed: f64 = modes.iter().map(DressedMode::weight).sum();
    let vacuum: f64
        = (0..photon.num_modes())
        .map(|k| vec_norm(&photon.profile(k, emitter)).powi(2))
        .sum();
    let diff = (dressed - vacuum).abs();
    if vacuum > 0.0 { diff / vacuum } else { diff }
}
