//! Dressed photon frequencies as roots of the pole equation
//!
//! ```text
//! f(ω) = det(I_d + λ G(r0, r0, ω)) = 0
//! ```
//!
//! Vacuum modes that `λ` cannot see from the emitter (`λ F_k(r0) ≈ 0`, e.g.
//! an emitter on a node) are decoupled: they keep their vacuum frequency and
//! their poles are left out of `f`. The remaining poles split the axis into
//! brackets, plus one edge bracket whose side follows the sign of `λ`.
//!
//! Inside a bracket, `f` is sampled away from the poles and every sign change
//! is refined by a Newton iteration safeguarded by bisection, so no trial point
//! leaves its sub-bracket. Right next to a pole `ω_p`, where `f` can't be
//! evaluated, its sign comes from the pole-cleared function
//! ```text
//! h_p(ω) = (ω_p² - ω²) f(ω)
//! ```
//! which stays finite at `ω_p` because every pole of `G` has rank one. Roots
//! inside the exclusion zone are bisected on `h_p` to machine precision.
//!
//! For `d = 1`, `f` is monotone between poles and each bracket holds exactly
//! one root. For `d > 1` a bracket may hold several roots or none, so the
//! sampling is refined until there is exactly one root per coupled mode.

use itertools::Itertools;
use ndarray as nd;
use ndarray_linalg::Determinant;
use num_complex::Complex64 as C64;
use num_traits::{ One, Zero };
use tracing::{ debug, info };
use crate::{
    config::{ BracketPolicy, EdgeRule, SolverConfig },
    error::{ Error, Result },
    green::SpectralGreen,
    photon::PhotonSystem,
    utils::{ outer_prod, vec_norm },
};

/// Upper limit on interior samples per bracket.
const MAX_SCAN_POINTS: f64 = 65536.0;

/// Which side of the vacuum spectrum holds the single edge bracket.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EdgeSide {
    /// `(ω_N, ω_N + span)`: every vacuum mode is dressed upward.
    Above,
    /// `(ω_1 - span, ω_1)`: every vacuum mode is dressed downward.
    Below,
}

impl EdgeSide {
    /// Resolve an [`EdgeRule`] for a given coupling matrix.
    pub fn resolve(rule: EdgeRule, lambda: &nd::Array2<C64>) -> Self {
        match rule {
            EdgeRule::Above => Self::Above,
            EdgeRule::Below => Self::Below,
            EdgeRule::Auto => {
                if lambda.diag().iter().map(|z| z.re).sum::<f64>() >= 0.0 {
                    Self::Above
                } else {
                    Self::Below
                }
            },
        }
    }
}

/// A search interval between two poles, or between a pole and a policy
/// chosen outer end.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Bracket {
    /// Index of the vacuum mode this root connects to as `λ → 0` (for
    /// `d = 1`).
    pub mode: usize,
    pub lower: f64,
    pub upper: f64,
    /// Vacuum modes whose poles sit at `lower` and `upper`.
    pub lower_pole: Option<usize>,
    pub upper_pole: Option<usize>,
    /// `Some` for the half-open edge bracket.
    pub edge: Option<EdgeSide>,
}

impl Bracket {
    /// Widen an edge bracket by `factor` away from its pole. Interior brackets
    /// are returned unchanged.
    pub fn expanded(&self, factor: f64) -> Self {
        let width = self.upper - self.lower;
        match self.edge {
            Some(EdgeSide::Above) => Self { upper: self.lower + factor * width, ..*self },
            Some(EdgeSide::Below) => {
                Self { lower: (self.upper - factor * width).max(0.0), ..*self }
            },
            None => *self,
        }
    }
}

/// Build the `N_p` brackets for a sorted list of vacuum frequencies. Mode and
/// pole indices refer to positions in `frequencies`.
pub fn brackets(
    frequencies: &nd::Array1<f64>,
    side: EdgeSide,
    policy: &BracketPolicy,
) -> Vec<Bracket>
{
    let n = frequencies.len();
    if n == 0 { return Vec::new(); }
    let interior
        = frequencies.iter().copied().tuple_windows().enumerate()
        .map(|(k, (lower, upper))| {
            let mode = match side {
                EdgeSide::Above => k,
                EdgeSide::Below => k + 1,
            };
            Bracket {
                mode,
                lower,
                upper,
                lower_pole: Some(k),
                upper_pole: Some(k + 1),
                edge: None,
            }
        });
    match side {
        EdgeSide::Above => {
            let top = frequencies[n - 1];
            let spacing = if n > 1 { top - frequencies[n - 2] } else { top };
            let edge = Bracket {
                mode: n - 1,
                lower: top,
                upper: top + policy.edge_span * spacing,
                lower_pole: Some(n - 1),
                upper_pole: None,
                edge: Some(EdgeSide::Above),
            };
            interior.chain([edge]).collect()
        },
        EdgeSide::Below => {
            let bottom = frequencies[0];
            let spacing = if n > 1 { frequencies[1] - bottom } else { bottom };
            let edge = Bracket {
                mode: 0,
                lower: (bottom - policy.edge_span * spacing).max(0.0),
                upper: bottom,
                lower_pole: None,
                upper_pole: Some(0),
                edge: Some(EdgeSide::Below),
            };
            [edge].into_iter().chain(interior).collect()
        },
    }
}

/// Split the vacuum modes into those coupled to the emitter through `λ` and
/// those that are not.
///
/// Mode `k` is decoupled when `|λ F_k(r0)|² ≤ threshold · |λ|² max_j
/// |F_j(r0)|²`, so `λ = 0` decouples everything.
pub fn partition_modes(
    photon: &PhotonSystem,
    emitter: usize,
    lambda: &nd::Array2<C64>,
    threshold: f64,
) -> (Vec<usize>, Vec<usize>)
{
    let lambda_norm2: f64 = lambda.iter().map(|z| z.norm_sqr()).sum();
    let peak: f64
        = (0..photon.num_modes())
        .map(|k| vec_norm(&photon.profile(k, emitter)).powi(2))
        .fold(0.0, f64::max);
    let cutoff = threshold * lambda_norm2 * peak;
    (0..photon.num_modes())
        .partition(|k| {
            vec_norm(&lambda.dot(&photon.profile(*k, emitter))).powi(2) > cutoff
        })
}

/// Determinant of a small square matrix.
pub fn determinant(a: &nd::Array2<C64>) -> Result<C64> {
    match a.nrows() {
        0 => Ok(C64::one()),
        1 => Ok(a[[0, 0]]),
        2 => Ok(a[[0, 0]] * a[[1, 1]] - a[[0, 1]] * a[[1, 0]]),
        _ => Ok(a.det()?),
    }
}

/// Determinant and adjugate of a small square matrix.
pub fn det_adjugate(a: &nd::Array2<C64>) -> Result<(C64, nd::Array2<C64>)> {
    let d = a.nrows();
    let det = determinant(a)?;
    match d {
        0 => Ok((det, nd::Array2::zeros((0, 0)))),
        1 => Ok((det, nd::array![[C64::one()]])),
        2 => Ok((det, nd::array![[a[[1, 1]], -a[[0, 1]]], [-a[[1, 0]], a[[0, 0]]]])),
        _ => {
            let mut adj: nd::Array2<C64> = nd::Array2::zeros((d, d));
            for i in 0..d {
                for j in 0..d {
                    // adj_ij = (-1)^(i+j) * det(a without row j, column i)
                    let minor: nd::Array2<C64>
                        = nd::Array2::from_shape_fn((d - 1, d - 1), |(m, n)| {
                            a[[m + usize::from(m >= j), n + usize::from(n >= i)]]
                        });
                    let sign = if (i + j) % 2 == 0 { 1.0 } else { -1.0 };
                    adj[[i, j]] = minor.det()? * sign;
                }
            }
            Ok((det, adj))
        },
    }
}

/// Convergence record for one dressed frequency.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RootDiagnostics {
    pub mode: usize,
    /// Bracket searched, after any edge expansion.
    pub lower: f64,
    pub upper: f64,
    pub iterations: usize,
    /// `|f(ω)|` at the last evaluated point, or `|h_p(ω)|` for a root inside a
    /// pole exclusion zone.
    pub residual: f64,
    /// Number of bisection steps, including all steps on `h_p`.
    pub bisection_steps: usize,
    /// Number of edge-bracket doublings.
    pub expansions: usize,
    /// The vacuum mode doesn't couple to the emitter and kept its vacuum
    /// frequency.
    pub decoupled: bool,
    pub converged: bool,
}

/// A converged dressed photon frequency.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DressedRoot {
    pub frequency: f64,
    pub diagnostics: RootDiagnostics,
}

/// Sign information for `f` at one point of a bracket. At a pole, `value`
/// only carries the sign of `f` on the bracket side of the pole.
#[derive(Copy, Clone, Debug)]
struct Sample {
    omega: f64,
    value: f64,
    pole: Option<usize>,
}

/// Finds the `N_p` dressed frequencies for a fixed coupling `λ`.
#[derive(Clone, Debug)]
pub struct PhotonRootSolver<'a> {
    green: SpectralGreen<'a>,
    emitter: usize,
    lambda: &'a nd::Array2<C64>,
    config: &'a SolverConfig,
    coupled: Vec<usize>,
    decoupled: Vec<usize>,
}

impl<'a> PhotonRootSolver<'a> {
    /// Create a new `PhotonRootSolver`.
    ///
    /// Fails if `lambda` is not `d × d` or the emitter index is off the grid.
    pub fn new(
        green: SpectralGreen<'a>,
        emitter: usize,
        lambda: &'a nd::Array2<C64>,
        config: &'a SolverConfig,
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
        let (coupled, decoupled)
            = partition_modes(green.photon(), emitter, lambda, config.decoupling_threshold);
        Ok(Self { green, emitter, lambda, config, coupled, decoupled })
    }

    /// Return `true` if no vacuum mode couples to the emitter, e.g. for
    /// `λ = 0`.
    pub fn is_decoupled(&self) -> bool { self.coupled.is_empty() }

    /// Vacuum modes whose poles enter `f`.
    pub fn coupled_modes(&self) -> &[usize] { &self.coupled }

    /// Vacuum modes that keep their vacuum frequency.
    pub fn decoupled_modes(&self) -> &[usize] { &self.decoupled }

    /// The brackets that [`Self::solve`] will search, before any expansion.
    pub fn brackets(&self) -> Vec<Bracket> {
        let freqs = self.green.photon().frequencies();
        let coupled: nd::Array1<f64> = self.coupled.iter().map(|k| freqs[*k]).collect();
        let side = EdgeSide::resolve(self.config.bracket.edge, self.lambda);
        brackets(&coupled, side, &self.config.bracket).into_iter()
            .map(|b| Bracket {
                mode: self.coupled[b.mode],
                lower_pole: b.lower_pole.map(|k| self.coupled[k]),
                upper_pole: b.upper_pole.map(|k| self.coupled[k]),
                ..b
            })
            .collect()
    }

    /// Evaluate `f(ω)` and `f'(ω)` over the coupled modes.
    ///
    /// `f' = tr(adj(A) λ ∂G/∂ω)` for `A = I + λ G`. Only real parts are kept;
    /// both are exactly real for Hermitian `λ` commuting with `G` (e.g. any
    /// scalar coupling) and Hermitian mode data.
    pub fn pole_function(&self, omega: f64) -> Result<(f64, f64)> {
        let r0 = self.emitter;
        let d = self.lambda.nrows();
        let g = self.green.evaluate_over(&self.coupled, r0, r0, omega)?;
        let dg = self.green.derivative_over(&self.coupled, r0, r0, omega)?;
        let a: nd::Array2<C64> = nd::Array2::eye(d) + self.lambda.dot(&g);
        let (det, adj) = det_adjugate(&a)?;
        let ddet: C64 = adj.dot(&self.lambda.dot(&dg)).diag().sum();
        Ok((det.re, ddet.re))
    }

    /// Evaluate `h_p(ω) = (ω_p² - ω²) f(ω)` for a coupled mode `p`.
    ///
    /// With `M = I + λ G'` (`G'` summing every coupled mode but `p`) and
    /// `R = λ F_p(r0) F_p(r0)†` of rank one, `det(M + t R)` is affine in `t`,
    /// so `h_p = x det M + det(M + R) - det M` for `x = ω_p² - ω²`. This is
    /// finite at `ω = ω_p`.
    pub fn cleared_function(&self, p: usize, omega: f64) -> Result<f64> {
        let r0 = self.emitter;
        let d = self.lambda.nrows();
        let photon = self.green.photon();
        let rest: Vec<usize> = self.coupled.iter().copied().filter(|k| *k != p).collect();
        let g = self.green.evaluate_over(&rest, r0, r0, omega)?;
        let m: nd::Array2<C64> = nd::Array2::eye(d) + self.lambda.dot(&g);
        let fp = photon.profile(p, r0);
        let residue: nd::Array2<C64> = self.lambda.dot(&outer_prod(&fp, &fp));
        let det_m = determinant(&m)?;
        let det_mr = determinant(&(&m + &residue))?;
        let wp = photon.frequencies()[p];
        Ok(((wp * wp - omega * omega) * det_m + det_mr - det_m).re)
    }

    fn not_found(&self, bracket: &Bracket, iterations: usize, residual: f64, reason: &str)
        -> Error
    {
        Error::RootNotFound {
            mode: bracket.mode,
            lower: bracket.lower,
            upper: bracket.upper,
            iterations,
            residual,
            reason: reason.to_string(),
        }
    }

    fn root(
        &self,
        bracket: &Bracket,
        frequency: f64,
        iterations: usize,
        residual: f64,
        bisection_steps: usize,
    ) -> DressedRoot
    {
        DressedRoot {
            frequency,
            diagnostics: RootDiagnostics {
                mode: bracket.mode,
                lower: bracket.lower,
                upper: bracket.upper,
                iterations,
                residual,
                bisection_steps,
                expansions: 0,
                decoupled: false,
                converged: true,
            },
        }
    }

    fn vacuum_root(&self, k: usize) -> DressedRoot {
        let w = self.green.photon().frequencies()[k];
        DressedRoot {
            frequency: w,
            diagnostics: RootDiagnostics {
                mode: k,
                lower: w,
                upper: w,
                iterations: 0,
                residual: 0.0,
                bisection_steps: 0,
                expansions: 0,
                decoupled: true,
                converged: true,
            },
        }
    }

    /// Sign of `f` just inside the bracket next to the pole of mode `p`, or
    /// `None` if `h_p` vanishes there. `side` is `-1` for a lower pole and
    /// `+1` for an upper one, the sign of `ω_p² - ω²` on the bracket side
    /// flipped.
    fn pole_sample(&self, p: usize, side: f64) -> Result<Option<Sample>> {
        let wp = self.green.photon().frequencies()[p];
        let h = self.cleared_function(p, wp)?;
        if h == 0.0 { return Ok(None); }
        Ok(Some(Sample { omega: wp, value: side * h.signum(), pole: Some(p) }))
    }

    /// Find every sign change of `f` in one bracket, sampling `n_interior`
    /// points between the pole exclusion zones.
    pub fn scan_bracket(&self, bracket: &Bracket, n_interior: usize)
        -> Result<Vec<DressedRoot>>
    {
        let inset = 2.0 * self.green.pole_epsilon();
        let a = if bracket.lower_pole.is_some() { bracket.lower + inset } else { bracket.lower };
        let b = if bracket.upper_pole.is_some() { bracket.upper - inset } else { bracket.upper };
        if a >= b {
            return Err(self.not_found(bracket, 0, f64::NAN,
                "bracket narrower than the pole exclusion zone"));
        }

        let mut samples: Vec<Sample> = Vec::with_capacity(n_interior + 4);
        if let Some(p) = bracket.lower_pole {
            samples.extend(self.pole_sample(p, -1.0)?);
        }
        let step = (b - a) / (n_interior + 1) as f64;
        for j in 0..=n_interior + 1 {
            let omega = if j == n_interior + 1 { b } else { a + step * j as f64 };
            samples.push(Sample { omega, value: self.pole_function(omega)?.0, pole: None });
        }
        if let Some(p) = bracket.upper_pole {
            samples.extend(self.pole_sample(p, 1.0)?);
        }

        let mut roots: Vec<DressedRoot>
            = samples.iter()
            .filter(|s| s.pole.is_none() && s.value == 0.0)
            .map(|s| self.root(bracket, s.omega, 0, 0.0, 0))
            .collect();
        for (lo, hi) in samples.iter().tuple_windows() {
            if lo.value * hi.value >= 0.0 { continue; }
            let root
                = match (lo.pole, hi.pole) {
                    (Some(p), _) | (_, Some(p)) => {
                        self.bisect_cleared(bracket, p, lo.omega, hi.omega)?
                    },
                    (None, None) => {
                        self.newton(bracket, (lo.omega, lo.value), hi.omega)?
                    },
                };
            roots.push(root);
        }
        Ok(roots)
    }

    /// Bisect `h_p` on a sub-bracket touching the pole of mode `p`, down to
    /// adjacent floats.
    fn bisect_cleared(&self, bracket: &Bracket, p: usize, lo: f64, hi: f64)
        -> Result<DressedRoot>
    {
        let (mut lo, mut hi) = (lo, hi);
        let mut h_lo = self.cleared_function(p, lo)?;
        let mut residual = h_lo.abs();
        for iter in 1..=self.config.root_max_iter {
            let mid = 0.5 * (lo + hi);
            let h_mid = self.cleared_function(p, mid)?;
            residual = h_mid.abs();
            if h_mid == 0.0 || mid <= lo || mid >= hi {
                debug!(mode = bracket.mode, pole = p, iter, omega = mid, residual, "root converged next to pole");
                return Ok(self.root(bracket, mid, iter, residual, iter));
            }
            if (h_mid < 0.0) == (h_lo < 0.0) {
                lo = mid;
                h_lo = h_mid;
            } else {
                hi = mid;
            }
        }
        Err(self.not_found(bracket, self.config.root_max_iter, residual, "iteration cap reached"))
    }

    /// Safeguarded Newton iteration on `f` over a sign-change sub-bracket.
    fn newton(&self, bracket: &Bracket, (a, fa): (f64, f64), b: f64)
        -> Result<DressedRoot>
    {
        let tol = self.config.root_tolerance;
        // keep f(x_neg) < 0 < f(x_pos)
        let (mut x_neg, mut x_pos) = if fa < 0.0 { (a, b) } else { (b, a) };
        let mut x = 0.5 * (a + b);
        let mut residual = f64::INFINITY;
        let mut bisection_steps: usize = 0;
        for iter in 1..=self.config.root_max_iter {
            let (fx, dfx) = self.pole_function(x)?;
            residual = fx.abs();
            if residual < tol {
                debug!(mode = bracket.mode, iter, omega = x, residual, "root converged on |f|");
                return Ok(self.root(bracket, x, iter, residual, bisection_steps));
            }
            if fx < 0.0 { x_neg = x; } else { x_pos = x; }
            let lo = x_neg.min(x_pos);
            let hi = x_neg.max(x_pos);
            let newton = x - fx / dfx;
            let next
                = if newton.is_finite() && newton > lo && newton < hi {
                    newton
                } else {
                    bisection_steps += 1;
                    0.5 * (lo + hi)
                };
            if (next - x).abs() < tol {
                debug!(mode = bracket.mode, iter, omega = next, residual, "root converged on step");
                return Ok(self.root(bracket, next, iter, residual, bisection_steps));
            }
            x = next;
        }
        Err(self.not_found(bracket, self.config.root_max_iter, residual, "iteration cap reached"))
    }

    /// Search every bracket until one root per coupled mode is found, widening
    /// the edge bracket (and for `d > 1` refining the scan) each round.
    fn solve_coupled(&self) -> Result<Vec<DressedRoot>> {
        let n = self.coupled.len();
        let base = self.brackets();
        let scan_points
            = if self.lambda.nrows() == 1 { 0 } else { self.config.bracket.scan_points };
        let mut found: Vec<DressedRoot> = Vec::new();
        let mut searched: Vec<Bracket> = Vec::new();
        for round in 0..=self.config.bracket.max_expansions {
            let factor = 2.0_f64.powi(round as i32);
            let n_interior = (scan_points as f64 * factor).min(MAX_SCAN_POINTS) as usize;
            found.clear();
            searched.clear();
            for bracket in &base {
                let bracket = bracket.expanded(factor);
                let expansions = if bracket.edge.is_some() { round } else { 0 };
                found.extend(
                    self.scan_bracket(&bracket, n_interior)?.into_iter()
                    .map(|mut root| { root.diagnostics.expansions = expansions; root })
                );
                searched.push(bracket);
            }
            if found.len() >= n { break; }
            debug!(round, found = found.len(), expected = n, "widening root search");
        }
        if found.len() != n {
            let reason = format!("found {} roots for {n} coupled modes", found.len());
            let bracket
                = searched.iter()
                .find(|b| !found.iter().any(|r| r.diagnostics.mode == b.mode))
                .or(searched.first())
                .copied()
                .ok_or_else(|| Error::invalid("no brackets to search"))?;
            let residual = found.iter().map(|r| r.diagnostics.residual).fold(0.0, f64::max);
            return Err(self.not_found(&bracket, 0, residual, &reason));
        }
        found.sort_by(|a, b| a.frequency.total_cmp(&b.frequency));
        // the n-th root connects to the n-th coupled vacuum mode as λ → 0
        for (root, k) in found.iter_mut().zip(&self.coupled) {
            root.diagnostics.mode = *k;
        }
        Ok(found)
    }

    /// Find all `N_p` dressed frequencies, sorted ascending.
    ///
    /// Decoupled modes contribute their vacuum frequency. A failure to find
    /// every coupled root fails the whole solve.
    pub fn solve(&self) -> Result<Vec<DressedRoot>> {
        let mut roots: Vec<DressedRoot>
            = self.decoupled.iter().map(|k| self.vacuum_root(*k)).collect();
        if self.is_decoupled() {
            info!("no vacuum mode couples to the emitter; returning vacuum frequencies");
        } else {
            if !self.decoupled.is_empty() {
                info!(modes = ?self.decoupled, "vacuum modes decoupled from the emitter");
            }
            roots.extend(self.solve_coupled()?);
        }
        roots.sort_by(|a, b| a.frequency.total_cmp(&b.frequency));
        info!(
            roots = ?roots.iter().map(|r| r.frequency).collect::<Vec<_>>(),
            "found dressed photon frequencies"
        );
        Ok(roots)
    }
}

#[cfg(test)]
mod test {
    use std::f64::consts::PI;
    use super::*;
    use crate::photon::PhotonSystem;

    fn scalar(l: f64) -> nd::Array2<C64> { nd::array![[C64::from(l)]] }

    #[test]
    fn decoupled_roots_are_vacuum_frequencies() {
        let photon = PhotonSystem::standing_wave(5, PI, 101).unwrap();
        let config = SolverConfig::default();
        let green = SpectralGreen::new(&photon, config.pole_epsilon);
        let lambda = scalar(0.0);
        let roots = PhotonRootSolver::new(green, 30, &lambda, &config).unwrap()
            .solve().unwrap();
        let freqs: Vec<f64> = roots.iter().map(|r| r.frequency).collect();
        assert_eq!(freqs, photon.frequencies().to_vec());
        assert!(roots.iter().all(|r| r.diagnostics.decoupled));
    }

    // first-order shift from ω² = ω_k² + λ |F_k(r0)|², without cancellation
    fn weak_shift(photon: &PhotonSystem, r0: usize, k: usize, l: f64) -> f64 {
        let wk = photon.frequencies()[k];
        let lw = l * photon.profile(k, r0)[0].norm_sqr();
        lw / (wk + (wk * wk + lw).sqrt())
    }

    #[test]
    fn weak_coupling_is_continuous_at_zero() {
        let photon = PhotonSystem::standing_wave(5, PI, 101).unwrap();
        let config = SolverConfig::default();
        let green = SpectralGreen::new(&photon, config.pole_epsilon);
        for r0 in [30, 50] {
            for l in [1e-9, 1e-12, -1e-9, -1e-12] {
                let lambda = scalar(l);
                let roots = PhotonRootSolver::new(green, r0, &lambda, &config).unwrap()
                    .solve().unwrap();
                assert_eq!(roots.len(), 5);
                for (k, root) in roots.iter().enumerate() {
                    let wk = photon.frequencies()[k];
                    assert_eq!(root.diagnostics.mode, k);
                    let expected
                        = if root.diagnostics.decoupled { 0.0 } else { weak_shift(&photon, r0, k, l) };
                    let shift = root.frequency - wk;
                    assert!(
                        (shift - expected).abs() < 2e-2 * expected.abs() + 4.0 * f64::EPSILON * wk,
                        "r0 = {r0}, λ = {l}, mode {k}: shift {shift:e}, expected {expected:e}",
                    );
                }
            }
        }
    }

    #[test]
    fn emitter_on_a_node_decouples_the_mode() {
        let photon = PhotonSystem::standing_wave(5, PI, 101).unwrap();
        let config = SolverConfig::default();
        let green = SpectralGreen::new(&photon, config.pole_epsilon);
        let lambda = scalar(0.05);
        // x = L/2 and x = L/5
        for (r0, nodes) in [(50, vec![1, 3]), (20, vec![4])] {
            let solver = PhotonRootSolver::new(green, r0, &lambda, &config).unwrap();
            assert_eq!(solver.decoupled_modes(), nodes.as_slice());
            let roots = solver.solve().unwrap();
            assert_eq!(roots.len(), 5);
            for (k, root) in roots.iter().enumerate() {
                let wk = photon.frequencies()[k];
                assert_eq!(root.diagnostics.mode, k);
                assert_eq!(root.diagnostics.decoupled, nodes.contains(&k));
                if root.diagnostics.decoupled {
                    assert_eq!(root.frequency, wk);
                } else {
                    assert!(root.frequency > wk && root.frequency < wk + 1.0);
                    assert!(solver.pole_function(root.frequency).unwrap().0.abs() < 1e-8);
                }
            }
        }
    }

    #[test]
    fn cleared_function_removes_one_pole() {
        let photon = PhotonSystem::standing_wave(5, PI, 101).unwrap();
        let config = SolverConfig::default();
        let green = SpectralGreen::new(&photon, config.pole_epsilon);
        let lambda = scalar(0.3);
        let solver = PhotonRootSolver::new(green, 30, &lambda, &config).unwrap();
        let omega = 2.4;
        let f = solver.pole_function(omega).unwrap().0;
        let h = solver.cleared_function(1, omega).unwrap();
        assert!((h - (4.0 - omega * omega) * f).abs() < 1e-12);
        // finite at the pole, where it equals λ |F_1(r0)|²
        let at_pole = solver.cleared_function(1, 2.0).unwrap();
        assert!((at_pole - 0.3 * photon.profile(1, 30)[0].norm_sqr()).abs() < 1e-12);
    }

    #[test]
    fn single_mode_matches_closed_form() {
        // 1 + λ c² / (ω1² - ω²) = 0  =>  ω² = ω1² + λ c²
        let photon = PhotonSystem::from_fn(
            nd::array![1.0],
            nd::array![0.0],
            1,
            |_, _| nd::array![C64::from(0.8)],
        ).unwrap();
        let config = SolverConfig::default();
        let green = SpectralGreen::new(&photon, config.pole_epsilon);
        for l in [0.3, -0.3, 10.0] {
            let lambda = scalar(l);
            let roots = PhotonRootSolver::new(green, 0, &lambda, &config).unwrap()
                .solve().unwrap();
            assert_eq!(roots.len(), 1);
            let expected = (1.0 + l * 0.64).sqrt();
            assert!((roots[0].frequency - expected).abs() < 1e-10);
        }
    }

    #[test]
    fn edge_expansion_is_bounded() {
        let photon = PhotonSystem::from_fn(
            nd::array![1.0], nd::array![0.0], 1, |_, _| nd::array![C64::from(1.0)],
        ).unwrap();
        let mut config = SolverConfig::default();
        let green = SpectralGreen::new(&photon, config.pole_epsilon);
        let lambda = scalar(10.0);
        let root = PhotonRootSolver::new(green, 0, &lambda, &config).unwrap()
            .solve().unwrap()[0];
        assert_eq!(root.diagnostics.expansions, 2);
        assert!((root.frequency - 11.0_f64.sqrt()).abs() < 1e-10);

        config.bracket.max_expansions = 0;
        let res = PhotonRootSolver::new(green, 0, &lambda, &config).unwrap().solve();
        assert!(matches!(res, Err(Error::RootNotFound { mode: 0, .. })));
    }

    #[test]
    fn roots_fill_every_bracket_strictly() {
        let photon = PhotonSystem::standing_wave(5, PI, 101).unwrap();
        let config = SolverConfig::default();
        let green = SpectralGreen::new(&photon, config.pole_epsilon);
        for l in [0.05, -0.05] {
            let lambda = scalar(l);
            let solver = PhotonRootSolver::new(green, 30, &lambda, &config).unwrap();
            let brackets = solver.brackets();
            let roots = solver.solve().unwrap();
            assert_eq!(roots.len(), 5);
            for (root, bracket) in roots.iter().zip(&brackets) {
                assert!(root.frequency > bracket.lower && root.frequency < bracket.upper);
                assert!(solver.pole_function(root.frequency).unwrap().0.abs() < 1e-8);
            }
        }
    }

    #[test]
    fn adjugate_derivative_matches_finite_difference() {
        let photon = PhotonSystem::from_fn(
            nd::array![1.0, 2.0, 3.0, 4.5],
            nd::Array1::linspace(0.0, 1.0, 7),
            3,
            |k, x| {
                let kf = (k + 1) as f64;
                nd::array![
                    C64::from((kf * x + 0.3).sin()),
                    C64::new(0.5 * (kf * x).cos(), 0.1),
                    C64::from(0.2 * kf * x),
                ]
            },
        ).unwrap();
        let config = SolverConfig::default();
        let green = SpectralGreen::new(&photon, config.pole_epsilon);
        let lambda: nd::Array2<C64> = nd::Array2::eye(3) * C64::from(0.1);
        let solver = PhotonRootSolver::new(green, 4, &lambda, &config).unwrap();
        let omega = 2.6;
        let h = 1e-6;
        let (_, df) = solver.pole_function(omega).unwrap();
        let fd
            = (solver.pole_function(omega + h).unwrap().0
                - solver.pole_function(omega - h).unwrap().0)
            / (2.0 * h);
        assert!((df - fd).abs() < 1e-5 * df.abs().max(1.0));

        let a: nd::Array2<C64> = nd::array![
            [C64::from(2.0), C64::new(0.0, 1.0), C64::from(0.5)],
            [C64::new(0.0, -1.0), C64::from(3.0), C64::from(1.0)],
            [C64::from(0.5), C64::from(1.0), C64::from(4.0)],
        ];
        let (det, adj) = det_adjugate(&a).unwrap();
        let prod = a.dot(&adj);
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { det } else { C64::zero() };
                assert!((prod[[i, j]] - expected).norm() < 1e-12);
            }
        }
    }

    #[test]
    fn polarized_modes_can_share_a_bracket() {
        // x-, y-, and x-polarized modes: the determinant factorizes into
        // (1 + 1/(1 - ω²) + 1/(4 - ω²)) (1 + 1/(1.44 - ω²))
        let photon = PhotonSystem::from_fn(
            nd::array![1.0, 1.2, 2.0],
            nd::array![0.0],
            2,
            |k, _| {
                if k == 1 {
                    nd::array![C64::zero(), C64::one()]
                } else {
                    nd::array![C64::one(), C64::zero()]
                }
            },
        ).unwrap();
        let config = SolverConfig::default();
        let green = SpectralGreen::new(&photon, config.pole_epsilon);
        let lambda: nd::Array2<C64> = nd::Array2::eye(2);
        let roots = PhotonRootSolver::new(green, 0, &lambda, &config).unwrap()
            .solve().unwrap();
        let s13 = 13.0_f64.sqrt();
        let expected = [
            ((7.0 - s13) / 2.0).sqrt(),
            2.44_f64.sqrt(),
            ((7.0 + s13) / 2.0).sqrt(),
        ];
        assert_eq!(roots.len(), 3);
        for (k, (root, w)) in roots.iter().zip(expected).enumerate() {
            assert!((root.frequency - w).abs() < 1e-10);
            assert_eq!(root.diagnostics.mode, k);
        }
        // nothing in (1, 1.2), two roots in (1.2, 2)
        assert!(roots[..2].iter().all(|r| r.frequency > 1.2 && r.frequency < 2.0));
    }

    #[test]
    fn vector_modes_find_determinant_roots() {
        let photon = PhotonSystem::from_fn(
            nd::array![1.0, 2.0, 3.0],
            nd::Array1::linspace(0.0, 1.0, 5),
            2,
            |k, x| {
                let kf = (k + 1) as f64;
                nd::array![
                    C64::from((kf * PI * (x + 0.2)).sin()),
                    C64::from(0.5 * (kf * PI * (x + 0.2)).cos()),
                ]
            },
        ).unwrap();
        let config = SolverConfig::default();
        let green = SpectralGreen::new(&photon, config.pole_epsilon);
        let lambda: nd::Array2<C64> = nd::Array2::eye(2) * C64::from(0.1);
        let solver = PhotonRootSolver::new(green, 2, &lambda, &config).unwrap();
        let roots = solver.solve().unwrap();
        assert_eq!(roots.len(), 3);
        for (root, bracket) in roots.iter().zip(solver.brackets()) {
            assert!(root.frequency > bracket.lower && root.frequency < bracket.upper);
            assert!(solver.pole_function(root.frequency).unwrap().0.abs() < 1e-8);
        }
    }
}
