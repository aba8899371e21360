//! Spectral (sum-over-modes) photon Green's function.
//!
//! ```text
//! G(r, r', ω) = Σ_k F_k(r) F_k(r')† / (ω_k² - ω²)
//! ∂G/∂ω       = Σ_k F_k(r) F_k(r')† 2ω / (ω_k² - ω²)²
//! ```

use ndarray as nd;
use num_complex::Complex64 as C64;
use crate::{
    error::{ Error, Result },
    photon::PhotonSystem,
    utils::outer_prod,
};

/// Green's function evaluator over a fixed set of vacuum modes.
///
/// Evaluation within `pole_epsilon` of any vacuum frequency fails with
/// [`Error::DivergentEvaluation`] instead of returning non-finite values.
#[derive(Copy, Clone, Debug)]
pub struct SpectralGreen<'a> {
    photon: &'a PhotonSystem,
    pole_epsilon: f64,
}

impl<'a> SpectralGreen<'a> {
    /// Create a new `SpectralGreen`.
    pub fn new(photon: &'a PhotonSystem, pole_epsilon: f64) -> Self {
        Self { photon, pole_epsilon }
    }

    /// Return a reference to the underlying vacuum modes.
    pub fn photon(&self) -> &'a PhotonSystem { self.photon }

    /// Return the pole exclusion radius.
    pub fn pole_epsilon(&self) -> f64 { self.pole_epsilon }

    fn check_poles(&self, modes: &[usize], omega: f64) -> Result<()> {
        let freqs = self.photon.frequencies();
        match modes.iter().find(|k| (omega - freqs[**k]).abs() < self.pole_epsilon) {
            Some(k) => Err(Error::DivergentEvaluation {
                omega,
                pole: freqs[*k],
                epsilon: self.pole_epsilon,
            }),
            None => Ok(()),
        }
    }

    fn all_modes(&self) -> Vec<usize> { (0..self.photon.num_modes()).collect() }

    fn mode_sum<F>(&self, modes: &[usize], r: usize, rp: usize, omega: f64, weight: F)
        -> Result<nd::Array2<C64>>
    where F: Fn(f64) -> f64
    {
        self.photon.check_point(r)?;
        self.photon.check_point(rp)?;
        if let Some(k) = modes.iter().find(|k| **k >= self.photon.num_modes()) {
            return Err(Error::invalid(format!(
                "mode index {k} out of range for {} modes", self.photon.num_modes())));
        }
        self.check_poles(modes, omega)?;
        let d = self.photon.dim();
        let freqs = self.photon.frequencies();
        let acc: nd::Array2<C64>
            = modes.iter()
            .fold(nd::Array2::zeros((d, d)), |acc, k| {
                let wk = freqs[*k];
                let w = weight(wk * wk - omega * omega);
                acc + outer_prod(
                    &self.photon.profile(*k, r),
                    &self.photon.profile(*k, rp),
                ) * w
            });
        Ok(acc)
    }

    /// Evaluate the `d × d` matrix `G(r, r', ω)` at grid indices `r`, `rp`.
    pub fn evaluate(&self, r: usize, rp: usize, omega: f64)
        -> Result<nd::Array2<C64>>
    {
        self.evaluate_over(&self.all_modes(), r, rp, omega)
    }

    /// Like [`Self::evaluate`], summing only over the vacuum modes in
    /// `modes`. Only their poles are excluded.
    pub fn evaluate_over(&self, modes: &[usize], r: usize, rp: usize, omega: f64)
        -> Result<nd::Array2<C64>>
    {
        self.mode_sum(modes, r, rp, omega, |den| den.recip())
    }

    /// Evaluate `∂G(r, r', ω)/∂ω` at grid indices `r`, `rp`.
    pub fn derivative(&self, r: usize, rp: usize, omega: f64)
        -> Result<nd::Array2<C64>>
    {
        self.derivative_over(&self.all_modes(), r, rp, omega)
    }

    /// Like [`Self::derivative`], summing only over the vacuum modes in
    /// `modes`.
    pub fn derivative_over(&self, modes: &[usize], r: usize, rp: usize, omega: f64)
        -> Result<nd::Array2<C64>>
    {
        self.mode_sum(modes, r, rp, omega, |den| 2.0 * omega / (den * den))
    }

    /// Evaluate `G(r, r0, ω)` for every grid point `r`, as an
    /// `n_points × d × d` array.
    pub fn evaluate_column(&self, r0: usize, omega: f64)
        -> Result<nd::Array3<C64>>
    {
        self.evaluate_column_over(&self.all_modes(), r0, omega)
    }

    /// Like [`Self::evaluate_column`], summing only over the vacuum modes in
    /// `modes`.
    pub fn evaluate_column_over(&self, modes: &[usize], r0: usize, omega: f64)
        -> Result<nd::Array3<C64>>
    {
        let d = self.photon.dim();
        let n = self.photon.num_points();
        let mut out: nd::Array3<C64> = nd::Array3::zeros((n, d, d));
        for (r, mut slot) in out.outer_iter_mut().enumerate() {
            slot.assign(&self.evaluate_over(modes, r, r0, omega)?);
        }
        Ok(out)
    }
}
