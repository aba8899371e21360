//! Anderson mixing for fixed-point iterations `x = g(x)`.
//!
//! With residual `f = g(x) - x` and histories of differences
//! `ΔX = [x_i - x_{i-1}]`, `ΔF = [f_i - f_{i-1}]` (at most `m` columns, oldest
//! dropped first), the next iterate is
//! ```text
//! γ   = argmin ‖f - ΔF γ‖
//! x⁺  = (x - ΔX γ) + β (f - ΔF γ)
//! ```
//! With no history this is damped substitution, `x⁺ = β g + (1 - β) x`.

use std::collections::VecDeque;
use ndarray as nd;
use ndarray_linalg::Solve;
use num_complex::Complex64 as C64;
use tracing::warn;
use crate::utils::adjoint;

/// Relative Tikhonov shift on the normal equations for `γ`.
const REGULARIZATION: f64 = 1e-12;

/// Stateful Anderson mixer over complex vectors.
#[derive(Clone, Debug)]
pub struct AndersonMixer {
    depth: usize,
    damping: f64,
    previous: Option<(nd::Array1<C64>, nd::Array1<C64>)>,
    dx: VecDeque<nd::Array1<C64>>,
    df: VecDeque<nd::Array1<C64>>,
}

impl AndersonMixer {
    /// Create a new `AndersonMixer` with history depth `m` and damping `β`.
    pub fn new(depth: usize, damping: f64) -> Self {
        Self {
            depth,
            damping,
            previous: None,
            dx: VecDeque::with_capacity(depth),
            df: VecDeque::with_capacity(depth),
        }
    }

    pub fn depth(&self) -> usize { self.depth }

    pub fn damping(&self) -> f64 { self.damping }

    /// Change the damping; the history is kept.
    pub fn set_damping(&mut self, damping: f64) { self.damping = damping; }

    /// Number of difference pairs currently stored.
    pub fn history_len(&self) -> usize { self.df.len() }

    /// Forget all previous iterates.
    pub fn reset(&mut self) {
        self.previous = None;
        self.dx.clear();
        self.df.clear();
    }

    fn substitute(&self, x: &nd::Array1<C64>, g: &nd::Array1<C64>)
        -> nd::Array1<C64>
    {
        if self.damping == 1.0 {
            g.clone()
        } else {
            let b = self.damping;
            nd::Zip::from(g).and(x).map_collect(|gi, xi| *gi * b + *xi * (1.0 - b))
        }
    }

    /// Produce the next iterate from the current one `x` and its image
    /// `g = g(x)`.
    pub fn mix(&mut self, x: &nd::Array1<C64>, g: &nd::Array1<C64>)
        -> nd::Array1<C64>
    {
        if self.depth == 0 {
            return self.substitute(x, g);
        }
        let f: nd::Array1<C64> = g - x;
        if let Some((x_prev, f_prev)) = self.previous.take() {
            if x_prev.len() == x.len() {
                self.dx.push_back(x - &x_prev);
                self.df.push_back(&f - &f_prev);
                if self.df.len() > self.depth {
                    self.dx.pop_front();
                    self.df.pop_front();
                }
            } else {
                self.dx.clear();
                self.df.clear();
            }
        }
        self.previous = Some((x.clone(), f.clone()));
        if self.df.is_empty() {
            return self.substitute(x, g);
        }

        let n = x.len();
        let k = self.df.len();
        let mut dx: nd::Array2<C64> = nd::Array2::zeros((n, k));
        let mut df: nd::Array2<C64> = nd::Array2::zeros((n, k));
        for (j, (dxj, dfj)) in self.dx.iter().zip(&self.df).enumerate() {
            dx.column_mut(j).assign(dxj);
            df.column_mut(j).assign(dfj);
        }
        let df_dag = adjoint(&df);
        let mut normal = df_dag.dot(&df);
        let trace: f64 = normal.diag().iter().map(|z| z.re).sum();
        let shift = (REGULARIZATION * trace).max(f64::MIN_POSITIVE);
        normal.diag_mut().mapv_inplace(|z| z + shift);
        let rhs = df_dag.dot(&f);
        match normal.solve(&rhs) {
            Ok(gamma) if gamma.iter().all(|z| z.re.is_finite() && z.im.is_finite()) => {
                let x_bar = x - &dx.dot(&gamma);
                let f_bar = &f - &df.dot(&gamma);
                x_bar + f_bar.mapv(|z| z * self.damping)
            },
            _ => {
                warn!(history = k, "singular Anderson history; resetting");
                self.dx.clear();
                self.df.clear();
                self.substitute(x, g)
            },
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{ c, utils::vec_norm };

    #[test]
    fn zero_depth_is_substitution() {
        let x: nd::Array1<C64> = nd::array![c!(1.0), c!(0.5, -0.25), c!(-3.0)];
        let g: nd::Array1<C64> = nd::array![c!(0.1, 0.1), c!(0.7), c!(2.0)];
        let mut mixer = AndersonMixer::new(0, 1.0);
        for _ in 0..3 {
            assert_eq!(mixer.mix(&x, &g), g);
        }
        assert_eq!(mixer.history_len(), 0);

        let mut damped = AndersonMixer::new(0, 0.5);
        let expected = (&x + &g).mapv(|z| z * 0.5);
        assert!(vec_norm(&(damped.mix(&x, &g) - expected)) < 1e-15);
    }

    #[test]
    fn accelerates_linear_contraction() {
        // g(x) = A x + b with A = diag(0.95, 0.8, 0.5)
        let a: nd::Array1<C64> = nd::array![c!(0.95), c!(0.8), c!(0.5)];
        let b: nd::Array1<C64> = nd::array![c!(1.0), c!(0.0, 1.0), c!(-2.0)];
        let g = |x: &nd::Array1<C64>| -> nd::Array1<C64> { &a * x + &b };
        let exact: nd::Array1<C64>
            = nd::Zip::from(&a).and(&b).map_collect(|ai, bi| *bi / (c!(1.0) - *ai));

        let run = |mixer: &mut AndersonMixer| -> f64 {
            let mut x: nd::Array1<C64> = nd::Array1::zeros(3);
            for _ in 0..12 {
                let gx = g(&x);
                x = mixer.mix(&x, &gx);
            }
            vec_norm(&(&x - &exact))
        };
        let plain = run(&mut AndersonMixer::new(0, 1.0));
        let anderson = run(&mut AndersonMixer::new(3, 1.0));
        assert!(plain > 1e-1);
        assert!(anderson < 1e-6, "{anderson}");
    }

    #[test]
    fn history_is_bounded() {
        let mut mixer = AndersonMixer::new(2, 0.8);
        let mut x: nd::Array1<C64> = nd::array![c!(1.0), c!(2.0)];
        for k in 0..6 {
            let gx = x.mapv(|z| z * 0.5 + c!(k as f64 * 0.01));
            x = mixer.mix(&x, &gx);
            assert!(mixer.history_len() <= 2);
        }
        assert_eq!(mixer.history_len(), 2);
        mixer.reset();
        assert_eq!(mixer.history_len(), 0);
    }
}
