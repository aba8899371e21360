//! Bare matter data: a Hermitian Hamiltonian with its dipole/momentum operator,
//! and the eigenpair sets that the solver stages pass between each other.

use ndarray as nd;
use ndarray_linalg::{ Eigh, UPLO };
use num_complex::Complex64 as C64;
use num_traits::Zero;
use crate::{
    c,
    error::{ Error, Result },
    utils::{ is_hermitian, vec_norm },
};

/// Relative tolerance used when checking input operators for Hermiticity.
pub const HERMITIAN_RTOL: f64 = 1e-10;

/// A set of matter eigenpairs `(E_i, ψ_i)`, with `ψ_i` stored as the `i`-th
/// column of `states`.
#[derive(Clone, Debug, PartialEq)]
pub struct Eigenpairs {
    pub energies: nd::Array1<f64>,
    pub states: nd::Array2<C64>,
}

impl Eigenpairs {
    /// Diagonalize a Hermitian matrix, with eigenvalues sorted ascending.
    pub fn from_hermitian<S>(H: &nd::ArrayBase<S, nd::Ix2>) -> Result<Self>
    where S: nd::Data<Elem = C64>
    {
        let (energies, states) = H.eigh(UPLO::Lower)?;
        Ok(Self { energies, states })
    }

    /// Build eigenpairs from a trial set of states, taking Rayleigh quotients
    /// against `H` as the energies.
    pub fn from_states(H: &nd::Array2<C64>, states: nd::Array2<C64>)
        -> Result<Self>
    {
        if states.shape() != H.shape() {
            return Err(Error::invalid(format!(
                "trial states have shape {:?}; expected {:?}",
                states.shape(),
                H.shape(),
            )));
        }
        let energies: nd::Array1<f64>
            = states.columns().into_iter()
            .map(|psi| {
                let norm2 = vec_norm(&psi).powi(2);
                let num: C64
                    = psi.iter().zip(H.dot(&psi).iter())
                    .map(|(a, b)| a.conj() * b)
                    .sum();
                if norm2 > 0.0 { num.re / norm2 } else { f64::NAN }
            })
            .collect();
        if energies.iter().any(|e| !e.is_finite()) {
            return Err(Error::invalid("trial states contain a zero vector"));
        }
        Ok(Self { energies, states })
    }

    /// Number of levels.
    pub fn len(&self) -> usize { self.energies.len() }

    /// Return `true` if there are no levels.
    pub fn is_empty(&self) -> bool { self.energies.is_empty() }

    /// Index of the lowest energy.
    pub fn lowest(&self) -> usize {
        self.energies.iter().enumerate()
            .fold((0, f64::INFINITY), |(imin, emin), (i, e)| {
                if *e < emin { (i, *e) } else { (imin, emin) }
            })
            .0
    }

    /// View the `i`-th state.
    pub fn state(&self, i: usize) -> nd::ArrayView1<C64> {
        self.states.column(i)
    }
}

/// Bare matter system: Hamiltonian `H` and dipole/momentum operator `p`, both
/// `N_e × N_e` and Hermitian.
///
/// Both operators are fixed at construction; every solver stage produces new
/// dressed operators rather than mutating these.
#[derive(Clone, Debug, PartialEq)]
pub struct MatterSystem {
    hamiltonian: nd::Array2<C64>,
    momentum: nd::Array2<C64>,
}

impl MatterSystem {
    /// Create a new `MatterSystem` from pre-built operators.
    ///
    /// Fails if either matrix is empty, non-square, non-Hermitian, contains
    /// non-finite values, or if their shapes differ.
    pub fn new(hamiltonian: nd::Array2<C64>, momentum: nd::Array2<C64>)
        -> Result<Self>
    {
        if hamiltonian.is_empty() {
            return Err(Error::invalid("matter Hamiltonian is empty"));
        }
        if hamiltonian.shape() != momentum.shape() {
            return Err(Error::invalid(format!(
                "Hamiltonian shape {:?} does not match momentum shape {:?}",
                hamiltonian.shape(),
                momentum.shape(),
            )));
        }
        for (name, op) in [("Hamiltonian", &hamiltonian), ("momentum", &momentum)] {
            if op.iter().any(|z| !(z.re.is_finite() && z.im.is_finite())) {
                return Err(Error::invalid(format!("{name} has non-finite entries")));
            }
            if !is_hermitian(op, HERMITIAN_RTOL) {
                return Err(Error::invalid(format!("{name} is not Hermitian")));
            }
        }
        Ok(Self { hamiltonian, momentum })
    }

    /// Build a one-dimensional tight-binding chain.
    ///
    /// `onsite` gives the diagonal potential (and fixes `N_e`), every pair of
    /// sites with `1 ≤ |i - j| ≤ radius` is coupled by `-tunneling`, and the
    /// momentum operator is `p = i[H, X]` for site positions
    /// `X = diag(j - (N_e - 1) / 2)`.
    pub fn tight_binding(onsite: &[f64], tunneling: f64, radius: usize)
        -> Result<Self>
    {
        let n = onsite.len();
        if n == 0 {
            return Err(Error::invalid("tight-binding chain needs at least one site"));
        }
        if !tunneling.is_finite() || onsite.iter().any(|v| !v.is_finite()) {
            return Err(Error::invalid("tight-binding parameters must be finite"));
        }
        let H: nd::Array2<C64>
            = nd::Array2::from_shape_fn((n, n), |(i, j)| {
                if i == j {
                    c!(onsite[i])
                } else if i.abs_diff(j) <= radius {
                    c!(-tunneling)
                } else {
                    C64::zero()
                }
            });
        let x0 = (n as f64 - 1.0) / 2.0;
        let p: nd::Array2<C64>
            = nd::Array2::from_shape_fn((n, n), |(i, j)| {
                let dx = (j as f64 - x0) - (i as f64 - x0);
                c!(i 1.0) * H[[i, j]] * dx
            });
        Self::new(H, p)
    }

    /// Number of matter levels `N_e`.
    pub fn dim(&self) -> usize { self.hamiltonian.nrows() }

    /// Return a reference to the bare Hamiltonian.
    pub fn hamiltonian(&self) -> &nd::Array2<C64> { &self.hamiltonian }

    /// Return a reference to the momentum operator.
    pub fn momentum(&self) -> &nd::Array2<C64> { &self.momentum }

    /// Diagonalize the bare Hamiltonian.
    pub fn bare(&self) -> Result<Eigenpairs> {
        Eigenpairs::from_hermitian(&self.hamiltonian)
    }

    /// Matrix elements `⟨ψ_a|p|ψ_b⟩` in a given eigenbasis.
    pub fn momentum_in(&self, eig: &Eigenpairs) -> nd::Array2<C64> {
        let psi_dag = eig.states.t().mapv(|z| z.conj());
        psi_dag.dot(&self.momentum.dot(&eig.states))
    }
}

#[cfg(test)]
mod test {
    use std::f64::consts::PI;
    use super::*;
    use crate::utils::hermitian_deviation;

    #[test]
    fn chain_spectrum_matches_open_boundary_formula() {
        let t = 0.25;
        let matter = MatterSystem::tight_binding(&[0.0; 4], t, 1).unwrap();
        let bare = matter.bare().unwrap();
        let mut expected: Vec<f64>
            = (1..=4).map(|k| -2.0 * t * (PI * k as f64 / 5.0).cos()).collect();
        expected.sort_by(|a, b| a.partial_cmp(b).unwrap());
        for (e, ex) in bare.energies.iter().zip(&expected) {
            assert!((e - ex).abs() < 1e-12, "{e} vs {ex}");
        }
        assert_eq!(bare.lowest(), 0);
        assert!(hermitian_deviation(matter.momentum()) < 1e-15);
    }

    #[test]
    fn radius_controls_range() {
        let matter = MatterSystem::tight_binding(&[0.1, 0.2, 0.3, 0.4], 1.0, 2).unwrap();
        let H = matter.hamiltonian();
        assert_eq!(H[[0, 2]], c!(-1.0));
        assert_eq!(H[[0, 3]], c!(0.0));
        assert_eq!(H[[2, 2]], c!(0.3));
        // p_ij = i H_ij (x_j - x_i)
        assert_eq!(matter.momentum()[[0, 2]], c!(i -2.0));
    }

    #[test]
    fn rejects_bad_operators() {
        let H: nd::Array2<C64> = nd::array![[c!(0.0), c!(1.0)], [c!(2.0), c!(0.0)]];
        let p: nd::Array2<C64> = nd::Array2::zeros((2, 2));
        assert!(matches!(MatterSystem::new(H, p.clone()), Err(Error::InvalidInput(_))));
        let H3: nd::Array2<C64> = nd::Array2::eye(3);
        assert!(MatterSystem::new(H3, p).is_err());
        assert!(MatterSystem::tight_binding(&[], 1.0, 1).is_err());
    }

    #[test]
    fn rayleigh_quotients_of_exact_states() {
        let matter = MatterSystem::tight_binding(&[0.0, 0.5, -0.2], 0.3, 1).unwrap();
        let bare = matter.bare().unwrap();
        let trial = Eigenpairs::from_states(matter.hamiltonian(), bare.states.clone()).unwrap();
        for (a, b) in trial.energies.iter().zip(&bare.energies) {
            assert!((a - b).abs() < 1e-12);
        }
    }
}
