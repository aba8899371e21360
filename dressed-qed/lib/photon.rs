//! Vacuum photon data: mode frequencies and vector-valued mode profiles
//! sampled on a spatial grid.

use std::{ fs::File, path::Path };
use ndarray::{ self as nd, s };
use ndarray_npy::NpzReader;
use num_complex::Complex64 as C64;
use crate::error::{ Error, Result };

/// Vacuum cavity modes.
///
/// Profiles are stored as a `N_p × n_points × d` array: `profiles[[k, r, a]]`
/// is component `a` of mode `k` at grid point `r`. Frequencies are strictly
/// positive and strictly ascending.
#[derive(Clone, Debug, PartialEq)]
pub struct PhotonSystem {
    frequencies: nd::Array1<f64>,
    grid: nd::Array1<f64>,
    profiles: nd::Array3<C64>,
}

impl PhotonSystem {
    /// Create a new `PhotonSystem`.
    ///
    /// Fails if there are no modes, if frequencies are non-positive,
    /// non-finite, or not strictly ascending, or if the profile array shape
    /// doesn't match the frequency and grid lengths.
    pub fn new(
        frequencies: nd::Array1<f64>,
        grid: nd::Array1<f64>,
        profiles: nd::Array3<C64>,
    ) -> Result<Self>
    {
        let n_modes = frequencies.len();
        if n_modes == 0 {
            return Err(Error::invalid("photon system needs at least one mode"));
        }
        if frequencies.iter().any(|w| !(w.is_finite() && *w > 0.0)) {
            return Err(Error::invalid("vacuum frequencies must be positive and finite"));
        }
        if frequencies.windows(2).into_iter().any(|w| w[1] <= w[0]) {
            return Err(Error::invalid(
                "vacuum frequencies must be distinct and sorted ascending"));
        }
        let (n_p, n_r, d) = profiles.dim();
        if n_p != n_modes || n_r != grid.len() || n_r == 0 || d == 0 {
            return Err(Error::invalid(format!(
                "profile array has shape {:?}; expected ({}, {}, d ≥ 1)",
                profiles.shape(),
                n_modes,
                grid.len(),
            )));
        }
        if
            grid.iter().any(|x| !x.is_finite())
            || profiles.iter().any(|z| !(z.re.is_finite() && z.im.is_finite()))
        {
            return Err(Error::invalid("grid and profiles must be finite"));
        }
        Ok(Self { frequencies, grid, profiles })
    }

    /// Sample closed-form profiles `f(k, x)` (each returning a length-`dim`
    /// vector) on a grid.
    pub fn from_fn<F>(
        frequencies: nd::Array1<f64>,
        grid: nd::Array1<f64>,
        dim: usize,
        f: F,
    ) -> Result<Self>
    where F: Fn(usize, f64) -> nd::Array1<C64>
    {
        let mut profiles: nd::Array3<C64>
            = nd::Array3::zeros((frequencies.len(), grid.len(), dim));
        for k in 0..frequencies.len() {
            for (r, x) in grid.iter().enumerate() {
                let val = f(k, *x);
                if val.len() != dim {
                    return Err(Error::invalid(format!(
                        "profile function returned {} components for mode {k}; expected {dim}",
                        val.len(),
                    )));
                }
                profiles.slice_mut(s![k, r, ..]).assign(&val);
            }
        }
        Self::new(frequencies, grid, profiles)
    }

    /// Ideal one-dimensional standing-wave cavity of length `length` (in units
    /// where `c = 1`): `ω_k = π k / L` and `F_k(x) = √(2/L) sin(π k x / L)`
    /// for `k = 1, ..., n_modes`, sampled on `n_points` uniform points over
    /// `[0, L]`.
    pub fn standing_wave(n_modes: usize, length: f64, n_points: usize)
        -> Result<Self>
    {
        if !(length.is_finite() && length > 0.0) || n_points < 2 {
            return Err(Error::invalid(
                "standing-wave cavity needs a positive length and at least two grid points"));
        }
        let k0 = std::f64::consts::PI / length;
        let frequencies: nd::Array1<f64>
            = (1..=n_modes).map(|k| k0 * k as f64).collect();
        let grid = nd::Array1::linspace(0.0, length, n_points);
        let amp = (2.0 / length).sqrt();
        Self::from_fn(frequencies, grid, 1, |k, x| {
            nd::array![C64::from(amp * (k0 * (k + 1) as f64 * x).sin())]
        })
    }

    /// Load mode data from an `.npz` archive holding `frequencies` (1D),
    /// `grid` (1D), and `profiles` (3D, real or complex).
    pub fn from_npz<P>(path: P) -> Result<Self>
    where P: AsRef<Path>
    {
        let mut npz
            = NpzReader::new(File::open(path)?)
            .map_err(|err| Error::Npz(err.to_string()))?;
        let names: Vec<String>
            = npz.names().map_err(|err| Error::Npz(err.to_string()))?;
        let find = |key: &str| -> Result<String> {
            names.iter()
                .find(|name| {
                    name.as_str() == key
                        || name.strip_suffix(".npy") == Some(key)
                })
                .cloned()
                .ok_or_else(|| Error::Npz(format!("missing array '{key}'")))
        };
        let frequencies: nd::Array1<f64>
            = npz.by_name(&find("frequencies")?)
            .map_err(|err| Error::Npz(err.to_string()))?;
        let grid: nd::Array1<f64>
            = npz.by_name(&find("grid")?)
            .map_err(|err| Error::Npz(err.to_string()))?;
        let profiles_name = find("profiles")?;
        let profiles: nd::Array3<C64>
            = match npz.by_name::<nd::OwnedRepr<C64>, nd::Ix3>(&profiles_name) {
                Ok(arr) => arr,
                Err(_) => {
                    npz.by_name::<nd::OwnedRepr<f64>, nd::Ix3>(&profiles_name)
                        .map_err(|err| Error::Npz(err.to_string()))?
                        .mapv(C64::from)
                },
            };
        Self::new(frequencies, grid, profiles)
    }

    /// Number of vacuum modes `N_p`.
    pub fn num_modes(&self) -> usize { self.frequencies.len() }

    /// Spatial dimension `d` of each mode vector.
    pub fn dim(&self) -> usize { self.profiles.dim().2 }

    /// Number of spatial grid points.
    pub fn num_points(&self) -> usize { self.grid.len() }

    /// Return a reference to the vacuum frequencies.
    pub fn frequencies(&self) -> &nd::Array1<f64> { &self.frequencies }

    /// Return a reference to the spatial grid.
    pub fn grid(&self) -> &nd::Array1<f64> { &self.grid }

    /// Return a reference to the full profile array.
    pub fn profiles(&self) -> &nd::Array3<C64> { &self.profiles }

    /// View the profile vector of mode `k` at grid point `r`.
    pub fn profile(&self, k: usize, r: usize) -> nd::ArrayView1<C64> {
        self.profiles.slice(s![k, r, ..])
    }

    /// Index of the grid point closest to `x`.
    pub fn nearest_point(&self, x: f64) -> usize {
        self.grid.iter().enumerate()
            .fold((0, f64::INFINITY), |(imin, dmin), (i, xi)| {
                let d = (xi - x).abs();
                if d < dmin { (i, d) } else { (imin, dmin) }
            })
            .0
    }

    /// Check that a grid index is in range.
    pub(crate) fn check_point(&self, r: usize) -> Result<()> {
        if r < self.num_points() {
            Ok(())
        } else {
            Err(Error::invalid(format!(
                "grid index {r} out of range for {} points", self.num_points())))
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::write_npz;

    #[test]
    fn standing_wave_modes() {
        let photon = PhotonSystem::standing_wave(5, 2.0, 201).unwrap();
        assert_eq!(photon.num_modes(), 5);
        assert_eq!(photon.dim(), 1);
        let w = photon.frequencies();
        assert!((w[2] - 3.0 * std::f64::consts::PI / 2.0).abs() < 1e-14);
        // nodes at the mirrors, antinode of mode 1 at the center
        assert!(photon.profile(0, 0)[0].norm() < 1e-14);
        let mid = photon.nearest_point(1.0);
        assert_eq!(mid, 100);
        assert!((photon.profile(0, mid)[0].re - 1.0).abs() < 1e-12);
    }

    #[test]
    fn rejects_bad_frequencies() {
        let grid = nd::Array1::linspace(0.0, 1.0, 3);
        let profiles: nd::Array3<C64> = nd::Array3::zeros((2, 3, 1));
        for w in [nd::array![1.0, 1.0], nd::array![2.0, 1.0], nd::array![0.0, 1.0]] {
            assert!(matches!(
                PhotonSystem::new(w, grid.clone(), profiles.clone()),
                Err(Error::InvalidInput(_)),
            ));
        }
        assert!(PhotonSystem::new(nd::array![1.0], grid.clone(), profiles).is_err());
    }

    #[test]
    fn npz_round_trip_with_real_profiles() {
        let photon = PhotonSystem::standing_wave(3, 1.0, 11).unwrap();
        let dir = std::env::temp_dir().join("dressed_qed_photon_npz");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("modes.npz");
        let real_profiles = photon.profiles().mapv(|z| z.re);
        write_npz!(
            &path,
            arrays: {
                "frequencies" => photon.frequencies(),
                "grid" => photon.grid(),
                "profiles" => &real_profiles,
            }
        ).unwrap();
        let loaded = PhotonSystem::from_npz(&path).unwrap();
        assert_eq!(loaded, photon);
    }
}
