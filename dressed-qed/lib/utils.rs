//! Small array helpers and convenience macros shared by the solver stages and
//! the workspace binaries.

use ndarray as nd;
use num_complex::Complex64 as C64;

/// Construct a `Complex64` from a real part, an imaginary part written as
/// `i <expr>`, or both.
///
/// ```ignore
/// c!(1.0)        // 1 + 0i
/// c!(i 2.0)      // 0 + 2i
/// c!(1.0, 2.0)   // 1 + 2i
/// ```
#[macro_export]
macro_rules! c {
    ( i $im:expr ) => {
        $crate::num_complex::Complex64::new(0.0, $im)
    };
    ( $re:expr, $im:expr ) => {
        $crate::num_complex::Complex64::new($re, $im)
    };
    ( $re:expr ) => {
        $crate::num_complex::Complex64::new($re, 0.0)
    };
}

/// Create a directory (and all parents) if it doesn't already exist,
/// returning early from the enclosing function on failure.
#[macro_export]
macro_rules! mkdir {
    ( $dir:expr ) => {
        if !$dir.is_dir() {
            std::fs::create_dir_all(&$dir)?;
        }
    }
}

/// Write a collection of named arrays to a single `.npz` file.
///
/// Evaluates to `Result<(), dressed_qed::Error>`.
/// ```ignore
/// write_npz!(
///     outdir.join("data.npz"),
///     arrays: {
///         "omega" => &omega,
///         "energies" => &energies,
///     }
/// )?;
/// ```
#[macro_export]
macro_rules! write_npz {
    (
        $filename:expr,
        arrays: { $( $name:expr => $array:expr ),+ $(,)? } $(,)?
    ) => {
        (|| -> $crate::error::Result<()> {
            let mut npz
                = $crate::ndarray_npy::NpzWriter::new(
                    std::fs::File::create($filename)?);
            $(
                npz.add_array($name, $array)
                    .map_err(|err| $crate::error::Error::Npz(err.to_string()))?;
            )+
            npz.finish()
                .map_err(|err| $crate::error::Error::Npz(err.to_string()))?;
            Ok(())
        })()
    }
}

/// Compute the outer product `a b†` of two vectors.
pub fn outer_prod<S1, S2>(
    a: &nd::ArrayBase<S1, nd::Ix1>,
    b: &nd::ArrayBase<S2, nd::Ix1>,
) -> nd::Array2<C64>
where
    S1: nd::Data<Elem = C64>,
    S2: nd::Data<Elem = C64>,
{
    nd::Array2::from_shape_fn((a.len(), b.len()), |(i, j)| a[i] * b[j].conj())
}

/// Return the conjugate transpose of a matrix.
pub fn adjoint<S>(a: &nd::ArrayBase<S, nd::Ix2>) -> nd::Array2<C64>
where S: nd::Data<Elem = C64>
{
    a.t().mapv(|z| z.conj())
}

/// Largest element-wise deviation `|a_ij - conj(a_ji)|` of a square matrix from
/// Hermiticity.
pub fn hermitian_deviation<S>(a: &nd::ArrayBase<S, nd::Ix2>) -> f64
where S: nd::Data<Elem = C64>
{
    a.iter().zip(a.t().iter())
        .map(|(aij, aji)| (*aij - aji.conj()).norm())
        .fold(0.0, f64::max)
}

/// Largest element magnitude of an array.
pub fn max_abs<S, D>(a: &nd::ArrayBase<S, D>) -> f64
where
    S: nd::Data<Elem = C64>,
    D: nd::Dimension,
{
    a.iter().map(|z| z.norm()).fold(0.0, f64::max)
}

/// Return `true` if a square matrix is Hermitian to within a tolerance scaled
/// by its largest element.
pub fn is_hermitian<S>(a: &nd::ArrayBase<S, nd::Ix2>, rtol: f64) -> bool
where S: nd::Data<Elem = C64>
{
    a.is_square()
        && hermitian_deviation(a) <= rtol * max_abs(a).max(1.0)
}

/// Quadrature sum of a complex vector.
pub fn vec_norm<S>(a: &nd::ArrayBase<S, nd::Ix1>) -> f64
where S: nd::Data<Elem = C64>
{
    a.iter().map(|z| z.norm_sqr()).sum::<f64>().sqrt()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn outer_prod_is_hermitian_for_equal_vectors() {
        let a: nd::Array1<C64> = nd::array![c!(1.0, 2.0), c!(i -0.5), c!(0.3)];
        let op = outer_prod(&a, &a);
        assert!(hermitian_deviation(&op) < 1e-15);
        assert!((op[[0, 0]].re - 5.0).abs() < 1e-15);
        assert!((op[[0, 1]] - c!(1.0, 2.0) * c!(i 0.5)).norm() < 1e-15);
    }

    #[test]
    fn detects_non_hermitian() {
        let a: nd::Array2<C64> = nd::array![[c!(1.0), c!(0.0, 1.0)], [c!(0.0, 1.0), c!(2.0)]];
        assert!(!is_hermitian(&a, 1e-12));
        assert!(is_hermitian(&adjoint(&a).dot(&a), 1e-12));
    }
}
