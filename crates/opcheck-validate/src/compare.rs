//! Element-wise closeness of two arrays.
//!
//! Two elements are close when `|actual - expected| <= atol + rtol * |expected|`.
//! NaN is never close to anything, equal infinities are close, and bool arrays
//! are compared exactly. Shape and dtype must match before values are looked
//! at; the device an array lives on is ignored.

use opcheck_core::{Array, Buffer, DType, Shape};
use serde::Serialize;

/// Closeness thresholds.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Tolerance {
    pub rtol: f64,
    pub atol: f64,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self {
            rtol: 1e-4,
            atol: 1e-3,
        }
    }
}

impl Tolerance {
    pub fn is_close(&self, actual: f64, expected: f64) -> bool {
        if actual == expected {
            return true;
        }
        if !actual.is_finite() || !expected.is_finite() {
            return false;
        }
        (actual - expected).abs() <= self.atol + self.rtol * expected.abs()
    }
}

/// Why two arrays are not close.
#[derive(Clone, Debug, PartialEq)]
pub enum Mismatch {
    Shape { actual: Shape, expected: Shape },
    DType { actual: DType, expected: DType },
    Values(ValueMismatch),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ValueMismatch {
    pub mismatched: usize,
    pub total: usize,
    /// Greatest absolute difference and its multi-index.
    pub max_abs: (f64, Vec<usize>),
    /// Greatest relative difference and its multi-index.
    pub max_rel: (f64, Vec<usize>),
    pub tolerance: Tolerance,
    pub exact: bool,
}

impl std::fmt::Display for Mismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mismatch::Shape { actual, expected } => write!(
                f,
                "The values for attribute 'shape' do not match: {actual} != {expected}."
            ),
            Mismatch::DType { actual, expected } => write!(
                f,
                "The values for attribute 'dtype' do not match: {actual} != {expected}."
            ),
            Mismatch::Values(v) => {
                let pct = 100.0 * v.mismatched as f64 / v.total.max(1) as f64;
                if v.exact {
                    writeln!(f, "Tensor-likes are not equal!")?;
                } else {
                    writeln!(f, "Tensor-likes are not close!")?;
                }
                writeln!(f)?;
                write!(f, "Mismatched elements: {} / {} ({pct:.1}%)", v.mismatched, v.total)?;
                if !v.exact {
                    write!(
                        f,
                        "\nGreatest absolute difference: {} at index {} (up to {} allowed)",
                        v.max_abs.0,
                        index_tuple(&v.max_abs.1),
                        v.tolerance.atol
                    )?;
                    write!(
                        f,
                        "\nGreatest relative difference: {} at index {} (up to {} allowed)",
                        v.max_rel.0,
                        index_tuple(&v.max_rel.1),
                        v.tolerance.rtol
                    )?;
                }
                Ok(())
            }
        }
    }
}

fn index_tuple(idx: &[usize]) -> String {
    match idx {
        [single] => format!("({single},)"),
        _ => format!(
            "({})",
            idx.iter().map(usize::to_string).collect::<Vec<_>>().join(", ")
        ),
    }
}

/// Compare `actual` against `expected`.
pub fn compare(actual: &Array, expected: &Array, tol: &Tolerance) -> Result<(), Mismatch> {
    if actual.shape() != expected.shape() {
        return Err(Mismatch::Shape {
            actual: actual.shape().clone(),
            expected: expected.shape().clone(),
        });
    }
    if actual.dtype() != expected.dtype() {
        return Err(Mismatch::DType {
            actual: actual.dtype(),
            expected: expected.dtype(),
        });
    }

    let exact = matches!(expected.data(), Buffer::Bool(_));
    let close = |a: f64, e: f64| if exact { a == e } else { tol.is_close(a, e) };

    let total = expected.numel();
    let mut mismatched = 0;
    let mut max_abs = (0.0f64, 0usize);
    let mut max_rel = (0.0f64, 0usize);
    for i in 0..total {
        let (a, e) = (actual.get_f64(i), expected.get_f64(i));
        if close(a, e) {
            continue;
        }
        mismatched += 1;
        let abs = (a - e).abs();
        let rel = abs / e.abs();
        if abs.total_cmp(&max_abs.0).is_gt() {
            max_abs = (abs, i);
        }
        if rel.total_cmp(&max_rel.0).is_gt() {
            max_rel = (rel, i);
        }
    }

    if mismatched == 0 {
        return Ok(());
    }
    let shape = expected.shape();
    Err(Mismatch::Values(ValueMismatch {
        mismatched,
        total,
        max_abs: (max_abs.0, shape.unravel(max_abs.1)),
        max_rel: (max_rel.0, shape.unravel(max_rel.1)),
        tolerance: *tol,
        exact,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f32s(data: &[f32]) -> Array {
        Array::from_f32(data, &Shape::new(vec![data.len() as i64])).unwrap()
    }

    #[test]
    fn test_within_tolerance() {
        let tol = Tolerance::default();
        assert!(compare(&f32s(&[1.0005, 100.0]), &f32s(&[1.0, 100.01]), &tol).is_ok());
        assert!(compare(&f32s(&[1.01]), &f32s(&[1.0]), &tol).is_err());
    }

    #[test]
    fn test_nan_and_inf() {
        let tol = Tolerance::default();
        assert!(!tol.is_close(f64::NAN, f64::NAN));
        assert!(tol.is_close(f64::INFINITY, f64::INFINITY));
        assert!(!tol.is_close(f64::INFINITY, f64::NEG_INFINITY));
        assert!(!tol.is_close(1e300, f64::INFINITY));
    }

    #[test]
    fn test_shape_and_dtype_mismatch() {
        let tol = Tolerance::default();
        let a = f32s(&[1.0, 2.0]);
        let b = a.reshape(&Shape::new(vec![2, 1])).unwrap();
        let err = compare(&a, &b, &tol).unwrap_err();
        assert_eq!(
            err.to_string(),
            "The values for attribute 'shape' do not match: [2] != [2, 1]."
        );

        let c = Array::from_f64(vec![1.0, 2.0], &Shape::new(vec![2]), DType::F64).unwrap();
        assert!(matches!(compare(&a, &c, &tol), Err(Mismatch::DType { .. })));
    }

    #[test]
    fn test_device_ignored() {
        let a = f32s(&[1.0]).with_device(opcheck_core::Device::Gpu);
        assert!(compare(&a, &f32s(&[1.0]), &Tolerance::default()).is_ok());
    }

    #[test]
    fn test_mismatch_report() {
        let a = Array::from_f32(&[1.0, 2.0, 3.0, 9.0], &Shape::new(vec![2, 2])).unwrap();
        let e = Array::from_f32(&[1.0, 2.0, 3.0, 4.0], &Shape::new(vec![2, 2])).unwrap();
        let Err(Mismatch::Values(v)) = compare(&a, &e, &Tolerance::default()) else {
            panic!("expected a value mismatch");
        };
        assert_eq!(v.mismatched, 1);
        assert_eq!(v.max_abs, (5.0, vec![1, 1]));
        let text = Mismatch::Values(v).to_string();
        assert!(text.contains("Mismatched elements: 1 / 4 (25.0%)"));
        assert!(text.contains("at index (1, 1)"));
    }

    #[test]
    fn test_bool_exact() {
        let s = Shape::new(vec![2]);
        let a = Array::from_bool(vec![true, false], &s).unwrap();
        let e = Array::from_bool(vec![true, true], &s).unwrap();
        let err = compare(&a, &e, &Tolerance { rtol: 1.0, atol: 1.0 }).unwrap_err();
        assert!(err.to_string().starts_with("Tensor-likes are not equal!"));
    }
}
