//! Conversion from row vectors to a dense `f64` matrix.

use crate::error::{Error, Result};
use ndarray::Array2;

/// Stack `points` into an `n x d` matrix, rejecting ragged input.
pub(crate) fn to_array(points: &[Vec<f32>]) -> Result<Array2<f64>> {
    let first = points.first().ok_or(Error::EmptyInput)?;
    let (n, d) = (points.len(), first.len());

    let mut flat = Vec::with_capacity(n * d);
    for point in points {
        if point.len() != d {
            return Err(Error::DimensionMismatch {
                expected: d,
                found: point.len(),
            });
        }
        flat.extend(point.iter().map(|&v| f64::from(v)));
    }

    Array2::from_shape_vec((n, d), flat).map_err(|e| Error::Other(e.to_string()))
}

/// Widen `points` to `f64` rows, rejecting ragged input.
pub(crate) fn to_rows_f64(points: &[Vec<f32>]) -> Result<Vec<Vec<f64>>> {
    let d = points.first().ok_or(Error::EmptyInput)?.len();
    points
        .iter()
        .map(|point| {
            if point.len() != d {
                return Err(Error::DimensionMismatch {
                    expected: d,
                    found: point.len(),
                });
            }
            Ok(point.iter().map(|&v| f64::from(v)).collect())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_array_shape() {
        let arr = to_array(&[vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]]).unwrap();
        assert_eq!(arr.dim(), (3, 2));
        assert_eq!(arr[[2, 1]], 6.0);
    }

    #[test]
    fn test_to_array_rejects_ragged() {
        let err = to_array(&[vec![1.0, 2.0], vec![3.0]]).unwrap_err();
        assert_eq!(
            err,
            Error::DimensionMismatch {
                expected: 2,
                found: 1
            }
        );
        assert_eq!(to_array(&[]).unwrap_err(), Error::EmptyInput);
        assert!(to_rows_f64(&[vec![1.0], vec![1.0, 2.0]]).is_err());
    }
}
