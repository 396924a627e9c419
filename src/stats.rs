//! Small numeric helpers shared by the analyses.

use linfa::prelude::*;
use linfa_preprocessing::linear_scaling::LinearScaler;
use nalgebra::{DMatrix, DVector};
use ndarray::Array2;
use statrs::statistics::Statistics;

use crate::error::{Error, Result};

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().mean()
}

/// Standard deviation with one degree of freedom removed. NaN for fewer
/// than two values.
pub fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }
    values.iter().std_dev()
}

pub fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().population_std_dev()
}

pub fn population_variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().population_variance()
}

/// Stacks equally wide rows into a matrix.
pub fn table(rows: &[Vec<f64>]) -> Result<Array2<f64>> {
    let width = rows.first().map_or(0, Vec::len);
    Ok(Array2::from_shape_vec((rows.len(), width), rows.concat())?)
}

/// Per-column standardization to zero mean and unit population variance.
/// Constant columns are only centered.
pub fn standardize(records: &Array2<f64>) -> Result<Array2<f64>> {
    let scaler = LinearScaler::standard()
        .fit(&DatasetBase::from(records.clone()))
        .map_err(|e| Error::Model(e.to_string()))?;
    Ok(scaler.transform(records.clone()))
}

/// Ordinary least squares through an SVD. Singular values below a cutoff
/// relative to the largest one count as zero, and a rank-deficient design
/// gives `None`.
pub fn least_squares(rows: &[Vec<f64>], targets: &[f64]) -> Option<Vec<f64>> {
    let width = rows.first()?.len();
    let x = DMatrix::from_row_iterator(rows.len(), width, rows.iter().flatten().copied());
    let y = DVector::from_column_slice(targets);

    let svd = x.svd(true, true);
    let cutoff = svd.singular_values.max() * rows.len().max(width) as f64 * f64::EPSILON;
    if svd.rank(cutoff) < width {
        return None;
    }
    let beta = svd.solve(&y, cutoff).ok()?;
    Some(beta.iter().copied().collect())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn moments() {
        let v = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((mean(&v) - 5.0).abs() < 1e-12);
        assert!((population_std(&v) - 2.0).abs() < 1e-12);
        assert!((sample_std(&v) - 2.138089935).abs() < 1e-6);
        assert!(sample_std(&[1.0]).is_nan());
        assert!(mean(&[]).is_nan());
    }

    #[test]
    fn scaler_handles_constant_columns() {
        let records = table(&[vec![1.0, 50.0], vec![3.0, 50.0]]).unwrap();
        let scaled = standardize(&records).unwrap();
        assert_eq!(scaled, ndarray::array![[-1.0, 0.0], [1.0, 0.0]]);
    }

    #[test]
    fn ragged_rows_are_rejected() {
        assert!(matches!(table(&[vec![1.0, 2.0], vec![3.0]]), Err(Error::Shape(_))));
    }

    #[test]
    fn fit_line() {
        let rows: Vec<Vec<f64>> = (0..10).map(|i| vec![1.0, i as f64]).collect();
        let y: Vec<f64> = (0..10).map(|i| 3.0 + 0.5 * i as f64).collect();
        let beta = least_squares(&rows, &y).unwrap();
        assert!((beta[0] - 3.0).abs() < 1e-9);
        assert!((beta[1] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn fit_does_not_depend_on_scale() {
        // regressors around 1e-7 give normal-equation pivots far below 1e-12
        let rows: Vec<Vec<f64>> = (0..50).map(|i| vec![1e-7, (i % 7) as f64 * 1e-7]).collect();
        let y: Vec<f64> = rows.iter().map(|r| 2.0 * r[0] - 3.0 * r[1]).collect();
        let beta = least_squares(&rows, &y).unwrap();
        assert!((beta[0] - 2.0).abs() < 1e-6, "{beta:?}");
        assert!((beta[1] + 3.0).abs() < 1e-6, "{beta:?}");
    }

    #[test]
    fn collinear_design_is_rejected() {
        let rows: Vec<Vec<f64>> = (0..10).map(|i| vec![1.0, i as f64, 2.0 * i as f64]).collect();
        let y: Vec<f64> = (0..10).map(|i| i as f64).collect();
        assert!(least_squares(&rows, &y).is_none());
        assert!(least_squares(&vec![vec![1.0, 0.0]; 4], &[1.0; 4]).is_none());
    }
}
