//! One-class SVM over fixed windows of inter-arrival statistics.

use linfa::prelude::*;
use linfa_svm::Svm;
use ndarray::{Array1, Array2};
use serde::Serialize;

use super::Series;
use crate::error::{Error, Result};
use crate::output::OutputDir;
use crate::plot::Figure;
use crate::stats;

pub const WINDOW: usize = 50;
pub const NU: f64 = 0.1;

/// `1 / (n_features * var(X))` over every element of `records`.
pub fn scale_gamma(records: &Array2<f64>) -> f64 {
    let values: Vec<f64> = records.iter().copied().collect();
    let var = stats::population_variance(&values);
    if var.is_finite() && var > 0.0 {
        1.0 / (records.ncols().max(1) as f64 * var)
    } else {
        1.0
    }
}

/// `[mean, sample std, count]` of each full window, stepping by the window
/// size. The trailing window is only used when more data follows it.
pub fn window_features(deltas: &[f64], size: usize) -> Vec<Vec<f64>> {
    (0..deltas.len().saturating_sub(size))
        .step_by(size.max(1))
        .map(|start| {
            let window = &deltas[start..start + size];
            vec![stats::mean(window), stats::sample_std(window), window.len() as f64]
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    pub window: usize,
    pub start_index: usize,
    pub start_timestamp: f64,
    pub mean: f64,
    pub std: f64,
    pub count: usize,
    pub prediction: i8,
}

/// Fits a ν-one-class SVM with an RBF kernel on the standardized window
/// features and predicts every window with it: `1` inlier, `-1` outlier.
pub fn detect(series: &Series) -> Result<Vec<Row>> {
    let features = window_features(&series.deltas, WINDOW);
    if features.is_empty() {
        return Err(Error::NotEnoughData {
            needed: WINDOW + 1,
            got: series.len(),
        });
    }

    let scaled = stats::standardize(&stats::table(&features)?)?;
    let gamma = scale_gamma(&scaled);
    // linfa's gaussian kernel is exp(-|x - y|² / eps)
    let svm = Svm::<f64, Pr>::params()
        .nu_weight(NU)
        .gaussian_kernel(1.0 / gamma)
        .fit(&DatasetBase::new(scaled.clone(), Array1::from_elem(scaled.nrows(), ())))
        .map_err(|e| Error::Model(e.to_string()))?;
    let inliers: Array1<bool> = svm.predict(&scaled);
    log::info!("one-class SVM on {} windows, gamma {gamma:.4}", scaled.nrows());

    Ok(features
        .iter()
        .zip(inliers)
        .enumerate()
        .map(|(window, (raw, inlier))| {
            let start_index = window * WINDOW;
            Row {
                window,
                start_index,
                start_timestamp: series.timestamps[start_index],
                mean: raw[0],
                std: raw[1],
                count: raw[2] as usize,
                prediction: if inlier { 1 } else { -1 },
            }
        })
        .collect())
}

pub fn print(rows: &[Row]) {
    let outliers: Vec<usize> = rows.iter().filter(|r| r.prediction < 0).map(|r| r.window).collect();
    println!("{} of {} windows flagged: {outliers:?}", outliers.len(), rows.len());
}

pub fn write(rows: &[Row], out: &OutputDir) -> Result<()> {
    out.write_csv("ocsvm_windows.csv", rows)?;
    let predictions: Vec<f64> = rows.iter().map(|r| r.prediction as f64).collect();
    Figure::new("Sliding Window One-Class SVM Detection", "Window Index", "Anomaly Score")
        .line("One-Class SVM Window Score", &predictions)
        .write(&out.path("ocsvm_windows.html"))?;
    Ok(())
}
