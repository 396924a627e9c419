//! Anomaly detection on frame inter-arrival times.

use std::path::Path;

use crate::capture;
use crate::error::Result;

pub mod arima;
pub mod autoencoder;
pub mod burst;
pub mod clustering;
pub mod deltas;
pub mod ocsvm;
pub mod statistical;

/// Capture timestamps and the gaps between them.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub timestamps: Vec<f64>,
    pub deltas: Vec<f64>,
}

impl Series {
    pub fn new(timestamps: Vec<f64>) -> Self {
        let deltas = deltas::deltas(&timestamps);
        Self { timestamps, deltas }
    }

    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self::new(capture::timestamps(path)?))
    }

    pub fn len(&self) -> usize {
        self.deltas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }
}

/// `(index, value)` pairs of the flagged samples.
fn flagged(values: &[f64], flags: impl IntoIterator<Item = bool>) -> Vec<(usize, f64)> {
    values
        .iter()
        .zip(flags)
        .enumerate()
        .filter(|(_, (_, flag))| *flag)
        .map(|(i, (v, _))| (i, *v))
        .collect()
}
