use serde::Serialize;

use super::{flagged, Series};
use crate::error::Result;
use crate::output::OutputDir;
use crate::plot::Figure;
use crate::stats;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Band {
    pub mean: f64,
    pub std: f64,
    pub lower: f64,
    pub upper: f64,
}

impl Band {
    /// mean ± 3 sample standard deviations
    pub fn three_sigma(values: &[f64]) -> Self {
        let mean = stats::mean(values);
        let std = stats::sample_std(values);
        Self {
            mean,
            std,
            lower: mean - 3.0 * std,
            upper: mean + 3.0 * std,
        }
    }

    /// NaN bounds never flag anything.
    pub fn outside(&self, value: f64) -> bool {
        value > self.upper || value < self.lower
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    pub index: usize,
    pub timestamp: f64,
    pub delta: f64,
    pub anomaly: bool,
}

#[derive(Debug)]
pub struct Report {
    pub band: Band,
    pub rows: Vec<Row>,
}

pub fn detect(series: &Series) -> Report {
    let band = Band::three_sigma(&series.deltas);
    let rows = series
        .timestamps
        .iter()
        .zip(&series.deltas)
        .enumerate()
        .map(|(index, (&timestamp, &delta))| Row {
            index,
            timestamp,
            delta,
            anomaly: band.outside(delta),
        })
        .collect();
    Report { band, rows }
}

impl Report {
    pub fn anomalies(&self) -> impl Iterator<Item = &Row> {
        self.rows.iter().filter(|r| r.anomaly)
    }

    pub fn print(&self) {
        println!(
            "Δt mean {:.6}s, std {:.6}s, band [{:.6}, {:.6}]",
            self.band.mean, self.band.std, self.band.lower, self.band.upper
        );
        println!("{} anomalies out of {} packets", self.anomalies().count(), self.rows.len());
    }

    pub fn write(&self, out: &OutputDir) -> Result<()> {
        out.write_csv("time_delta_statistical.csv", &self.rows)?;
        let deltas: Vec<f64> = self.rows.iter().map(|r| r.delta).collect();
        let len = deltas.len();
        Figure::new("Statistical Threshold Anomaly Detection", "Packet Index", "Δt (seconds)")
            .line("Δt", &deltas)
            .hline("Upper Threshold", self.band.upper, len)
            .hline("Lower Threshold", self.band.lower, len)
            .points("Anomalies", "#d62728", &flagged(&deltas, self.rows.iter().map(|r| r.anomaly)))
            .write(&out.path("time_delta_statistical.html"))?;
        Ok(())
    }
}
