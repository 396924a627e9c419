use serde::Serialize;

use super::{flagged, Series};
use crate::error::Result;
use crate::output::OutputDir;
use crate::plot::Figure;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// Gaps below this are part of a burst.
    pub burst: f64,
    /// Gaps above this are silences.
    pub silence: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            burst: 0.001,
            silence: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    pub index: usize,
    pub timestamp: f64,
    pub delta: f64,
    pub burst: bool,
    pub silence: bool,
}

pub fn detect(series: &Series, thresholds: Thresholds) -> Vec<Row> {
    series
        .timestamps
        .iter()
        .zip(&series.deltas)
        .enumerate()
        .map(|(index, (&timestamp, &delta))| Row {
            index,
            timestamp,
            delta,
            burst: delta < thresholds.burst,
            silence: delta > thresholds.silence,
        })
        .collect()
}

pub fn print(rows: &[Row]) {
    let bursts = rows.iter().filter(|r| r.burst).count();
    let silences = rows.iter().filter(|r| r.silence).count();
    println!("{bursts} burst gaps, {silences} silences out of {} packets", rows.len());
}

pub fn write(rows: &[Row], out: &OutputDir) -> Result<()> {
    out.write_csv("burst_silence.csv", rows)?;
    let deltas: Vec<f64> = rows.iter().map(|r| r.delta).collect();
    Figure::new("Burst and Silence Detection", "Packet Index", "Δt (seconds)")
        .line("Δt", &deltas)
        .points("Burst", "#ff7f0e", &flagged(&deltas, rows.iter().map(|r| r.burst)))
        .points("Silence", "#9467bd", &flagged(&deltas, rows.iter().map(|r| r.silence)))
        .write(&out.path("burst_silence.html"))?;
    Ok(())
}
