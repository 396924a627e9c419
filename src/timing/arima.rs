//! ARIMA(2,0,1) one-step forecasts of the inter-arrival times.
//!
//! The model is fitted with the Hannan–Rissanen procedure: a long
//! autoregression estimates the innovations, then the ARMA coefficients
//! come from a least-squares regression on lagged values and lagged
//! innovations.

use serde::Serialize;

use super::{flagged, Series};
use crate::error::{Error, Result};
use crate::output::OutputDir;
use crate::plot::Figure;
use crate::stats;

pub const MIN_SAMPLES: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Arma21 {
    pub constant: f64,
    pub ar: [f64; 2],
    pub ma: f64,
}

fn lagged(y: &[f64], t: usize, lags: usize) -> Vec<f64> {
    let mut row = Vec::with_capacity(lags + 1);
    row.push(1.0);
    row.extend((1..=lags).map(|k| y[t - k]));
    row
}

impl Arma21 {
    pub fn fit(y: &[f64]) -> Result<Self> {
        if y.len() < MIN_SAMPLES {
            return Err(Error::NotEnoughData {
                needed: MIN_SAMPLES,
                got: y.len(),
            });
        }
        let n = y.len();

        // long AR for the innovations
        let m = (n / 4).clamp(2, 20);
        let rows: Vec<Vec<f64>> = (m..n).map(|t| lagged(y, t, m)).collect();
        let Some(long_ar) = stats::least_squares(&rows, &y[m..]) else {
            log::warn!("long autoregression is singular, falling back to the mean");
            return Ok(Self::mean_only(y));
        };
        let mut innovations = vec![0.0; n];
        for (t, row) in (m..n).zip(&rows) {
            let fitted: f64 = row.iter().zip(&long_ar).map(|(x, b)| x * b).sum();
            innovations[t] = y[t] - fitted;
        }

        let start = (m + 1).max(2);
        let rows: Vec<Vec<f64>> = (start..n)
            .map(|t| vec![1.0, y[t - 1], y[t - 2], innovations[t - 1]])
            .collect();
        let Some(beta) = stats::least_squares(&rows, &y[start..]) else {
            log::warn!("ARMA regression is singular, falling back to the mean");
            return Ok(Self::mean_only(y));
        };
        let model = Self {
            constant: beta[0],
            ar: [beta[1], beta[2]],
            ma: beta[3],
        };
        log::debug!("fitted {model:?}");
        Ok(model)
    }

    fn mean_only(y: &[f64]) -> Self {
        Self {
            constant: stats::mean(y),
            ar: [0.0, 0.0],
            ma: 0.0,
        }
    }

    /// Unconditional mean of the process, or NaN when it is not stationary.
    pub fn process_mean(&self) -> f64 {
        let denominator = 1.0 - self.ar[0] - self.ar[1];
        if denominator.abs() < 1e-9 {
            return f64::NAN;
        }
        self.constant / denominator
    }

    /// In-sample one-step predictions. Values before the start of the series
    /// are taken as the process mean with zero innovations.
    pub fn predict(&self, y: &[f64]) -> Vec<f64> {
        let mut mu = self.process_mean();
        if !mu.is_finite() {
            mu = stats::mean(y);
        }
        let at = |t: isize| if t < 0 { mu } else { y[t as usize] };

        let mut predictions = Vec::with_capacity(y.len());
        let mut previous_innovation = 0.0;
        for (t, &value) in y.iter().enumerate() {
            let t = t as isize;
            let prediction =
                self.constant + self.ar[0] * at(t - 1) + self.ar[1] * at(t - 2) + self.ma * previous_innovation;
            previous_innovation = value - prediction;
            predictions.push(prediction);
        }
        predictions
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    pub index: usize,
    pub timestamp: f64,
    pub delta: f64,
    pub forecast: f64,
    pub residual: f64,
    pub anomaly: bool,
}

#[derive(Debug)]
pub struct Report {
    pub model: Arma21,
    pub threshold: f64,
    pub rows: Vec<Row>,
}

/// Flags samples whose residual exceeds three standard deviations of all
/// residuals.
pub fn detect(series: &Series) -> Result<Report> {
    let model = Arma21::fit(&series.deltas)?;
    let forecast = model.predict(&series.deltas);
    let residuals: Vec<f64> = series.deltas.iter().zip(&forecast).map(|(y, f)| y - f).collect();
    let threshold = 3.0 * stats::sample_std(&residuals);

    let rows = (0..series.len())
        .map(|i| Row {
            index: i,
            timestamp: series.timestamps[i],
            delta: series.deltas[i],
            forecast: forecast[i],
            residual: residuals[i],
            anomaly: residuals[i].abs() > threshold,
        })
        .collect();
    Ok(Report { model, threshold, rows })
}

impl Report {
    pub fn anomalies(&self) -> impl Iterator<Item = &Row> {
        self.rows.iter().filter(|r| r.anomaly)
    }

    pub fn print(&self) {
        let m = &self.model;
        println!(
            "ARIMA(2,0,1): const {:.6}, ar [{:.4}, {:.4}], ma {:.4}",
            m.constant, m.ar[0], m.ar[1], m.ma
        );
        println!(
            "{} anomalies out of {} packets (|residual| > {:.6})",
            self.anomalies().count(),
            self.rows.len(),
            self.threshold
        );
    }

    pub fn write(&self, out: &OutputDir) -> Result<()> {
        out.write_csv("arima_forecast.csv", &self.rows)?;
        let deltas: Vec<f64> = self.rows.iter().map(|r| r.delta).collect();
        let forecast: Vec<f64> = self.rows.iter().map(|r| r.forecast).collect();
        Figure::new("ARIMA Forecasting Anomaly Detection", "Packet Index", "Δt (seconds)")
            .line("Δt", &deltas)
            .line("ARIMA Forecast", &forecast)
            .points("Anomaly", "#d62728", &flagged(&deltas, self.rows.iter().map(|r| r.anomaly)))
            .write(&out.path("arima_forecast.html"))?;
        Ok(())
    }
}
