//! Dense autoencoder over sliding windows of inter-arrival times.
//!
//! Windows the network reconstructs badly are reported as anomalies.

use std::sync::{Mutex, PoisonError};

use burn::{
    backend::{Autodiff, NdArray},
    module::Module,
    nn::{
        loss::{MseLoss, Reduction},
        Linear, LinearConfig, Relu,
    },
    optim::{AdamConfig, GradientsParams, Optimizer},
    tensor::{backend::Backend, Data, Shape, Tensor},
};
use rand::{prelude::*, rngs::StdRng};
use serde::Serialize;

use super::Series;
use crate::error::{Error, Result};
use crate::output::OutputDir;
use crate::plot::Figure;
use crate::stats;

type Train = Autodiff<NdArray<f32>>;

/// The ndarray backend keeps a single process-wide RNG for parameter init.
static BACKEND_RNG: Mutex<()> = Mutex::new(());

#[derive(Debug, Clone)]
pub struct Params {
    pub window: usize,
    pub hidden: usize,
    pub latent: usize,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub seed: u64,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            window: 10,
            hidden: 8,
            latent: 4,
            epochs: 50,
            batch_size: 32,
            learning_rate: 1e-3,
            seed: 42,
        }
    }
}

/// window -> hidden -> latent -> hidden -> window, ReLU everywhere but the
/// output layer.
#[derive(Module, Debug)]
pub struct Autoencoder<B: Backend> {
    encoder_fc1: Linear<B>,
    encoder_fc2: Linear<B>,
    decoder_fc1: Linear<B>,
    decoder_fc2: Linear<B>,
    activation: Relu,
}

impl<B: Backend> Autoencoder<B> {
    pub fn new(params: &Params, device: &B::Device) -> Self {
        Self {
            encoder_fc1: LinearConfig::new(params.window, params.hidden).init(device),
            encoder_fc2: LinearConfig::new(params.hidden, params.latent).init(device),
            decoder_fc1: LinearConfig::new(params.latent, params.hidden).init(device),
            decoder_fc2: LinearConfig::new(params.hidden, params.window).init(device),
            activation: Relu::new(),
        }
    }

    pub fn encode(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.activation.forward(self.encoder_fc1.forward(x));
        self.activation.forward(self.encoder_fc2.forward(x))
    }

    pub fn decode(&self, z: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.activation.forward(self.decoder_fc1.forward(z));
        self.decoder_fc2.forward(x)
    }

    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        self.decode(self.encode(x))
    }

    /// Mean squared reconstruction error of every row, shape `[rows, 1]`.
    pub fn reconstruction_error(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let diff = x.clone() - self.forward(x);
        (diff.clone() * diff).mean_dim(1)
    }
}

fn to_tensor(rows: &[&Vec<f64>], device: &<Train as Backend>::Device) -> Tensor<Train, 2> {
    let width = rows.first().map_or(0, |r| r.len());
    let values: Vec<f32> = rows.iter().flat_map(|r| r.iter().map(|v| *v as f32)).collect();
    Tensor::from_data(Data::new(values, Shape::new([rows.len(), width])), device)
}

/// Seeded parameter initialization.
pub fn init(params: &Params, device: &<Train as Backend>::Device) -> Autoencoder<Train> {
    let _guard = BACKEND_RNG.lock().unwrap_or_else(PoisonError::into_inner);
    Train::seed(params.seed);
    Autoencoder::new(params, device)
}

/// Adam on the mean squared reconstruction error, reshuffling the windows
/// every epoch.
pub fn train(
    mut model: Autoencoder<Train>,
    data: &[Vec<f64>],
    params: &Params,
    device: &<Train as Backend>::Device,
) -> Autoencoder<Train> {
    let mut optim = AdamConfig::new().with_epsilon(1e-7).init::<Train, Autoencoder<Train>>();
    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut order: Vec<usize> = (0..data.len()).collect();

    for epoch in 0..params.epochs {
        order.shuffle(&mut rng);
        let mut total = 0.0;
        for chunk in order.chunks(params.batch_size.max(1)) {
            let batch: Vec<&Vec<f64>> = chunk.iter().map(|&i| &data[i]).collect();
            let x = to_tensor(&batch, device);
            let loss = MseLoss::new().forward(model.forward(x.clone()), x, Reduction::Mean);
            total += f64::from(loss.clone().into_scalar()) * chunk.len() as f64;

            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optim.step(params.learning_rate, model, grads);
        }
        log::trace!("epoch {epoch}: loss {}", total / data.len().max(1) as f64);
    }
    model
}

pub fn errors(model: &Autoencoder<Train>, data: &[Vec<f64>], device: &<Train as Backend>::Device) -> Vec<f64> {
    if data.is_empty() {
        return Vec::new();
    }
    let rows: Vec<&Vec<f64>> = data.iter().collect();
    model
        .reconstruction_error(to_tensor(&rows, device))
        .into_data()
        .value
        .into_iter()
        .map(f64::from)
        .collect()
}

/// Windows of `size` consecutive values, `len - size` of them.
pub fn windows(values: &[f64], size: usize) -> Vec<Vec<f64>> {
    (0..values.len().saturating_sub(size))
        .map(|i| values[i..i + size].to_vec())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    pub window: usize,
    pub start_timestamp: f64,
    pub error: f64,
    pub anomaly: bool,
}

#[derive(Debug)]
pub struct Report {
    pub threshold: f64,
    pub rows: Vec<Row>,
}

pub fn detect(series: &Series, params: &Params) -> Result<Report> {
    let data = windows(&series.deltas, params.window);
    if data.is_empty() {
        return Err(Error::NotEnoughData {
            needed: params.window + 1,
            got: series.len(),
        });
    }

    let device = Default::default();
    let model = train(init(params, &device), &data, params, &device);
    let errors = errors(&model, &data, &device);
    let threshold = stats::mean(&errors) + 3.0 * stats::population_std(&errors);
    log::info!("autoencoder trained on {} windows, threshold {threshold:.6}", data.len());

    let rows = errors
        .into_iter()
        .enumerate()
        .map(|(window, error)| Row {
            window,
            start_timestamp: series.timestamps[window],
            error,
            anomaly: error > threshold,
        })
        .collect();
    Ok(Report { threshold, rows })
}

impl Report {
    pub fn anomalies(&self) -> impl Iterator<Item = &Row> {
        self.rows.iter().filter(|r| r.anomaly)
    }

    pub fn print(&self) {
        println!(
            "{} anomalous windows out of {} (error > {:.6})",
            self.anomalies().count(),
            self.rows.len(),
            self.threshold
        );
    }

    pub fn write(&self, out: &OutputDir) -> Result<()> {
        out.write_csv("autoencoder_errors.csv", &self.rows)?;
        let errors: Vec<f64> = self.rows.iter().map(|r| r.error).collect();
        let anomalies: Vec<(usize, f64)> = self.anomalies().map(|r| (r.window, r.error)).collect();
        Figure::new("Autoencoder Anomaly Detection", "Sequence Index", "Reconstruction Error")
            .line("Reconstruction Error", &errors)
            .hline("Threshold", self.threshold, errors.len())
            .points("Anomalies", "#d62728", &anomalies)
            .write(&out.path("autoencoder_errors.html"))?;
        Ok(())
    }
}
