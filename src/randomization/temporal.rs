use std::collections::BTreeMap;

use itertools::Itertools;
use serde::Serialize;

use crate::capture::Packet;
use crate::cluster::dbscan_features;
use crate::error::Result;
use crate::mac::Mac;
use crate::output::OutputDir;
use crate::stats;

const SEQUENCE_MODULO: i32 = 4096;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemporalProfile {
    pub mac: Mac,
    pub mean_gap: f64,
    pub std_gap: f64,
    pub total_time: f64,
    pub frame_count: usize,
    pub mean_seq_delta: f64,
    pub std_seq_delta: f64,
    pub cluster: i32,
}

impl TemporalProfile {
    fn features(&self, with_sequence: bool) -> Vec<f64> {
        let mut f = vec![self.mean_gap, self.std_gap, self.total_time, self.frame_count as f64];
        if with_sequence {
            f.extend([self.mean_seq_delta, self.std_seq_delta]);
        }
        f
    }
}

#[derive(Debug, Clone)]
pub struct TemporalParams {
    pub eps: f64,
    pub min_samples: usize,
    pub with_sequence: bool,
}

impl Default for TemporalParams {
    fn default() -> Self {
        Self {
            eps: 5.0,
            min_samples: 1,
            with_sequence: false,
        }
    }
}

fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    (stats::mean(values), stats::population_std(values))
}

/// Builds one timing profile per transmitting MAC, ordered by MAC.
pub fn profiles(packets: &[Packet]) -> Vec<TemporalProfile> {
    let mut seen: BTreeMap<Mac, Vec<(f64, u16)>> = BTreeMap::new();
    for p in packets {
        if let Some(frame) = &p.frame {
            seen.entry(frame.source()).or_default().push((p.timestamp, frame.sequence()));
        }
    }

    seen.into_iter()
        .map(|(mac, mut points)| {
            points.sort_by(|a, b| a.0.total_cmp(&b.0));
            let gaps: Vec<f64> = points.iter().tuple_windows().map(|(a, b)| b.0 - a.0).collect();
            let seq_deltas: Vec<f64> = points
                .iter()
                .tuple_windows()
                .map(|(a, b)| (b.1 as i32 - a.1 as i32).rem_euclid(SEQUENCE_MODULO) as f64)
                .collect();
            let (mean_gap, std_gap) = mean_std(&gaps);
            let (mean_seq_delta, std_seq_delta) = mean_std(&seq_deltas);
            let total_time = match (points.first(), points.last()) {
                (Some(first), Some(last)) => last.0 - first.0,
                _ => 0.0,
            };
            TemporalProfile {
                mac,
                mean_gap,
                std_gap,
                total_time,
                frame_count: points.len(),
                mean_seq_delta,
                std_seq_delta,
                cluster: crate::cluster::NOISE,
            }
        })
        .collect()
}

pub fn cluster(packets: &[Packet], params: &TemporalParams) -> Vec<TemporalProfile> {
    let mut profiles = profiles(packets);
    let features: Vec<Vec<f64>> = profiles.iter().map(|p| p.features(params.with_sequence)).collect();
    let labels = dbscan_features(&features, params.eps, params.min_samples);
    for (p, label) in profiles.iter_mut().zip(labels) {
        p.cluster = label;
    }
    profiles
}

pub fn print(profiles: &[TemporalProfile]) {
    for (label, group) in &profiles.iter().sorted_by_key(|p| p.cluster).group_by(|p| p.cluster) {
        println!("Cluster {label}: {}", group.map(|p| p.mac).join(", "));
    }
}

pub fn write(profiles: &[TemporalProfile], out: &OutputDir) -> Result<()> {
    out.write_csv("temporal_clusters.csv", profiles)?;
    Ok(())
}
