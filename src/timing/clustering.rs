use linfa::prelude::*;
use linfa::ParamGuard;
use linfa_clustering::{Dbscan, KMeans};
use ndarray::{Array1, Array2};
use rand::{rngs::StdRng, SeedableRng};
use serde::Serialize;

use super::Series;
use crate::cluster::NOISE;
use crate::error::{Error, Result};
use crate::output::OutputDir;
use crate::plot::Figure;
use crate::stats;

#[derive(Debug, Clone)]
pub struct Params {
    pub eps: f64,
    pub min_samples: usize,
    pub k: usize,
    pub seed: u64,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            eps: 0.5,
            min_samples: 5,
            k: 2,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    pub index: usize,
    pub timestamp: f64,
    pub delta: f64,
    pub dbscan: i32,
    pub kmeans: usize,
}

/// Labels every Δt with a DBSCAN and a k-means cluster, both computed on
/// the standardized values.
pub fn detect(series: &Series, params: &Params) -> Result<Vec<Row>> {
    if series.len() < params.k.max(1) {
        return Err(Error::NotEnoughData {
            needed: params.k.max(1),
            got: series.len(),
        });
    }
    let column = Array2::from_shape_vec((series.len(), 1), series.deltas.clone())?;
    let scaled = stats::standardize(&column)?;

    let dbscan: Array1<Option<usize>> = Dbscan::params(params.min_samples)
        .tolerance(params.eps)
        .check()
        .map_err(|e| Error::Model(e.to_string()))?
        .transform(&scaled);

    let kmeans = KMeans::params_with_rng(params.k, StdRng::seed_from_u64(params.seed))
        .fit(&DatasetBase::from(scaled.clone()))
        .map_err(|e| Error::Model(e.to_string()))?;
    let labels: Array1<usize> = kmeans.predict(&scaled);
    log::info!("k-means centroids {}", kmeans.centroids());

    Ok(series
        .timestamps
        .iter()
        .zip(&series.deltas)
        .zip(dbscan.into_iter().zip(labels))
        .enumerate()
        .map(|(index, ((&timestamp, &delta), (dbscan, kmeans)))| Row {
            index,
            timestamp,
            delta,
            dbscan: dbscan.map_or(NOISE, |c| c as i32),
            kmeans,
        })
        .collect())
}

pub fn print(rows: &[Row]) {
    let mut dbscan: Vec<i32> = rows.iter().map(|r| r.dbscan).collect();
    dbscan.sort_unstable();
    dbscan.dedup();
    let noise = rows.iter().filter(|r| r.dbscan == NOISE).count();
    println!("DBSCAN labels {dbscan:?}, {noise} noise points");
    for k in 0..=rows.iter().map(|r| r.kmeans).max().unwrap_or_default() {
        println!("k-means cluster {k}: {} points", rows.iter().filter(|r| r.kmeans == k).count());
    }
}

pub fn write(rows: &[Row], out: &OutputDir) -> Result<()> {
    out.write_csv("delta_clusters.csv", rows)?;
    let deltas: Vec<f64> = rows.iter().map(|r| r.delta).collect();
    let dbscan: Vec<i32> = rows.iter().map(|r| r.dbscan).collect();
    let kmeans: Vec<usize> = rows.iter().map(|r| r.kmeans).collect();
    Figure::new("DBSCAN Clustering", "Packet Index", "Δt (seconds)")
        .labelled(&deltas, &dbscan)
        .write(&out.path("dbscan_clusters.html"))?;
    Figure::new("KMeans Clustering", "Packet Index", "Δt (seconds)")
        .labelled(&deltas, &kmeans)
        .write(&out.path("kmeans_clusters.html"))?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::timing::test::series;

    #[test]
    fn separates_two_rates() {
        let mut gaps = vec![0.1; 50];
        gaps.extend(vec![2.0; 50]);
        let rows = detect(&series(&gaps), &Params::default()).unwrap();
        assert_eq!(rows.len(), 101);

        // the leading zero sits with the fast gaps
        let fast = &rows[..51];
        let slow = &rows[51..];
        assert!(fast.iter().all(|r| r.kmeans == fast[0].kmeans && r.dbscan == fast[0].dbscan));
        assert!(slow.iter().all(|r| r.kmeans == slow[0].kmeans && r.dbscan == slow[0].dbscan));
        assert_ne!(fast[0].kmeans, slow[0].kmeans);
        assert_ne!(fast[0].dbscan, slow[0].dbscan);
        assert!(rows.iter().all(|r| r.dbscan != NOISE));
    }

    #[test]
    fn writes_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let out = OutputDir::create(dir.path()).unwrap();
        let rows = detect(&series(&[0.1, 0.1, 0.2, 3.0]), &Params::default()).unwrap();
        write(&rows, &out).unwrap();
        for name in ["delta_clusters.csv", "dbscan_clusters.html", "kmeans_clusters.html"] {
            assert!(out.path(name).exists());
        }
    }

    #[test]
    fn same_seed_same_labels() {
        let gaps: Vec<f64> = (0..60).map(|i| 0.05 * (i % 7) as f64).collect();
        let a = detect(&series(&gaps), &Params::default()).unwrap();
        let b = detect(&series(&gaps), &Params::default()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn too_short() {
        let empty = Series::new(Vec::new());
        assert!(matches!(
            detect(&empty, &Params::default()),
            Err(Error::NotEnoughData { needed: 2, got: 0 })
        ));
    }
}
