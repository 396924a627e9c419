use clap::ValueEnum;
use indexmap::{IndexMap, IndexSet};
use serde::Serialize;

use crate::capture::Packet;
use crate::error::Result;
use crate::frame::{stable_element, Management};
use crate::mac::Mac;
use crate::output::{self, OutputDir};

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Elements {
    /// Only elements a station keeps constant across probes.
    #[default]
    Stable,
    /// Every tagged element in the probe request.
    All,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FingerprintCluster {
    pub cluster: usize,
    pub fingerprint: String,
    pub mac_count: usize,
    pub macs: String,
}

/// SHA-256 over the selected elements as they appear on the air, or `None`
/// if the probe carries none of them.
pub fn fingerprint(m: &Management, elements: Elements) -> Option<String> {
    let bytes: Vec<u8> = m
        .elements
        .iter()
        .filter(|e| elements == Elements::All || stable_element(e.id))
        .flat_map(|e| e.to_bytes())
        .collect();
    if bytes.is_empty() {
        return None;
    }
    Some(sha256::digest(&bytes))
}

/// Groups probe-request source addresses by fingerprint. Only fingerprints
/// shared by more than one MAC form a cluster unless `singletons` is set.
pub fn cluster(packets: &[Packet], elements: Elements, singletons: bool) -> Vec<FingerprintCluster> {
    let mut prints: IndexMap<String, IndexSet<Mac>> = IndexMap::new();
    for (_, m) in super::probe_requests(packets) {
        let Some(fp) = fingerprint(m, elements) else {
            continue;
        };
        prints.entry(fp).or_default().insert(m.source);
    }

    prints
        .into_iter()
        .filter(|(_, macs)| singletons || macs.len() > 1)
        .enumerate()
        .map(|(i, (fingerprint, macs))| FingerprintCluster {
            cluster: i + 1,
            fingerprint,
            mac_count: macs.len(),
            macs: output::join(&macs),
        })
        .collect()
}

pub fn print(clusters: &[FingerprintCluster]) {
    if clusters.is_empty() {
        println!("No multi-MAC clusters found.");
    }
    for c in clusters {
        println!("Cluster {} ({}...): {}", c.cluster, &c.fingerprint[..8], c.macs);
    }
}

pub fn write(clusters: &[FingerprintCluster], out: &OutputDir) -> Result<()> {
    out.write_csv("fingerprint_clusters.csv", clusters)?;
    Ok(())
}
