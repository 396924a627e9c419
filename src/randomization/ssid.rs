use std::collections::BTreeSet;

use indexmap::IndexMap;
use itertools::Itertools;
use serde::Serialize;

use crate::capture::Packet;
use crate::cluster;
use crate::error::Result;
use crate::mac::Mac;
use crate::output::{self, OutputDir};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SsidCluster {
    pub mac: Mac,
    pub ssids: String,
    pub cluster: i32,
}

pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f64 / union as f64
}

/// Per source MAC, the set of SSIDs it probed for by name, in first-seen
/// order of the MACs. Stations that only sent broadcast probes get an
/// empty set.
pub fn ssid_sets(packets: &[Packet]) -> IndexMap<Mac, BTreeSet<String>> {
    let mut sets: IndexMap<Mac, BTreeSet<String>> = IndexMap::new();
    for (_, m) in super::probe_requests(packets) {
        let ssids = sets.entry(m.source).or_default();
        if let Some(ssid) = m.ssid().filter(|s| !s.is_empty()) {
            ssids.insert(ssid);
        }
    }
    sets
}

/// DBSCAN over `1 - jaccard` between the SSID sets of every pair of MACs.
pub fn cluster(packets: &[Packet], eps: f64, min_samples: usize) -> Vec<SsidCluster> {
    let sets = ssid_sets(packets);
    let distances: Vec<Vec<f64>> = sets
        .values()
        .map(|a| sets.values().map(|b| 1.0 - jaccard(a, b)).collect())
        .collect();
    let labels = cluster::dbscan_precomputed(&distances, eps, min_samples);

    sets.into_iter()
        .zip(labels)
        .map(|((mac, ssids), cluster)| SsidCluster {
            mac,
            ssids: output::join(&ssids),
            cluster,
        })
        .collect()
}

pub fn print(rows: &[SsidCluster]) {
    for (label, group) in &rows.iter().sorted_by_key(|r| r.cluster).group_by(|r| r.cluster) {
        println!("Cluster {label}: {}", group.map(|r| r.mac).join(", "));
    }
}

pub fn write(rows: &[SsidCluster], out: &OutputDir) -> Result<()> {
    out.write_csv("ssid_list_clusters.csv", rows)?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::capture::test::packets;
    use crate::frame::test::probe_request;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn jaccard_index() {
        assert_eq!(jaccard(&set(&[]), &set(&[])), 1.0);
        assert_eq!(jaccard(&set(&["a"]), &set(&[])), 0.0);
        assert_eq!(jaccard(&set(&["a", "b"]), &set(&["b", "c"])), 1.0 / 3.0);
        assert_eq!(jaccard(&set(&["a", "b"]), &set(&["b", "a"])), 1.0);
    }

    #[test]
    fn shared_networks_cluster_together() {
        let a = [0x02, 0, 0, 0, 0, 1];
        let b = [0x02, 0, 0, 0, 0, 2];
        let c = [0x02, 0, 0, 0, 0, 3];
        let d = [0x02, 0, 0, 0, 0, 4];
        let packets = packets(&[
            probe_request(a, 1, &[(0, b"home")]),
            probe_request(a, 2, &[(0, b"work")]),
            probe_request(b, 3, &[(0, b"home")]),
            probe_request(b, 4, &[(0, b"work")]),
            probe_request(b, 5, &[(0, b"gym")]),
            probe_request(c, 6, &[(0, b"airport")]),
            probe_request(d, 7, &[(0, b"")]),
        ]);

        let sets = ssid_sets(&packets);
        assert_eq!(sets.len(), 4);
        assert_eq!(sets.keys().copied().collect::<Vec<_>>(), vec![Mac(a), Mac(b), Mac(c), Mac(d)]);
        assert!(sets[&Mac(d)].is_empty());

        let rows = cluster(&packets, 0.5, 1);
        assert_eq!(rows[0].ssids, "home;work");
        // a and b share 2 of 3 names: distance 1/3
        assert_eq!(rows[0].cluster, rows[1].cluster);
        assert_ne!(rows[0].cluster, rows[2].cluster);
        assert_ne!(rows[2].cluster, rows[3].cluster);

        let rows = cluster(&packets, 0.5, 2);
        assert_eq!(rows[2].cluster, cluster::NOISE);
        assert_eq!(rows[3].cluster, cluster::NOISE);
    }
}
