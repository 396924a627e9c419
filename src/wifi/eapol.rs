use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use crate::capture::Packet;
use crate::error::Result;
use crate::mac::Mac;
use crate::output::OutputDir;
use crate::plot;

pub const DEFAULT_THRESHOLD: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EapolSummary {
    pub source: Mac,
    pub count: usize,
    /// Key frames whose replay counter this source had already used.
    pub duplicate_replay_counters: usize,
    pub first_seen: f64,
    pub last_seen: f64,
    pub attack_type: &'static str,
    pub suspicious: bool,
}

#[derive(Debug, Default)]
pub struct EapolReport {
    pub threshold: usize,
    pub sources: Vec<EapolSummary>,
}

#[derive(Default)]
struct Tally {
    count: usize,
    duplicates: usize,
    counters: HashSet<u64>,
    first_seen: f64,
    last_seen: f64,
}

/// Counts EAPOL frames per source. A source sending more than `threshold`
/// of them is flagged as a possible replay.
pub fn detect(packets: &[Packet], threshold: usize) -> EapolReport {
    let mut tallies: BTreeMap<Mac, Tally> = BTreeMap::new();
    for p in packets {
        let Some((data, eapol)) = p.frame.as_ref().and_then(|f| f.eapol()) else {
            continue;
        };
        let tally = tallies.entry(data.source).or_insert_with(|| Tally {
            first_seen: p.timestamp,
            ..Default::default()
        });
        tally.count += 1;
        tally.last_seen = p.timestamp;
        if let Some(key) = eapol.key {
            if !tally.counters.insert(key.replay_counter) {
                tally.duplicates += 1;
            }
        }
    }

    let sources = tallies
        .into_iter()
        .map(|(source, t)| EapolSummary {
            source,
            count: t.count,
            duplicate_replay_counters: t.duplicates,
            first_seen: t.first_seen,
            last_seen: t.last_seen,
            attack_type: "eapol_replay",
            suspicious: t.count > threshold,
        })
        .collect();

    EapolReport { threshold, sources }
}

impl EapolReport {
    pub fn suspicious(&self) -> impl Iterator<Item = &EapolSummary> {
        self.sources.iter().filter(|s| s.suspicious)
    }

    pub fn print(&self) {
        let mut found = false;
        for s in self.suspicious() {
            found = true;
            println!(
                "Possible EAPOL Replay Attack detected: {} EAPOL messages from {} ({} reused replay counters)",
                s.count, s.source, s.duplicate_replay_counters
            );
        }
        if !found {
            println!("No EAPOL Replay Attack Found.");
        }
    }

    pub fn write(&self, out: &OutputDir) -> Result<()> {
        out.write_csv("eapol_replay_results.csv", &self.sources)?;
        let data: Vec<(String, f64)> = self
            .sources
            .iter()
            .map(|s| (s.source.to_string(), s.count as f64))
            .collect();
        plot::bar_chart(
            &out.path("eapol_replay_results.html"),
            "Wi-Fi Attack: EAPOL Replay",
            "wlan.sa",
            "count",
            &data,
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::capture::test::packets;
    use crate::frame::test::{eapol_key, AP, STA};

    #[test]
    fn flags_sources_over_threshold() {
        let other = [0x0a, 0, 0, 0, 0, 2];
        let frames = vec![
            eapol_key(AP, STA, 1),
            eapol_key(AP, STA, 2),
            eapol_key(AP, STA, 2),
            eapol_key(AP, STA, 2),
            eapol_key(other, STA, 1),
        ];
        let report = detect(&packets(&frames), DEFAULT_THRESHOLD);
        assert_eq!(report.sources.len(), 2);

        let ap = &report.sources[0];
        assert_eq!(ap.source, Mac(AP));
        assert_eq!(ap.count, 4);
        assert_eq!(ap.duplicate_replay_counters, 2);
        assert!(ap.suspicious);
        assert_eq!(ap.last_seen - ap.first_seen, 3.0);

        let other = &report.sources[1];
        assert_eq!(other.count, 1);
        assert!(!other.suspicious);
        assert_eq!(report.suspicious().count(), 1);
    }

    #[test]
    fn threshold_is_exclusive() {
        let frames: Vec<Vec<u8>> = (0..3).map(|i| eapol_key(AP, STA, i)).collect();
        let report = detect(&packets(&frames), 3);
        assert_eq!(report.suspicious().count(), 0);
        let report = detect(&packets(&frames), 2);
        assert_eq!(report.suspicious().count(), 1);
    }
}
