use std::collections::BTreeMap;

use serde::Serialize;

use crate::capture::Packet;
use crate::error::Result;
use crate::frame::Subtype;
use crate::mac::Mac;
use crate::output::OutputDir;
use crate::plot;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeauthFrame {
    pub timestamp: f64,
    pub source: Mac,
    pub destination: Mac,
    pub bssid: Mac,
    pub reason: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeauthSummary {
    pub source: Mac,
    pub bssid: Mac,
    pub count: usize,
    pub attack_type: &'static str,
}

#[derive(Debug, Default)]
pub struct DeauthReport {
    pub frames: Vec<DeauthFrame>,
    pub summary: Vec<DeauthSummary>,
}

pub fn detect(packets: &[Packet]) -> DeauthReport {
    let frames: Vec<DeauthFrame> = super::management(packets, &[Subtype::Deauthentication])
        .map(|(p, m)| DeauthFrame {
            timestamp: p.timestamp,
            source: m.source,
            destination: m.receiver,
            bssid: m.bssid,
            reason: m.reason,
        })
        .collect();

    let mut counts: BTreeMap<(Mac, Mac), usize> = BTreeMap::new();
    for f in &frames {
        *counts.entry((f.source, f.bssid)).or_default() += 1;
    }
    let mut summary: Vec<DeauthSummary> = counts
        .into_iter()
        .map(|((source, bssid), count)| DeauthSummary {
            source,
            bssid,
            count,
            attack_type: "deauth",
        })
        .collect();
    summary.sort_by(|a, b| b.count.cmp(&a.count));

    DeauthReport { frames, summary }
}

impl DeauthReport {
    pub fn detected(&self) -> bool {
        !self.frames.is_empty()
    }

    pub fn print(&self) {
        if !self.detected() {
            println!("No Deauthentication Attack Found.");
            return;
        }
        println!("Deauthentication Attack Detected! Possible MAC addresses involved:");
        for s in &self.summary {
            println!("  {} -> bssid {} ({} frames)", s.source, s.bssid, s.count);
        }
    }

    pub fn write(&self, out: &OutputDir) -> Result<()> {
        out.write_csv("deauth_frames.csv", &self.frames)?;
        out.write_csv("deauth_results.csv", &self.summary)?;
        let data: Vec<(String, f64)> = self
            .summary
            .iter()
            .map(|s| (s.source.to_string(), s.count as f64))
            .collect();
        plot::bar_chart(
            &out.path("deauth_results.html"),
            "Wi-Fi Attack: Deauth",
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
    use crate::frame::test::{beacon, deauth, AP, STA};

    #[test]
    fn groups_by_source_and_bssid() {
        let other = [0x02, 0, 0, 0, 0, 1];
        let packets = packets(&[
            beacon(AP, "HomeWiFi"),
            deauth(AP, STA, AP),
            deauth(AP, [0xff; 6], AP),
            deauth(other, STA, AP),
            deauth(AP, STA, AP),
        ]);
        let report = detect(&packets);
        assert!(report.detected());
        assert_eq!(report.frames.len(), 4);
        assert_eq!(report.frames[0].reason, Some(7));
        assert_eq!(report.frames[1].destination, Mac::BROADCAST);

        assert_eq!(report.summary.len(), 2);
        assert_eq!(report.summary[0].source, Mac(AP));
        assert_eq!(report.summary[0].count, 3);
        assert_eq!(report.summary[1].source, Mac(other));
        assert_eq!(report.summary[1].count, 1);
    }

    #[test]
    fn nothing_to_report() {
        let report = detect(&packets(&[beacon(AP, "HomeWiFi")]));
        assert!(!report.detected());
        assert!(report.summary.is_empty());
    }

    #[test]
    fn writes_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let out = OutputDir::create(dir.path()).unwrap();
        detect(&packets(&[deauth(AP, STA, AP)])).write(&out).unwrap();
        let csv = std::fs::read_to_string(out.path("deauth_results.csv")).unwrap();
        assert_eq!(
            csv,
            "source,bssid,count,attack_type\n00:11:22:33:44:55,00:11:22:33:44:55,1,deauth\n"
        );
        assert!(out.path("deauth_results.html").exists());
    }
}
