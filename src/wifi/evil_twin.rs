use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::capture::Packet;
use crate::error::Result;
use crate::frame::Subtype;
use crate::mac::Mac;
use crate::output::{self, OutputDir};
use crate::plot;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SsidBssids {
    pub ssid: String,
    pub bssid_count: usize,
    pub bssids: String,
    pub attack_type: &'static str,
    pub suspicious: bool,
}

#[derive(Debug, Default)]
pub struct EvilTwinReport {
    pub ssids: Vec<SsidBssids>,
}

/// Maps every advertised SSID to the BSSIDs announcing it, from beacons and
/// probe responses. More than one BSSID for a name is a possible evil twin.
pub fn detect(packets: &[Packet]) -> EvilTwinReport {
    let mut seen: BTreeMap<String, BTreeSet<Mac>> = BTreeMap::new();
    for (_, m) in super::management(packets, &[Subtype::Beacon, Subtype::ProbeResponse]) {
        if let Some(ssid) = super::advertised_ssid(m) {
            seen.entry(ssid).or_default().insert(m.bssid);
        }
    }

    let ssids = seen
        .into_iter()
        .map(|(ssid, bssids)| SsidBssids {
            ssid,
            bssid_count: bssids.len(),
            bssids: output::join(&bssids),
            attack_type: "evil_twin",
            suspicious: bssids.len() > 1,
        })
        .collect();
    EvilTwinReport { ssids }
}

impl EvilTwinReport {
    pub fn suspicious(&self) -> impl Iterator<Item = &SsidBssids> {
        self.ssids.iter().filter(|s| s.suspicious)
    }

    pub fn print(&self) {
        let mut found = false;
        for s in self.suspicious() {
            found = true;
            println!("Possible Evil Twin Attack Detected: SSID '{}' is being broadcast by multiple BSSIDs:", s.ssid);
            for bssid in s.bssids.split(';') {
                println!("  - BSSID: {bssid}");
            }
        }
        if !found {
            println!("No Evil Twin Attack Found.");
        }
    }

    pub fn write(&self, out: &OutputDir) -> Result<()> {
        out.write_csv("evil_twin_results.csv", &self.ssids)?;
        let data: Vec<(String, f64)> = self
            .ssids
            .iter()
            .map(|s| (s.ssid.clone(), s.bssid_count as f64))
            .collect();
        plot::bar_chart(
            &out.path("evil_twin_results.html"),
            "Wi-Fi Attack: Evil Twin",
            "wlan.ssid",
            "bssid_count",
            &data,
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::capture::test::packets;
    use crate::frame::test::{beacon, probe_response, AP};

    #[test]
    fn same_ssid_from_two_bssids() {
        let twin = [0x02, 0x11, 0x22, 0x33, 0x44, 0x55];
        let report = detect(&packets(&[
            beacon(AP, "HomeWiFi"),
            beacon(AP, "HomeWiFi"),
            probe_response(twin, "HomeWiFi"),
            beacon(AP, "OfficeAP"),
            beacon(twin, ""),
        ]));
        assert_eq!(report.ssids.len(), 2);

        let home = &report.ssids[0];
        assert_eq!(home.ssid, "HomeWiFi");
        assert_eq!(home.bssid_count, 2);
        assert_eq!(home.bssids, "00:11:22:33:44:55;02:11:22:33:44:55");
        assert!(home.suspicious);

        let office = &report.ssids[1];
        assert_eq!(office.bssid_count, 1);
        assert!(!office.suspicious);
        assert_eq!(report.suspicious().count(), 1);
    }
}
