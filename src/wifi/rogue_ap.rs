use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::capture::Packet;
use crate::error::Result;
use crate::frame::Subtype;
use crate::mac::Mac;
use crate::output::OutputDir;
use crate::plot::Figure;

pub const DEFAULT_KNOWN_SSIDS: [&str; 4] = ["HomeWiFi", "OfficeAP", "SecureNetwork", "PublicWiFi"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccessPoint {
    pub ssid: String,
    pub bssid: Mac,
    pub beacons: usize,
    pub whitelist: bool,
    pub attack_type: &'static str,
}

#[derive(Debug, Default)]
pub struct RogueApReport {
    pub access_points: Vec<AccessPoint>,
}

/// Splits comma separated SSID lists and drops blanks.
pub fn parse_known(lists: &[String]) -> BTreeSet<String> {
    lists
        .iter()
        .flat_map(|l| l.split(','))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Labels every distinct (SSID, BSSID) pair seen in beacons as known or
/// rogue, depending on whether the SSID is trusted.
pub fn detect(packets: &[Packet], known: &BTreeSet<String>) -> RogueApReport {
    let mut beacons: BTreeMap<(String, Mac), usize> = BTreeMap::new();
    for (_, m) in super::management(packets, &[Subtype::Beacon]) {
        let ssid = m.ssid().unwrap_or_default();
        *beacons.entry((ssid, m.bssid)).or_default() += 1;
    }

    let access_points = beacons
        .into_iter()
        .map(|((ssid, bssid), beacons)| {
            let whitelist = known.contains(&ssid);
            AccessPoint {
                ssid,
                bssid,
                beacons,
                whitelist,
                attack_type: if whitelist { "known_ap" } else { "rogue_ap" },
            }
        })
        .collect();
    RogueApReport { access_points }
}

impl RogueApReport {
    pub fn rogue(&self) -> impl Iterator<Item = &AccessPoint> {
        self.access_points.iter().filter(|ap| !ap.whitelist)
    }

    pub fn print(&self) {
        let rogue: Vec<_> = self.rogue().collect();
        if rogue.is_empty() {
            println!("No Rogue APs Detected.");
            return;
        }
        println!("Rogue Access Points Detected:");
        for ap in rogue {
            println!("  - SSID: {}, BSSID: {} (Not in trusted SSID list!)", ap.ssid, ap.bssid);
        }
    }

    pub fn write(&self, out: &OutputDir) -> Result<()> {
        out.write_csv("rogue_ap_results.csv", &self.access_points)?;

        let mut figure = Figure::new("Wi-Fi Attack: Rogue AP", "wlan.ssid", "BSSIDs");
        for label in ["known_ap", "rogue_ap"] {
            let mut per_ssid: BTreeMap<&str, f64> = BTreeMap::new();
            for ap in self.access_points.iter().filter(|ap| ap.attack_type == label) {
                *per_ssid.entry(ap.ssid.as_str()).or_default() += 1.0;
            }
            let (x, y) = per_ssid.into_iter().map(|(s, c)| (s.to_string(), c)).unzip();
            figure = figure.bars(label, x, y);
        }
        figure.write(&out.path("rogue_ap_results.html"))?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::capture::test::packets;
    use crate::frame::test::{beacon, AP};

    #[test]
    fn known_list_parsing() {
        let known = parse_known(&["HomeWiFi, OfficeAP".to_string(), " ,Lab".to_string()]);
        assert_eq!(
            known.into_iter().collect::<Vec<_>>(),
            vec!["HomeWiFi", "Lab", "OfficeAP"]
        );
    }

    #[test]
    fn labels_unknown_ssids_as_rogue() {
        let known = parse_known(&[DEFAULT_KNOWN_SSIDS.join(",")]);
        let other = [0x02, 0, 0, 0, 0, 9];
        let report = detect(
            &packets(&[
                beacon(AP, "HomeWiFi"),
                beacon(AP, "HomeWiFi"),
                beacon(other, "FreeCoffee"),
            ]),
            &known,
        );
        assert_eq!(report.access_points.len(), 2);
        let rogue: Vec<_> = report.rogue().collect();
        assert_eq!(rogue.len(), 1);
        assert_eq!(rogue[0].ssid, "FreeCoffee");
        assert_eq!(rogue[0].attack_type, "rogue_ap");

        let home = report.access_points.iter().find(|ap| ap.ssid == "HomeWiFi").unwrap();
        assert!(home.whitelist);
        assert_eq!(home.beacons, 2);
    }
}
