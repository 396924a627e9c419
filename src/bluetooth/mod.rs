//! Bluetooth device profiling from Kismet logs.

use std::path::Path;

use serde::Serialize;

use crate::error::Result;
use crate::output::OutputDir;

pub mod behavior;
pub mod kismet;
pub mod kml;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum BtType {
    #[serde(rename = "BLE")]
    Ble,
    Classic,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Behavior {
    Advertiser,
    Persistent,
    RichServices,
    Scanner,
    #[default]
    Unknown,
}

impl std::fmt::Display for Behavior {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Behavior::Advertiser => "advertiser",
            Behavior::Persistent => "persistent",
            Behavior::RichServices => "rich_services",
            Behavior::Scanner => "scanner",
            Behavior::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

impl std::fmt::Display for BtType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BtType::Ble => "BLE",
            BtType::Classic => "Classic",
            BtType::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BluetoothDevice {
    pub devmac: String,
    pub phyname: String,
    #[serde(rename = "type")]
    pub device_type: String,
    pub strongest_signal: f64,
    pub bytes_data: i64,
    pub vendor_prefix: String,
    pub first_time: f64,
    pub last_time: f64,
    pub first_seen: String,
    pub last_seen: String,
    pub services: String,
    pub bt_type: BtType,
    pub avg_lat: f64,
    pub avg_lon: f64,
    pub gps_inferred: bool,
    pub duration_sec: f64,
    pub num_services: usize,
    pub behavior: Behavior,
}

#[derive(Debug, Clone, Copy)]
pub struct Options {
    pub json: bool,
    pub kml: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self { json: true, kml: true }
    }
}

/// Runs the whole Bluetooth pipeline on one Kismet log and returns the
/// classified devices.
pub fn run(db: &Path, out: &OutputDir, options: Options) -> Result<Vec<BluetoothDevice>> {
    let conn = kismet::open(db)?;
    if options.json {
        kismet::export_json(&conn, &out.path("kismet_export.json"))?;
    }

    let mut devices = kismet::bluetooth_devices(&conn)?;
    if devices.is_empty() {
        log::warn!("no Bluetooth devices in {db:?}");
    }
    if !kismet::has_gps(&devices) {
        log::info!("no GPS in device records, inferring from snapshots");
        kismet::infer_gps(&mut devices, &conn);
    }

    behavior::classify_all(&mut devices);
    behavior::write(&devices, out)?;
    if options.kml {
        kml::write(&devices, &out.path("bluetooth_devices.kml"))?;
    }
    Ok(devices)
}

pub fn print(devices: &[BluetoothDevice]) {
    let count = |b: Behavior| devices.iter().filter(|d| d.behavior == b).count();
    println!("Bluetooth devices: {}", devices.len());
    for b in [
        Behavior::Advertiser,
        Behavior::Persistent,
        Behavior::RichServices,
        Behavior::Scanner,
        Behavior::Unknown,
    ] {
        println!("  {b}: {}", count(b));
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use kismet::test::{create_schema, insert_device};
    use rusqlite::Connection;

    #[test]
    fn pipeline_writes_every_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("capture.kismet");
        {
            let conn = Connection::open(&db).unwrap();
            create_schema(&conn);
            insert_device(&conn, "AA:BB:CC:00:00:01", "Bluetooth", 1000, 1010, -30, None);
            insert_device(&conn, "AA:BB:CC:00:00:02", "Bluetooth", 1000, 2000, -70, None);
            conn.execute("INSERT INTO snapshots (ts_sec, ts_usec, lat, lon) VALUES (1000, 0, 47.5, 8.5)", [])
                .unwrap();
        }

        let out = OutputDir::create(dir.path().join("out")).unwrap();
        let devices = run(&db, &out, Options::default()).unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].behavior, Behavior::Scanner);
        assert_eq!(devices[1].behavior, Behavior::Persistent);
        assert!(devices.iter().all(|d| d.gps_inferred && d.avg_lat == 47.5));

        for name in [
            "kismet_export.json",
            "bluetooth_devices.csv",
            "advertisers.csv",
            "persistent.csv",
            "rich_services.csv",
            "scanners.csv",
            "rotating_macs.csv",
            "repetitive_advertisers.csv",
            "strong_no_services.csv",
            "vendor_distribution.html",
            "device_timeline.html",
            "bluetooth_devices.kml",
        ] {
            assert!(out.path(name).exists(), "{name} missing");
        }
    }
}
