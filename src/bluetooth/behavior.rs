use std::collections::{BTreeMap, BTreeSet};

use chrono::{TimeZone, Timelike, Utc};
use itertools::Itertools;
use serde::Serialize;

use super::{Behavior, BluetoothDevice};
use crate::error::Result;
use crate::output::OutputDir;
use crate::plot::{self, Figure};

pub fn num_services(services: &str) -> usize {
    if services.is_empty() || services == "None" {
        return 0;
    }
    services.split(',').count()
}

/// Later rules win over earlier ones.
pub fn classify(duration_sec: f64, num_services: usize, strongest_signal: f64) -> Behavior {
    let mut behavior = Behavior::Unknown;
    if num_services == 0 && duration_sec <= 30.0 {
        behavior = Behavior::Advertiser;
    }
    if duration_sec > 300.0 {
        behavior = Behavior::Persistent;
    }
    if num_services > 3 {
        behavior = Behavior::RichServices;
    }
    if duration_sec <= 60.0 && strongest_signal >= -50.0 {
        behavior = Behavior::Scanner;
    }
    behavior
}

pub fn classify_all(devices: &mut [BluetoothDevice]) {
    for d in devices.iter_mut() {
        d.duration_sec = d.last_time - d.first_time;
        d.num_services = num_services(&d.services);
        d.behavior = classify(d.duration_sec, d.num_services, d.strongest_signal);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RotatingVendor {
    pub vendor_prefix: String,
    pub unique_macs: usize,
}

/// Vendor prefixes seen behind more than one address.
pub fn rotating_macs(devices: &[BluetoothDevice]) -> Vec<RotatingVendor> {
    let mut vendors: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for d in devices {
        vendors.entry(d.vendor_prefix.as_str()).or_default().insert(d.devmac.as_str());
    }
    vendors
        .into_iter()
        .filter(|(_, macs)| macs.len() > 1)
        .map(|(vendor, macs)| RotatingVendor {
            vendor_prefix: vendor.to_string(),
            unique_macs: macs.len(),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepeatedAdvertiser {
    pub devmac: String,
    pub count: usize,
}

/// Short-lived addresses that show up in more than one device record.
pub fn repetitive_advertisers(devices: &[BluetoothDevice]) -> Vec<RepeatedAdvertiser> {
    devices
        .iter()
        .filter(|d| d.duration_sec <= 60.0)
        .map(|d| d.devmac.as_str())
        .counts()
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .sorted()
        .map(|(devmac, count)| RepeatedAdvertiser {
            devmac: devmac.to_string(),
            count,
        })
        .collect()
}

pub fn strong_no_services(devices: &[BluetoothDevice]) -> Vec<BluetoothDevice> {
    devices
        .iter()
        .filter(|d| d.strongest_signal >= -40.0 && d.num_services == 0)
        .cloned()
        .collect()
}

/// The ten most common vendor prefixes, most frequent first.
pub fn vendor_distribution(devices: &[BluetoothDevice]) -> Vec<(String, f64)> {
    devices
        .iter()
        .map(|d| d.vendor_prefix.as_str())
        .counts()
        .into_iter()
        .sorted_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)))
        .take(10)
        .map(|(vendor, count)| (vendor.to_string(), count as f64))
        .collect()
}

/// Number of devices first seen in each UTC hour.
pub fn timeline(devices: &[BluetoothDevice]) -> Vec<(String, f64)> {
    let mut hours: BTreeMap<i64, usize> = BTreeMap::new();
    for d in devices {
        let hour = (d.first_time as i64).div_euclid(3600) * 3600;
        *hours.entry(hour).or_default() += 1;
    }
    hours
        .into_iter()
        .filter_map(|(hour, count)| {
            let t = Utc.timestamp_opt(hour, 0).single()?;
            Some((format!("{} {:02}:00", t.date_naive(), t.hour()), count as f64))
        })
        .collect()
}

fn with_behavior(devices: &[BluetoothDevice], behavior: Behavior) -> Vec<BluetoothDevice> {
    devices.iter().filter(|d| d.behavior == behavior).cloned().collect()
}

pub fn write(devices: &[BluetoothDevice], out: &OutputDir) -> Result<()> {
    out.write_csv("bluetooth_devices.csv", devices)?;
    for (name, behavior) in [
        ("advertisers.csv", Behavior::Advertiser),
        ("persistent.csv", Behavior::Persistent),
        ("rich_services.csv", Behavior::RichServices),
        ("scanners.csv", Behavior::Scanner),
    ] {
        out.write_csv(name, &with_behavior(devices, behavior))?;
    }
    out.write_csv("rotating_macs.csv", &rotating_macs(devices))?;
    out.write_csv("repetitive_advertisers.csv", &repetitive_advertisers(devices))?;
    out.write_csv("strong_no_services.csv", &strong_no_services(devices))?;

    plot::bar_chart(
        &out.path("vendor_distribution.html"),
        "Top 10 Vendor Prefixes",
        "Vendor Prefix",
        "Devices",
        &vendor_distribution(devices),
    )?;
    let (hours, counts): (Vec<String>, Vec<f64>) = timeline(devices).into_iter().unzip();
    Figure::new("Devices First Seen per Hour", "Hour (UTC)", "Devices")
        .line_xy("Devices", hours, counts)
        .write(&out.path("device_timeline.html"))?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    fn device(devmac: &str, first: f64, last: f64, signal: f64, services: &str) -> BluetoothDevice {
        let mut d = BluetoothDevice {
            devmac: devmac.to_string(),
            vendor_prefix: devmac.chars().take(8).collect(),
            first_time: first,
            last_time: last,
            strongest_signal: signal,
            services: services.to_string(),
            ..Default::default()
        };
        classify_all(std::slice::from_mut(&mut d));
        d
    }

    #[test]
    fn counts_services() {
        assert_eq!(num_services("None"), 0);
        assert_eq!(num_services(""), 0);
        assert_eq!(num_services("180f"), 1);
        assert_eq!(num_services("180f, 180a, 1812"), 3);
    }

    #[test]
    fn later_rules_override() {
        assert_eq!(classify(10.0, 0, -80.0), Behavior::Advertiser);
        assert_eq!(classify(10.0, 0, -40.0), Behavior::Scanner);
        assert_eq!(classify(400.0, 0, -40.0), Behavior::Persistent);
        assert_eq!(classify(400.0, 5, -40.0), Behavior::RichServices);
        assert_eq!(classify(45.0, 5, -50.0), Behavior::Scanner);
        assert_eq!(classify(100.0, 1, -70.0), Behavior::Unknown);
    }

    #[test]
    fn derived_tables() {
        let devices = vec![
            device("AA:BB:CC:00:00:01", 0.0, 10.0, -30.0, "None"),
            device("AA:BB:CC:00:00:01", 100.0, 110.0, -80.0, "180f"),
            device("AA:BB:CC:00:00:02", 0.0, 1000.0, -60.0, "None"),
            device("11:22:33:00:00:01", 3600.0, 4000.0, -35.0, "180f"),
        ];
        assert_eq!(
            rotating_macs(&devices),
            vec![RotatingVendor {
                vendor_prefix: "AA:BB:CC".to_string(),
                unique_macs: 2
            }]
        );
        assert_eq!(
            repetitive_advertisers(&devices),
            vec![RepeatedAdvertiser {
                devmac: "AA:BB:CC:00:00:01".to_string(),
                count: 2
            }]
        );
        let strong = strong_no_services(&devices);
        assert_eq!(strong.len(), 1);
        assert_eq!(strong[0].strongest_signal, -30.0);

        assert_eq!(
            vendor_distribution(&devices),
            vec![("AA:BB:CC".to_string(), 3.0), ("11:22:33".to_string(), 1.0)]
        );
        assert_eq!(
            timeline(&devices),
            vec![
                ("1970-01-01 00:00".to_string(), 3.0),
                ("1970-01-01 01:00".to_string(), 1.0)
            ]
        );
    }
}
