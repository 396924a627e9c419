//! Reading Kismet's SQLite log (`.kismet`).

use std::{fs, path::Path};

use chrono::{TimeZone, Utc};
use rusqlite::{types::ValueRef, Connection, OpenFlags};
use serde_json::{Map, Value};

use super::{Behavior, BluetoothDevice, BtType};
use crate::error::Result;

pub fn open(path: &Path) -> Result<Connection> {
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
    Ok(conn)
}

fn json_value(value: ValueRef) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Value::from(f),
        ValueRef::Text(t) | ValueRef::Blob(t) => Value::from(String::from_utf8_lossy(t).into_owned()),
    }
}

fn text(value: ValueRef) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) | ValueRef::Blob(t) => String::from_utf8_lossy(t).into_owned(),
    }
}

fn number(value: ValueRef) -> f64 {
    match value {
        ValueRef::Integer(i) => i as f64,
        ValueRef::Real(f) => f,
        ValueRef::Text(t) => String::from_utf8_lossy(t).trim().parse().unwrap_or(0.0),
        ValueRef::Null | ValueRef::Blob(_) => 0.0,
    }
}

/// Dumps every table as `{table: [row, ...]}`.
pub fn to_json(conn: &Connection) -> Result<Value> {
    let tables: Vec<String> = conn
        .prepare("SELECT name FROM sqlite_master WHERE type='table'")?
        .query_map([], |row| row.get(0))?
        .collect::<Result<_, _>>()?;

    let mut db = Map::new();
    for table in tables {
        let mut stmt = conn.prepare(&format!("SELECT * FROM \"{}\"", table.replace('"', "\"\"")))?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut object = Map::new();
            for (i, column) in columns.iter().enumerate() {
                object.insert(column.clone(), json_value(row.get_ref(i)?));
            }
            out.push(Value::Object(object));
        }
        log::debug!("exported {} rows of {table}", out.len());
        db.insert(table, Value::Array(out));
    }
    Ok(Value::Object(db))
}

pub fn export_json(conn: &Connection, path: &Path) -> Result<()> {
    let db = to_json(conn)?;
    fs::write(path, serde_json::to_string_pretty(&db)?)?;
    log::info!("exported Kismet DB to {path:?}");
    Ok(())
}

fn iso(secs: f64) -> String {
    Utc.timestamp_opt(secs as i64, 0)
        .single()
        .map(|t| t.to_rfc3339())
        .unwrap_or_default()
}

/// Service list and classic/LE type from the device's JSON record.
pub fn parse_device_record(record: Option<&str>) -> (String, BtType) {
    let Some(record) = record else {
        return ("None".to_string(), BtType::Unknown);
    };
    let parsed: Value = match serde_json::from_str(record) {
        Ok(x) => x,
        Err(e) => {
            log::debug!("invalid device record: {e}");
            return ("Invalid JSON".to_string(), BtType::Unknown);
        }
    };

    let empty = Value::Object(Map::new());
    let meta = parsed.as_object().map(|o| o.get("bluetooth.device").unwrap_or(&empty));
    let Some(meta) = meta.filter(|m| m.is_object()) else {
        log::debug!("device record is not a JSON object: {record}");
        return ("Invalid JSON".to_string(), BtType::Unknown);
    };
    let services: Vec<&str> = meta["bluetooth.device.services"]
        .as_array()
        .map(|a| a.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    let bt_type = match meta["bluetooth.device.type"].as_i64() {
        Some(1) => BtType::Ble,
        Some(0) => BtType::Classic,
        _ if services.iter().any(|s| s.starts_with("0000")) => BtType::Ble,
        _ => BtType::Unknown,
    };
    let services = if services.is_empty() {
        "None".to_string()
    } else {
        services.join(", ")
    };
    (services, bt_type)
}

/// Every device Kismet logged on the Bluetooth PHY.
pub fn bluetooth_devices(conn: &Connection) -> Result<Vec<BluetoothDevice>> {
    let mut stmt = conn.prepare(
        "SELECT devmac, phyname, type, strongest_signal, bytes_data, first_time, last_time, \
         avg_lat, avg_lon, device FROM devices",
    )?;
    let mut rows = stmt.query([])?;
    let mut devices = Vec::new();
    while let Some(row) = rows.next()? {
        let phyname = text(row.get_ref(1)?);
        if !phyname.eq_ignore_ascii_case("bluetooth") {
            continue;
        }
        let devmac = text(row.get_ref(0)?);
        let record = match row.get_ref(9)? {
            ValueRef::Null => None,
            v => Some(text(v)),
        };
        let (services, bt_type) = parse_device_record(record.as_deref());
        let first_time = number(row.get_ref(5)?);
        let last_time = number(row.get_ref(6)?);

        devices.push(BluetoothDevice {
            vendor_prefix: devmac.chars().take(8).collect(),
            devmac,
            phyname,
            device_type: text(row.get_ref(2)?),
            strongest_signal: number(row.get_ref(3)?),
            bytes_data: number(row.get_ref(4)?) as i64,
            first_time,
            last_time,
            first_seen: iso(first_time),
            last_seen: iso(last_time),
            services,
            bt_type,
            avg_lat: number(row.get_ref(7)?),
            avg_lon: number(row.get_ref(8)?),
            gps_inferred: false,
            duration_sec: 0.0,
            num_services: 0,
            behavior: Behavior::Unknown,
        });
    }
    log::info!("extracted {} Bluetooth devices", devices.len());
    Ok(devices)
}

/// Location fixes from the `snapshots` table as `(timestamp, lat, lon)`.
pub fn snapshots(conn: &Connection) -> Result<Vec<(f64, f64, f64)>> {
    let mut stmt = conn.prepare("SELECT ts_sec, ts_usec, lat, lon FROM snapshots ORDER BY ts_sec, ts_usec")?;
    let fixes = stmt
        .query_map([], |row| {
            let ts = number(row.get_ref(0)?) + number(row.get_ref(1)?) / 1_000_000.0;
            Ok((ts, number(row.get_ref(2)?), number(row.get_ref(3)?)))
        })?
        .collect::<Result<_, _>>()?;
    Ok(fixes)
}

/// Whether any device already carries a position.
pub fn has_gps(devices: &[BluetoothDevice]) -> bool {
    devices.iter().any(|d| d.avg_lat != 0.0)
}

/// Places every device at the snapshot closest in time to its first
/// sighting. Without usable snapshots every device is put at 0,0.
pub fn infer_gps(devices: &mut [BluetoothDevice], conn: &Connection) {
    let fixes = match snapshots(conn) {
        Ok(x) if !x.is_empty() => x,
        Ok(_) => {
            log::warn!("GPS inference failed: snapshots table is empty");
            Vec::new()
        }
        Err(e) => {
            log::warn!("GPS inference failed or snapshots table missing: {e}");
            Vec::new()
        }
    };

    for device in devices.iter_mut() {
        let closest = fixes
            .iter()
            .min_by(|a, b| (a.0 - device.first_time).abs().total_cmp(&(b.0 - device.first_time).abs()));
        match closest {
            Some(&(_, lat, lon)) => {
                device.avg_lat = lat;
                device.avg_lon = lon;
                device.gps_inferred = true;
            }
            None => {
                device.avg_lat = 0.0;
                device.avg_lon = 0.0;
                device.gps_inferred = false;
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;

    pub fn create_schema(conn: &Connection) {
        conn.execute_batch(
            "CREATE TABLE devices (first_time INT, last_time INT, devkey TEXT, phyname TEXT, \
             devmac TEXT, strongest_signal INT, min_lat REAL, min_lon REAL, max_lat REAL, \
             max_lon REAL, avg_lat REAL, avg_lon REAL, bytes_data INT, type TEXT, device BLOB);
             CREATE TABLE snapshots (ts_sec INT, ts_usec INT, lat REAL, lon REAL, snaptype TEXT, json BLOB);",
        )
        .unwrap();
    }

    pub fn kismet_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        create_schema(&conn);
        conn
    }

    pub fn insert_device(
        conn: &Connection,
        devmac: &str,
        phyname: &str,
        first: i64,
        last: i64,
        signal: i64,
        device: Option<&str>,
    ) {
        conn.execute(
            "INSERT INTO devices (first_time, last_time, devkey, phyname, devmac, strongest_signal, \
             avg_lat, avg_lon, bytes_data, type, device) VALUES (?1, ?2, 'k', ?3, ?4, ?5, 0, 0, 10, 'BTLE', ?6)",
            rusqlite::params![first, last, phyname, devmac, signal, device.map(|d| d.as_bytes().to_vec())],
        )
        .unwrap();
    }

    #[test]
    fn device_record_types() {
        let ble = r#"{"bluetooth.device": {"bluetooth.device.type": 1, "bluetooth.device.services": ["180f"]}}"#;
        assert_eq!(parse_device_record(Some(ble)), ("180f".to_string(), BtType::Ble));

        let classic = r#"{"bluetooth.device": {"bluetooth.device.type": 0}}"#;
        assert_eq!(parse_device_record(Some(classic)), ("None".to_string(), BtType::Classic));

        let guessed = r#"{"bluetooth.device": {"bluetooth.device.services": ["0000180d-0000", "abcd"]}}"#;
        assert_eq!(
            parse_device_record(Some(guessed)),
            ("0000180d-0000, abcd".to_string(), BtType::Ble)
        );

        assert_eq!(parse_device_record(Some("{}")), ("None".to_string(), BtType::Unknown));
        assert_eq!(parse_device_record(Some("{oops")), ("Invalid JSON".to_string(), BtType::Unknown));
        for record in ["[1]", r#""x""#, "null", r#"{"bluetooth.device": 5}"#] {
            assert_eq!(
                parse_device_record(Some(record)),
                ("Invalid JSON".to_string(), BtType::Unknown),
                "{record}"
            );
        }
        assert_eq!(parse_device_record(None), ("None".to_string(), BtType::Unknown));
    }

    #[test]
    fn extracts_only_bluetooth() {
        let conn = kismet_db();
        insert_device(&conn, "AA:BB:CC:00:00:01", "Bluetooth", 1_700_000_000, 1_700_000_100, -40, None);
        insert_device(&conn, "AA:BB:CC:00:00:02", "IEEE802.11", 1_700_000_000, 1_700_000_100, -40, None);
        let devices = bluetooth_devices(&conn).unwrap();
        assert_eq!(devices.len(), 1);
        let d = &devices[0];
        assert_eq!(d.vendor_prefix, "AA:BB:CC");
        assert_eq!(d.first_seen, "2023-11-14T22:13:20+00:00");
        assert_eq!(d.services, "None");
        assert_eq!(d.strongest_signal, -40.0);
        assert_eq!(d.bytes_data, 10);
    }

    #[test]
    fn json_export_has_every_table() {
        let conn = kismet_db();
        insert_device(&conn, "AA:BB:CC:00:00:01", "Bluetooth", 1, 2, -40, Some("{}"));
        let json = to_json(&conn).unwrap();
        assert_eq!(json["devices"][0]["devmac"], "AA:BB:CC:00:00:01");
        assert_eq!(json["devices"][0]["device"], "{}");
        assert_eq!(json["snapshots"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn gps_from_closest_snapshot() {
        let conn = kismet_db();
        insert_device(&conn, "AA:BB:CC:00:00:01", "Bluetooth", 100, 200, -40, None);
        insert_device(&conn, "AA:BB:CC:00:00:02", "Bluetooth", 160, 200, -40, None);
        conn.execute_batch(
            "INSERT INTO snapshots (ts_sec, ts_usec, lat, lon) VALUES (90, 0, 1.0, 2.0);
             INSERT INTO snapshots (ts_sec, ts_usec, lat, lon) VALUES (150, 500000, 3.0, 4.0);",
        )
        .unwrap();

        let mut devices = bluetooth_devices(&conn).unwrap();
        assert!(!has_gps(&devices));
        infer_gps(&mut devices, &conn);
        assert_eq!((devices[0].avg_lat, devices[0].avg_lon), (1.0, 2.0));
        assert_eq!((devices[1].avg_lat, devices[1].avg_lon), (3.0, 4.0));
        assert!(devices.iter().all(|d| d.gps_inferred));
    }

    #[test]
    fn gps_inference_without_snapshots() {
        let conn = Connection::open_in_memory().unwrap();
        let mut devices = vec![BluetoothDevice::default()];
        infer_gps(&mut devices, &conn);
        assert!(!devices[0].gps_inferred);
        assert_eq!(devices[0].avg_lat, 0.0);
    }
}
