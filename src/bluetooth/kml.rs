use std::{fmt::Write as _, fs, path::Path};

use super::BluetoothDevice;
use crate::error::Result;

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

/// CDATA can't contain its own terminator.
fn cdata(s: &str) -> String {
    s.replace("]]>", "]]]]><![CDATA[>")
}

/// KML 2.2 document with one placemark per located device.
pub fn render(devices: &[BluetoothDevice]) -> String {
    let mut kml = String::new();
    kml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    kml.push_str("<kml xmlns=\"http://www.opengis.net/kml/2.2\">\n");
    kml.push_str("<Document>\n<name>Bluetooth Devices</name>\n");

    for d in devices {
        if d.avg_lat == 0.0 && d.avg_lon == 0.0 {
            continue;
        }
        let description = format!(
            "Vendor: {}<br/>Type: {}<br/>Behavior: {}<br/>Signal: {}<br/>Services: {}<br/>GPS Inferred: {}",
            d.vendor_prefix, d.bt_type, d.behavior, d.strongest_signal, d.services, d.gps_inferred
        );
        // writing into a String can't fail
        let _ = write!(
            kml,
            "<Placemark>\n<name>{}</name>\n<description><![CDATA[{}]]></description>\n\
             <Point><coordinates>{},{},0</coordinates></Point>\n</Placemark>\n",
            escape(&d.devmac),
            cdata(&description),
            d.avg_lon,
            d.avg_lat
        );
    }

    kml.push_str("</Document>\n</kml>\n");
    kml
}

pub fn write(devices: &[BluetoothDevice], path: &Path) -> Result<()> {
    fs::write(path, render(devices))?;
    log::info!("wrote KML to {path:?}");
    Ok(())
}
