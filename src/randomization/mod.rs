//! Groups randomized MAC addresses that likely belong to the same station.

use crate::capture::Packet;
use crate::frame::{Management, Subtype};

pub mod fingerprint;
pub mod ssid;
pub mod temporal;

/// Probe requests in capture order.
pub fn probe_requests(packets: &[Packet]) -> impl Iterator<Item = (&Packet, &Management)> {
    packets.iter().filter_map(|p| {
        let m = p.frame.as_ref()?.management()?;
        (m.subtype == Subtype::ProbeRequest).then_some((p, m))
    })
}
