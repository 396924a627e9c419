//! Detectors for attacks visible in 802.11 management and EAPOL traffic.

use crate::capture::Packet;
use crate::frame::{Management, Subtype};

pub mod deauth;
pub mod eapol;
pub mod evil_twin;
pub mod rogue_ap;

/// Management frames of the given subtypes, in capture order.
pub fn management<'a>(
    packets: &'a [Packet],
    subtypes: &'a [Subtype],
) -> impl Iterator<Item = (&'a Packet, &'a Management)> + 'a {
    packets.iter().filter_map(move |p| {
        let m = p.frame.as_ref()?.management()?;
        subtypes.contains(&m.subtype).then_some((p, m))
    })
}

/// SSIDs as advertised, with the hidden (empty) SSID mapped to `None`.
pub fn advertised_ssid(m: &Management) -> Option<String> {
    m.ssid().filter(|s| !s.is_empty())
}
