use std::path::Path;

use pcap::{Capture as PcapCapture, Offline};
use radiotap::Radiotap;

use crate::error::Result;
use crate::frame::{self, WlanFrame};

const LINKTYPE_IEEE802_11: i32 = 105;
const LINKTYPE_IEEE802_11_RADIOTAP: i32 = 127;
const FCS_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    Radiotap,
    Ieee80211,
    Other(i32),
}

impl Link {
    pub fn from_linktype(linktype: i32) -> Self {
        match linktype {
            LINKTYPE_IEEE802_11_RADIOTAP => Link::Radiotap,
            LINKTYPE_IEEE802_11 => Link::Ieee80211,
            x => Link::Other(x),
        }
    }

    pub fn is_wifi(&self) -> bool {
        matches!(self, Link::Radiotap | Link::Ieee80211)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub index: usize,
    /// Seconds since the epoch.
    pub timestamp: f64,
    /// Antenna signal in dBm, if the capture carries radiotap.
    pub signal: Option<i8>,
    pub frame: Option<WlanFrame>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub packets: usize,
    pub decoded: usize,
    pub undecoded: usize,
}

pub struct Capture {
    inner: PcapCapture<Offline>,
    link: Link,
}

impl Capture {
    pub fn open(path: &Path) -> Result<Self> {
        let inner = PcapCapture::from_file(path)?;
        let link = Link::from_linktype(inner.get_datalink().0);
        log::debug!("opened {path:?} with link type {link:?}");
        Ok(Self { inner, link })
    }

    pub fn link(&self) -> Link {
        self.link
    }

    /// Reads every packet. 802.11 frames are decoded when the link type
    /// allows it; frames that fail to decode are kept with `frame: None`.
    pub fn packets(mut self) -> Result<(Vec<Packet>, CaptureStats)> {
        let mut packets = Vec::new();
        let mut stats = CaptureStats::default();
        loop {
            let p = match self.inner.next_packet() {
                Err(pcap::Error::NoMorePackets) => break,
                x => x?,
            };
            let timestamp = p.header.ts.tv_sec as f64 + p.header.ts.tv_usec as f64 / 1_000_000.0;
            let packet = decode(self.link, stats.packets, timestamp, p.data);

            stats.packets += 1;
            if packet.frame.is_some() {
                stats.decoded += 1;
            } else if self.link.is_wifi() {
                stats.undecoded += 1;
            }
            packets.push(packet);
        }

        log::info!(
            "read {} packets ({} decoded 802.11 frames, {} skipped)",
            stats.packets,
            stats.decoded,
            stats.undecoded
        );
        Ok((packets, stats))
    }
}

/// Opens `path` and reads all of its packets.
pub fn read(path: &Path) -> Result<(Link, Vec<Packet>)> {
    let capture = Capture::open(path)?;
    let link = capture.link();
    let (packets, _) = capture.packets()?;
    Ok((link, packets))
}

pub fn decode(link: Link, index: usize, timestamp: f64, data: &[u8]) -> Packet {
    let mut packet = Packet {
        index,
        timestamp,
        signal: None,
        frame: None,
    };

    let payload = match link {
        Link::Radiotap => {
            let radiotap = match Radiotap::from_bytes(data) {
                Ok(x) => x,
                Err(e) => {
                    log::debug!("packet {index}: bad radiotap header: {e}");
                    return packet;
                }
            };
            packet.signal = radiotap.antenna_signal.map(|s| s.value);
            let has_fcs = radiotap.flags.map(|f| f.fcs).unwrap_or(false);
            let payload = data.get(radiotap.header.length..).unwrap_or_default();
            if has_fcs && payload.len() >= FCS_LEN {
                &payload[..payload.len() - FCS_LEN]
            } else {
                payload
            }
        }
        Link::Ieee80211 => data,
        Link::Other(_) => return packet,
    };

    match frame::parse(payload) {
        Ok(frame) => packet.frame = frame,
        Err(e) => log::debug!("packet {index}: {e:?}"),
    }
    packet
}

/// Timestamps of every packet in the capture, whatever its link type.
pub fn timestamps(path: &Path) -> Result<Vec<f64>> {
    let mut capture = PcapCapture::from_file(path)?;
    let mut timestamps = Vec::new();
    loop {
        let p = match capture.next_packet() {
            Err(pcap::Error::NoMorePackets) => break,
            x => x?,
        };
        timestamps.push(p.header.ts.tv_sec as f64 + p.header.ts.tv_usec as f64 / 1_000_000.0);
    }
    log::info!("read {} timestamps from {path:?}", timestamps.len());
    Ok(timestamps)
}
