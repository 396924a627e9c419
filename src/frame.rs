use byteorder::{BigEndian, ByteOrder};
use libwifi::parsers::{parse_frame_control, parse_management_header};
use libwifi::{FrameSubType, FrameType};
use nom::bytes::complete::take;
use nom::combinator::map;
use nom::number::complete::{le_u16, le_u64, u8};
use nom::sequence::tuple;
use nom::IResult;

use crate::mac::Mac;

const LLC_SNAP_EAPOL: [u8; 8] = [0xaa, 0xaa, 0x03, 0x00, 0x00, 0x00, 0x88, 0x8e];
const EAPOL_KEY: u8 = 3;

#[derive(Debug, Clone, PartialEq)]
pub enum WlanFrame {
    Management(Management),
    Data(Data),
}

impl WlanFrame {
    pub fn source(&self) -> Mac {
        match self {
            WlanFrame::Management(m) => m.source,
            WlanFrame::Data(d) => d.source,
        }
    }

    pub fn sequence(&self) -> u16 {
        match self {
            WlanFrame::Management(m) => m.sequence,
            WlanFrame::Data(d) => d.sequence,
        }
    }

    pub fn management(&self) -> Option<&Management> {
        match self {
            WlanFrame::Management(m) => Some(m),
            WlanFrame::Data(_) => None,
        }
    }

    pub fn eapol(&self) -> Option<(&Data, &Eapol)> {
        match self {
            WlanFrame::Data(d) => d.eapol.as_ref().map(|e| (d, e)),
            WlanFrame::Management(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subtype {
    Beacon,
    ProbeRequest,
    ProbeResponse,
    Deauthentication,
    Disassociation,
    Other(u8),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Management {
    pub subtype: Subtype,
    /// addr1
    pub receiver: Mac,
    /// addr2
    pub source: Mac,
    /// addr3
    pub bssid: Mac,
    pub sequence: u16,
    /// Reason code of deauthentication and disassociation frames.
    pub reason: Option<u16>,
    pub elements: Vec<Element>,
}

impl Management {
    pub fn ssid(&self) -> Option<String> {
        self.element(0).map(|e| String::from_utf8_lossy(&e.data).into_owned())
    }

    pub fn element(&self, id: u8) -> Option<&Element> {
        self.elements.iter().find(|e| e.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Element {
    pub id: u8,
    pub data: Vec<u8>,
}

impl Element {
    /// The element as it appears on the air: id, length, payload.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.data.len() + 2);
        bytes.push(self.id);
        bytes.push(self.data.len() as u8);
        bytes.extend(&self.data);
        bytes
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Data {
    pub source: Mac,
    pub destination: Mac,
    pub bssid: Mac,
    pub sequence: u16,
    pub eapol: Option<Eapol>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Eapol {
    pub version: u8,
    pub packet_type: u8,
    pub key: Option<EapolKey>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EapolKey {
    pub descriptor: u8,
    pub key_info: u16,
    pub replay_counter: u64,
}

/// Decodes an 802.11 MPDU without radiotap header and without FCS.
/// Control frames and unsupported frame types yield `Ok(None)`.
pub fn parse(input: &[u8]) -> Result<Option<WlanFrame>, libwifi::error::Error> {
    // subtype nibble and flags byte, before libwifi consumes them
    let raw_subtype = input.first().map(|b| b >> 4).unwrap_or_default();
    let flags = input.get(1).copied().unwrap_or_default();

    let (_, frame_control) = parse_frame_control(input)?;
    match frame_control.frame_type {
        FrameType::Management => parse_management(input, raw_subtype).map(|m| m.map(WlanFrame::Management)),
        FrameType::Data => parse_data(input, raw_subtype, flags).map(|d| Some(WlanFrame::Data(d))),
        _ => Ok(None),
    }
}

fn parse_management(input: &[u8], raw_subtype: u8) -> Result<Option<Management>, libwifi::error::Error> {
    let (input, frame_control) = parse_frame_control(input)?;

    let subtype = match frame_control.frame_subtype {
        FrameSubType::Beacon => Subtype::Beacon,
        FrameSubType::ProbeRequest => Subtype::ProbeRequest,
        FrameSubType::ProbeResponse => Subtype::ProbeResponse,
        FrameSubType::Deauthentication => Subtype::Deauthentication,
        FrameSubType::Disassociation => Subtype::Disassociation,
        _ => Subtype::Other(raw_subtype),
    };

    let (input, header) = parse_management_header(frame_control, input)?;

    let mut management = Management {
        subtype,
        receiver: Mac(header.address_1.0),
        source: Mac(header.address_2.0),
        bssid: Mac(header.address_3.0),
        sequence: header.sequence_control.sequence_number,
        reason: None,
        elements: Vec::new(),
    };

    match subtype {
        Subtype::Beacon | Subtype::ProbeResponse => {
            let (input, (_timestamp, _beacon_interval, _capability_info)) =
                tuple((le_u64, le_u16, le_u16))(input)?;
            management.elements = parse_elements(input);
        }
        Subtype::ProbeRequest => management.elements = parse_elements(input),
        Subtype::Deauthentication | Subtype::Disassociation => {
            let (_, reason) = le_u16(input)?;
            management.reason = Some(reason);
        }
        Subtype::Other(_) => (),
    }

    Ok(Some(management))
}

fn parse_data(input: &[u8], raw_subtype: u8, flags: u8) -> Result<Data, libwifi::error::Error> {
    let to_ds = flags & 0x01 != 0;
    let from_ds = flags & 0x02 != 0;
    let protected = flags & 0x40 != 0;
    let order = flags & 0x80 != 0;
    let qos = raw_subtype & 0x08 != 0;

    let (input, _frame_control) = parse_frame_control(input)?;
    let (mut input, (_duration, addr1, addr2, addr3, sequence_control)) =
        tuple((le_u16, mac_address, mac_address, mac_address, le_u16))(input)?;

    let mut addr4 = None;
    if to_ds && from_ds {
        let (rest, a) = mac_address(input)?;
        input = rest;
        addr4 = Some(a);
    }
    if qos {
        let (rest, _qos_control) = le_u16(input)?;
        input = rest;
        // the order bit on a QoS frame announces an HT control field
        if order {
            let (rest, _ht_control) = take(4usize)(input)?;
            input = rest;
        }
    }

    let (destination, source, bssid) = match (to_ds, from_ds) {
        (false, false) => (addr1, addr2, addr3),
        (true, false) => (addr3, addr2, addr1),
        (false, true) => (addr1, addr3, addr2),
        // mesh / WDS: there is no single BSSID, use the transmitter
        (true, true) => (addr3, addr4.unwrap_or(addr2), addr2),
    };

    let eapol = if protected { None } else { parse_eapol(input) };

    Ok(Data {
        source,
        destination,
        bssid,
        sequence: sequence_control >> 4,
        eapol,
    })
}

fn mac_address(input: &[u8]) -> IResult<&[u8], Mac> {
    map(take(6usize), |bytes: &[u8]| {
        let mut octets = [0u8; 6];
        octets.copy_from_slice(bytes);
        Mac(octets)
    })(input)
}

fn parse_eapol(body: &[u8]) -> Option<Eapol> {
    let rest = body.strip_prefix(&LLC_SNAP_EAPOL[..])?;
    if rest.len() < 4 {
        return None;
    }
    let (version, packet_type) = (rest[0], rest[1]);
    let key = match &rest[4..] {
        // descriptor, key info, key length, replay counter
        k if packet_type == EAPOL_KEY && k.len() >= 13 => Some(EapolKey {
            descriptor: k[0],
            key_info: BigEndian::read_u16(&k[1..3]),
            replay_counter: BigEndian::read_u64(&k[5..13]),
        }),
        _ => None,
    };
    Some(Eapol {
        version,
        packet_type,
        key,
    })
}

fn element(input: &[u8]) -> IResult<&[u8], Element> {
    let (input, (id, length)) = tuple((u8, u8))(input)?;
    let (input, data) = take(length)(input)?;
    Ok((
        input,
        Element {
            id,
            data: data.to_vec(),
        },
    ))
}

/// Reads tagged elements until the input ends. A truncated trailing element
/// is dropped.
pub fn parse_elements(mut input: &[u8]) -> Vec<Element> {
    let mut elements = Vec::new();
    while !input.is_empty() {
        match element(input) {
            Ok((rest, e)) => {
                elements.push(e);
                input = rest;
            }
            Err(_) => break,
        }
    }
    elements
}

/// Elements a station sends unchanged in every probe request, regardless of
/// channel or time.
pub fn stable_element(id: u8) -> bool {
    match id {
        0 => true,   // ssid
        1 => true,   // supported rates
        45 => true,  // ht capabilities
        48 => true,  // rsn
        50 => true,  // extended supported rates
        127 => true, // extended capabilities
        191 => true, // vht capabilities
        221 => true, // vendor specific

        3 => false,  // ds params - includes channel number
        59 => false, // supported operating classes - depends on current band
        70 => false, // radio measurement capabilities
        255 => false, // extended - he capabilities vary by band

        _ => false,
    }
}
