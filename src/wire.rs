//! The 16-byte flow descriptor exchanged at the start of every flow: four
//! little-endian `u32`s, `flow_id, flow_size, flow_tos, flow_rate`. The
//! wire format is explicitly little-endian regardless of host byte order,
//! converting on both ends.

use std::io::{self, Read, Write};

pub const HEADER_LEN: usize = 16;

/// flow_id == 0 is reserved: it tells the peer to close the connection
/// after responding, and is never assigned to a real flow.
pub const TERMINATOR_FLOW_ID: u32 = 0;

/// Size and timing parameters used for the synthetic terminator flow sent
/// to close out a connection at the end of a run.
pub const TERMINATOR_FLOW_SIZE: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowHeader {
    pub flow_id: u32,
    pub flow_size: u32,
    pub flow_tos: u32,
    pub flow_rate: u32,
}

impl FlowHeader {
    pub fn terminator() -> FlowHeader {
        FlowHeader {
            flow_id: TERMINATOR_FLOW_ID,
            flow_size: TERMINATOR_FLOW_SIZE,
            flow_tos: 0,
            flow_rate: 0,
        }
    }

    pub fn is_terminator(&self) -> bool {
        self.flow_id == TERMINATOR_FLOW_ID
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0..4].copy_from_slice(&self.flow_id.to_le_bytes());
        buf[4..8].copy_from_slice(&self.flow_size.to_le_bytes());
        buf[8..12].copy_from_slice(&self.flow_tos.to_le_bytes());
        buf[12..16].copy_from_slice(&self.flow_rate.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8; HEADER_LEN]) -> FlowHeader {
        FlowHeader {
            flow_id: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            flow_size: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
            flow_tos: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
            flow_rate: u32::from_le_bytes(buf[12..16].try_into().unwrap()),
        }
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.to_bytes())
    }

    pub fn read_from<R: Read>(r: &mut R) -> io::Result<FlowHeader> {
        let mut buf = [0u8; HEADER_LEN];
        r.read_exact(&mut buf)?;
        Ok(FlowHeader::from_bytes(&buf))
    }
}

/// Maps a DSCP (0..63) into the IP ToS byte at bit offset 2.
pub fn dscp_to_tos(dscp: u32) -> u32 {
    dscp * 4
}
