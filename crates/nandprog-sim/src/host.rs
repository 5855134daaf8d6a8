//! Host-side frame helpers
//!
//! Builders for every request packet and a decoder for response frames,
//! mirroring what the PC tool does on its end of the wire.

use nandprog_core::proto::{
    CmdCode, RESP_DATA, RESP_STATUS, STATUS_BAD_BLOCK, STATUS_ERROR, STATUS_OK, STATUS_WRITE_ACK,
};

fn range_cmd(code: CmdCode, addr: u32, len: u32) -> Vec<u8> {
    let mut packet = vec![code as u8];
    packet.extend_from_slice(&addr.to_le_bytes());
    packet.extend_from_slice(&len.to_le_bytes());
    packet
}

/// READ_ID request.
pub fn read_id() -> Vec<u8> {
    vec![CmdCode::ReadId as u8]
}

/// ERASE request.
pub fn erase(addr: u32, len: u32) -> Vec<u8> {
    range_cmd(CmdCode::Erase, addr, len)
}

/// READ request.
pub fn read(addr: u32, len: u32) -> Vec<u8> {
    range_cmd(CmdCode::Read, addr, len)
}

/// WRITE_S request.
pub fn write_start(addr: u32, len: u32) -> Vec<u8> {
    range_cmd(CmdCode::WriteStart, addr, len)
}

/// WRITE_D request carrying one payload chunk.
pub fn write_data(data: &[u8]) -> Vec<u8> {
    let mut packet = vec![CmdCode::WriteData as u8, data.len() as u8];
    packet.extend_from_slice(data);
    packet
}

/// WRITE_E request.
pub fn write_end() -> Vec<u8> {
    vec![CmdCode::WriteEnd as u8]
}

/// SELECT request.
pub fn select(chip_num: u32) -> Vec<u8> {
    let mut packet = vec![CmdCode::Select as u8];
    packet.extend_from_slice(&chip_num.to_le_bytes());
    packet
}

/// READ_BB request.
pub fn read_bad_blocks() -> Vec<u8> {
    vec![CmdCode::ReadBadBlocks as u8]
}

/// Decoded response frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// DATA frame payload
    Data(Vec<u8>),
    /// STATUS OK
    Ok,
    /// STATUS ERROR with its wire code
    Err(u8),
    /// STATUS BAD_BLOCK with the block's byte address
    BadBlock(u32),
    /// STATUS WRITE_ACK with the acknowledged byte count
    WriteAck(u32),
}

fn read_u32_le(buf: &[u8]) -> Option<u32> {
    Some(u32::from_le_bytes(buf.get(..4)?.try_into().ok()?))
}

/// Decode one response frame; `None` if it is malformed.
pub fn parse_frame(frame: &[u8]) -> Option<Frame> {
    let (&kind, rest) = frame.split_first()?;
    let (&info, payload) = rest.split_first()?;
    match kind {
        RESP_DATA => {
            if payload.len() != info as usize {
                return None;
            }
            Some(Frame::Data(payload.to_vec()))
        }
        RESP_STATUS => match info {
            STATUS_OK => Some(Frame::Ok),
            STATUS_ERROR => Some(Frame::Err(*payload.first()?)),
            STATUS_BAD_BLOCK => Some(Frame::BadBlock(read_u32_le(payload)?)),
            STATUS_WRITE_ACK => Some(Frame::WriteAck(read_u32_le(payload)?)),
            _ => None,
        },
        _ => None,
    }
}

/// Decode a batch of response frames; panics on a malformed frame.
pub fn parse_frames(frames: &[Vec<u8>]) -> Vec<Frame> {
    frames
        .iter()
        .map(|frame| parse_frame(frame).expect("malformed response frame"))
        .collect()
}
