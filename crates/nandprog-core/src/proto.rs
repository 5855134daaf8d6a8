//! Wire protocol: request and response frame layout
//!
//! All frames are byte-exact and little-endian with no padding. A request
//! starts with a one-byte command code; a response starts with a one-byte
//! kind followed by a one-byte info field. Decoding never assumes any
//! alignment of the inbound buffer.

use crate::error::Error;

/// Transport packet size, shared by both directions.
pub const PACKET_BUF_SIZE: usize = 64;

/// Response header: kind byte plus info byte.
pub const RESP_HEADER_SIZE: usize = 2;

/// Payload capacity of a single DATA frame.
pub const DATA_PAYLOAD_MAX: usize = PACKET_BUF_SIZE - RESP_HEADER_SIZE;

/// Write-data request header: command code plus length byte.
pub const WRITE_DATA_HEADER_SIZE: usize = 2;

// =============================================================================
// Command codes
// =============================================================================

/// Request command codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum CmdCode {
    /// Return the raw NAND ID bytes
    ReadId = 0x00,
    /// Erase a block-aligned range
    Erase = 0x01,
    /// Read a page-aligned range
    Read = 0x02,
    /// Start a streaming write
    WriteStart = 0x03,
    /// One chunk of streaming write payload
    WriteData = 0x04,
    /// Finish a streaming write
    WriteEnd = 0x05,
    /// Select the chip to operate on
    Select = 0x06,
    /// Scan the whole chip for bad-block markers
    ReadBadBlocks = 0x07,
}

/// One past the highest valid command code.
pub const CMD_LAST: u8 = 0x08;

impl CmdCode {
    /// Decode a command byte, rejecting anything outside the valid range.
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            0x00 => Some(Self::ReadId),
            0x01 => Some(Self::Erase),
            0x02 => Some(Self::Read),
            0x03 => Some(Self::WriteStart),
            0x04 => Some(Self::WriteData),
            0x05 => Some(Self::WriteEnd),
            0x06 => Some(Self::Select),
            0x07 => Some(Self::ReadBadBlocks),
            _ => None,
        }
    }
}

// =============================================================================
// Response framing
// =============================================================================

/// Response kind: header is followed by `info` payload bytes.
pub const RESP_DATA: u8 = 0x00;
/// Response kind: `info` is one of the status codes below.
pub const RESP_STATUS: u8 = 0x01;

/// Command completed.
pub const STATUS_OK: u8 = 0x00;
/// Command failed; one error-code byte follows.
pub const STATUS_ERROR: u8 = 0x01;
/// A bad block was encountered; its byte address follows.
pub const STATUS_BAD_BLOCK: u8 = 0x02;
/// Write flow control; the acknowledged byte count follows.
pub const STATUS_WRITE_ACK: u8 = 0x03;

/// STATUS OK frame.
pub fn status_ok_frame() -> [u8; 2] {
    [RESP_STATUS, STATUS_OK]
}

/// STATUS ERROR frame carrying the positive wire code.
pub fn status_error_frame(err: Error) -> [u8; 3] {
    [RESP_STATUS, STATUS_ERROR, err.wire_code()]
}

/// STATUS BAD_BLOCK frame carrying the block's byte address.
pub fn bad_block_frame(addr: u32) -> [u8; 6] {
    let a = addr.to_le_bytes();
    [RESP_STATUS, STATUS_BAD_BLOCK, a[0], a[1], a[2], a[3]]
}

/// STATUS WRITE_ACK frame carrying the acknowledged byte count.
pub fn write_ack_frame(bytes_ack: u32) -> [u8; 6] {
    let a = bytes_ack.to_le_bytes();
    [RESP_STATUS, STATUS_WRITE_ACK, a[0], a[1], a[2], a[3]]
}

// =============================================================================
// Request decoding
// =============================================================================

fn read_u32_le(buf: &[u8]) -> u32 {
    u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]])
}

/// Address/length request body, shared by ERASE, READ and WRITE_START.
///
/// Layout after the command byte: `u32 addr | u32 len`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeReq {
    /// Start byte address on the chip
    pub addr: u32,
    /// Length in bytes
    pub len: u32,
}

impl RangeReq {
    /// Decode from a full request packet (command byte included).
    pub fn decode(packet: &[u8]) -> Result<Self, Error> {
        if packet.len() < 9 {
            return Err(Error::CmdDataSize);
        }
        Ok(Self {
            addr: read_u32_le(&packet[1..5]),
            len: read_u32_le(&packet[5..9]),
        })
    }
}

/// SELECT request body: `u32 chip_num` after the command byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectReq {
    /// Index into the chip table
    pub chip_num: u32,
}

impl SelectReq {
    /// Decode from a full request packet (command byte included).
    pub fn decode(packet: &[u8]) -> Result<Self, Error> {
        if packet.len() < 5 {
            return Err(Error::CmdDataSize);
        }
        Ok(Self {
            chip_num: read_u32_le(&packet[1..5]),
        })
    }
}

/// WRITE_DATA request body: `u8 len | u8 data[len]` after the command byte.
#[derive(Debug, Clone, Copy)]
pub struct WriteDataReq<'a> {
    /// Payload bytes for the page buffer
    pub data: &'a [u8],
}

impl<'a> WriteDataReq<'a> {
    /// Decode from a full request packet (command byte included).
    ///
    /// The declared length must fit the packet buffer and must not claim
    /// more bytes than the packet actually carries.
    pub fn decode(packet: &'a [u8]) -> Result<Self, Error> {
        if packet.len() < WRITE_DATA_HEADER_SIZE {
            return Err(Error::CmdDataSize);
        }
        let len = packet[1] as usize;
        if len + WRITE_DATA_HEADER_SIZE > PACKET_BUF_SIZE {
            return Err(Error::CmdDataSize);
        }
        if len + WRITE_DATA_HEADER_SIZE > packet.len() {
            return Err(Error::CmdDataSize);
        }
        Ok(Self {
            data: &packet[WRITE_DATA_HEADER_SIZE..WRITE_DATA_HEADER_SIZE + len],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cmd_codes_cover_valid_range() {
        for code in 0..CMD_LAST {
            let cmd = CmdCode::from_u8(code).expect("valid code rejected");
            assert_eq!(cmd as u8, code);
        }
        assert_eq!(CmdCode::from_u8(CMD_LAST), None);
        assert_eq!(CmdCode::from_u8(0x7F), None);
    }

    #[test]
    fn status_frames_are_byte_exact() {
        assert_eq!(status_ok_frame(), [0x01, 0x00]);
        assert_eq!(
            status_error_frame(Error::CmdInvalid),
            [0x01, 0x01, 109]
        );
        assert_eq!(
            bad_block_frame(0x0002_0000),
            [0x01, 0x02, 0x00, 0x00, 0x02, 0x00]
        );
        assert_eq!(
            write_ack_frame(2048),
            [0x01, 0x03, 0x00, 0x08, 0x00, 0x00]
        );
    }

    #[test]
    fn range_req_decodes_little_endian() {
        let pkt = [0x01, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00, 0x06, 0x00];
        let req = RangeReq::decode(&pkt).unwrap();
        assert_eq!(req.addr, 0x0002_0000);
        assert_eq!(req.len, 0x0600_0000);
    }

    #[test]
    fn range_req_rejects_short_packets() {
        assert_eq!(RangeReq::decode(&[0x01]), Err(Error::CmdDataSize));
        assert_eq!(
            RangeReq::decode(&[0x01, 0, 0, 0, 0, 0, 0, 0]),
            Err(Error::CmdDataSize)
        );
    }

    #[test]
    fn select_req_decodes() {
        let req = SelectReq::decode(&[0x06, 0x03, 0x00, 0x00, 0x00]).unwrap();
        assert_eq!(req.chip_num, 3);
        assert_eq!(SelectReq::decode(&[0x06, 0x03]), Err(Error::CmdDataSize));
    }

    #[test]
    fn write_data_req_bounds_the_payload() {
        let mut pkt = [0u8; 64];
        pkt[0] = 0x04;
        pkt[1] = 62;
        assert_eq!(WriteDataReq::decode(&pkt).unwrap().data.len(), 62);

        // Declared length would overflow the packet buffer.
        pkt[1] = 63;
        assert!(WriteDataReq::decode(&pkt).is_err());

        // Declared length exceeds what the packet carries.
        let short = [0x04u8, 10, 1, 2, 3];
        assert!(WriteDataReq::decode(&short).is_err());

        let empty = [0x04u8, 0];
        assert_eq!(WriteDataReq::decode(&empty).unwrap().data.len(), 0);
    }
}
