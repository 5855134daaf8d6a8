//! Transport layer abstraction
//!
//! The engine is transport-agnostic; the firmware wires this to a USB CDC
//! packet queue, tests wire it to an in-memory queue. Packets are whole
//! frames of at most `proto::PACKET_BUF_SIZE` bytes.

use core::fmt;

/// Error returned when a frame could not be handed to the transport.
///
/// The engine treats this as fatal for the current command and emits no
/// further traffic for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SendError;

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transport send failed")
    }
}

#[cfg(feature = "std")]
impl std::error::Error for SendError {}

/// Packet transport between the host tool and the engine.
pub trait Transport {
    /// Expose the next inbound packet without consuming it.
    fn peek(&mut self) -> Option<&[u8]>;

    /// Drop the packet last exposed by `peek`.
    fn consume(&mut self);

    /// Send one response frame to the host.
    fn send(&mut self, frame: &[u8]) -> Result<(), SendError>;

    /// Whether a send would complete without blocking.
    fn send_ready(&mut self) -> bool;
}
