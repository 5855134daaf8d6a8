//! Queue-backed packet transport

use std::collections::VecDeque;

use nandprog_core::transport::{SendError, Transport};

/// In-memory transport: host packets queue in, engine frames record out.
#[derive(Debug, Default)]
pub struct SimTransport {
    inbox: VecDeque<Vec<u8>>,
    outbox: Vec<Vec<u8>>,
    fail_sends: bool,
    not_ready_polls: u32,
}

impl SimTransport {
    /// Empty transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one host packet for the engine to pick up.
    pub fn push(&mut self, packet: &[u8]) {
        self.inbox.push_back(packet.to_vec());
    }

    /// Frames the engine has sent so far.
    pub fn sent(&self) -> &[Vec<u8>] {
        &self.outbox
    }

    /// Drain and return the frames the engine has sent so far.
    pub fn take_sent(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.outbox)
    }

    /// Number of host packets not yet consumed.
    pub fn pending_packets(&self) -> usize {
        self.inbox.len()
    }

    /// Make every subsequent send fail.
    pub fn set_fail_sends(&mut self, fail: bool) {
        self.fail_sends = fail;
    }

    /// Report not-ready for the next `polls` send_ready calls.
    pub fn set_not_ready_polls(&mut self, polls: u32) {
        self.not_ready_polls = polls;
    }
}

impl Transport for SimTransport {
    fn peek(&mut self) -> Option<&[u8]> {
        self.inbox.front().map(|packet| packet.as_slice())
    }

    fn consume(&mut self) {
        self.inbox.pop_front();
    }

    fn send(&mut self, frame: &[u8]) -> Result<(), SendError> {
        if self.fail_sends {
            return Err(SendError);
        }
        self.outbox.push(frame.to_vec());
        Ok(())
    }

    fn send_ready(&mut self) -> bool {
        if self.not_ready_polls > 0 {
            self.not_ready_polls -= 1;
            false
        } else {
            true
        }
    }
}
