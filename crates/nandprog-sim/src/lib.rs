//! nandprog-sim - In-memory collaborators for testing the engine
//!
//! Provides a simulated raw NAND chip ([`SimNand`]) and a queue-backed
//! packet transport ([`SimTransport`]) implementing the engine's
//! collaborator traits, plus [`host`] helpers that build request frames
//! and decode response frames the way the PC-side tool does.
//!
//! The simulator models the properties the engine depends on: programs
//! only clear bits (1→0), erase is block-granular and restores 0xFF
//! including the spare area, page programs complete asynchronously after
//! a configurable number of status polls, and every failure mode the
//! controller can report is injectable per block or page.

mod nand;
mod transport;

pub mod host;

pub use nand::{SimNand, SimStats, SPARE_SIZE};
pub use transport::SimTransport;
