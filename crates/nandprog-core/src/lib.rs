//! nandprog-core - Command engine of a parallel NAND flash programmer
//!
//! A host tool drives a microcontroller over a byte-oriented packet
//! transport (e.g. USB CDC); this crate is the engine on the
//! microcontroller side. It decodes command packets, validates them
//! against the selected chip's geometry, drives the NAND controller to
//! erase/read/program, streams data back in MTU-sized frames and keeps a
//! bad-block table discovered at select time.
//!
//! The crate is `no_std` and hardware-free: the firmware supplies the two
//! collaborator traits ([`transport::Transport`] and
//! [`nand::NandController`]) and pumps [`Engine::tick`] from its main
//! loop.
//!
//! # Example
//!
//! ```ignore
//! use nandprog_core::Engine;
//!
//! let mut engine = Engine::new(controller);
//! engine.attach_transport(usb_cdc);
//! loop {
//!     engine.tick();
//! }
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

#[cfg(feature = "std")]
extern crate std;

pub mod bad_block;
pub mod chip;
pub mod engine;
pub mod error;
pub mod nand;
pub mod proto;
pub mod transport;

pub use engine::Engine;
pub use error::{Error, Result};
