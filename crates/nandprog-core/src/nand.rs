//! NAND controller interface
//!
//! The engine drives the raw chip through this trait; the firmware
//! implements it on top of the parallel memory-bus controller, tests
//! implement it with an in-memory simulator. Page indices address the
//! main area; `read_data` offsets past `page_size` reach the spare area.

use crate::chip::ChipInfo;

/// Raw NAND ID bytes as returned by the READ ID bus cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NandId {
    /// Manufacturer code
    pub maker: u8,
    /// Device code
    pub device: u8,
    /// Internal chip number / cell type byte
    pub third: u8,
    /// Page/block/spare size byte
    pub fourth: u8,
}

impl NandId {
    /// The ID in wire order.
    pub fn as_bytes(&self) -> [u8; 4] {
        [self.maker, self.device, self.third, self.fourth]
    }
}

/// Completion status reported by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NandStatus {
    /// Operation finished successfully
    Ready,
    /// Operation still in progress
    Busy,
    /// The chip flagged the operation as failed
    Error,
    /// The controller gave up waiting for the chip
    Timeout,
}

/// Low-level NAND controller operations.
///
/// All blocking operations return a final `NandStatus`; only
/// `write_page_begin` is asynchronous, with completion observed through
/// `status`. The engine guarantees at most one program is in flight.
pub trait NandController {
    /// Configure the controller for the given chip geometry.
    fn init(&mut self, chip: &ChipInfo);

    /// Run a READ ID cycle.
    fn read_id(&mut self) -> NandId;

    /// Erase the block whose first page is `page`. Blocking.
    fn erase_block(&mut self, page: u32) -> NandStatus;

    /// Read one full page of main data into `buf`. Blocking.
    fn read_page(&mut self, buf: &mut [u8], page: u32) -> NandStatus;

    /// Read `buf.len()` bytes from `page` starting at byte `offset`.
    ///
    /// Offsets at or beyond the page size address the spare area.
    fn read_data(&mut self, buf: &mut [u8], page: u32, offset: u32) -> NandStatus;

    /// Start programming one full page and return immediately.
    fn write_page_begin(&mut self, data: &[u8], page: u32);

    /// Poll the status of an in-flight page program.
    fn status(&mut self) -> NandStatus;
}
