//! Command engine: dispatch, validation and the streaming state machines
//!
//! One `Engine` instance owns the whole protocol state: the selected chip,
//! the bad-block table, the page buffers and the in-flight write. It is
//! driven from the firmware main loop by calling [`Engine::tick`], which
//! drains inbound packets and then advances any asynchronous NAND program.
//! Everything runs to completion on a single thread; the only busy-waits
//! are the read streamer's `send_ready` spin and the write pipeline's
//! drain of a previous page program.

use crate::bad_block::BadBlockTable;
use crate::chip::{self, ChipInfo};
use crate::error::Error;
use crate::nand::{NandController, NandStatus};
use crate::proto::{self, CmdCode, RangeReq, SelectReq, WriteDataReq};
use crate::transport::{SendError, Transport};

/// Largest page size the engine can buffer.
pub const MAX_PAGE_SIZE: usize = 0x800;

/// Status polls before an in-flight page program is abandoned.
pub const NAND_TIMEOUT_POLLS: u32 = 0x0100_0000;

/// Spare-area marker value of a good block.
pub const GOOD_BLOCK_MARK: u8 = 0xFF;

// =============================================================================
// Handler outcome
// =============================================================================

/// How a command handler failed.
///
/// Protocol errors are reported to the host as a STATUS ERROR frame; a
/// transport failure silences all further traffic for the command, since
/// reporting it would mean sending on the transport that just failed.
enum CmdError {
    Proto(Error),
    Transport,
}

type CmdResult = Result<(), CmdError>;

impl From<Error> for CmdError {
    fn from(err: Error) -> Self {
        Self::Proto(err)
    }
}

impl From<SendError> for CmdError {
    fn from(_: SendError) -> Self {
        Self::Transport
    }
}

// =============================================================================
// Engine state
// =============================================================================

/// Page-sized staging buffer with its fill cursor.
struct PageBuf {
    buf: [u8; MAX_PAGE_SIZE],
    /// NAND page index the buffer belongs to
    page: u32,
    /// Fill level, 0..=page_size
    offset: u32,
}

impl PageBuf {
    const fn new() -> Self {
        Self {
            buf: [0; MAX_PAGE_SIZE],
            page: 0,
            offset: 0,
        }
    }
}

/// The programmer's command engine.
///
/// Generic over the packet [`Transport`] to the host and the
/// [`NandController`] driving the chip. The transport is an optional
/// capability: with none attached the engine sees no packets and drops
/// all responses.
pub struct Engine<T: Transport, N: NandController> {
    transport: Option<T>,
    nand: N,
    chips: &'static [ChipInfo],
    chip: Option<&'static ChipInfo>,
    bad_blocks: BadBlockTable,

    rx: [u8; proto::PACKET_BUF_SIZE],
    tx: [u8; proto::PACKET_BUF_SIZE],

    // Write session, valid between WRITE_S and WRITE_E.
    addr: u32,
    total_len: u32,
    addr_is_set: bool,
    page: PageBuf,
    bytes_written: u32,
    bytes_ack: u32,
    wr_in_progress: bool,
    wr_poll_count: u32,

    // Read streamer scratch, kept apart from the write page buffer so an
    // interleaved read cannot clobber a half-filled write page.
    read_page: PageBuf,
}

impl<T: Transport, N: NandController> Engine<T, N> {
    /// Engine over the built-in chip table.
    pub fn new(nand: N) -> Self {
        Self::with_chips(nand, chip::CHIPS)
    }

    /// Engine over a caller-supplied chip table.
    pub fn with_chips(nand: N, chips: &'static [ChipInfo]) -> Self {
        Self {
            transport: None,
            nand,
            chips,
            chip: None,
            bad_blocks: BadBlockTable::new(),
            rx: [0; proto::PACKET_BUF_SIZE],
            tx: [0; proto::PACKET_BUF_SIZE],
            addr: 0,
            total_len: 0,
            addr_is_set: false,
            page: PageBuf::new(),
            bytes_written: 0,
            bytes_ack: 0,
            wr_in_progress: false,
            wr_poll_count: 0,
            read_page: PageBuf::new(),
        }
    }

    /// Install the transport the engine talks to the host over.
    pub fn attach_transport(&mut self, transport: T) {
        self.transport = Some(transport);
    }

    /// Remove and return the current transport, if any.
    pub fn detach_transport(&mut self) -> Option<T> {
        self.transport.take()
    }

    /// Access the attached transport.
    pub fn transport_mut(&mut self) -> Option<&mut T> {
        self.transport.as_mut()
    }

    /// Access the NAND controller.
    pub fn nand_mut(&mut self) -> &mut N {
        &mut self.nand
    }

    /// Geometry of the currently selected chip.
    pub fn selected_chip(&self) -> Option<&'static ChipInfo> {
        self.chip
    }

    /// Bad blocks found by the last scan (or reported since).
    pub fn bad_block_table(&self) -> &BadBlockTable {
        &self.bad_blocks
    }

    /// Whether a page program is currently in flight.
    pub fn write_in_progress(&self) -> bool {
        self.wr_in_progress
    }

    /// One event-loop iteration: drain inbound packets, then advance an
    /// in-flight page program. Never blocks waiting for the host.
    pub fn tick(&mut self) {
        self.drain_packets();
        self.poll_write();
    }

    // =========================================================================
    // Event loop
    // =========================================================================

    fn drain_packets(&mut self) {
        loop {
            let len = {
                let Some(transport) = self.transport.as_mut() else {
                    return;
                };
                match transport.peek() {
                    Some(packet) => {
                        let len = packet.len().min(proto::PACKET_BUF_SIZE);
                        self.rx[..len].copy_from_slice(&packet[..len]);
                        len
                    }
                    None => return,
                }
            };

            let ret = self.dispatch(len);

            if let Some(transport) = self.transport.as_mut() {
                transport.consume();
            }

            match ret {
                Ok(()) => {}
                Err(CmdError::Proto(err)) => {
                    // If even the error frame cannot be sent there is
                    // nothing left to tell the host.
                    let _ = self.send_error(err);
                }
                Err(CmdError::Transport) => {}
            }
        }
    }

    fn poll_write(&mut self) {
        if !self.wr_in_progress {
            return;
        }
        match self.check_write_status() {
            Ok(()) => {}
            Err(CmdError::Proto(err)) => {
                let _ = self.send_error(err);
            }
            Err(CmdError::Transport) => {}
        }
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    fn dispatch(&mut self, len: usize) -> CmdResult {
        if len == 0 {
            log::error!("empty command packet");
            return Err(Error::CmdInvalid.into());
        }
        let code = self.rx[0];

        // SELECT is the only command legal without a selected chip.
        if self.chip.is_none() && code != CmdCode::Select as u8 {
            log::error!("chip is not selected");
            return Err(Error::ChipNotSelected.into());
        }

        let Some(cmd) = CmdCode::from_u8(code) else {
            log::error!("invalid command code {:#x}", code);
            return Err(Error::CmdInvalid.into());
        };

        match cmd {
            CmdCode::ReadId => self.cmd_read_id(),
            CmdCode::Erase => self.cmd_erase(len),
            CmdCode::Read => self.cmd_read(len),
            CmdCode::WriteStart => self.cmd_write_start(len),
            CmdCode::WriteData => self.cmd_write_data(len),
            CmdCode::WriteEnd => self.cmd_write_end(),
            CmdCode::Select => self.cmd_select(len),
            CmdCode::ReadBadBlocks => self.cmd_read_bad_blocks(),
        }
    }

    fn chip(&self) -> Result<&'static ChipInfo, Error> {
        self.chip.ok_or(Error::ChipNotSelected)
    }

    // =========================================================================
    // Response helpers
    // =========================================================================

    fn send_frame(&mut self, frame: &[u8]) -> Result<(), SendError> {
        match self.transport.as_mut() {
            Some(transport) => transport.send(frame),
            // Detached transport: responses are dropped.
            None => Ok(()),
        }
    }

    fn send_ok(&mut self) -> Result<(), SendError> {
        self.send_frame(&proto::status_ok_frame())
    }

    fn send_error(&mut self, err: Error) -> Result<(), SendError> {
        self.send_frame(&proto::status_error_frame(err))
    }

    fn send_bad_block(&mut self, addr: u32) -> Result<(), SendError> {
        self.send_frame(&proto::bad_block_frame(addr))
    }

    fn send_write_ack(&mut self, bytes_ack: u32) -> Result<(), SendError> {
        self.send_frame(&proto::write_ack_frame(bytes_ack))
    }

    // =========================================================================
    // SELECT and READ_ID
    // =========================================================================

    fn cmd_select(&mut self, len: usize) -> CmdResult {
        let req = SelectReq::decode(&self.rx[..len])?;
        log::debug!("chip select id {}", req.chip_num);

        match chip::find(self.chips, req.chip_num) {
            Some(info) => {
                self.nand.init(info);
                self.bad_blocks.clear();
                self.chip = Some(info);
            }
            None => {
                self.chip = None;
                log::error!("chip id {} not found", req.chip_num);
                return Err(Error::ChipNotFound.into());
            }
        }

        self.send_ok()?;
        Ok(())
    }

    fn cmd_read_id(&mut self) -> CmdResult {
        log::debug!("read ID command");

        let id = self.nand.read_id().as_bytes();
        self.tx[0] = proto::RESP_DATA;
        self.tx[1] = id.len() as u8;
        self.tx[proto::RESP_HEADER_SIZE..proto::RESP_HEADER_SIZE + id.len()]
            .copy_from_slice(&id);

        if let Some(transport) = self.transport.as_mut() {
            transport.send(&self.tx[..proto::RESP_HEADER_SIZE + id.len()])?;
        }
        Ok(())
    }

    // =========================================================================
    // Erase
    // =========================================================================

    fn cmd_erase(&mut self, len: usize) -> CmdResult {
        let req = RangeReq::decode(&self.rx[..len])?;
        let chip = self.chip()?;
        log::debug!("erase at {:#x}, {:#x} bytes", req.addr, req.len);

        chip.check_aligned_range(req.addr, req.len, chip.block_size)?;

        let block_size = chip.block_size;
        let pages_per_block = chip.pages_per_block();
        let chip_size = chip.size;
        let full_chip = req.len == chip_size;

        let mut addr = req.addr;
        let mut remaining = req.len;
        let mut page = chip.page_at(req.addr);

        while remaining != 0 {
            if addr >= chip_size {
                log::error!("erase address {:#x} exceeds chip size {:#x}", addr, chip_size);
                return Err(Error::AddrExceeded.into());
            }

            let is_bad = self.bad_blocks.contains(addr);
            if is_bad {
                log::debug!("skipped bad block at {:#x}", addr);
                self.send_bad_block(addr)?;
            } else {
                self.erase_block_at(page, addr)?;
            }

            addr += block_size;
            page += pages_per_block;
            // A partial erase does not count skipped bad blocks against
            // its budget; a full-chip erase visits each block once.
            if !is_bad || full_chip {
                remaining -= block_size;
            }
        }

        self.send_ok()?;
        Ok(())
    }

    fn erase_block_at(&mut self, page: u32, addr: u32) -> CmdResult {
        log::debug!("NAND erase at {:#x}", addr);

        match self.nand.erase_block(page) {
            NandStatus::Ready => Ok(()),
            NandStatus::Error => {
                self.send_bad_block(addr)?;
                Ok(())
            }
            NandStatus::Timeout => {
                log::error!("NAND erase timeout at {:#x}", addr);
                Ok(())
            }
            NandStatus::Busy => {
                log::error!("unexpected NAND status while erasing at {:#x}", addr);
                Err(Error::NandErase.into())
            }
        }
    }

    // =========================================================================
    // Read streamer
    // =========================================================================

    fn cmd_read(&mut self, len: usize) -> CmdResult {
        let req = RangeReq::decode(&self.rx[..len])?;
        let chip = self.chip()?;
        log::debug!("read at {:#x}, {:#x} bytes", req.addr, req.len);

        chip.check_aligned_range(req.addr, req.len, chip.page_size)?;

        let page_size = chip.page_size;
        let chip_size = chip.size;
        let mut addr = req.addr;
        let mut remaining = req.len;

        self.read_page.page = chip.page_at(addr);
        self.read_page.offset = 0;

        while remaining != 0 {
            self.read_page_into_scratch(addr, page_size)?;

            while self.read_page.offset < page_size && remaining != 0 {
                let chunk = (page_size - self.read_page.offset)
                    .min(proto::DATA_PAYLOAD_MAX as u32)
                    .min(remaining);
                let off = self.read_page.offset as usize;

                self.tx[0] = proto::RESP_DATA;
                self.tx[1] = chunk as u8;
                self.tx[proto::RESP_HEADER_SIZE..proto::RESP_HEADER_SIZE + chunk as usize]
                    .copy_from_slice(&self.read_page.buf[off..off + chunk as usize]);

                if let Some(transport) = self.transport.as_mut() {
                    while !transport.send_ready() {}
                    transport.send(&self.tx[..proto::RESP_HEADER_SIZE + chunk as usize])?;
                }

                self.read_page.offset += chunk;
                remaining -= chunk;
            }

            if remaining != 0 {
                addr += page_size;
                if addr >= chip_size {
                    log::error!(
                        "read address {:#x} exceeds chip size {:#x}",
                        addr,
                        chip_size
                    );
                    return Err(Error::AddrExceeded.into());
                }
                self.read_page.page += 1;
                self.read_page.offset = 0;
            }
        }

        Ok(())
    }

    fn read_page_into_scratch(&mut self, addr: u32, page_size: u32) -> CmdResult {
        log::debug!("NAND read at {:#x}", addr);

        let status = self
            .nand
            .read_page(&mut self.read_page.buf[..page_size as usize], self.read_page.page);
        match status {
            NandStatus::Ready => Ok(()),
            NandStatus::Error => {
                self.send_bad_block(addr)?;
                Ok(())
            }
            NandStatus::Timeout => {
                log::error!("NAND read timeout at {:#x}", addr);
                Ok(())
            }
            NandStatus::Busy => {
                log::error!("unexpected NAND status while reading at {:#x}", addr);
                Err(Error::NandRead.into())
            }
        }
    }

    // =========================================================================
    // Write pipeline
    // =========================================================================

    fn cmd_write_start(&mut self, len: usize) -> CmdResult {
        let req = RangeReq::decode(&self.rx[..len])?;
        let chip = self.chip()?;
        log::debug!("write at {:#x}, {:#x} bytes", req.addr, req.len);

        chip.check_aligned_range(req.addr, req.len, chip.page_size)
            .map_err(|err| match err {
                // Hosts expect the address code for a misaligned write length.
                Error::LenNotAligned => Error::AddrNotAligned,
                err => err,
            })?;

        self.addr = req.addr;
        self.total_len = req.len;
        self.addr_is_set = true;
        self.page.page = chip.page_at(req.addr);
        self.page.offset = 0;
        self.bytes_written = 0;
        self.bytes_ack = 0;

        self.send_ok()?;
        Ok(())
    }

    fn cmd_write_data(&mut self, len: usize) -> CmdResult {
        let mut chunk = [0u8; proto::DATA_PAYLOAD_MAX];
        let chunk_len = {
            let req = WriteDataReq::decode(&self.rx[..len])?;
            chunk[..req.data.len()].copy_from_slice(req.data);
            req.data.len() as u32
        };

        if !self.addr_is_set {
            log::error!("write address is not set");
            return Err(Error::AddrInvalid.into());
        }
        let chip = self.chip()?;
        if self.addr >= chip.size {
            log::error!(
                "write address {:#x} exceeds chip size {:#x}",
                self.addr,
                chip.size
            );
            return Err(Error::AddrExceeded.into());
        }
        let page_size = chip.page_size;

        // Fill the page buffer, splitting the chunk across a page
        // boundary if needed.
        let head = chunk_len.min(page_size - self.page.offset);
        let off = self.page.offset as usize;
        self.page.buf[off..off + head as usize].copy_from_slice(&chunk[..head as usize]);
        self.page.offset += head;

        if self.page.offset == page_size {
            self.program_page(page_size)?;
        }

        let rest = chunk_len - head;
        if rest != 0 {
            self.page.buf[..rest as usize]
                .copy_from_slice(&chunk[head as usize..chunk_len as usize]);
            self.page.offset += rest;
        }

        self.bytes_written += chunk_len;
        if self.bytes_written - self.bytes_ack >= page_size
            || self.bytes_written == self.total_len
        {
            self.send_write_ack(self.bytes_written)?;
            self.bytes_ack = self.bytes_written;
        }

        if self.bytes_written > self.total_len {
            log::error!(
                "received {:#x} stream bytes, announced {:#x}",
                self.bytes_written,
                self.total_len
            );
            return Err(Error::LenExceeded.into());
        }

        Ok(())
    }

    fn cmd_write_end(&mut self) -> CmdResult {
        self.addr_is_set = false;

        if self.page.offset != 0 {
            log::error!(
                "{:#x} buffered bytes were never programmed",
                self.page.offset
            );
            return Err(Error::NandWrite.into());
        }

        self.send_ok()?;
        Ok(())
    }

    /// Program the buffered page, first draining any program still in
    /// flight so at most one is ever pending. Advances the write cursor
    /// and resets the buffer before the caller copies any remainder.
    fn program_page(&mut self, page_size: u32) -> CmdResult {
        if self.wr_in_progress {
            log::debug!("waiting for previous NAND write");
            while self.wr_in_progress {
                self.check_write_status()?;
            }
        }

        log::debug!("NAND write at {:#x}, {} bytes", self.addr, page_size);
        self.nand
            .write_page_begin(&self.page.buf[..page_size as usize], self.page.page);
        self.wr_in_progress = true;

        self.addr += page_size;
        self.page.page += 1;
        self.page.offset = 0;

        Ok(())
    }

    /// One status poll of the in-flight program.
    ///
    /// Both a chip-reported failure (after its BAD_BLOCK frame) and a
    /// completion leave the write no longer in progress.
    fn check_write_status(&mut self) -> CmdResult {
        match self.nand.status() {
            NandStatus::Error => {
                self.send_bad_block(self.addr)?;
                self.wr_in_progress = false;
                self.wr_poll_count = 0;
                Ok(())
            }
            NandStatus::Ready => {
                self.wr_in_progress = false;
                self.wr_poll_count = 0;
                Ok(())
            }
            NandStatus::Busy => {
                self.wr_poll_count += 1;
                if self.wr_poll_count == NAND_TIMEOUT_POLLS {
                    log::error!("NAND write timeout at {:#x}", self.addr);
                    self.wr_in_progress = false;
                    self.wr_poll_count = 0;
                    Err(Error::NandWrite.into())
                } else {
                    Ok(())
                }
            }
            NandStatus::Timeout => {
                log::error!(
                    "unexpected NAND status while programming at {:#x}",
                    self.addr
                );
                self.wr_in_progress = false;
                self.wr_poll_count = 0;
                Err(Error::NandWrite.into())
            }
        }
    }

    // =========================================================================
    // Bad-block scan
    // =========================================================================

    fn cmd_read_bad_blocks(&mut self) -> CmdResult {
        let chip = self.chip()?;
        let block_count = chip.block_count();
        let pages_per_block = chip.pages_per_block();
        let block_size = chip.block_size;
        let page_size = chip.page_size;

        // A bad block carries a non-0xFF marker at spare offset 0 of its
        // first or second page.
        for block in 0..block_count {
            let page = block * pages_per_block;
            let addr = block * block_size;

            if !self.scan_marker(page, addr, page_size)? {
                self.scan_marker(page + 1, addr, page_size)?;
            }
        }

        self.send_ok()?;
        Ok(())
    }

    /// Read one bad-block marker byte; report and record a hit.
    fn scan_marker(&mut self, page: u32, addr: u32, page_size: u32) -> Result<bool, CmdError> {
        let mut marker = [0u8; 1];
        match self.nand.read_data(&mut marker, page, page_size) {
            NandStatus::Ready => {}
            status => {
                log::error!(
                    "NAND status {:?} reading bad-block marker at {:#x}",
                    status,
                    addr
                );
                return Err(Error::NandRead.into());
            }
        }

        if marker[0] == GOOD_BLOCK_MARK {
            return Ok(false);
        }

        self.send_bad_block(addr)?;
        self.bad_blocks.insert(addr)?;
        Ok(true)
    }
}
