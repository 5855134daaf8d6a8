//! Simulated raw NAND chip

use std::collections::HashMap;

use nandprog_core::chip::ChipInfo;
use nandprog_core::nand::{NandController, NandId, NandStatus};

/// Spare-area bytes per page.
pub const SPARE_SIZE: usize = 64;

/// Call statistics, for asserting on how the engine drove the chip.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimStats {
    /// `read_id` calls
    pub id_reads: usize,
    /// `erase_block` calls (including injected failures)
    pub erases: usize,
    /// `read_page` calls
    pub page_reads: usize,
    /// `read_data` calls
    pub data_reads: usize,
    /// `write_page_begin` calls
    pub programs: usize,
    /// `status` polls
    pub status_polls: usize,
}

struct PendingProgram {
    page: u32,
    data: Vec<u8>,
    busy_left: u32,
    result: NandStatus,
}

/// In-memory NAND chip with spare areas, asynchronous page programs and
/// injectable failures.
pub struct SimNand {
    id: NandId,
    page_size: usize,
    pages_per_block: usize,
    page_count: usize,
    /// Per-page rows of `page_size + SPARE_SIZE` bytes.
    rows: Vec<u8>,
    pending: Option<PendingProgram>,
    /// Status polls a program stays busy before completing.
    busy_polls: u32,
    erase_results: HashMap<u32, NandStatus>,
    program_results: HashMap<u32, NandStatus>,
    read_results: HashMap<u32, NandStatus>,
    data_read_results: HashMap<u32, NandStatus>,
    /// Set when a program is kicked off while one is still in flight.
    pub overlap_violation: bool,
    /// Call counters
    pub stats: SimStats,
}

impl SimNand {
    /// Fresh, fully erased chip with the given geometry.
    pub fn new(chip: &ChipInfo) -> Self {
        let page_size = chip.page_size as usize;
        let page_count = (chip.size / chip.page_size) as usize;
        Self {
            id: NandId {
                maker: 0xEC,
                device: 0xF1,
                third: 0x00,
                fourth: 0x95,
            },
            page_size,
            pages_per_block: (chip.block_size / chip.page_size) as usize,
            page_count,
            rows: vec![0xFF; page_count * (page_size + SPARE_SIZE)],
            pending: None,
            busy_polls: 0,
            erase_results: HashMap::new(),
            program_results: HashMap::new(),
            read_results: HashMap::new(),
            data_read_results: HashMap::new(),
            overlap_violation: false,
            stats: SimStats::default(),
        }
    }

    /// Set the ID bytes returned by `read_id`.
    pub fn set_id(&mut self, id: NandId) {
        self.id = id;
    }

    /// Make page programs stay busy for `polls` status polls.
    pub fn set_busy_polls(&mut self, polls: u32) {
        self.busy_polls = polls;
    }

    /// Force the outcome of erasing the given block.
    pub fn set_erase_result(&mut self, block: u32, result: NandStatus) {
        self.erase_results.insert(block, result);
    }

    /// Force the completion status of programming the given page.
    pub fn set_program_result(&mut self, page: u32, result: NandStatus) {
        self.program_results.insert(page, result);
    }

    /// Force the outcome of full-page reads of the given page.
    pub fn set_read_result(&mut self, page: u32, result: NandStatus) {
        self.read_results.insert(page, result);
    }

    /// Force the outcome of partial reads (spare included) of the given page.
    pub fn set_data_read_result(&mut self, page: u32, result: NandStatus) {
        self.data_read_results.insert(page, result);
    }

    /// Write the factory bad-block marker of `block` (spare byte 0 of the
    /// page `page_in_block`).
    pub fn set_block_marker(&mut self, block: u32, page_in_block: u32, value: u8) {
        let page = block as usize * self.pages_per_block + page_in_block as usize;
        let idx = page * self.row_len() + self.page_size;
        self.rows[idx] = value;
    }

    /// Main-area contents of one page.
    pub fn page(&self, page: u32) -> &[u8] {
        let start = page as usize * self.row_len();
        &self.rows[start..start + self.page_size]
    }

    /// Preload the main area of one page, bypassing program semantics.
    pub fn set_page(&mut self, page: u32, data: &[u8]) {
        assert!(data.len() <= self.page_size);
        let start = page as usize * self.row_len();
        self.rows[start..start + data.len()].copy_from_slice(data);
    }

    fn row_len(&self) -> usize {
        self.page_size + SPARE_SIZE
    }

    fn block_of(&self, page: u32) -> u32 {
        page / self.pages_per_block as u32
    }

    fn apply_program(&mut self, page: u32, data: &[u8]) {
        let start = page as usize * self.row_len();
        // Real NAND programming only clears bits.
        for (cell, byte) in self.rows[start..start + data.len()].iter_mut().zip(data) {
            *cell &= byte;
        }
    }
}

impl NandController for SimNand {
    fn init(&mut self, chip: &ChipInfo) {
        assert_eq!(chip.page_size as usize, self.page_size);
        self.pending = None;
    }

    fn read_id(&mut self) -> NandId {
        self.stats.id_reads += 1;
        self.id
    }

    fn erase_block(&mut self, page: u32) -> NandStatus {
        self.stats.erases += 1;
        let block = self.block_of(page);
        if let Some(&result) = self.erase_results.get(&block) {
            log::trace!("sim: injected erase status for block {block}");
            return result;
        }

        let start = block as usize * self.pages_per_block * self.row_len();
        let len = self.pages_per_block * self.row_len();
        self.rows[start..start + len].fill(0xFF);
        NandStatus::Ready
    }

    fn read_page(&mut self, buf: &mut [u8], page: u32) -> NandStatus {
        self.stats.page_reads += 1;
        assert!((page as usize) < self.page_count, "page out of range");
        assert!(buf.len() <= self.page_size);
        if let Some(&result) = self.read_results.get(&page) {
            return result;
        }
        let start = page as usize * self.row_len();
        buf.copy_from_slice(&self.rows[start..start + buf.len()]);
        NandStatus::Ready
    }

    fn read_data(&mut self, buf: &mut [u8], page: u32, offset: u32) -> NandStatus {
        self.stats.data_reads += 1;
        assert!((page as usize) < self.page_count, "page out of range");
        if let Some(&result) = self.data_read_results.get(&page) {
            return result;
        }
        let start = page as usize * self.row_len() + offset as usize;
        buf.copy_from_slice(&self.rows[start..start + buf.len()]);
        NandStatus::Ready
    }

    fn write_page_begin(&mut self, data: &[u8], page: u32) {
        self.stats.programs += 1;
        assert_eq!(data.len(), self.page_size);
        if self.pending.is_some() {
            self.overlap_violation = true;
        }
        let result = self
            .program_results
            .get(&page)
            .copied()
            .unwrap_or(NandStatus::Ready);
        self.pending = Some(PendingProgram {
            page,
            data: data.to_vec(),
            busy_left: self.busy_polls,
            result,
        });
    }

    fn status(&mut self) -> NandStatus {
        self.stats.status_polls += 1;
        let Some(pending) = self.pending.as_mut() else {
            return NandStatus::Ready;
        };
        if pending.busy_left > 0 {
            pending.busy_left -= 1;
            return NandStatus::Busy;
        }

        let pending = self.pending.take().expect("pending program");
        match pending.result {
            NandStatus::Ready => {
                let data = pending.data;
                self.apply_program(pending.page, &data);
                NandStatus::Ready
            }
            // Failed or timed-out programs leave the page untouched.
            other => other,
        }
    }
}
