//! Chip geometry and the built-in chip table
//!
//! The engine only ever sees a `ChipInfo`: the page/block/total geometry
//! of the selected part. The table below carries the parallel NAND parts
//! the programmer hardware is wired for; callers that want a different
//! set (tests, exotic boards) construct the engine with their own slice.

use crate::error::Error;

/// Geometry of one supported NAND chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChipInfo {
    /// Part name, e.g. "K9F1G08U0D"
    pub name: &'static str,
    /// Program/read unit in bytes (main area, spare excluded)
    pub page_size: u32,
    /// Erase unit in bytes
    pub block_size: u32,
    /// Total main-area capacity in bytes
    pub size: u32,
}

impl ChipInfo {
    /// Number of pages in one erase block.
    pub fn pages_per_block(&self) -> u32 {
        self.block_size / self.page_size
    }

    /// Number of erase blocks on the chip.
    pub fn block_count(&self) -> u32 {
        self.size / self.block_size
    }

    /// Page index containing the given byte address.
    pub fn page_at(&self, addr: u32) -> u32 {
        addr / self.page_size
    }

    /// Validate an operation range against this chip.
    ///
    /// Checks, in order: address alignment, non-zero length, length
    /// alignment, and that the range stays on the chip. `align` is the
    /// block size for erase and the page size for read/write.
    pub fn check_aligned_range(&self, addr: u32, len: u32, align: u32) -> Result<(), Error> {
        if !addr.is_multiple_of(align) {
            log::error!(
                "address {:#x} is not aligned to {:#x}",
                addr,
                align
            );
            return Err(Error::AddrNotAligned);
        }
        if len == 0 {
            log::error!("length is 0");
            return Err(Error::LenInvalid);
        }
        if !len.is_multiple_of(align) {
            log::error!("length {:#x} is not aligned to {:#x}", len, align);
            return Err(Error::LenNotAligned);
        }
        match addr.checked_add(len) {
            Some(end) if end <= self.size => Ok(()),
            _ => {
                log::error!(
                    "range {:#x}+{:#x} exceeds chip size {:#x}",
                    addr,
                    len,
                    self.size
                );
                Err(Error::AddrExceeded)
            }
        }
    }
}

/// Built-in chip table. SELECT indexes into this.
pub static CHIPS: &[ChipInfo] = &[
    ChipInfo {
        name: "K9F1G08U0D",
        page_size: 2048,
        block_size: 128 * 1024,
        size: 128 * 1024 * 1024,
    },
    ChipInfo {
        name: "K9F2G08U0C",
        page_size: 2048,
        block_size: 128 * 1024,
        size: 256 * 1024 * 1024,
    },
    ChipInfo {
        name: "K9F4G08U0B",
        page_size: 2048,
        block_size: 128 * 1024,
        size: 512 * 1024 * 1024,
    },
    ChipInfo {
        name: "HY27US08121B",
        page_size: 512,
        block_size: 16 * 1024,
        size: 64 * 1024 * 1024,
    },
];

/// Look up a chip by its table index.
pub fn find(chips: &'static [ChipInfo], chip_num: u32) -> Option<&'static ChipInfo> {
    chips.get(chip_num as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHIP: ChipInfo = ChipInfo {
        name: "test",
        page_size: 2048,
        block_size: 128 * 1024,
        size: 128 * 1024 * 1024,
    };

    #[test]
    fn derived_geometry() {
        assert_eq!(CHIP.pages_per_block(), 64);
        assert_eq!(CHIP.block_count(), 1024);
        assert_eq!(CHIP.page_at(0x20000), 64);
    }

    #[test]
    fn range_checks_fail_in_order() {
        let bs = CHIP.block_size;
        // Misaligned address wins over everything else.
        assert_eq!(
            CHIP.check_aligned_range(0x100, 0, bs),
            Err(Error::AddrNotAligned)
        );
        assert_eq!(CHIP.check_aligned_range(0, 0, bs), Err(Error::LenInvalid));
        assert_eq!(
            CHIP.check_aligned_range(0, 0x100, bs),
            Err(Error::LenNotAligned)
        );
        assert_eq!(
            CHIP.check_aligned_range(CHIP.size - bs, 2 * bs, bs),
            Err(Error::AddrExceeded)
        );
        assert_eq!(CHIP.check_aligned_range(0, CHIP.size, bs), Ok(()));
    }

    #[test]
    fn range_check_catches_u32_overflow() {
        let bs = CHIP.block_size;
        assert_eq!(
            CHIP.check_aligned_range(u32::MAX - bs + 1, bs * 2, bs),
            Err(Error::AddrExceeded)
        );
    }

    #[test]
    fn builtin_table_geometry_is_consistent() {
        for chip in CHIPS {
            assert!(chip.page_size.is_power_of_two(), "{}", chip.name);
            assert!(
                chip.block_size.is_multiple_of(chip.page_size),
                "{}",
                chip.name
            );
            assert!(chip.size.is_multiple_of(chip.block_size), "{}", chip.name);
            assert!(chip.page_size <= 2048, "{}", chip.name);
        }
    }

    #[test]
    fn find_is_bounds_checked() {
        assert_eq!(find(CHIPS, 0).unwrap().name, "K9F1G08U0D");
        assert!(find(CHIPS, CHIPS.len() as u32).is_none());
    }
}
