//! Geometry constants and tunables for the JISC-SSD TC58NVG0S3HTA00 NAND stack.

use serde::{Deserialize, Serialize};

/// Maximum number of chip-selects this stack drives.
pub const MAX_CHIPS: usize = 2;

/// Expected READ-ID response for TC58NVG0S3HTA00.
pub const READ_ID_EXPECT: [u8; 5] = [0x98, 0xF1, 0x80, 0x15, 0x72];

/// Usable (main/data) area of one page.
pub const PAGE_USABLE_BYTES: usize = 2048;
/// Spare area appended to the usable area on the wire.
pub const PAGE_SPARE_BYTES: usize = 128;
/// Full on-wire page size (main + spare).
pub const PAGE_ALL_BYTES: usize = PAGE_USABLE_BYTES + PAGE_SPARE_BYTES;

/// Pages per erase block.
pub const PAGES_PER_BLOCK: usize = 64;
/// Erase blocks per chip.
pub const BLOCKS_PER_CHIP: usize = 1024;

/// Client-visible sector size.
pub const SECTOR_BYTES: usize = 512;
/// Sectors packed into one page (2048 / 512).
pub const SECTORS_PER_PAGE: usize = PAGE_USABLE_BYTES / SECTOR_BYTES;

/// Bit widths of the PBA sub-fields (see `addr::encode_pba`).
pub const SECTOR_BITS: u32 = 2; // log2(SECTORS_PER_PAGE)
pub const PAGE_BITS: u32 = 6; // log2(PAGES_PER_BLOCK)
pub const BLOCK_BITS: u32 = 10; // log2(BLOCKS_PER_CHIP)
pub const CHIP_BITS: u32 = 1; // log2(MAX_CHIPS)

/// Configuration for the page codec's scramble/ECC/CRC hook points.
///
/// All transforms default to disabled, matching the reference codec which
/// ships as an identity transform with the hooks reserved but unused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCodecConfig {
    pub use_scramble: bool,
    pub scramble_seed: u8,
    pub use_ecc: bool,
    pub use_crc: bool,
}

impl Default for PageCodecConfig {
    fn default() -> Self {
        Self {
            use_scramble: false,
            scramble_seed: 0xA5,
            use_ecc: false,
            use_crc: false,
        }
    }
}

/// Timing/behavior knobs for the NAND commander backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommanderConfig {
    /// Busy-wait budget for erase/program/reset/read completion.
    pub timeout_ms: u32,
    /// Minimum settle delay after a WP toggle, in microseconds.
    pub wp_settle_us: u32,
}

impl Default for CommanderConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 1000,
            wp_settle_us: 100,
        }
    }
}
