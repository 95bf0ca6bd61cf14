//! Component E: the per-chip bad-block and allocation bitmaps.
//!
//! Mirrors `NandBlockManager`: a factory bad-block scan seeds one bitmap per
//! chip, allocation erases a block before handing it out and promotes it to
//! bad on an erase failure, and the combined state persists as JSON so a
//! reboot doesn't have to rescan every block.

use std::collections::HashMap;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::commander::NandCommander;
use crate::config::{BLOCKS_PER_CHIP, MAX_CHIPS, PAGE_ALL_BYTES};
use crate::error::BlockManagerError;

/// A fixed-size bitmap over one chip's erase blocks, one bit per block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockBitmap {
    bits: Vec<u8>,
}

impl BlockBitmap {
    fn new(num_blocks: usize) -> Self {
        Self {
            bits: vec![0u8; num_blocks.div_ceil(8)],
        }
    }

    pub fn get(&self, block: usize) -> bool {
        self.bits[block / 8] & (1 << (block % 8)) != 0
    }

    pub fn set(&mut self, block: usize, value: bool) {
        if value {
            self.bits[block / 8] |= 1 << (block % 8);
        } else {
            self.bits[block / 8] &= !(1 << (block % 8));
        }
    }

    /// Render as a decimal string, matching how the reference allocator
    /// persists its Python big-integer bitmasks in JSON.
    fn to_decimal_string(&self) -> String {
        if self.bits.iter().all(|&b| b == 0) {
            return "0".to_string();
        }
        let mut digits = self.bits.clone();
        let mut out = Vec::new();
        while digits.iter().any(|&b| b != 0) {
            let mut remainder: u32 = 0;
            for byte in digits.iter_mut().rev() {
                let cur = (remainder << 8) | (*byte as u32);
                *byte = (cur / 10) as u8;
                remainder = cur % 10;
            }
            out.push(std::char::from_digit(remainder, 10).expect("remainder < 10"));
        }
        out.iter().rev().collect()
    }

    fn from_decimal_string(s: &str, num_blocks: usize) -> Self {
        let mut bits = vec![0u8; num_blocks.div_ceil(8)];
        for ch in s.chars() {
            let d = ch.to_digit(10).expect("bitmap field must be decimal") as u32;
            let mut carry = d;
            for byte in bits.iter_mut() {
                let cur = (*byte as u32) * 10 + carry;
                *byte = (cur & 0xFF) as u8;
                carry = cur >> 8;
            }
        }
        Self { bits }
    }
}

/// On-disk allocator state, matching the reference's `{num_chip,
/// badblock_bitmaps, allocated_bitmaps}` JSON schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedState {
    pub num_chip: usize,
    pub badblock_bitmaps: Vec<String>,
    pub allocated_bitmaps: Vec<String>,
}

impl PersistedState {
    fn from_bitmaps(badblock: &[BlockBitmap], allocated: &[BlockBitmap]) -> Self {
        Self {
            num_chip: badblock.len(),
            badblock_bitmaps: badblock.iter().map(BlockBitmap::to_decimal_string).collect(),
            allocated_bitmaps: allocated.iter().map(BlockBitmap::to_decimal_string).collect(),
        }
    }
}

/// Per-chip bad-block/allocated bookkeeping over an array of `NandCommander`
/// backends, one per chip-select.
pub struct BlockManager<C: NandCommander> {
    commanders: Vec<C>,
    badblock: Vec<BlockBitmap>,
    allocated: Vec<BlockBitmap>,
}

impl<C: NandCommander> BlockManager<C> {
    /// Probes chip 0, then chip 1, stopping at the first that doesn't reset
    /// or doesn't answer READ-ID with the expected identifier — a board with
    /// only chip 0 populated yields `num_chip() == 1`, not an init failure.
    /// Every chip that matches is then scanned for the factory bad-block
    /// mark (byte 0 of page 0 != 0xFF).
    pub fn init(commanders: Vec<C>) -> Result<Self, BlockManagerError> {
        let mut active = Vec::new();
        for (chip, mut cmd) in commanders.into_iter().enumerate().take(MAX_CHIPS) {
            if cmd.reset(chip).is_err() {
                break;
            }
            let id = cmd.read_id(chip, crate::config::READ_ID_EXPECT.len());
            if id != crate::config::READ_ID_EXPECT {
                break;
            }
            active.push(cmd);
        }
        if active.is_empty() {
            return Err(BlockManagerError::NoActiveChip);
        }

        let mut badblock = Vec::with_capacity(active.len());
        for (chip, cmd) in active.iter_mut().enumerate() {
            let mut bitmap = BlockBitmap::new(BLOCKS_PER_CHIP);
            for block in 0..BLOCKS_PER_CHIP {
                let page0 = cmd
                    .read_page(chip, block, 0, 0, 1)
                    .ok_or(BlockManagerError::BadBlockCheckFailure { chip, block })?;
                if page0[0] != 0xFF {
                    bitmap.set(block, true);
                }
            }
            let bad_count = (0..BLOCKS_PER_CHIP).filter(|&b| bitmap.get(b)).count();
            info!("chip {chip}: {bad_count} factory bad block(s) of {BLOCKS_PER_CHIP}");
            badblock.push(bitmap);
        }
        let allocated = (0..active.len()).map(|_| BlockBitmap::new(BLOCKS_PER_CHIP)).collect();
        Ok(Self {
            commanders: active,
            badblock,
            allocated,
        })
    }

    pub fn num_chip(&self) -> usize {
        self.commanders.len()
    }

    pub fn is_bad(&self, chip: usize, block: usize) -> bool {
        self.badblock[chip].get(block)
    }

    pub fn is_allocated(&self, chip: usize, block: usize) -> bool {
        self.allocated[chip].get(block)
    }

    /// Finds the first free, good block, scanning chips in index order and
    /// blocks within each chip, erases it, and marks it allocated. Promotes
    /// a block to bad and keeps scanning on an erase failure.
    pub fn alloc(&mut self) -> Result<(usize, usize), BlockManagerError> {
        for chip in 0..self.commanders.len() {
            loop {
                let Some(block) = (0..BLOCKS_PER_CHIP)
                    .find(|&b| !self.badblock[chip].get(b) && !self.allocated[chip].get(b))
                else {
                    break;
                };
                if self.commanders[chip].erase_block(chip, block) {
                    self.allocated[chip].set(block, true);
                    return Ok((chip, block));
                }
                warn!("chip {chip} block {block} failed erase on alloc, marking bad");
                self.badblock[chip].set(block, true);
            }
        }
        Err(BlockManagerError::NoFreeBlock)
    }

    pub fn free(&mut self, chip: usize, block: usize) -> Result<(), BlockManagerError> {
        if !self.allocated[chip].get(block) {
            return Err(BlockManagerError::AlreadyFree { chip, block });
        }
        self.allocated[chip].set(block, false);
        Ok(())
    }

    pub fn read(&mut self, chip: usize, block: usize, page: usize) -> Option<[u8; PAGE_ALL_BYTES]> {
        self.commanders[chip]
            .read_page(chip, block, page, 0, PAGE_ALL_BYTES)
            .map(|v| v.try_into().expect("read_page returns PAGE_ALL_BYTES"))
    }

    /// Programs a page; on failure, promotes the block to bad so it will
    /// not be handed out by a future `alloc`.
    pub fn program(&mut self, chip: usize, block: usize, page: usize, data: &[u8]) -> bool {
        let ok = self.commanders[chip].program_page(chip, block, page, data, 0);
        if !ok {
            warn!("chip {chip} block {block} page {page} program failed, marking bad");
            self.badblock[chip].set(block, true);
        }
        ok
    }

    pub fn to_persisted_state(&self) -> PersistedState {
        PersistedState::from_bitmaps(&self.badblock, &self.allocated)
    }

    pub fn load_persisted_state(&mut self, state: &PersistedState) {
        self.badblock = state
            .badblock_bitmaps
            .iter()
            .map(|s| BlockBitmap::from_decimal_string(s, BLOCKS_PER_CHIP))
            .collect();
        self.allocated = state
            .allocated_bitmaps
            .iter()
            .map(|s| BlockBitmap::from_decimal_string(s, BLOCKS_PER_CHIP))
            .collect();
    }

    pub fn save_json(&self) -> Result<String, crate::error::PersistenceError> {
        Ok(serde_json::to_string(&self.to_persisted_state())?)
    }

    pub fn load_json(&mut self, json: &str) -> Result<(), crate::error::PersistenceError> {
        let state: PersistedState = serde_json::from_str(json)?;
        self.load_persisted_state(&state);
        Ok(())
    }
}

/// Bad blocks discovered across all chips, keyed by chip index — used by
/// higher layers that want a flat report rather than per-bit bitmap access.
pub fn bad_block_report<C: NandCommander>(mgr: &BlockManager<C>) -> HashMap<usize, Vec<usize>> {
    let mut report = HashMap::new();
    for chip in 0..mgr.num_chip() {
        let bad: Vec<usize> = (0..BLOCKS_PER_CHIP).filter(|&b| mgr.is_bad(chip, b)).collect();
        report.insert(chip, bad);
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::fake::FakeNand;
    use crate::commander::FirmwareCommander;
    use crate::config::CommanderConfig;

    fn fresh_manager() -> BlockManager<FirmwareCommander<FakeNand>> {
        let commanders = vec![
            FirmwareCommander::new(FakeNand::new(), CommanderConfig::default()),
            FirmwareCommander::new(FakeNand::new(), CommanderConfig::default()),
        ];
        BlockManager::init(commanders).unwrap()
    }

    #[test]
    fn init_scans_no_bad_blocks_on_fresh_fake() {
        let mgr = fresh_manager();
        assert_eq!(mgr.num_chip(), 2);
        for chip in 0..2 {
            for block in 0..BLOCKS_PER_CHIP {
                assert!(!mgr.is_bad(chip, block));
            }
        }
    }

    #[test]
    fn alloc_erases_and_marks_allocated() {
        let mut mgr = fresh_manager();
        let (chip, block) = mgr.alloc().unwrap();
        assert!(mgr.is_allocated(chip, block));
    }

    #[test]
    fn alloc_skips_blocks_that_fail_erase() {
        let mut commander = FirmwareCommander::new(FakeNand::new(), CommanderConfig::default());
        commander.bus_mut().fail_next_erase(0, 0);
        let mut mgr = BlockManager::init(vec![commander]).unwrap();
        let (chip, block) = mgr.alloc().unwrap();
        assert_eq!(chip, 0);
        assert_eq!(block, 1);
        assert!(mgr.is_bad(0, 0));
    }

    #[test]
    fn alloc_advances_to_the_next_chip_once_one_is_exhausted() {
        let mut commanders = vec![
            FirmwareCommander::new(FakeNand::new(), CommanderConfig::default()),
            FirmwareCommander::new(FakeNand::new(), CommanderConfig::default()),
        ];
        // Fill chip 0 by marking every block already allocated.
        let mut mgr = {
            let c0 = commanders.remove(0);
            let c1 = commanders.remove(0);
            BlockManager::init(vec![c0, c1]).unwrap()
        };
        for block in 0..BLOCKS_PER_CHIP {
            mgr.allocated[0].set(block, true);
        }
        let (chip, block) = mgr.alloc().unwrap();
        assert_eq!(chip, 1);
        assert_eq!(block, 0);
    }

    #[test]
    fn free_an_unallocated_block_errors() {
        let mut mgr = fresh_manager();
        assert!(matches!(
            mgr.free(0, 5),
            Err(BlockManagerError::AlreadyFree { chip: 0, block: 5 })
        ));
    }

    #[test]
    fn persisted_state_round_trips() {
        let mut mgr = fresh_manager();
        let (chip, block) = mgr.alloc().unwrap();
        let json = mgr.save_json().unwrap();

        let commanders = vec![
            FirmwareCommander::new(FakeNand::new(), CommanderConfig::default()),
            FirmwareCommander::new(FakeNand::new(), CommanderConfig::default()),
        ];
        let mut reloaded = BlockManager::init(commanders).unwrap();
        reloaded.load_json(&json).unwrap();
        assert!(reloaded.is_allocated(chip, block));
    }

    #[test]
    fn bitmap_decimal_round_trip() {
        let mut bm = BlockBitmap::new(BLOCKS_PER_CHIP);
        bm.set(0, true);
        bm.set(500, true);
        bm.set(1023, true);
        let s = bm.to_decimal_string();
        let back = BlockBitmap::from_decimal_string(&s, BLOCKS_PER_CHIP);
        assert_eq!(bm, back);
    }
}
