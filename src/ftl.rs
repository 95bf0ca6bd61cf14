//! Component H: the flash translation layer.
//!
//! Ties the block manager, page codec, and mapping table into a sector-level
//! read/write surface. Writes buffer up to `SECTORS_PER_PAGE` sectors and
//! flush as one page program, appended sequentially within the active
//! block; a page is never rewritten in place. Reads check the write buffer
//! first, then the mapping table, then fall back to an all-zero sentinel for
//! sectors that have never been written.

use log::{debug, warn};

use crate::addr::{decode_pba, encode_pba};
use crate::block_manager::BlockManager;
use crate::commander::NandCommander;
use crate::config::{PAGES_PER_BLOCK, PAGE_USABLE_BYTES, SECTORS_PER_PAGE, SECTOR_BYTES};
use crate::error::BlockManagerError;
use crate::mapping::Mapping;
use crate::page_codec::PageCodec;

/// Sector-level translation layer over one block manager.
pub struct Ftl<C: NandCommander> {
    block_manager: BlockManager<C>,
    codec: PageCodec,
    mapping: Mapping,
    write_buf: Vec<(u64, [u8; SECTOR_BYTES])>,
    cur_chip: usize,
    cur_block: Option<usize>,
    cur_page: usize,
}

impl<C: NandCommander> Ftl<C> {
    pub fn new(block_manager: BlockManager<C>, codec: PageCodec) -> Self {
        Self {
            block_manager,
            codec,
            mapping: Mapping::new(),
            write_buf: Vec::with_capacity(SECTORS_PER_PAGE),
            cur_chip: 0,
            cur_block: None,
            cur_page: 0,
        }
    }

    pub fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    pub fn block_manager(&self) -> &BlockManager<C> {
        &self.block_manager
    }

    pub fn block_manager_mut(&mut self) -> &mut BlockManager<C> {
        &mut self.block_manager
    }

    /// Buffers `data` (exactly `SECTOR_BYTES` long) for logical sector `lba`;
    /// flushes automatically once the buffer fills a page.
    pub fn write_logical(&mut self, lba: u64, data: &[u8]) -> Result<(), BlockManagerError> {
        assert_eq!(data.len(), SECTOR_BYTES, "write_logical requires one sector");
        let mut sector = [0u8; SECTOR_BYTES];
        sector.copy_from_slice(data);
        self.write_buf.retain(|(l, _)| *l != lba);
        self.write_buf.push((lba, sector));
        if self.write_buf.len() == SECTORS_PER_PAGE {
            self.flush()?;
        }
        Ok(())
    }

    /// Reads logical sector `lba`: from the write buffer if pending, else
    /// from the mapped physical location, else the all-zero sentinel.
    pub fn read_logical(&mut self, lba: u64) -> Vec<u8> {
        if let Some((_, data)) = self.write_buf.iter().rev().find(|(l, _)| *l == lba) {
            return data.to_vec();
        }
        let Some(pba) = self.mapping.resolve(lba) else {
            return Self::unmapped_sector();
        };
        let (chip, block, page, sector) = decode_pba(pba);
        let Some(full) = self.block_manager.read(chip, block, page) else {
            warn!("read_logical(lba={lba}) hit an unreadable page at chip={chip} block={block} page={page}");
            return Self::unmapped_sector();
        };
        let Some(decoded) = self.codec.decode(&full) else {
            warn!("read_logical(lba={lba}) failed to decode chip={chip} block={block} page={page}, unmapping");
            self.mapping.unmap(lba);
            return Self::unmapped_sector();
        };
        decoded[sector * SECTOR_BYTES..(sector + 1) * SECTOR_BYTES].to_vec()
    }

    fn unmapped_sector() -> Vec<u8> {
        vec![0u8; SECTOR_BYTES]
    }

    /// Drops any pending write and the committed mapping for `lba`.
    pub fn unmap(&mut self, lba: u64) {
        self.write_buf.retain(|(l, _)| *l != lba);
        self.mapping.unmap(lba);
    }

    /// Forces out a partial page (unused sector slots stay unmapped).
    /// Returns `Ok(())` immediately if the buffer is already empty.
    pub fn flush(&mut self) -> Result<(), BlockManagerError> {
        if self.write_buf.is_empty() {
            return Ok(());
        }
        if self.cur_block.is_none() || self.cur_page >= PAGES_PER_BLOCK {
            let (chip, block) = self.block_manager.alloc()?;
            self.cur_chip = chip;
            self.cur_block = Some(block);
            self.cur_page = 0;
        }
        let chip = self.cur_chip;
        let block = self.cur_block.expect("allocated above");
        let page = self.cur_page;

        let mut main = vec![0u8; PAGE_USABLE_BYTES];
        let mut pending = Vec::with_capacity(self.write_buf.len());
        for (sector_idx, (lba, data)) in self.write_buf.iter().enumerate() {
            main[sector_idx * SECTOR_BYTES..(sector_idx + 1) * SECTOR_BYTES].copy_from_slice(data);
            let pba = encode_pba(chip, block, page, sector_idx)?;
            pending.push((*lba, pba));
        }
        let full = self.codec.encode(&main);

        let ok = self.block_manager.program(chip, block, page, &full);
        self.write_buf.clear();
        if !ok {
            // Reference implementation leaves a dangling mapping here; this
            // rolls the write back instead, so a failed program never
            // leaves `mapping` pointing at a page that wasn't written.
            self.cur_block = None;
            return Err(BlockManagerError::ProgramFailed { chip, block, page });
        }
        for (lba, pba) in pending {
            self.mapping.update(lba, pba);
        }
        debug!("flushed page chip={chip} block={block} page={page}");
        self.cur_page += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::fake::FakeNand;
    use crate::commander::FirmwareCommander;
    use crate::config::CommanderConfig;
    use crate::config::PageCodecConfig;

    fn fresh_ftl() -> Ftl<FirmwareCommander<FakeNand>> {
        let commanders = vec![FirmwareCommander::new(FakeNand::new(), CommanderConfig::default())];
        let block_manager = BlockManager::init(commanders).unwrap();
        Ftl::new(block_manager, PageCodec::new(PageCodecConfig::default()))
    }

    #[test]
    fn read_unmapped_sector_is_zero() {
        let mut ftl = fresh_ftl();
        assert_eq!(ftl.read_logical(42), vec![0u8; SECTOR_BYTES]);
    }

    #[test]
    fn write_then_read_before_flush_hits_write_buffer() {
        let mut ftl = fresh_ftl();
        let data = vec![0xABu8; SECTOR_BYTES];
        ftl.write_logical(3, &data).unwrap();
        assert_eq!(ftl.read_logical(3), data);
    }

    #[test]
    fn full_page_of_writes_flushes_and_reads_back() {
        let mut ftl = fresh_ftl();
        for s in 0..SECTORS_PER_PAGE {
            let data = vec![s as u8; SECTOR_BYTES];
            ftl.write_logical(s as u64, &data).unwrap();
        }
        assert!(ftl.write_buf.is_empty());
        for s in 0..SECTORS_PER_PAGE {
            assert_eq!(ftl.read_logical(s as u64), vec![s as u8; SECTOR_BYTES]);
        }
    }

    #[test]
    fn overwrite_before_flush_keeps_latest_value() {
        let mut ftl = fresh_ftl();
        ftl.write_logical(1, &vec![0x11u8; SECTOR_BYTES]).unwrap();
        ftl.write_logical(1, &vec![0x22u8; SECTOR_BYTES]).unwrap();
        assert_eq!(ftl.read_logical(1), vec![0x22u8; SECTOR_BYTES]);
    }

    #[test]
    fn overwrite_after_flush_lands_on_a_new_page() {
        let mut ftl = fresh_ftl();
        for s in 0..SECTORS_PER_PAGE {
            ftl.write_logical(s as u64, &vec![1u8; SECTOR_BYTES]).unwrap();
        }
        let old_pba = ftl.mapping.resolve(0).unwrap();
        for s in 0..SECTORS_PER_PAGE {
            ftl.write_logical(s as u64, &vec![2u8; SECTOR_BYTES]).unwrap();
        }
        let new_pba = ftl.mapping.resolve(0).unwrap();
        assert_ne!(old_pba, new_pba);
        assert_eq!(ftl.read_logical(0), vec![2u8; SECTOR_BYTES]);
    }

    #[test]
    fn unmap_clears_both_buffer_and_mapping() {
        let mut ftl = fresh_ftl();
        ftl.write_logical(5, &vec![9u8; SECTOR_BYTES]).unwrap();
        ftl.unmap(5);
        assert_eq!(ftl.read_logical(5), vec![0u8; SECTOR_BYTES]);
    }

    #[test]
    fn explicit_flush_persists_a_partial_page() {
        let mut ftl = fresh_ftl();
        ftl.write_logical(0, &vec![7u8; SECTOR_BYTES]).unwrap();
        ftl.flush().unwrap();
        assert!(ftl.mapping.is_mapped(0));
        assert_eq!(ftl.read_logical(0), vec![7u8; SECTOR_BYTES]);
    }
}
