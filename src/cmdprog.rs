//! Component B: the command program bytecode format.
//!
//! A command program is a flat sequence of 32-bit words built from 2-word
//! instructions (see module docs on `CmdWord`). The same program can drive
//! either a bit-banged GPIO path or an off-board DMA/PIO sequencer — see
//! `crate::commander`.

/// Raw NAND command bytes (same constants on both commander backends).
pub mod nand_cmd {
    pub const READ_1ST: u8 = 0x00;
    pub const READ_2ND: u8 = 0x30;
    pub const PROGRAM_1ST: u8 = 0x80;
    pub const PROGRAM_2ND: u8 = 0x10;
    pub const ERASE_1ST: u8 = 0x60;
    pub const ERASE_2ND: u8 = 0xD0;
    pub const READ_ID: u8 = 0x90;
    pub const STATUS_READ: u8 = 0x70;
    pub const RESET: u8 = 0xFF;
}

/// NAND status register bits (see `NandCommander::read_status`).
pub mod nand_status {
    pub const PROGRAM_ERASE_FAIL: u8 = 0x01;
    pub const CACHE_PROGRAM_FAIL: u8 = 0x02;
    pub const PAGE_BUFFER_READY: u8 = 0x20;
    pub const DATA_CACHE_READY: u8 = 0x40;
    pub const WRITE_PROTECT_DISABLE: u8 = 0x80;
}

/// Logical pin positions within the 16-bit pin-direction/bitbang word.
pub mod pin {
    pub const IO0: u32 = 0;
    pub const IO7: u32 = 7;
    pub const CEB0: u32 = 8;
    pub const CEB1: u32 = 9;
    pub const CLE: u32 = 10;
    pub const ALE: u32 = 11;
    pub const WPB: u32 = 12;
    pub const WEB: u32 = 13;
    pub const REB: u32 = 14;
    pub const RBB: u32 = 15;
}

/// `1 << bit_pos`.
pub const fn bit_on(bit_pos: u32) -> u32 {
    1u32 << bit_pos
}

/// Round `value` up to the next multiple of 4.
pub const fn roundup4(value: usize) -> usize {
    (value + 3) & !0x03
}

/// All control/CE/IO lines driven as outputs (R/B stays an input). Per the
/// fix recorded in DESIGN.md, WP is always included here.
pub const PIN_DIR_WRITE: u16 = (bit_on(pin::REB)
    | bit_on(pin::WEB)
    | bit_on(pin::WPB)
    | bit_on(pin::ALE)
    | bit_on(pin::CLE)
    | bit_on(pin::CEB1)
    | bit_on(pin::CEB0)
    | bit_on(pin::IO0)
    | bit_on(pin::IO0 + 1)
    | bit_on(pin::IO0 + 2)
    | bit_on(pin::IO0 + 3)
    | bit_on(pin::IO0 + 4)
    | bit_on(pin::IO0 + 5)
    | bit_on(pin::IO0 + 6)
    | bit_on(pin::IO7)) as u16;

/// Controls and CE as outputs; IO and R/B stay inputs (data-output phase).
pub const PIN_DIR_READ: u16 = (bit_on(pin::REB)
    | bit_on(pin::WEB)
    | bit_on(pin::WPB)
    | bit_on(pin::ALE)
    | bit_on(pin::CLE)
    | bit_on(pin::CEB1)
    | bit_on(pin::CEB0)) as u16;

/// Combine a chip selection into the CEB0/CEB1 bit pattern (active-low: the
/// deselected chip's bit is 1). `None` deselects both.
pub fn ce_bits(chip: Option<usize>) -> u32 {
    match chip {
        None => bit_on(pin::CEB0) | bit_on(pin::CEB1),
        Some(0) => bit_on(pin::CEB1),
        Some(1) => bit_on(pin::CEB0),
        Some(_) => panic!("chip must be 0 or 1 or None"),
    }
}

/// OR a CE pattern onto a data word (single value or, via `apply_cs_all`, a
/// whole data-input/address-latch stream).
pub fn apply_cs(data: u32, chip: Option<usize>) -> u32 {
    ce_bits(chip) | data
}

pub fn apply_cs_all(data: &mut [u32], chip: Option<usize>) {
    let bits = ce_bits(chip);
    for word in data.iter_mut() {
        *word = bits | *word;
    }
}

/// Elementary command-program instruction IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmdId {
    Bitbang = 0,
    CmdLatch = 1,
    AddrLatch = 2,
    DataOutput = 3,
    DataInput = 4,
    WaitReady = 5,
}

/// An assembled sequence of 32-bit command words.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandProgram {
    pub words: Vec<u32>,
}

impl CommandProgram {
    pub fn new() -> Self {
        Self { words: Vec::new() }
    }

    fn push_header(&mut self, cmd_id: CmdId, pindir: u16, transfer_count: usize, word1: u32) {
        assert!(transfer_count >= 1 && transfer_count <= 4096, "transfer_count out of range");
        let header = ((cmd_id as u32) << 28)
            | (((transfer_count as u32 - 1) & 0x0FFF) << 16)
            | (pindir as u32);
        self.words.push(header);
        self.words.push(word1);
    }
}

/// Builds canonical command programs, mirroring the elementary emitters and
/// composite sequences of the reference PIO command builder.
pub struct CommandProgramBuilder;

impl CommandProgramBuilder {
    pub fn init_pin(prog: &mut CommandProgram) {
        prog.push_header(CmdId::Bitbang, PIN_DIR_WRITE, 1, apply_cs(0, None));
    }

    pub fn assert_cs(prog: &mut CommandProgram, chip: Option<usize>) {
        prog.push_header(CmdId::Bitbang, PIN_DIR_WRITE, 1, apply_cs(0, chip));
    }

    pub fn deassert_cs(prog: &mut CommandProgram) {
        Self::assert_cs(prog, None);
    }

    pub fn cmd_latch(prog: &mut CommandProgram, cmd: u8, chip: Option<usize>) {
        prog.push_header(CmdId::CmdLatch, PIN_DIR_WRITE, 1, apply_cs(cmd as u32, chip));
    }

    pub fn addr_latch(prog: &mut CommandProgram, addrs: &[u8], chip: Option<usize>) {
        let mut words: Vec<u32> = addrs.iter().map(|&b| b as u32).collect();
        apply_cs_all(&mut words, chip);
        prog.push_header(CmdId::AddrLatch, PIN_DIR_WRITE, words.len(), 0);
        prog.words.extend(words);
    }

    pub fn data_output(prog: &mut CommandProgram, count: usize) {
        prog.push_header(CmdId::DataOutput, PIN_DIR_READ, count, 0);
    }

    pub fn data_input_header(prog: &mut CommandProgram, count: usize) {
        prog.push_header(CmdId::DataInput, PIN_DIR_WRITE, count, 0);
    }

    pub fn data_input(prog: &mut CommandProgram, data: &[u8], chip: Option<usize>) {
        let mut words: Vec<u32> = data.iter().map(|&b| b as u32).collect();
        apply_cs_all(&mut words, chip);
        prog.push_header(CmdId::DataInput, PIN_DIR_WRITE, words.len(), 0);
        prog.words.extend(words);
    }

    pub fn wait_ready(prog: &mut CommandProgram) {
        prog.push_header(CmdId::WaitReady, PIN_DIR_WRITE, 1, 0);
    }

    pub fn full_addr_latch(
        prog: &mut CommandProgram,
        column: usize,
        page: usize,
        block: usize,
        chip: Option<usize>,
    ) {
        let addrs = crate::addr::encode_full_addr(column, page, block);
        Self::addr_latch(prog, &addrs, chip);
    }

    pub fn block_addr_latch(prog: &mut CommandProgram, block: usize, chip: Option<usize>) {
        let addrs = crate::addr::encode_block_addr(block);
        Self::addr_latch(prog, &addrs, chip);
    }

    pub fn seq_reset(chip: usize) -> CommandProgram {
        let mut prog = CommandProgram::new();
        Self::init_pin(&mut prog);
        Self::assert_cs(&mut prog, Some(chip));
        Self::cmd_latch(&mut prog, nand_cmd::RESET, Some(chip));
        Self::wait_ready(&mut prog);
        Self::deassert_cs(&mut prog);
        prog
    }

    pub fn seq_read_id(chip: usize, offset: u8, count: usize) -> CommandProgram {
        let mut prog = CommandProgram::new();
        Self::init_pin(&mut prog);
        Self::assert_cs(&mut prog, Some(chip));
        Self::cmd_latch(&mut prog, nand_cmd::READ_ID, Some(chip));
        Self::addr_latch(&mut prog, &[offset], Some(chip));
        Self::data_output(&mut prog, count);
        Self::deassert_cs(&mut prog);
        prog
    }

    pub fn seq_read(chip: usize, column: usize, page: usize, block: usize, count: usize) -> CommandProgram {
        let mut prog = CommandProgram::new();
        Self::init_pin(&mut prog);
        Self::assert_cs(&mut prog, Some(chip));
        Self::cmd_latch(&mut prog, nand_cmd::READ_1ST, Some(chip));
        Self::full_addr_latch(&mut prog, column, page, block, Some(chip));
        Self::cmd_latch(&mut prog, nand_cmd::READ_2ND, Some(chip));
        Self::wait_ready(&mut prog);
        Self::data_output(&mut prog, count);
        Self::deassert_cs(&mut prog);
        prog
    }

    pub fn seq_status_read(chip: usize) -> CommandProgram {
        let mut prog = CommandProgram::new();
        Self::init_pin(&mut prog);
        Self::assert_cs(&mut prog, Some(chip));
        Self::cmd_latch(&mut prog, nand_cmd::STATUS_READ, Some(chip));
        Self::data_output(&mut prog, 1);
        Self::deassert_cs(&mut prog);
        prog
    }

    pub fn seq_program(
        chip: usize,
        column: usize,
        page: usize,
        block: usize,
        data: &[u8],
    ) -> CommandProgram {
        let mut prog = CommandProgram::new();
        Self::init_pin(&mut prog);
        Self::assert_cs(&mut prog, Some(chip));
        Self::cmd_latch(&mut prog, nand_cmd::PROGRAM_1ST, Some(chip));
        Self::full_addr_latch(&mut prog, column, page, block, Some(chip));
        Self::data_input(&mut prog, data, Some(chip));
        Self::cmd_latch(&mut prog, nand_cmd::PROGRAM_2ND, Some(chip));
        Self::wait_ready(&mut prog);
        Self::cmd_latch(&mut prog, nand_cmd::STATUS_READ, Some(chip));
        Self::data_output(&mut prog, 1);
        Self::deassert_cs(&mut prog);
        prog
    }

    pub fn seq_erase(chip: usize, block: usize) -> CommandProgram {
        let mut prog = CommandProgram::new();
        Self::init_pin(&mut prog);
        Self::assert_cs(&mut prog, Some(chip));
        Self::cmd_latch(&mut prog, nand_cmd::ERASE_1ST, Some(chip));
        Self::block_addr_latch(&mut prog, block, Some(chip));
        Self::cmd_latch(&mut prog, nand_cmd::ERASE_2ND, Some(chip));
        Self::wait_ready(&mut prog);
        Self::cmd_latch(&mut prog, nand_cmd::STATUS_READ, Some(chip));
        Self::data_output(&mut prog, 1);
        Self::deassert_cs(&mut prog);
        prog
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_word_layout() {
        let mut prog = CommandProgram::new();
        CommandProgramBuilder::cmd_latch(&mut prog, 0xAB, Some(0));
        let header = prog.words[0];
        assert_eq!((header >> 28) & 0xF, CmdId::CmdLatch as u32);
        assert_eq!((header >> 16) & 0x0FFF, 0); // transfer_count - 1 == 0
        assert_eq!(header & 0xFFFF, PIN_DIR_WRITE as u32);
    }

    #[test]
    fn ce_bits_select_chip() {
        assert_eq!(ce_bits(Some(0)), bit_on(pin::CEB1));
        assert_eq!(ce_bits(Some(1)), bit_on(pin::CEB0));
        assert_eq!(ce_bits(None), bit_on(pin::CEB0) | bit_on(pin::CEB1));
    }

    #[test]
    fn write_pindir_includes_wp() {
        assert_ne!(PIN_DIR_WRITE as u32 & bit_on(pin::WPB), 0);
    }

    #[test]
    fn roundup4_examples() {
        assert_eq!(roundup4(0), 0);
        assert_eq!(roundup4(1), 4);
        assert_eq!(roundup4(4), 4);
        assert_eq!(roundup4(5), 8);
    }

    #[test]
    fn program_sequence_wire_trace() {
        let data = vec![0u8; 4];
        let prog = CommandProgramBuilder::seq_program(1, 256, 2, 3, &data);
        // init_pin, assert_cs, cmd_latch(PROGRAM_1ST), addr_latch(4 bytes),
        // data_input(4 bytes), cmd_latch(PROGRAM_2ND), wait_ready,
        // cmd_latch(STATUS_READ), data_output(1), deassert_cs.
        assert_eq!(prog.words.len(), 2 * 8 + 4 + 4);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn prop_bit_on(k in 0u32..32) {
            prop_assert_eq!(bit_on(k), 1u32 << k);
        }

        #[test]
        fn prop_roundup4(n in 0usize..100_000) {
            let r = roundup4(n);
            prop_assert_eq!(r % 4, 0);
            prop_assert!(r >= n);
            prop_assert!(r - n < 4);
        }

        #[test]
        fn prop_header_encoding(cmd_id in 0u32..6, count in 1usize..4096, pindir in 0u16..=0xFFFFu16) {
            let mut prog = CommandProgram::new();
            let id = match cmd_id {
                0 => CmdId::Bitbang,
                1 => CmdId::CmdLatch,
                2 => CmdId::AddrLatch,
                3 => CmdId::DataOutput,
                4 => CmdId::DataInput,
                _ => CmdId::WaitReady,
            };
            prog.push_header(id, pindir, count, 0);
            let header = prog.words[0];
            prop_assert_eq!((header >> 28) & 0xF, cmd_id);
            prop_assert_eq!((header >> 16) & 0x0FFF, (count as u32 - 1) & 0x0FFF);
            prop_assert_eq!(header & 0xFFFF, pindir as u32);
        }
    }
}
