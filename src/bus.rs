//! Component A: primitive NAND pin operations.
//!
//! This module specifies the contract the command engine drives (set/get the
//! 8 IO lines, toggle CLE/ALE/WE/RE, select a chip via CE, read R/B, switch IO
//! direction) without binding to any concrete GPIO/PIO peripheral — that
//! binding lives outside this crate's scope. A `#[cfg(test)]` in-memory fake
//! die is provided so the commander and FTL layers can be exercised without
//! real silicon.

use crate::error::BusError;

/// Low-level NAND bus primitives.
///
/// Implementors must deassert CE on every completion path, including error
/// paths, and must honor the documented settle delay after `set_wp` changes.
/// The `input_cmd`/`input_addrs`/`output_data`/`input_data` default methods
/// compose the primitive pin toggles into the strobe sequences the NAND
/// expects; implementors may override them directly when a lower-level
/// primitive isn't meaningful to model (as the test fake does).
pub trait NandBus {
    fn init_pins(&mut self);
    fn set_io(&mut self, value: u8);
    fn get_io(&self) -> u8;
    fn set_io_dir(&mut self, is_output: bool);
    fn set_ce(&mut self, chip: Option<usize>);
    fn set_cle(&mut self, bit: bool);
    fn set_ale(&mut self, bit: bool);
    fn set_we(&mut self, bit: bool);
    fn set_re(&mut self, bit: bool);
    /// Blocks for at least the configured WP settle delay after the change.
    fn set_wp(&mut self, bit: bool);
    fn get_rb(&self) -> bool;

    /// Polls R/B at a bounded rate; returns `false` if it hasn't gone ready
    /// within `timeout_ms`.
    fn wait_busy(&mut self, timeout_ms: u32) -> bool;

    fn input_cmd(&mut self, cmd: u8) {
        self.set_io(cmd);
        self.set_cle(true);
        self.set_we(false);
        self.set_we(true);
        self.set_cle(false);
    }

    fn input_addrs(&mut self, addrs: &[u8]) {
        for &addr in addrs {
            self.set_io(addr);
            self.set_ale(true);
            self.set_we(false);
            self.set_we(true);
            self.set_ale(false);
        }
    }

    fn output_data(&mut self, n: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(n);
        self.set_io_dir(false);
        for _ in 0..n {
            self.set_re(false);
            out.push(self.get_io());
            self.set_re(true);
        }
        self.set_io_dir(true);
        out
    }

    fn input_data(&mut self, data: &[u8]) {
        for &byte in data {
            self.set_io(byte);
            self.set_we(false);
            self.set_we(true);
        }
    }
}

/// Resolve a bus-level reset timeout into the crate's fatal error type.
pub fn reset_timeout_err(_chip: usize) -> BusError {
    BusError::Timeout
}

#[cfg(any(test, feature = "fake-nand"))]
pub mod fake {
    //! An in-memory NAND die: test support only, not the excluded simulation
    //! harness. It tracks NAND-level state (pending command, latched
    //! address, status) directly rather than re-deriving it from individual
    //! pin edges, and overrides the `NandBus` strobe-composing default
    //! methods accordingly. Backs `commander`/`ftl` unit and integration
    //! tests with plausible page/status/ready-busy behavior.

    use super::NandBus;
    use crate::cmdprog::nand_cmd as c;
    use crate::config::{MAX_CHIPS, PAGE_ALL_BYTES, PAGES_PER_BLOCK};
    use std::collections::HashMap;

    /// Sparse page storage: unwritten pages read back as erased (`0xFF`).
    struct ChipStorage {
        pages: HashMap<(usize, usize), [u8; PAGE_ALL_BYTES]>,
        bad_blocks: Vec<usize>,
        fail_erase_once: Vec<usize>,
    }

    impl ChipStorage {
        fn new() -> Self {
            Self {
                pages: HashMap::new(),
                bad_blocks: Vec::new(),
                fail_erase_once: Vec::new(),
            }
        }

        fn get(&self, block: usize, page: usize) -> [u8; PAGE_ALL_BYTES] {
            self.pages
                .get(&(block, page))
                .copied()
                .unwrap_or([0xFFu8; PAGE_ALL_BYTES])
        }

        fn set(&mut self, block: usize, page: usize, data: [u8; PAGE_ALL_BYTES]) {
            self.pages.insert((block, page), data);
        }

        fn erase_block(&mut self, block: usize) {
            for p in 0..PAGES_PER_BLOCK {
                self.pages.remove(&(block, p));
            }
        }
    }

    /// Latched command/address state plus per-chip page storage.
    pub struct FakeNand {
        chips: Vec<ChipStorage>,
        selected: Option<usize>,
        pending_cmd: Option<u8>,
        addr_bytes: Vec<u8>,
        program_data: Vec<u8>,
        status: u8,
        /// Set once a RESET/READ_2ND/ERASE_2ND/PROGRAM_2ND has been latched;
        /// cleared by `wait_busy`.
        busy: bool,
        /// When set, READ_ID returns garbage instead of `READ_ID_EXPECT`,
        /// simulating an unpopulated chip-select slot on the board.
        absent: bool,
    }

    impl FakeNand {
        pub fn new() -> Self {
            Self {
                chips: (0..MAX_CHIPS).map(|_| ChipStorage::new()).collect(),
                selected: None,
                pending_cmd: None,
                addr_bytes: Vec::new(),
                program_data: Vec::new(),
                status: 0x00,
                busy: false,
                absent: false,
            }
        }

        /// Makes this die fail READ-ID, as an unpopulated chip-select would.
        pub fn simulate_absent_chip(&mut self) {
            self.absent = true;
        }

        pub fn mark_bad_block(&mut self, chip: usize, block: usize) {
            let mut page0 = self.chips[chip].get(block, 0);
            page0[0] = 0x00;
            self.chips[chip].set(block, 0, page0);
            self.chips[chip].bad_blocks.push(block);
        }

        pub fn fail_next_erase(&mut self, chip: usize, block: usize) {
            self.chips[chip].fail_erase_once.push(block);
        }

        pub fn write_page_raw(&mut self, chip: usize, block: usize, page: usize, data: &[u8]) {
            let mut full = [0xFFu8; PAGE_ALL_BYTES];
            full.copy_from_slice(data);
            self.chips[chip].set(block, page, full);
        }

        pub fn read_page_raw(&self, chip: usize, block: usize, page: usize) -> [u8; PAGE_ALL_BYTES] {
            self.chips[chip].get(block, page)
        }

        fn decode_full_addr(bytes: &[u8]) -> (usize, usize, usize) {
            let col = bytes[0] as usize | ((bytes[1] as usize & 0x0F) << 8);
            let row = bytes[2] as usize | ((bytes[3] as usize) << 8);
            (col, row & 0x3F, row >> 6)
        }

        fn decode_block_addr(bytes: &[u8]) -> usize {
            bytes[0] as usize | ((bytes[1] as usize) << 8)
        }

        fn chip(&self) -> usize {
            self.selected.expect("chip must be selected before a command latch")
        }
    }

    impl Default for FakeNand {
        fn default() -> Self {
            Self::new()
        }
    }

    impl NandBus for FakeNand {
        fn init_pins(&mut self) {
            self.selected = None;
            self.pending_cmd = None;
            self.addr_bytes.clear();
        }

        fn set_io(&mut self, _value: u8) {}
        fn get_io(&self) -> u8 {
            0
        }
        fn set_io_dir(&mut self, _is_output: bool) {}
        fn set_ce(&mut self, chip: Option<usize>) {
            self.selected = chip;
        }
        fn set_cle(&mut self, _bit: bool) {}
        fn set_ale(&mut self, _bit: bool) {}
        fn set_we(&mut self, _bit: bool) {}
        fn set_re(&mut self, _bit: bool) {}
        fn set_wp(&mut self, _bit: bool) {}
        fn get_rb(&self) -> bool {
            !self.busy
        }

        fn wait_busy(&mut self, _timeout_ms: u32) -> bool {
            self.busy = false;
            true
        }

        fn input_cmd(&mut self, cmd: u8) {
            // Commands that open a new address/data phase start with a
            // clean slate; `_2ND` commands consume the bytes latched since
            // the matching `_1ST`/`READ_ID` and must not clear them first.
            match cmd {
                c::RESET | c::READ_ID | c::READ_1ST | c::PROGRAM_1ST | c::ERASE_1ST
                | c::STATUS_READ => self.addr_bytes.clear(),
                _ => {}
            }
            match cmd {
                c::RESET => self.busy = true,
                c::READ_2ND => self.busy = true,
                c::ERASE_2ND => {
                    let block = Self::decode_block_addr(&self.addr_bytes.clone());
                    let chip = self.chip();
                    if let Some(pos) = self.chips[chip]
                        .fail_erase_once
                        .iter()
                        .position(|&b| b == block)
                    {
                        self.chips[chip].fail_erase_once.remove(pos);
                        self.status = 0x01;
                    } else if self.chips[chip].bad_blocks.contains(&block) {
                        self.status = 0x01;
                    } else {
                        self.chips[chip].erase_block(block);
                        self.status = 0x00;
                    }
                    self.busy = true;
                }
                c::PROGRAM_2ND => {
                    let (col, page, block) = Self::decode_full_addr(&self.addr_bytes.clone());
                    let chip = self.chip();
                    if self.chips[chip].bad_blocks.contains(&block) {
                        self.status = 0x01;
                    } else {
                        let body = self.program_data.clone();
                        let mut full = self.chips[chip].get(block, page);
                        let n = body.len().min(full.len() - col);
                        full[col..col + n].copy_from_slice(&body[..n]);
                        self.chips[chip].set(block, page, full);
                        self.status = 0x00;
                    }
                    self.busy = true;
                }
                _ => {}
            }
            self.pending_cmd = Some(cmd);
        }

        fn input_addrs(&mut self, addrs: &[u8]) {
            self.addr_bytes.extend_from_slice(addrs);
        }

        fn input_data(&mut self, data: &[u8]) {
            self.program_data = data.to_vec();
        }

        fn output_data(&mut self, n: usize) -> Vec<u8> {
            match self.pending_cmd {
                Some(c::READ_ID) if self.absent => vec![0x00; n],
                Some(c::READ_ID) => crate::config::READ_ID_EXPECT
                    .iter()
                    .copied()
                    .chain(std::iter::repeat(0xFF))
                    .take(n)
                    .collect(),
                Some(c::STATUS_READ) => vec![self.status; n],
                Some(c::READ_2ND) => {
                    let (col, page, block) = Self::decode_full_addr(&self.addr_bytes);
                    let chip = self.chip();
                    let full = self.chips[chip].get(block, page);
                    full[col..col + n].to_vec()
                }
                _ => vec![0xFF; n],
            }
        }
    }

}
