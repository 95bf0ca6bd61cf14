//! A NAND flash controller stack for a dual-chip SLC parallel NAND device
//! (JISC-SSD TC58NVG0S3HTA00 class): bus primitives, a command-program
//! bytecode shared by the firmware and hardware commander paths, a
//! block/bad-block manager, a page codec, and a flash translation layer on
//! top.
//!
//! Module map:
//! - [`config`] — geometry constants and tunables.
//! - [`error`] — one error enum per failing layer.
//! - [`bus`] — the `NandBus` pin-level contract (component A).
//! - [`cmdprog`] — the command-program bytecode (component B).
//! - [`commander`] — firmware and hardware command backends (component C).
//! - [`addr`] — column/page/block and physical-block-address encoding (component D).
//! - [`block_manager`] — bad-block/allocation bookkeeping (component E).
//! - [`page_codec`] — scramble/ECC/CRC hook points (component F).
//! - [`mapping`] — the logical-to-physical address table (component G).
//! - [`ftl`] — the sector-level flash translation layer (component H).

pub mod addr;
pub mod block_manager;
pub mod bus;
pub mod cmdprog;
pub mod commander;
pub mod config;
pub mod error;
pub mod ftl;
pub mod mapping;
pub mod page_codec;

pub use block_manager::{BlockBitmap, BlockManager, PersistedState};
pub use bus::NandBus;
pub use cmdprog::{CmdId, CommandProgram, CommandProgramBuilder};
pub use commander::{FirmwareCommander, HardwareCommander, InlineSequencer, NandCommander, Sequencer};
pub use config::{CommanderConfig, PageCodecConfig};
pub use error::{AddrError, BlockManagerError, BusError, CommanderError, PersistenceError};
pub use ftl::Ftl;
pub use mapping::Mapping;
pub use page_codec::{Lfsr8, PageCodec};
