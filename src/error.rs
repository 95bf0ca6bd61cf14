//! Crate-wide error types, one enum per failing layer.
//!
//! Kept as plain enums with a hand-written `Display`, matching the rest of
//! this codebase's style rather than pulling in an error-derive crate.

use std::fmt;

/// Failures surfaced directly by the bus driver.
#[derive(Debug)]
pub enum BusError {
    /// R/B did not return ready within the configured timeout.
    Timeout,
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusError::Timeout => write!(f, "NAND bus timed out waiting for ready/busy"),
        }
    }
}

impl std::error::Error for BusError {}

/// Fatal commander-level failures. Most operation failures are instead
/// folded into `Option`/`bool` return values (see `commander` module docs);
/// this type covers only the paths the spec calls out as fatal.
#[derive(Debug)]
pub enum CommanderError {
    /// `reset` did not observe ready within its timeout budget.
    ResetTimeout { chip: usize },
}

impl fmt::Display for CommanderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommanderError::ResetTimeout { chip } => {
                write!(f, "NAND reset failed: chip {chip} did not clear busy in time")
            }
        }
    }
}

impl std::error::Error for CommanderError {}

/// Failures from address encode/decode validation (`addr` module).
#[derive(Debug)]
pub enum AddrError {
    ChipOutOfRange { chip: usize },
    BlockOutOfRange { block: usize },
    PageOutOfRange { page: usize },
    SectorOutOfRange { sector: usize },
}

impl fmt::Display for AddrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddrError::ChipOutOfRange { chip } => write!(f, "chip index {chip} out of range"),
            AddrError::BlockOutOfRange { block } => write!(f, "block index {block} out of range"),
            AddrError::PageOutOfRange { page } => write!(f, "page index {page} out of range"),
            AddrError::SectorOutOfRange { sector } => {
                write!(f, "sector index {sector} out of range")
            }
        }
    }
}

impl std::error::Error for AddrError {}

/// Failures from the block manager (component E).
#[derive(Debug)]
pub enum BlockManagerError {
    /// No chip responded to READ-ID with the expected identifier.
    NoActiveChip,
    /// A page-0 read failed while scanning for factory bad-block marks.
    BadBlockCheckFailure { chip: usize, block: usize },
    /// The allocator scanned every block and found none free and good.
    NoFreeBlock,
    /// Attempted to allocate a block that is already allocated.
    AlreadyAllocated { chip: usize, block: usize },
    /// Attempted to free a block that is not currently allocated.
    AlreadyFree { chip: usize, block: usize },
    /// A page program failed and was rolled back rather than mapped in.
    ProgramFailed { chip: usize, block: usize, page: usize },
    /// An address passed validation failed (wraps `AddrError`).
    Addr(AddrError),
}

impl fmt::Display for BlockManagerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockManagerError::NoActiveChip => write!(f, "no active chip responded to READ-ID"),
            BlockManagerError::BadBlockCheckFailure { chip, block } => write!(
                f,
                "bad-block scan failed reading chip {chip} block {block} page 0"
            ),
            BlockManagerError::NoFreeBlock => write!(f, "no free block available"),
            BlockManagerError::AlreadyAllocated { chip, block } => {
                write!(f, "chip {chip} block {block} is already allocated")
            }
            BlockManagerError::AlreadyFree { chip, block } => {
                write!(f, "chip {chip} block {block} is already free")
            }
            BlockManagerError::ProgramFailed { chip, block, page } => write!(
                f,
                "program failed on chip {chip} block {block} page {page}, write rolled back"
            ),
            BlockManagerError::Addr(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for BlockManagerError {}

impl From<AddrError> for BlockManagerError {
    fn from(e: AddrError) -> Self {
        BlockManagerError::Addr(e)
    }
}

/// Failures loading persisted allocator state. Treated by `BlockManager::init`
/// as "first boot" rather than propagated.
#[derive(Debug)]
pub enum PersistenceError {
    Io(std::io::Error),
    Format(serde_json::Error),
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistenceError::Io(e) => write!(f, "allocator state I/O error: {e}"),
            PersistenceError::Format(e) => write!(f, "allocator state format error: {e}"),
        }
    }
}

impl std::error::Error for PersistenceError {}

impl From<std::io::Error> for PersistenceError {
    fn from(e: std::io::Error) -> Self {
        PersistenceError::Io(e)
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(e: serde_json::Error) -> Self {
        PersistenceError::Format(e)
    }
}
