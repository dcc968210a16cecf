use thiserror::Error;

use crate::config::{Addr, BlockId, PageId};

/// Result alias for translation layer operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Faults reported by a flash medium.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlashError {
    #[error("page {page} is out of range")]
    PageOutOfRange { page: PageId },
    #[error("block {block} is out of range")]
    BlockOutOfRange { block: BlockId },
    /// Program attempted on a page that was not erased since its last write.
    #[error("page {page} is not erased")]
    NotErased { page: PageId },
    #[error("buffer of {actual} bytes, page size is {expected}")]
    BufferSize { expected: usize, actual: usize },
}

#[derive(Error, Debug)]
pub enum Error {
    /// Device geometry or construction options are inconsistent.
    #[error("configuration error: {0}")]
    Config(&'static str),
    /// Read of a logical block that was never written.
    #[error("logical block {block} is unmapped")]
    Unmapped { block: Addr },
    #[error("logical block {block} is out of range (disk has {limit} blocks)")]
    OutOfRange { block: Addr, limit: Addr },
    #[error("buffer of {actual} bytes, page size is {expected}")]
    BufferSize { expected: usize, actual: usize },
    /// No free page even after a collection cycle.
    #[error("no free flash pages left after cleaning")]
    NoFreeSpace,
    /// The collector found no block holding a stale page.
    #[error("no block holds stale pages")]
    NothingToClean,
    /// An erased victim could not take back its own valid pages. The tables
    /// were corrupted before the cycle started.
    #[error("relocating logical block {logical} out of block {victim} failed")]
    RelocationFailed { victim: BlockId, logical: Addr },
    #[error("mapping tables are inconsistent: {0}")]
    Inconsistent(String),
    #[error(transparent)]
    Flash(#[from] FlashError),
}

impl Error {
    /// True for broken-invariant conditions, as opposed to ordinary exhaustion
    /// or caller mistakes.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::RelocationFailed { .. } | Error::Inconsistent(_))
    }
}
