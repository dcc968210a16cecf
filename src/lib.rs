//! Page-mapped flash translation layer.
//!
//! Presents a fixed number of logical blocks on top of a [`Flash`] medium
//! whose pages cannot be rewritten in place. Overwrites leave stale pages
//! behind which the collector reclaims by erasing whole blocks, choosing the
//! block with the most stale pages and the least wear.

pub mod config;
pub mod error;
pub mod flash;
pub mod ftl;
pub mod shared;

pub use config::FtlConfig;
pub use error::{Error, FlashError, Result};
pub use flash::{Flash, FlashStats, MemFlash};
pub use ftl::{Ftl, FtlStats, PageState, PageUsage, WearStats};
pub use shared::SharedFtl;
