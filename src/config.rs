pub type BaseType = usize;

pub type Addr = BaseType;
pub type PageId = BaseType;
pub type BlockId = BaseType;
pub type Counter = BaseType;

pub const PAGE_SIZE: BaseType = 4096;

// Geometry of the simulated drive driven by the binary.
pub const BLOCKS: BaseType = 64;
pub const PAGES_PER_BLOCK: BaseType = 4;
pub const ALL_PAGES: BaseType = BLOCKS * PAGES_PER_BLOCK;

/// Over-provisioning percentage used by the demo drive.
pub const DEFAULT_OP: f64 = 7.0;

/// Construction options for [`crate::Ftl`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FtlConfig {
    /// Number of logical blocks exposed to the caller.
    pub logical_blocks: Addr,
    /// Erase every physical block once before first use. Needed for media
    /// that do not come up erased.
    pub erase_on_init: bool,
}

impl FtlConfig {
    pub fn new(logical_blocks: Addr) -> Self {
        FtlConfig {
            logical_blocks,
            erase_on_init: false,
        }
    }

    /// Derive the logical size from an over-provisioning percentage of the
    /// physical page count.
    pub fn with_op(page_count: BaseType, op: f64) -> Self {
        let op_pages = (page_count as f64 * (op / 100.)).trunc() as Addr;
        FtlConfig::new(page_count.saturating_sub(op_pages))
    }

    pub fn erase_on_init(mut self, erase: bool) -> Self {
        self.erase_on_init = erase;
        self
    }
}
