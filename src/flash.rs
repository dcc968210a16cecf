use std::sync::atomic::{AtomicUsize, Ordering};

use crate::config::{BlockId, Counter, PageId};
use crate::error::FlashError;

/// Raw flash medium the translation layer drives.
///
/// Pages are grouped into erase blocks of `pages_per_block()` contiguous
/// pages. A page may only be programmed once between two erases of its block.
pub trait Flash {
    fn page_count(&self) -> usize;

    fn pages_per_block(&self) -> usize;

    /// Bytes per page.
    fn page_size(&self) -> usize;

    /// Reads page `page` into `buf`, which must be exactly one page long.
    fn read_page(&self, page: PageId, buf: &mut [u8]) -> Result<(), FlashError>;

    /// Programs page `page`. The page must have been erased since its last write.
    fn write_page(&mut self, page: PageId, data: &[u8]) -> Result<(), FlashError>;

    /// Resets every page of `block` to the erased state.
    fn erase_block(&mut self, block: BlockId) -> Result<(), FlashError>;
}

const ERASED_BYTE: u8 = 0xFF;

/// Operation counters of a [`MemFlash`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlashStats {
    pub reads: Counter,
    pub writes: Counter,
    pub erases: Counter,
}

/// In-memory flash medium.
///
/// Enforces the erase-before-write contract, so a translation layer bug that
/// programs a dirty page surfaces as [`FlashError::NotErased`].
pub struct MemFlash {
    pages_per_block: usize,
    page_size: usize,
    data: Vec<u8>,
    erased: Vec<bool>,
    reads: AtomicUsize,
    writes: Counter,
    erases: Counter,
}

impl MemFlash {
    /// Creates a medium with every page erased.
    pub fn new(blocks: usize, pages_per_block: usize, page_size: usize) -> Self {
        let pages = blocks * pages_per_block;
        MemFlash {
            pages_per_block,
            page_size,
            data: vec![ERASED_BYTE; pages * page_size],
            erased: vec![true; pages],
            reads: AtomicUsize::new(0),
            writes: 0,
            erases: 0,
        }
    }

    /// Creates a medium whose pages all hold leftover data and must be erased
    /// before they can be programmed.
    pub fn unerased(blocks: usize, pages_per_block: usize, page_size: usize) -> Self {
        let mut flash = MemFlash::new(blocks, pages_per_block, page_size);
        flash.data.fill(0);
        flash.erased.fill(false);
        flash
    }

    pub fn stats(&self) -> FlashStats {
        FlashStats {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes,
            erases: self.erases,
        }
    }

    pub fn is_erased(&self, page: PageId) -> bool {
        self.erased.get(page).copied().unwrap_or(false)
    }

    fn check_page(&self, page: PageId, len: usize) -> Result<std::ops::Range<usize>, FlashError> {
        if page >= self.erased.len() {
            return Err(FlashError::PageOutOfRange { page });
        }
        if len != self.page_size {
            return Err(FlashError::BufferSize {
                expected: self.page_size,
                actual: len,
            });
        }
        let start = page * self.page_size;
        Ok(start..start + self.page_size)
    }
}

impl Flash for MemFlash {
    fn page_count(&self) -> usize {
        self.erased.len()
    }

    fn pages_per_block(&self) -> usize {
        self.pages_per_block
    }

    fn page_size(&self) -> usize {
        self.page_size
    }

    fn read_page(&self, page: PageId, buf: &mut [u8]) -> Result<(), FlashError> {
        let range = self.check_page(page, buf.len())?;
        buf.copy_from_slice(&self.data[range]);
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn write_page(&mut self, page: PageId, data: &[u8]) -> Result<(), FlashError> {
        let range = self.check_page(page, data.len())?;
        if !self.erased[page] {
            return Err(FlashError::NotErased { page });
        }
        self.data[range].copy_from_slice(data);
        self.erased[page] = false;
        self.writes += 1;
        Ok(())
    }

    fn erase_block(&mut self, block: BlockId) -> Result<(), FlashError> {
        if block >= self.page_count() / self.pages_per_block.max(1) {
            return Err(FlashError::BlockOutOfRange { block });
        }
        let first = block * self.pages_per_block;
        let pages = first..first + self.pages_per_block;
        self.data[pages.start * self.page_size..pages.end * self.page_size].fill(ERASED_BYTE);
        self.erased[pages].fill(true);
        self.erases += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn program_requires_erase() {
        let mut flash = MemFlash::new(2, 4, 8);
        flash.write_page(5, &[1; 8]).unwrap();
        assert_eq!(
            flash.write_page(5, &[2; 8]),
            Err(FlashError::NotErased { page: 5 })
        );

        flash.erase_block(1).unwrap();
        flash.write_page(5, &[2; 8]).unwrap();

        let mut buf = [0; 8];
        flash.read_page(5, &mut buf).unwrap();
        assert_eq!(buf, [2; 8]);
    }

    #[test]
    fn erase_only_touches_its_block() {
        let mut flash = MemFlash::new(2, 2, 4);
        flash.write_page(1, &[9; 4]).unwrap();
        flash.write_page(2, &[7; 4]).unwrap();
        flash.erase_block(0).unwrap();

        assert!(flash.is_erased(0) && flash.is_erased(1));
        assert!(!flash.is_erased(2));

        let mut buf = [0; 4];
        flash.read_page(1, &mut buf).unwrap();
        assert_eq!(buf, [ERASED_BYTE; 4]);
        flash.read_page(2, &mut buf).unwrap();
        assert_eq!(buf, [7; 4]);
    }

    #[test]
    fn rejects_bad_indices_and_buffers() {
        let mut flash = MemFlash::new(1, 4, 16);
        let mut short = [0; 3];
        assert_eq!(
            flash.read_page(0, &mut short),
            Err(FlashError::BufferSize { expected: 16, actual: 3 })
        );
        assert_eq!(
            flash.write_page(4, &[0; 16]),
            Err(FlashError::PageOutOfRange { page: 4 })
        );
        assert_eq!(flash.erase_block(1), Err(FlashError::BlockOutOfRange { block: 1 }));
    }

    #[test]
    fn unerased_medium_refuses_programs() {
        let mut flash = MemFlash::unerased(1, 2, 4);
        assert_eq!(flash.write_page(0, &[1; 4]), Err(FlashError::NotErased { page: 0 }));
        flash.erase_block(0).unwrap();
        flash.write_page(0, &[1; 4]).unwrap();
    }

    #[test]
    fn counts_operations() {
        let mut flash = MemFlash::new(1, 2, 4);
        let mut buf = [0; 4];
        flash.write_page(0, &[1; 4]).unwrap();
        flash.read_page(0, &mut buf).unwrap();
        flash.read_page(1, &mut buf).unwrap();
        flash.erase_block(0).unwrap();
        assert_eq!(
            flash.stats(),
            FlashStats { reads: 2, writes: 1, erases: 1 }
        );
    }
}
