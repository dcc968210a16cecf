#[cfg(test)]
use std::{println as info, println as warn, println as error, println as trace, println as debug};

#[cfg(not(test))]
use log::*;

use std::fmt;
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};

use byte_unit::Byte;
use num_integer::Integer;

use crate::config::*;
use crate::error::{Error, Result};
use crate::flash::Flash;

/// Page-level translation layer over a [`Flash`] medium.
///
/// One logical block maps to one physical page. Overwrites go to a fresh page
/// and leave the previous one stale; stale pages are reclaimed by [`Ftl::clean`]
/// which erases whole blocks.
pub struct Ftl<F> {
    flash: F,

    l2p: Vec<L2PValue>,
    p2l: Vec<Option<Addr>>,
    page_state: Vec<PageState>,
    erase_count: Vec<Counter>,

    pages_per_block: usize,
    page_size: usize,

    reads: AtomicUsize,
    writes: Counter,
    cleans: Counter,
    relocations: Counter,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum L2PValue {
    Unmapped,
    Mapped(PageId),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageState {
    /// Erased, available for allocation.
    Free,
    /// Holds the current data of a logical block.
    Valid,
    /// Superseded, must be erased before reuse.
    Stale,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FtlStats {
    pub reads: Counter,
    pub writes: Counter,
    /// Completed collection cycles.
    pub cleans: Counter,
    /// Valid pages moved out of victim blocks.
    pub relocations: Counter,
}

impl fmt::Display for FtlStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\tdisk reads: {}", self.reads)?;
        writeln!(f, "\tdisk writes: {}", self.writes)?;
        writeln!(f, "\tcleans: {}", self.cleans)?;
        write!(f, "\trelocations: {}", self.relocations)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PageUsage {
    pub free: Counter,
    pub valid: Counter,
    pub stale: Counter,
}

/// Spread of erase counts across physical blocks.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WearStats {
    pub min: Counter,
    pub max: Counter,
    pub mean: f64,
    pub spread: Counter,
}

// A valid page pulled out of a victim block, waiting for a new home.
struct Staged {
    page: PageId,
    logical: Addr,
    data: Vec<u8>,
}

impl<F: Flash> Ftl<F> {
    pub fn new(mut flash: F, cfg: FtlConfig) -> Result<Self> {
        let page_count = flash.page_count();
        let pages_per_block = flash.pages_per_block();
        let page_size = flash.page_size();

        if pages_per_block == 0 {
            return Err(Error::Config("zero pages per block"));
        }
        if page_count == 0 {
            return Err(Error::Config("medium has no pages"));
        }
        if page_size == 0 {
            return Err(Error::Config("zero page size"));
        }
        let (blocks, rest) = page_count.div_rem(&pages_per_block);
        if rest != 0 {
            return Err(Error::Config("page count is not a multiple of pages per block"));
        }
        if cfg.logical_blocks == 0 {
            return Err(Error::Config("zero logical blocks"));
        }
        if cfg.logical_blocks > page_count {
            return Err(Error::Config("more logical blocks than physical pages"));
        }

        let mut erase_count = vec![0; blocks];
        if cfg.erase_on_init {
            for (block, count) in erase_count.iter_mut().enumerate() {
                flash.erase_block(block)?;
                *count += 1;
            }
            debug!("Erased {} blocks before first use", blocks);
        }

        trace!("pages: {}, pages per block: {}, blocks: {}", page_count, pages_per_block, blocks);
        trace!(
            "Physical Capacity: {} bytes, {}",
            page_count * page_size,
            Byte::from(page_count * page_size).get_appropriate_unit(true).to_string()
        );
        info!(
            "User Capacity: {} bytes, {}",
            cfg.logical_blocks * page_size,
            Byte::from(cfg.logical_blocks * page_size).get_appropriate_unit(true).to_string()
        );

        Ok(Ftl {
            flash,
            l2p: vec![L2PValue::Unmapped; cfg.logical_blocks],
            p2l: vec![None; page_count],
            page_state: vec![PageState::Free; page_count],
            erase_count,
            pages_per_block,
            page_size,
            reads: AtomicUsize::new(0),
            writes: 0,
            cleans: 0,
            relocations: 0,
        })
    }

    pub fn logical_blocks(&self) -> Addr {
        self.l2p.len()
    }

    pub fn max_lba(&self) -> Addr {
        self.l2p.len() - 1
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn flash(&self) -> &F {
        &self.flash
    }

    /// Reads logical block `block` into a fresh buffer.
    pub fn read(&self, block: Addr) -> Result<Vec<u8>> {
        let mut buf = vec![0; self.page_size];
        self.read_into(block, &mut buf)?;
        Ok(buf)
    }

    pub fn read_into(&self, block: Addr, buf: &mut [u8]) -> Result<()> {
        self.check_block(block)?;
        self.check_len(buf.len())?;

        let page = match self.l2p[block] {
            L2PValue::Mapped(page) => page,
            L2PValue::Unmapped => return Err(Error::Unmapped { block }),
        };
        self.flash.read_page(page, buf)?;
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Writes one page of data to logical block `block`.
    ///
    /// Runs one collection cycle when no page is free. Fails with
    /// [`Error::NoFreeSpace`] if that cycle cannot produce one.
    pub fn write(&mut self, block: Addr, data: &[u8]) -> Result<()> {
        self.check_block(block)?;
        self.check_len(data.len())?;

        let page = match self.find_free_page() {
            Some(page) => page,
            None => {
                match self.clean() {
                    Ok(_) => {}
                    Err(Error::NothingToClean) => {
                        warn!("No stale pages to reclaim for logical block {}", block);
                        return Err(Error::NoFreeSpace);
                    }
                    Err(e) => return Err(e),
                }
                match self.find_free_page() {
                    Some(page) => page,
                    None => {
                        warn!("No free flash pages after cleaning");
                        return Err(Error::NoFreeSpace);
                    }
                }
            }
        };

        trace!("Write logical block {} to page {}", block, page);
        if let Err(e) = self.flash.write_page(page, data) {
            // whatever the program left behind, the page needs an erase
            self.page_state[page] = PageState::Stale;
            return Err(e.into());
        }

        self.retire(block);
        self.install(block, page);
        self.writes += 1;
        Ok(())
    }

    /// Runs one collection cycle and returns the erased block.
    ///
    /// The victim is the block with the most stale pages; ties go to the
    /// least worn block, then to the lowest index. Valid pages of the victim
    /// are relocated before [`Ftl::clean`] returns.
    pub fn clean(&mut self) -> Result<BlockId> {
        let victim = self.select_victim().ok_or(Error::NothingToClean)?;
        let pages = self.block_range(victim);

        let mut staged = Vec::with_capacity(self.pages_per_block);
        for page in pages.clone() {
            if self.page_state[page] != PageState::Valid {
                continue;
            }
            let logical = self.p2l[page].ok_or_else(|| {
                Error::Inconsistent(format!("valid page {} has no logical owner", page))
            })?;
            let mut data = vec![0; self.page_size];
            self.flash.read_page(page, &mut data)?;
            staged.push(Staged { page, logical, data });
        }

        debug!(
            "Cleaning block {} ({} stale, {} valid, {} erases)",
            victim,
            self.stale_in(victim),
            staged.len(),
            self.erase_count[victim]
        );

        for s in &staged {
            self.page_state[s.page] = PageState::Stale;
            self.p2l[s.page] = None;
        }

        if let Err(e) = self.flash.erase_block(victim) {
            error!("Erase of block {} failed: {}", victim, e);
            for s in &staged {
                self.page_state[s.page] = PageState::Valid;
                self.p2l[s.page] = Some(s.logical);
            }
            return Err(e.into());
        }
        self.erase_count[victim] += 1;

        for page in pages {
            self.page_state[page] = PageState::Free;
            self.p2l[page] = None;
        }
        self.cleans += 1;

        self.relocate(victim, staged)?;
        Ok(victim)
    }

    /// Picks the block [`Ftl::clean`] would erase, if any block holds a stale page.
    pub fn select_victim(&self) -> Option<BlockId> {
        let mut victim: Option<(BlockId, Counter, Counter)> = None;

        for (block, &wear) in self.erase_count.iter().enumerate() {
            let stale = self.stale_in(block);
            if stale == 0 {
                continue;
            }
            let better = match victim {
                None => true,
                Some((_, max_stale, min_wear)) => {
                    stale > max_stale || (stale == max_stale && wear < min_wear)
                }
            };
            if better {
                victim = Some((block, stale, wear));
            }
        }

        victim.map(|(block, _, _)| block)
    }

    /// Releases the tables and hands the medium back.
    pub fn close(self) -> F {
        debug!("Closing translation layer after {} writes", self.writes);
        self.flash
    }

    pub fn stats(&self) -> FtlStats {
        FtlStats {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes,
            cleans: self.cleans,
            relocations: self.relocations,
        }
    }

    pub fn usage(&self) -> PageUsage {
        self.page_state
            .iter()
            .fold(PageUsage::default(), |mut usage, state| {
                match state {
                    PageState::Free => usage.free += 1,
                    PageState::Valid => usage.valid += 1,
                    PageState::Stale => usage.stale += 1,
                }
                usage
            })
    }

    pub fn wear(&self) -> WearStats {
        let min = self.erase_count.iter().copied().min().unwrap_or(0);
        let max = self.erase_count.iter().copied().max().unwrap_or(0);
        let total: Counter = self.erase_count.iter().sum();
        WearStats {
            min,
            max,
            mean: total as f64 / self.erase_count.len().max(1) as f64,
            spread: max - min,
        }
    }

    pub fn erase_counts(&self) -> &[Counter] {
        &self.erase_count
    }

    /// Physical page currently holding logical block `block`.
    pub fn mapping(&self, block: Addr) -> Option<PageId> {
        match self.l2p.get(block) {
            Some(L2PValue::Mapped(page)) => Some(*page),
            _ => None,
        }
    }

    pub fn page_state(&self, page: PageId) -> Option<PageState> {
        self.page_state.get(page).copied()
    }

    /// Logical block stored in `page`, if the page is valid.
    pub fn owner(&self, page: PageId) -> Option<Addr> {
        self.p2l.get(page).copied().flatten()
    }

    /// Cross-checks the forward map, reverse map and page states.
    pub fn verify(&self) -> Result<()> {
        let mut owners = vec![0usize; self.l2p.len()];

        for (page, (&state, &owner)) in self.page_state.iter().zip(&self.p2l).enumerate() {
            match (state, owner) {
                (PageState::Valid, Some(block)) => {
                    if self.l2p.get(block) != Some(&L2PValue::Mapped(page)) {
                        return Err(Error::Inconsistent(format!(
                            "valid page {} claims logical block {} which maps elsewhere",
                            page, block
                        )));
                    }
                    owners[block] += 1;
                }
                (PageState::Valid, None) => {
                    return Err(Error::Inconsistent(format!("valid page {} has no owner", page)));
                }
                (_, Some(block)) => {
                    return Err(Error::Inconsistent(format!(
                        "{:?} page {} still owned by logical block {}",
                        state, page, block
                    )));
                }
                (_, None) => {}
            }
        }

        for (block, entry) in self.l2p.iter().enumerate() {
            if let L2PValue::Mapped(page) = *entry {
                if self.page_state.get(page) != Some(&PageState::Valid)
                    || self.p2l[page] != Some(block)
                {
                    return Err(Error::Inconsistent(format!(
                        "logical block {} maps to page {} which is not its valid copy",
                        block, page
                    )));
                }
            }
            if owners[block] > 1 {
                return Err(Error::Inconsistent(format!(
                    "logical block {} has {} valid pages",
                    block, owners[block]
                )));
            }
        }

        Ok(())
    }

    fn find_free_page(&self) -> Option<PageId> {
        self.page_state.iter().position(|&state| state == PageState::Free)
    }

    fn block_range(&self, block: BlockId) -> Range<PageId> {
        let base = block * self.pages_per_block;
        base..base + self.pages_per_block
    }

    fn stale_in(&self, block: BlockId) -> Counter {
        self.page_state[self.block_range(block)]
            .iter()
            .filter(|&&state| state == PageState::Stale)
            .count()
    }

    fn relocate(&mut self, victim: BlockId, staged: Vec<Staged>) -> Result<()> {
        let mut pending = staged.into_iter();

        while let Some(s) = pending.next() {
            let page = match self.find_free_page() {
                Some(page) => page,
                None => {
                    error!("No free page for logical block {} out of block {}", s.logical, victim);
                    return Err(self.abandon(victim, s.logical, pending));
                }
            };
            if let Err(e) = self.flash.write_page(page, &s.data) {
                error!("Relocation of logical block {} to page {} failed: {}", s.logical, page, e);
                self.page_state[page] = PageState::Stale;
                return Err(self.abandon(victim, s.logical, pending));
            }
            trace!("Relocated logical block {} from page {} to page {}", s.logical, s.page, page);
            self.install(s.logical, page);
            self.relocations += 1;
        }

        Ok(())
    }

    // Unmaps every logical block whose data was lost with the victim, so no
    // forward entry is left pointing into the erased block.
    fn abandon(
        &mut self,
        victim: BlockId,
        logical: Addr,
        rest: impl Iterator<Item = Staged>,
    ) -> Error {
        self.l2p[logical] = L2PValue::Unmapped;
        for s in rest {
            error!("Logical block {} lost with block {}", s.logical, victim);
            self.l2p[s.logical] = L2PValue::Unmapped;
        }
        Error::RelocationFailed { victim, logical }
    }

    fn retire(&mut self, block: Addr) {
        if let L2PValue::Mapped(old) = self.l2p[block] {
            self.page_state[old] = PageState::Stale;
            self.p2l[old] = None;
        }
    }

    fn install(&mut self, block: Addr, page: PageId) {
        self.l2p[block] = L2PValue::Mapped(page);
        self.p2l[page] = Some(block);
        self.page_state[page] = PageState::Valid;
    }

    fn check_block(&self, block: Addr) -> Result<()> {
        if block >= self.l2p.len() {
            return Err(Error::OutOfRange {
                block,
                limit: self.l2p.len(),
            });
        }
        Ok(())
    }

    fn check_len(&self, len: usize) -> Result<()> {
        if len != self.page_size {
            return Err(Error::BufferSize {
                expected: self.page_size,
                actual: len,
            });
        }
        Ok(())
    }
}
