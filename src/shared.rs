use std::sync::Arc;

use log::debug;
use parking_lot::RwLock;

use crate::config::{Addr, BlockId};
use crate::error::Result;
use crate::flash::Flash;
use crate::ftl::{Ftl, FtlStats};

/// Cloneable handle to one [`Ftl`] shared between threads.
///
/// Reads share the lock. Writes and collection cycles hold it exclusively
/// for their whole run, relocation writes included, so a reader never sees
/// a page in the middle of being moved.
pub struct SharedFtl<F> {
    inner: Arc<RwLock<Ftl<F>>>,
}

impl<F> Clone for SharedFtl<F> {
    fn clone(&self) -> Self {
        SharedFtl {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: Flash> SharedFtl<F> {
    pub fn new(ftl: Ftl<F>) -> Self {
        SharedFtl {
            inner: Arc::new(RwLock::new(ftl)),
        }
    }

    pub fn read(&self, block: Addr) -> Result<Vec<u8>> {
        self.inner.read().read(block)
    }

    pub fn write(&self, block: Addr, data: &[u8]) -> Result<()> {
        self.inner.write().write(block, data)
    }

    pub fn clean(&self) -> Result<BlockId> {
        self.inner.write().clean()
    }

    pub fn stats(&self) -> FtlStats {
        self.inner.read().stats()
    }

    pub fn verify(&self) -> Result<()> {
        self.inner.read().verify()
    }

    /// Unwraps the layer once every other handle is gone.
    pub fn into_inner(self) -> std::result::Result<Ftl<F>, Self> {
        match Arc::try_unwrap(self.inner) {
            Ok(lock) => Ok(lock.into_inner()),
            Err(inner) => {
                debug!("Layer still shared by {} handles", Arc::strong_count(&inner));
                Err(SharedFtl { inner })
            }
        }
    }
}
