//! Page Guard (§4.C): RAII-scoped acquisition of a [`Frame`] in one of
//! three modes, with restart-on-conflict validation.
//!
//! Grounded on the teacher's `buffer::page_cache::FrameGuard`
//! (`Arc<BufferFrame>` + `Drop` releasing a pin), generalized from a single
//! pin-counted mode to the three latch modes §4.B defines, and from
//! `parking_lot` read/write locks to the lock-free `HybridLatch` so the
//! optimistic mode never blocks.

use crate::buffer::frame::Frame;
use crate::buffer::latch::Validated;
use crate::error::{Signal, StorageError};
use crate::storage::page::PageBuffer;
use std::sync::Arc;

/// Optimistic guard: holds a version snapshot, not the latch itself.
/// Any field read through it must be followed by [`OptimisticGuard::recheck`]
/// (or an upgrade) before the caller trusts what it saw.
pub struct OptimisticGuard {
    frame: Arc<Frame>,
    version: u64,
}

pub struct SharedGuard {
    frame: Arc<Frame>,
}

pub struct ExclusiveGuard {
    frame: Arc<Frame>,
}

impl OptimisticGuard {
    /// Acquire an optimistic read on `frame`, restarting (per §4.B) if a
    /// writer currently holds it.
    pub fn acquire(frame: Arc<Frame>) -> Result<Self, Signal> {
        match frame.latch.optimistic_read_begin() {
            crate::buffer::latch::Validated2::Ok(version) => {
                frame.contention.record_access();
                Ok(Self { frame, version })
            }
            crate::buffer::latch::Validated2::Restart => Err(Signal::Restart),
        }
    }

    pub fn frame(&self) -> &Arc<Frame> {
        &self.frame
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// View the page image without ever taking a lock. Any value read from
    /// the returned reference is only trustworthy once [`Self::recheck`]
    /// (or the enclosing guard's drop/upgrade validation) succeeds.
    ///
    /// # Safety contract
    /// The teacher's hand-over-hand pattern reads child state, THEN
    /// validates the parent — callers must follow the same order: read,
    /// then validate, never the reverse.
    pub fn page(&self) -> &PageBuffer {
        unsafe { &*self.frame.page_ptr() }
    }

    /// Re-validate that no writer has touched the frame since `acquire`.
    pub fn recheck(&self) -> Result<(), Signal> {
        match self.frame.latch.optimistic_read_validate(self.version) {
            Validated::Ok => Ok(()),
            Validated::Restart => {
                self.frame.contention.record_restart();
                Err(Signal::Restart)
            }
        }
    }

    /// Consume the optimistic guard, validating and converting to a real
    /// shared latch (§4.C "Upgrade").
    pub fn upgrade_to_shared(self) -> Result<SharedGuard, Signal> {
        self.frame.latch.acquire_shared();
        if self.frame.latch.optimistic_read_validate(self.version) == Validated::Restart {
            self.frame.latch.release_shared();
            self.frame.contention.record_restart();
            return Err(Signal::Restart);
        }
        Ok(SharedGuard { frame: self.frame })
    }

    /// Consume the optimistic guard, validating and converting to an
    /// exclusive latch.
    pub fn upgrade_to_exclusive(self) -> Result<ExclusiveGuard, Signal> {
        if !self.frame.latch.try_acquire_exclusive() {
            self.frame.contention.record_restart();
            return Err(Signal::Restart);
        }
        // version bumped EXCLUSIVE_BIT in; compare against the pre-bump
        // snapshot, ignoring that one bit.
        let now = self.frame.latch.version();
        if now & !1u64 != self.version & !1u64 {
            self.frame.latch.release_exclusive();
            self.frame.contention.record_restart();
            return Err(Signal::Restart);
        }
        Ok(ExclusiveGuard { frame: self.frame })
    }
}

impl SharedGuard {
    pub fn acquire(frame: Arc<Frame>) -> Self {
        frame.latch.acquire_shared();
        Self { frame }
    }

    pub fn frame(&self) -> &Arc<Frame> {
        &self.frame
    }

    pub fn page(&self) -> &PageBuffer {
        unsafe { &*self.frame.page_ptr() }
    }

    /// Downgrade back to an optimistic guard without releasing and
    /// reacquiring — used by the cursor fast path when it no longer needs
    /// blocking protection (§4.H).
    pub fn downgrade(self) -> OptimisticGuard {
        let version = self.frame.latch.version();
        let frame = self.frame.clone();
        drop(self);
        OptimisticGuard { frame, version }
    }
}

impl Drop for SharedGuard {
    fn drop(&mut self) {
        self.frame.latch.release_shared();
    }
}

impl ExclusiveGuard {
    pub fn acquire(frame: Arc<Frame>) -> Self {
        frame.latch.acquire_exclusive();
        Self { frame }
    }

    pub fn frame(&self) -> &Arc<Frame> {
        &self.frame
    }

    pub fn page(&self) -> &PageBuffer {
        unsafe { &*self.frame.page_ptr() }
    }

    /// Mark-dirty is implicit on exclusive acquisition (§4.C); this exposes
    /// the explicit form for structural modifications that want it stated.
    pub fn mark_dirty(&self) {
        self.frame.mark_dirty();
    }

    pub fn page_mut(&mut self) -> &mut PageBuffer {
        self.frame.mark_dirty();
        unsafe { &mut *self.frame.page_mut_ptr() }
    }
}

impl Drop for ExclusiveGuard {
    fn drop(&mut self) {
        self.frame.latch.release_exclusive();
    }
}

pub(crate) fn corruption(msg: impl Into<String>) -> Signal {
    Signal::Err(StorageError::Corruption(msg.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optimistic_read_then_recheck_succeeds_uncontended() {
        let frame = Arc::new(Frame::new(4096));
        let guard = OptimisticGuard::acquire(frame).unwrap();
        let _ = guard.page().len();
        guard.recheck().unwrap();
    }

    #[test]
    fn exclusive_then_shared_then_optimistic_compose() {
        let frame = Arc::new(Frame::new(4096));
        {
            let mut g = ExclusiveGuard::acquire(frame.clone());
            g.page_mut().data_mut()[0] = 9;
        }
        {
            let g = SharedGuard::acquire(frame.clone());
            assert_eq!(g.page().data()[0], 9);
        }
        let g = OptimisticGuard::acquire(frame).unwrap();
        assert_eq!(g.page().data()[0], 9);
        g.recheck().unwrap();
    }

    #[test]
    fn upgrade_to_exclusive_fails_after_concurrent_write() {
        let frame = Arc::new(Frame::new(4096));
        let g = OptimisticGuard::acquire(frame.clone()).unwrap();
        // Concurrent exclusive write bumps the version before upgrade.
        {
            let _w = ExclusiveGuard::acquire(frame);
        }
        assert!(matches!(g.upgrade_to_exclusive(), Err(Signal::Restart)));
    }
}
