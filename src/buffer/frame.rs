//! Frame: a cache slot holding one page image plus its header (§3 "Frame").
//!
//! Grounded on the teacher's `buffer::page_cache::BufferFrame`, with the
//! page body moved from a `parking_lot::RwLock<PageBuffer>` into an
//! `UnsafeCell` so optimistic readers can inspect it without taking any
//! lock at all — the whole point of §4.B's optimistic mode. Safety is
//! pushed onto the version-validation protocol in `latch`, the same trade
//! the teacher documents around `PageBuffer::as_ptr`/`as_mut_ptr`.

use crate::buffer::latch::HybridLatch;
use crate::common::PageId;
use crate::storage::page::PageBuffer;
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};

/// Lifecycle state of a frame (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// On the free list, no page resident.
    Free,
    /// Resident and reachable via a swizzled Swip from a live parent.
    Hot,
    /// Resident but every incoming Swip has been unswizzled; a candidate
    /// for eviction once nothing holds a guard on it.
    Cool,
    /// Just read from disk, not yet linked back into the tree (a
    /// transient state during page-in).
    Loaded,
}

impl FrameState {
    fn to_u8(self) -> u8 {
        match self {
            FrameState::Free => 0,
            FrameState::Hot => 1,
            FrameState::Cool => 2,
            FrameState::Loaded => 3,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => FrameState::Free,
            1 => FrameState::Hot,
            2 => FrameState::Cool,
            _ => FrameState::Loaded,
        }
    }
}

/// Per-frame sampling used by the contention-split policy (§6).
#[derive(Debug, Default)]
pub struct ContentionTracker {
    pub last_modified_slot: AtomicU64,
    pub restart_count: AtomicU64,
    pub access_count: AtomicU64,
}

impl ContentionTracker {
    pub fn record_access(&self) {
        self.access_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_restart(&self) {
        self.restart_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Restart rate as an integer percentage, for comparison against
    /// `Config::contention_split_threshold_pct`.
    pub fn restart_rate_pct(&self) -> u8 {
        let accesses = self.access_count.load(Ordering::Relaxed).max(1);
        let restarts = self.restart_count.load(Ordering::Relaxed);
        ((restarts * 100) / accesses).min(100) as u8
    }
}

/// A buffer pool slot (§3 "Frame", I1-I4).
pub struct Frame {
    pub latch: HybridLatch,
    page: UnsafeCell<PageBuffer>,
    pid: AtomicU64,
    state: AtomicU8,
    dirty: AtomicBool,
    pub contention: ContentionTracker,
}

// Safety: all access to `page` is gated by `latch`. Optimistic readers
// validate the latch version after reading; shared/exclusive guards hold
// the corresponding latch mode for the duration of the borrow. No code
// outside `buffer::guard` touches `page` directly.
unsafe impl Sync for Frame {}

impl Frame {
    pub fn new(page_size: usize) -> Self {
        Self {
            latch: HybridLatch::new(),
            page: UnsafeCell::new(PageBuffer::new(page_size)),
            pid: AtomicU64::new(crate::common::INVALID_PAGE_ID),
            state: AtomicU8::new(FrameState::Free.to_u8()),
            dirty: AtomicBool::new(false),
            contention: ContentionTracker::default(),
        }
    }

    #[inline]
    pub fn pid(&self) -> PageId {
        self.pid.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set_pid(&self, pid: PageId) {
        self.pid.store(pid, Ordering::Release);
    }

    #[inline]
    pub fn state(&self) -> FrameState {
        FrameState::from_u8(self.state.load(Ordering::Acquire))
    }

    #[inline]
    pub fn set_state(&self, state: FrameState) {
        self.state.store(state.to_u8(), Ordering::Release);
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    #[inline]
    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    #[inline]
    pub fn clear_dirty(&self) {
        self.dirty.store(false, Ordering::Release);
    }

    /// Raw pointer to the page image. Callers must hold at least an
    /// optimistic read (and validate afterwards) or a shared/exclusive
    /// guard before dereferencing.
    ///
    /// # Safety
    /// The caller must not retain the reference past the latch mode that
    /// justified the read, and must not construct a `&mut` alias while any
    /// other reference is live.
    #[inline]
    pub unsafe fn page_ptr(&self) -> *const PageBuffer {
        self.page.get()
    }

    /// # Safety
    /// The caller must hold the exclusive latch.
    #[inline]
    pub unsafe fn page_mut_ptr(&self) -> *mut PageBuffer {
        self.page.get()
    }

    /// Reinitialize a frame pulled off the free list for reuse.
    pub fn reset_for_reuse(&self, page_size: usize) {
        unsafe {
            (*self.page.get()).zero();
            if (*self.page.get()).len() != page_size {
                *self.page.get() = PageBuffer::new(page_size);
            }
        }
        self.set_pid(crate::common::INVALID_PAGE_ID);
        self.clear_dirty();
        self.set_state(FrameState::Free);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_frame_is_free_and_clean() {
        let frame = Frame::new(4096);
        assert_eq!(frame.state(), FrameState::Free);
        assert!(!frame.is_dirty());
        assert_eq!(frame.pid(), crate::common::INVALID_PAGE_ID);
    }

    #[test]
    fn state_transitions_round_trip() {
        let frame = Frame::new(4096);
        frame.set_state(FrameState::Hot);
        frame.set_pid(9);
        frame.mark_dirty();
        assert_eq!(frame.state(), FrameState::Hot);
        assert_eq!(frame.pid(), 9);
        assert!(frame.is_dirty());
    }

    #[test]
    fn contention_tracker_computes_rate() {
        let tracker = ContentionTracker::default();
        for _ in 0..10 {
            tracker.record_access();
        }
        for _ in 0..3 {
            tracker.record_restart();
        }
        assert_eq!(tracker.restart_rate_pct(), 30);
    }
}
