//! Swizzling pointer (§3 "Swip", §4.D): a tagged 64-bit word that is either
//! an in-memory frame reference or an on-disk page id.
//!
//! Grounded on the teacher's child-pointer handling in
//! `index::btree::BPlusTreeNode` (which keeps plain `PageId` children) and
//! the tagged frame/page-id word the teacher's `buffer::page_table` already
//! uses to distinguish a resident frame from an on-disk id.

use crate::common::{FrameId, PageId};
use std::sync::atomic::{AtomicU64, Ordering};

/// High bit set ⇒ the word holds a `PageId` ("unswizzled"); clear ⇒ it
/// holds a `FrameId` ("swizzled", the child is cached in memory).
const PID_TAG: u64 = 1 << 63;

/// What [`Swip::load`] resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwipTarget {
    Frame(FrameId),
    Pid(PageId),
}

/// A dual-mode child reference (§3, I5).
pub struct Swip(AtomicU64);

impl Swip {
    pub fn from_pid(pid: PageId) -> Self {
        Self(AtomicU64::new(pid | PID_TAG))
    }

    pub fn from_frame(frame: FrameId) -> Self {
        Self(AtomicU64::new(frame as u64))
    }

    #[inline]
    pub fn is_swizzled(&self) -> bool {
        self.0.load(Ordering::Acquire) & PID_TAG == 0
    }

    #[inline]
    pub fn load(&self) -> SwipTarget {
        let raw = self.0.load(Ordering::Acquire);
        if raw & PID_TAG != 0 {
            SwipTarget::Pid(raw & !PID_TAG)
        } else {
            SwipTarget::Frame(raw as FrameId)
        }
    }

    /// Install the swizzled in-memory reference once the BM has resolved
    /// and loaded the page (§4.C "atomically updated to the resolved Frame
    /// pointer").
    pub fn swizzle_to(&self, frame: FrameId) {
        self.0.store(frame as u64, Ordering::Release);
    }

    /// Replace a swizzled reference with its PID, used when a frame cools
    /// (§4.E, I4/I5).
    pub fn unswizzle_to(&self, pid: PageId) {
        self.0.store(pid | PID_TAG, Ordering::Release);
    }

    /// Raw bits, for persisting a node's child slots to a page image.
    pub fn raw(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    /// Reconstruct from raw bits read back out of a page image. Pages are
    /// always persisted with every Swip unswizzled (PID-tagged), so this
    /// is only ever called with a PID-tagged word in practice, but it
    /// accepts whatever tag the bits carry.
    pub fn from_raw(raw: u64) -> Self {
        Self(AtomicU64::new(raw))
    }
}

impl Clone for Swip {
    fn clone(&self) -> Self {
        Self(AtomicU64::new(self.0.load(Ordering::Acquire)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pid_round_trips() {
        let swip = Swip::from_pid(42);
        assert!(!swip.is_swizzled());
        assert_eq!(swip.load(), SwipTarget::Pid(42));
    }

    #[test]
    fn swizzle_then_unswizzle() {
        let swip = Swip::from_pid(7);
        swip.swizzle_to(3);
        assert!(swip.is_swizzled());
        assert_eq!(swip.load(), SwipTarget::Frame(3));
        swip.unswizzle_to(7);
        assert!(!swip.is_swizzled());
        assert_eq!(swip.load(), SwipTarget::Pid(7));
    }
}
