//! Versioned latch primitive (§4.B): optimistic / shared / exclusive
//! acquisition over a single atomic word, plus the guard types built on it
//! (§4.C).
//!
//! Grounded on the teacher's `buffer::lockfree_latch::OptimisticLatch` /
//! `HybridLatch`: a version counter with the low bit marking "exclusive
//! held". The teacher's `HybridLatch` only ever falls back to the same
//! optimistic word (no real blocking shared mode); this version adds a
//! genuine shared-reader count so `acquire_shared()` can block writers
//! without relying on optimistic retry, per §4.B.

use std::hint::spin_loop;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Set on `version` while a writer holds the exclusive latch.
const EXCLUSIVE_BIT: u64 = 1;

/// A per-frame versioned lock. `version` increments by 2 on every exclusive
/// release (bit 0 reserved for `EXCLUSIVE_BIT`); `shared_count` is the
/// number of live `SharedGuard`s.
pub struct HybridLatch {
    version: AtomicU64,
    shared_count: AtomicU32,
}

/// Outcome of an optimistic validation: either the read was consistent, or
/// the caller must restart its whole operation at the nearest boundary
/// (§5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validated {
    Ok,
    Restart,
}

impl HybridLatch {
    pub const fn new() -> Self {
        Self {
            version: AtomicU64::new(0),
            shared_count: AtomicU32::new(0),
        }
    }

    #[inline]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_exclusively_latched(&self) -> bool {
        self.version.load(Ordering::Acquire) & EXCLUSIVE_BIT != 0
    }

    /// `optimistic_read_begin`: returns the current version if no writer
    /// holds the latch. Spins briefly on a held write before giving up and
    /// asking the caller to restart — matches §4.B exactly.
    pub fn optimistic_read_begin(&self) -> Validated2<u64> {
        for _ in 0..64 {
            let v = self.version.load(Ordering::Acquire);
            if v & EXCLUSIVE_BIT == 0 {
                return Validated2::Ok(v);
            }
            spin_loop();
        }
        Validated2::Restart
    }

    /// `optimistic_read_validate`.
    #[inline]
    pub fn optimistic_read_validate(&self, observed: u64) -> Validated {
        if self.version.load(Ordering::Acquire) == observed {
            Validated::Ok
        } else {
            Validated::Restart
        }
    }

    /// `acquire_shared`: blocks (spins) while a writer holds the latch,
    /// then records a reader. Does not touch `version`.
    pub fn acquire_shared(&self) {
        loop {
            let v = self.version.load(Ordering::Acquire);
            if v & EXCLUSIVE_BIT != 0 {
                spin_loop();
                continue;
            }
            self.shared_count.fetch_add(1, Ordering::AcqRel);
            // Re-check: a writer may have slipped in between the load and
            // the increment above.
            if self.version.load(Ordering::Acquire) & EXCLUSIVE_BIT != 0 {
                self.shared_count.fetch_sub(1, Ordering::AcqRel);
                spin_loop();
                continue;
            }
            return;
        }
    }

    pub fn release_shared(&self) {
        self.shared_count.fetch_sub(1, Ordering::AcqRel);
    }

    /// `acquire_exclusive`: blocks until no readers and no other writer,
    /// then sets `EXCLUSIVE_BIT`.
    pub fn acquire_exclusive(&self) {
        loop {
            let v = self.version.load(Ordering::Acquire);
            if v & EXCLUSIVE_BIT != 0 {
                spin_loop();
                continue;
            }
            if self
                .version
                .compare_exchange_weak(v, v | EXCLUSIVE_BIT, Ordering::AcqRel, Ordering::Relaxed)
                .is_err()
            {
                spin_loop();
                continue;
            }
            while self.shared_count.load(Ordering::Acquire) > 0 {
                spin_loop();
            }
            return;
        }
    }

    /// Releases the exclusive latch, bumping the version so optimistic
    /// readers in flight observe a mismatch.
    pub fn release_exclusive(&self) {
        let v = self.version.load(Ordering::Acquire);
        debug_assert!(v & EXCLUSIVE_BIT != 0, "release_exclusive without hold");
        self.version
            .store((v & !EXCLUSIVE_BIT).wrapping_add(2), Ordering::Release);
    }

    /// `try_acquire_exclusive`, non-blocking. Used by `upgrade_to_exclusive`.
    pub fn try_acquire_exclusive(&self) -> bool {
        let v = self.version.load(Ordering::Acquire);
        if v & EXCLUSIVE_BIT != 0 {
            return false;
        }
        if self
            .version
            .compare_exchange(v, v | EXCLUSIVE_BIT, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            return false;
        }
        while self.shared_count.load(Ordering::Acquire) > 0 {
            spin_loop();
        }
        true
    }
}

impl Default for HybridLatch {
    fn default() -> Self {
        Self::new()
    }
}

/// Like [`Validated`] but carrying a payload on the `Ok` path; kept distinct
/// so call sites reading `optimistic_read_begin()` see the version inline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validated2<T> {
    Ok(T),
    Restart,
}

impl<T> Validated2<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            Validated2::Ok(v) => Some(v),
            Validated2::Restart => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optimistic_read_sees_stable_version() {
        let latch = HybridLatch::new();
        let v = latch.optimistic_read_begin().into_option().unwrap();
        assert_eq!(latch.optimistic_read_validate(v), Validated::Ok);
    }

    #[test]
    fn exclusive_acquire_bumps_version_on_release() {
        let latch = HybridLatch::new();
        let v0 = latch.version();
        latch.acquire_exclusive();
        assert!(latch.is_exclusively_latched());
        latch.release_exclusive();
        assert!(!latch.is_exclusively_latched());
        assert_ne!(v0, latch.version());
    }

    #[test]
    fn optimistic_read_fails_while_exclusively_held() {
        let latch = HybridLatch::new();
        let v = latch.optimistic_read_begin().into_option().unwrap();
        latch.acquire_exclusive();
        assert_eq!(latch.optimistic_read_validate(v), Validated::Restart);
        latch.release_exclusive();
    }

    #[test]
    fn shared_readers_block_a_writer_until_released() {
        use std::sync::atomic::AtomicBool;
        use std::sync::Arc;

        let latch = Arc::new(HybridLatch::new());
        latch.acquire_shared();

        let writer_done = Arc::new(AtomicBool::new(false));
        let l2 = latch.clone();
        let wd2 = writer_done.clone();
        let handle = std::thread::spawn(move || {
            l2.acquire_exclusive();
            wd2.store(true, Ordering::SeqCst);
            l2.release_exclusive();
        });

        std::thread::sleep(std::time::Duration::from_millis(20));
        assert!(!writer_done.load(Ordering::SeqCst));
        latch.release_shared();
        handle.join().unwrap();
        assert!(writer_done.load(Ordering::SeqCst));
    }
}
