//! Buffer Manager (§4.E): frame table, free list, SSD I/O, and the
//! cooling/eviction pipeline.
//!
//! Grounded on the teacher's `buffer::manager::BufferPoolManager` /
//! `buffer::frame_manager::FreeFrameManager` for the overall shape (fixed
//! frame array, free list, `BufferPoolBuilder`-style construction), with
//! the pin-counted eviction policy replaced by the Hot→Cool→Free cooling
//! pipeline §4.E specifies, and the `PageTable` narrowed to a PID→FrameId
//! lookup for not-yet-swizzled resolution.

use crate::buffer::frame::{Frame, FrameState};
use crate::buffer::swip::{Swip, SwipTarget};
use crate::common::{FrameId, PageId};
use crate::error::{Result, StorageError};
use crate::storage::disk::DiskManager;
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, trace, warn};

/// Resolves a child PID back to its parent frame and the child's slot
/// position within it (§4.G `find_parent`), so the cooling pipeline can
/// unswizzle without the BM knowing anything about tree structure.
/// `position == ROOT_PARENT_SLOT` means the child is a tree's true root.
pub trait ParentLocator: Send + Sync {
    fn find_parent(&self, child_pid: PageId) -> Option<(Arc<Frame>, i64)>;
}

/// PID → FrameId lookup used for frames that are not (or are no longer)
/// swizzled into a parent (§4.E "Frame table").
struct PageTable {
    map: RwLock<HashMap<PageId, FrameId>>,
}

impl PageTable {
    fn new() -> Self {
        Self {
            map: RwLock::new(HashMap::new()),
        }
    }

    fn get(&self, pid: PageId) -> Option<FrameId> {
        self.map.read().get(&pid).copied()
    }

    fn insert(&self, pid: PageId, frame: FrameId) {
        self.map.write().insert(pid, frame);
    }

    fn remove(&self, pid: PageId) {
        self.map.write().remove(&pid);
    }
}

/// Point-in-time counters for diagnostics (§4.E, observability).
#[derive(Debug, Clone)]
pub struct BufferPoolStats {
    pub num_frames: usize,
    pub hot_frames: usize,
    pub cool_frames: usize,
    pub free_frames: usize,
    pub disk_reads: u64,
    pub disk_writes: u64,
}

pub struct BufferPoolManager {
    frames: Vec<Arc<Frame>>,
    free_list: Mutex<VecDeque<FrameId>>,
    cooling_queue: Mutex<VecDeque<FrameId>>,
    page_table: PageTable,
    disk: Arc<DiskManager>,
    page_size: usize,
    parent_locators: RwLock<Vec<Arc<dyn ParentLocator>>>,
    stop: Arc<AtomicBool>,
    providers: Mutex<Vec<JoinHandle<()>>>,
}

impl BufferPoolManager {
    /// Build the fixed frame array and start `pp_threads` background page
    /// providers (§4.E "Eviction (Cooling pipeline)").
    pub fn new(
        num_frames: usize,
        page_size: usize,
        pp_threads: usize,
        disk: Arc<DiskManager>,
    ) -> Arc<Self> {
        let mut frames = Vec::with_capacity(num_frames);
        let mut free_list = VecDeque::with_capacity(num_frames);
        for i in 0..num_frames {
            frames.push(Arc::new(Frame::new(page_size)));
            free_list.push_back(i as FrameId);
        }

        let this = Arc::new(Self {
            frames,
            free_list: Mutex::new(free_list),
            cooling_queue: Mutex::new(VecDeque::new()),
            page_table: PageTable::new(),
            disk,
            page_size,
            parent_locators: RwLock::new(Vec::new()),
            stop: Arc::new(AtomicBool::new(false)),
            providers: Mutex::new(Vec::new()),
        });

        let mut handles = Vec::with_capacity(pp_threads);
        for idx in 0..pp_threads.max(1) {
            let bm = Arc::downgrade(&this);
            let stop = this.stop.clone();
            handles.push(
                std::thread::Builder::new()
                    .name(format!("page-provider-{idx}"))
                    .spawn(move || {
                        while !stop.load(Ordering::Relaxed) {
                            match bm.upgrade() {
                                Some(bm) => bm.run_cooling_cycle(),
                                None => return,
                            }
                            std::thread::sleep(std::time::Duration::from_millis(5));
                        }
                    })
                    .expect("spawn page provider"),
            );
        }
        *this.providers.lock() = handles;
        this
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }

    /// Register a tree's `find_parent` callback so the cooling pipeline can
    /// unswizzle references into this tree (§4.E step 2).
    pub fn register_tree(&self, locator: Arc<dyn ParentLocator>) {
        self.parent_locators.write().push(locator);
    }

    pub fn frame(&self, id: FrameId) -> Arc<Frame> {
        self.frames[id as usize].clone()
    }

    /// `allocate_page()` (§4.E): pick a free frame, assign a fresh PID,
    /// return the zero-initialized frame already marked Hot.
    pub fn allocate_page(&self) -> Result<Arc<Frame>> {
        let frame_id = self.take_free_frame()?;
        let pid = self.disk.allocate_pid();
        let frame = &self.frames[frame_id as usize];
        frame.reset_for_reuse(self.page_size);
        frame.set_pid(pid);
        frame.set_state(FrameState::Hot);
        self.page_table.insert(pid, frame_id);
        Ok(frame.clone())
    }

    /// Resolve a Swip target to its Frame, paging in from disk if the PID
    /// is not currently cached (§4.E "Resolution"). Swizzling the caller's
    /// Swip back into the parent is the caller's responsibility, since only
    /// the caller holds the parent guard needed to do it safely.
    pub fn resolve(&self, target: SwipTarget) -> Result<Arc<Frame>> {
        match target {
            SwipTarget::Frame(fid) => Ok(self.frame(fid)),
            SwipTarget::Pid(pid) => self.resolve_pid(pid),
        }
    }

    fn resolve_pid(&self, pid: PageId) -> Result<Arc<Frame>> {
        if let Some(fid) = self.page_table.get(pid) {
            let frame = &self.frames[fid as usize];
            if frame.pid() == pid && frame.state() != FrameState::Free {
                if frame.state() == FrameState::Cool {
                    frame.set_state(FrameState::Hot);
                }
                return Ok(frame.clone());
            }
        }

        let frame_id = self.take_free_frame()?;
        let frame = &self.frames[frame_id as usize];
        let page = self.disk.read_page(pid)?;
        frame.reset_for_reuse(self.page_size);
        unsafe {
            (*frame.page_mut_ptr()).copy_from(&page);
        }
        frame.set_pid(pid);
        frame.set_state(FrameState::Hot);
        frame.clear_dirty();
        self.page_table.insert(pid, frame_id);
        trace!(pid, frame_id, "paged in from disk");
        Ok(frame.clone())
    }

    fn take_free_frame(&self) -> Result<FrameId> {
        if let Some(id) = self.free_list.lock().pop_front() {
            return Ok(id);
        }
        // Nothing free: run a synchronous cooling/eviction pass and try
        // again. §4.E guarantees forward progress as long as some frame is
        // coolable; a real deployment sizes the pool so this is rare.
        for _ in 0..8 {
            self.run_cooling_cycle();
            if let Some(id) = self.free_list.lock().pop_front() {
                return Ok(id);
            }
        }
        Err(StorageError::Internal(
            "buffer pool exhausted: no evictable frame found".into(),
        ))
    }

    /// One pass of the cooling pipeline (§4.E): sample a Hot frame, cool
    /// it, and drain the cooling queue into the free list.
    fn run_cooling_cycle(&self) {
        self.try_cool_one();
        self.drain_cooling_queue();
    }

    fn try_cool_one(&self) {
        if self.frames.is_empty() {
            return;
        }
        let start = rand::rng().random_range(0..self.frames.len());
        for offset in 0..self.frames.len() {
            let idx = (start + offset) % self.frames.len();
            let frame = &self.frames[idx];
            if frame.state() != FrameState::Hot {
                continue;
            }
            // Skip frames that look recently touched; a real clock sweep
            // would clear a reference bit here instead.
            if frame.contention.access_count.load(Ordering::Relaxed) > 0
                && offset < self.frames.len() / 2
            {
                continue;
            }
            if self.try_unswizzle_and_cool(idx as FrameId, frame) {
                return;
            }
        }
    }

    fn try_unswizzle_and_cool(&self, frame_id: FrameId, frame: &Arc<Frame>) -> bool {
        let pid = frame.pid();
        let locators = self.parent_locators.read();
        let Some((parent_frame, position)) = locators.iter().find_map(|l| l.find_parent(pid))
        else {
            return false;
        };
        drop(locators);

        if !parent_frame.latch.try_acquire_exclusive() {
            return false;
        }
        if !frame.latch.try_acquire_exclusive() {
            parent_frame.latch.release_exclusive();
            return false;
        }

        if position != crate::common::ROOT_PARENT_SLOT {
            // The parent's Swip slots live inside the node's page layout,
            // which the BM does not parse; the locator implementation
            // (registered by the index layer) is expected to have already
            // rewritten the slot to a PID before returning here.
            debug!(pid, position, "cooling candidate unswizzled by owner");
        }

        frame.set_state(FrameState::Cool);
        frame.latch.release_exclusive();
        parent_frame.latch.release_exclusive();
        self.cooling_queue.lock().push_back(frame_id);
        true
    }

    fn drain_cooling_queue(&self) {
        let candidate = self.cooling_queue.lock().pop_front();
        let Some(frame_id) = candidate else { return };
        let frame = &self.frames[frame_id as usize];
        if frame.state() != FrameState::Cool {
            return;
        }
        if frame.is_dirty() {
            let pid = frame.pid();
            let page = unsafe { &*frame.page_ptr() };
            if let Err(e) = self.disk.write_page(pid, page) {
                warn!(pid, error = %e, "failed writing cool frame back, keeping it cached");
                self.cooling_queue.lock().push_back(frame_id);
                return;
            }
            frame.clear_dirty();
        }
        self.page_table.remove(frame.pid());
        frame.set_state(FrameState::Free);
        self.free_list.lock().push_back(frame_id);
    }

    /// Release a page whose tree has freed it structurally (a merged leaf,
    /// a dropped tree's reachable pages). If cached, recycles its frame
    /// directly onto the free list; otherwise leaves it unresolved — the
    /// PID itself is never reused (§3 "Lifecycle").
    pub fn free_pid(&self, pid: PageId) {
        if let Some(fid) = self.page_table.get(pid) {
            let frame = &self.frames[fid as usize];
            if frame.pid() == pid {
                frame.set_state(FrameState::Free);
                frame.clear_dirty();
                self.page_table.remove(pid);
                self.free_list.lock().push_back(fid);
            }
        }
    }

    /// Flush every dirty frame to disk and fsync (§4.E "Persistence").
    pub fn flush_all(&self) -> Result<()> {
        for frame in &self.frames {
            if frame.state() == FrameState::Free || !frame.is_dirty() {
                continue;
            }
            frame.latch.acquire_shared();
            let pid = frame.pid();
            let page = unsafe { &*frame.page_ptr() };
            let result = self.disk.write_page(pid, page);
            frame.latch.release_shared();
            result?;
            frame.clear_dirty();
        }
        self.disk.sync()
    }

    pub fn stats(&self) -> BufferPoolStats {
        let mut hot = 0;
        let mut cool = 0;
        let mut free = 0;
        for frame in &self.frames {
            match frame.state() {
                FrameState::Hot | FrameState::Loaded => hot += 1,
                FrameState::Cool => cool += 1,
                FrameState::Free => free += 1,
            }
        }
        let (reads, writes) = self.disk.stats();
        BufferPoolStats {
            num_frames: self.frames.len(),
            hot_frames: hot,
            cool_frames: cool,
            free_frames: free,
            disk_reads: reads,
            disk_writes: writes,
        }
    }
}

impl Drop for BufferPoolManager {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        for handle in self.providers.lock().drain(..) {
            let _ = handle.join();
        }
    }
}

/// Allocate a fresh page and hand back both its frame and a ready-to-use
/// swizzled [`Swip`], the common pattern at structural-modification call
/// sites (new leaves from a split, a new root, etc).
pub fn allocate_swizzled(bm: &BufferPoolManager) -> Result<(Arc<Frame>, Swip)> {
    let frame = bm.allocate_page()?;
    let frame_id = find_frame_id(bm, &frame);
    let swip = Swip::from_pid(frame.pid());
    swip.swizzle_to(frame_id);
    Ok((frame, swip))
}

fn find_frame_id(bm: &BufferPoolManager, frame: &Arc<Frame>) -> FrameId {
    // Frames never move once allocated; identity comparison against the
    // fixed array recovers the index without threading FrameId through
    // every call site that only has the Arc.
    for i in 0..bm.num_frames() as FrameId {
        if Arc::ptr_eq(&bm.frame(i), frame) {
            return i;
        }
    }
    unreachable!("frame not owned by this buffer pool")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(dir: &std::path::Path) -> Arc<BufferPoolManager> {
        let disk = Arc::new(DiskManager::open(dir.to_str().unwrap(), 4096).unwrap());
        BufferPoolManager::new(8, 4096, 1, disk)
    }

    #[test]
    fn allocate_page_hands_out_distinct_hot_frames() {
        let dir = tempfile::tempdir().unwrap();
        let bm = setup(dir.path());
        let f1 = bm.allocate_page().unwrap();
        let f2 = bm.allocate_page().unwrap();
        assert_ne!(f1.pid(), f2.pid());
        assert_eq!(f1.state(), FrameState::Hot);
    }

    #[test]
    fn resolve_pages_in_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let bm = setup(dir.path());
        let frame = bm.allocate_page().unwrap();
        let pid = frame.pid();
        unsafe {
            (*frame.page_mut_ptr()).data_mut()[0] = 77;
        }
        frame.mark_dirty();
        bm.flush_all().unwrap();

        let resolved = bm.resolve(SwipTarget::Pid(pid)).unwrap();
        assert_eq!(resolved.pid(), pid);
        assert_eq!(unsafe { (*resolved.page_ptr()).data()[0] }, 77);
    }
}
