//! Frame caching and latching (§4.A-§4.E): the hybrid latch, page guards,
//! swizzling pointers, frame headers, and the buffer pool manager that
//! ties them together.

pub mod frame;
pub mod guard;
pub mod latch;
pub mod manager;
pub mod swip;

pub use frame::{ContentionTracker, Frame, FrameState};
pub use guard::{ExclusiveGuard, OptimisticGuard, SharedGuard};
pub use latch::{HybridLatch, Validated};
pub use manager::{allocate_swizzled, BufferPoolManager, BufferPoolStats, ParentLocator};
pub use swip::{Swip, SwipTarget};
