//! Synchronization primitives.
//!
//! Provides [`SpinLock`], const-constructable so it can back `static` items
//! and usable before any allocator or scheduler is available.

mod spinlock;

pub(crate) mod loom_compat;

pub use spinlock::{SpinLock, SpinLockGuard};
