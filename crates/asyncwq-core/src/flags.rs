//! Work item flags, lifecycle state and priority

use bitflags::bitflags;
use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};

bitflags! {
    /// Per-item flag bits.
    ///
    /// `DONE`, `ORDER_DONE` and `HIGH_PRIO` carry the engine's semantics.
    /// `QUEUED`, `RUNNING` and `FREED` only record lifecycle progress so
    /// a `WorkHandle` can report where an item is.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct WorkFlags: u32 {
        /// Primary function has returned
        const DONE       = 1 << 0;
        /// Ordered-completion function has been claimed by a worker
        const ORDER_DONE = 1 << 1;
        /// Route to the high-priority pool when one exists
        const HIGH_PRIO  = 1 << 2;
        /// Handed to a pool
        const QUEUED     = 1 << 3;
        /// Picked up by a worker
        const RUNNING    = 1 << 4;
        /// Released by the engine (ordered-free ran or item dropped)
        const FREED      = 1 << 5;
    }
}

/// Atomic flag word shared between producers and worker threads.
///
/// Bits are only ever set, never cleared, so every transition is
/// monotonic.
#[derive(Debug, Default)]
pub struct AtomicWorkFlags(AtomicU32);

impl AtomicWorkFlags {
    pub const fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    #[inline]
    pub fn load(&self) -> WorkFlags {
        WorkFlags::from_bits_retain(self.0.load(Ordering::Acquire))
    }

    #[inline]
    pub fn contains(&self, flags: WorkFlags) -> bool {
        self.load().contains(flags)
    }

    #[inline]
    pub fn set(&self, flags: WorkFlags) {
        self.0.fetch_or(flags.bits(), Ordering::AcqRel);
    }

    /// Set `flags` and report whether all of them were already set.
    ///
    /// Exactly one caller observes `false` for a given bit.
    #[inline]
    pub fn test_and_set(&self, flags: WorkFlags) -> bool {
        let prev = self.0.fetch_or(flags.bits(), Ordering::AcqRel);
        WorkFlags::from_bits_retain(prev).contains(flags)
    }
}

/// Lifecycle state of a work item, derived from its flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum WorkState {
    /// Built by the producer, not yet submitted
    Created = 0,
    /// Submitted, waiting for a worker
    Queued = 1,
    /// Primary function executing
    Running = 2,
    /// Primary function returned
    Done = 3,
    /// Ordered-completion function claimed or finished
    OrderDone = 4,
    /// Released
    Freed = 5,
}

impl WorkState {
    /// Highest lifecycle state reached by a flag set
    pub fn from_flags(flags: WorkFlags) -> Self {
        if flags.contains(WorkFlags::FREED) {
            WorkState::Freed
        } else if flags.contains(WorkFlags::ORDER_DONE) {
            WorkState::OrderDone
        } else if flags.contains(WorkFlags::DONE) {
            WorkState::Done
        } else if flags.contains(WorkFlags::RUNNING) {
            WorkState::Running
        } else if flags.contains(WorkFlags::QUEUED) {
            WorkState::Queued
        } else {
            WorkState::Created
        }
    }

    #[inline]
    pub const fn is_finished(&self) -> bool {
        matches!(self, WorkState::Done | WorkState::OrderDone | WorkState::Freed)
    }
}

impl fmt::Display for WorkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkState::Created => write!(f, "CREATED"),
            WorkState::Queued => write!(f, "QUEUED"),
            WorkState::Running => write!(f, "RUNNING"),
            WorkState::Done => write!(f, "DONE"),
            WorkState::OrderDone => write!(f, "ORDER_DONE"),
            WorkState::Freed => write!(f, "FREED"),
        }
    }
}

/// Priority class of a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum Priority {
    /// Latency-sensitive work, served by a dedicated pool
    High = 0,
    /// Default
    #[default]
    Normal = 1,
}

impl Priority {
    #[inline]
    pub const fn is_high(&self) -> bool {
        matches!(self, Priority::High)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::High => write!(f, "HIGH"),
            Priority::Normal => write!(f, "NORMAL"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_and_set_claims_once() {
        let flags = AtomicWorkFlags::new();
        flags.set(WorkFlags::DONE);
        assert!(!flags.test_and_set(WorkFlags::ORDER_DONE));
        assert!(flags.test_and_set(WorkFlags::ORDER_DONE));
        assert!(flags.contains(WorkFlags::DONE | WorkFlags::ORDER_DONE));
    }

    #[test]
    fn test_and_set_concurrent() {
        use std::sync::atomic::AtomicUsize;
        use std::sync::Arc;
        use std::thread;

        let flags = Arc::new(AtomicWorkFlags::new());
        let winners = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let flags = Arc::clone(&flags);
                let winners = Arc::clone(&winners);
                thread::spawn(move || {
                    if !flags.test_and_set(WorkFlags::ORDER_DONE) {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(winners.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_state_from_flags() {
        assert_eq!(WorkState::from_flags(WorkFlags::empty()), WorkState::Created);
        assert_eq!(WorkState::from_flags(WorkFlags::HIGH_PRIO), WorkState::Created);
        assert_eq!(WorkState::from_flags(WorkFlags::QUEUED), WorkState::Queued);
        assert_eq!(
            WorkState::from_flags(WorkFlags::QUEUED | WorkFlags::RUNNING),
            WorkState::Running
        );
        assert_eq!(
            WorkState::from_flags(WorkFlags::QUEUED | WorkFlags::RUNNING | WorkFlags::DONE),
            WorkState::Done
        );
        assert_eq!(WorkState::from_flags(WorkFlags::all()), WorkState::Freed);
        assert!(WorkState::Done.is_finished());
        assert!(!WorkState::Running.is_finished());
    }

    #[test]
    fn test_priority_default() {
        assert_eq!(Priority::default(), Priority::Normal);
        assert!(Priority::High.is_high());
        assert_eq!(format!("{}", Priority::High), "HIGH");
    }
}
