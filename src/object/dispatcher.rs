// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Dispatchers
//!
//! A dispatcher is the kernel-side body of an object. User code never
//! touches one directly; it holds handles, and each live handle keeps a
//! shared reference to its dispatcher.
//!
//! The handle table only needs a narrow view of a dispatcher: its handle
//! count, its optional [`StateTracker`], and a callback for when the last
//! handle goes away. That view is the [`Dispatcher`] trait.

use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::any::Any;
use std::sync::Arc;

use crate::object::state_tracker::StateTracker;

/// ============================================================================
/// Kernel Object ID
/// ============================================================================

/// Kernel object identifier
pub type Koid = u64;

/// Invalid koid; never handed out
pub const KOID_INVALID: Koid = 0;

/// Next koid counter
static NEXT_KOID: AtomicU64 = AtomicU64::new(1);

/// Allocate a new koid
pub fn alloc_koid() -> Koid {
    NEXT_KOID.fetch_add(1, Ordering::Relaxed)
}

/// ============================================================================
/// Kernel Object Types
/// ============================================================================

/// Kernel object type
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    /// Unknown type
    Unknown = 0,

    /// Process object
    Process = 1,

    /// Thread object
    Thread = 2,

    /// Virtual Memory Object
    Vmo = 3,

    /// Channel endpoint
    Channel = 4,

    /// Event object
    Event = 5,

    /// Port (packet queue)
    Port = 6,
}

impl ObjectType {
    /// Create from raw value
    pub const fn from_raw(raw: u32) -> Self {
        match raw {
            1 => Self::Process,
            2 => Self::Thread,
            3 => Self::Vmo,
            4 => Self::Channel,
            5 => Self::Event,
            6 => Self::Port,
            _ => Self::Unknown,
        }
    }

    /// Get raw value
    pub const fn into_raw(self) -> u32 {
        self as u32
    }

    /// Get name as string
    pub const fn name(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Process => "process",
            Self::Thread => "thread",
            Self::Vmo => "vmo",
            Self::Channel => "channel",
            Self::Event => "event",
            Self::Port => "port",
        }
    }
}

/// ============================================================================
/// Dispatcher Base
/// ============================================================================

/// State every dispatcher carries
///
/// `handle_count` is written only by the handle-table operations, and only
/// while they hold the handle arena lock, so that 0 to 1 to 2 transitions
/// are observed atomically with slot allocation.
#[derive(Debug)]
pub struct DispatcherBase {
    /// Object ID
    koid: Koid,

    /// Number of live handles referencing the object
    handle_count: AtomicU32,
}

impl DispatcherBase {
    /// Create a new base with a fresh koid and no handles
    pub fn new() -> Self {
        Self {
            koid: alloc_koid(),
            handle_count: AtomicU32::new(0),
        }
    }

    /// Get object ID
    pub const fn koid(&self) -> Koid {
        self.koid
    }

    /// Get handle count
    pub fn handle_count(&self) -> u32 {
        self.handle_count.load(Ordering::Acquire)
    }

    /// Increment the handle count; caller holds the arena lock
    ///
    /// Returns the new count.
    pub(crate) fn inc_handle_count(&self) -> u32 {
        self.handle_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Decrement the handle count; caller holds the arena lock
    ///
    /// Returns the new count.
    pub(crate) fn dec_handle_count(&self) -> u32 {
        let previous = self.handle_count.fetch_sub(1, Ordering::AcqRel);
        assert!(previous > 0, "dispatcher {}: handle count underflow", self.koid);
        previous - 1
    }
}

impl Default for DispatcherBase {
    fn default() -> Self {
        Self::new()
    }
}

/// ============================================================================
/// Dispatcher Trait
/// ============================================================================

/// Kernel object as seen by the handle table and ports
pub trait Dispatcher: Send + Sync + 'static {
    /// Shared base state
    fn base(&self) -> &DispatcherBase;

    /// Object type
    fn object_type(&self) -> ObjectType;

    /// Signal state tracker, if the object is observable
    fn state_tracker(&self) -> Option<&StateTracker> {
        None
    }

    /// Called exactly once, with no kernel lock held, when the last handle
    /// to the object is deleted
    fn on_zero_handles(&self) {}

    /// Upcast for [`downcast_dispatcher`]
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;

    /// Object ID
    fn koid(&self) -> Koid {
        self.base().koid()
    }

    /// Number of live handles
    fn handle_count(&self) -> u32 {
        self.base().handle_count()
    }
}

/// Recover the concrete type of a dispatcher
pub fn downcast_dispatcher<T: Dispatcher>(dispatcher: Arc<dyn Dispatcher>) -> Option<Arc<T>> {
    dispatcher.into_any().downcast::<T>().ok()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    struct Plain {
        base: DispatcherBase,
    }

    impl Dispatcher for Plain {
        fn base(&self) -> &DispatcherBase {
            &self.base
        }

        fn object_type(&self) -> ObjectType {
            ObjectType::Vmo
        }

        fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
            self
        }
    }

    #[test]
    fn test_object_type() {
        assert_eq!(ObjectType::from_raw(5), ObjectType::Event);
        assert_eq!(ObjectType::from_raw(6), ObjectType::Port);
        assert_eq!(ObjectType::from_raw(999), ObjectType::Unknown);

        assert_eq!(ObjectType::Port.into_raw(), 6);
        assert_eq!(ObjectType::Event.name(), "event");
    }

    #[test]
    fn test_koids_are_unique() {
        let a = DispatcherBase::new();
        let b = DispatcherBase::new();
        assert_ne!(a.koid(), b.koid());
        assert_ne!(a.koid(), KOID_INVALID);
    }

    #[test]
    fn test_handle_count_transitions() {
        let base = DispatcherBase::new();
        assert_eq!(base.inc_handle_count(), 1);
        assert_eq!(base.inc_handle_count(), 2);
        assert_eq!(base.dec_handle_count(), 1);
        assert_eq!(base.dec_handle_count(), 0);
        assert_eq!(base.handle_count(), 0);
    }

    #[test]
    #[should_panic(expected = "handle count underflow")]
    fn test_handle_count_underflow_panics() {
        let base = DispatcherBase::new();
        base.dec_handle_count();
    }

    #[test]
    fn test_downcast() {
        let plain: Arc<dyn Dispatcher> = Arc::new(Plain { base: DispatcherBase::new() });
        assert!(plain.state_tracker().is_none());
        assert!(downcast_dispatcher::<Plain>(plain).is_some());
    }
}
