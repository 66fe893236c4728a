// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Event Objects
//!
//! Events are the simplest observable object: a signal word with no
//! behavior of its own. User code sets and clears `SIGNALED` and the user
//! signal bits, and anything watching the event (a port observer, for
//! instance) sees each transition.
//!
//! # Usage
//!
//! ```rust
//! use rustux_object::object::{EventDispatcher, Signals};
//!
//! let event = EventDispatcher::create();
//! event.signal(Signals::empty(), Signals::SIGNALED)?;
//! assert!(event.signals().contains(Signals::SIGNALED));
//! # Ok::<(), rustux_object::RxStatus>(())
//! ```

use core::sync::atomic::{AtomicUsize, Ordering};
use std::any::Any;
use std::sync::Arc;

use crate::object::dispatcher::{Dispatcher, DispatcherBase, ObjectType};
use crate::object::signals::Signals;
use crate::object::state_tracker::StateTracker;
use crate::status::{RxResult, RxStatus};

/// Signals user code may change on an event
pub const EVENT_SIGNALABLE: Signals = Signals::SIGNALED.union(Signals::USER_ALL);

/// Event object
pub struct EventDispatcher {
    /// Dispatcher base
    base: DispatcherBase,

    /// Signal state and observers
    tracker: StateTracker,

    /// Times the last handle went away
    zero_handles_calls: AtomicUsize,
}

impl EventDispatcher {
    /// Create a new unsignaled event
    pub fn create() -> Arc<Self> {
        Self::with_signals(Signals::empty())
    }

    /// Create an event with initial signals
    pub fn with_signals(signals: Signals) -> Arc<Self> {
        Arc::new(Self {
            base: DispatcherBase::new(),
            tracker: StateTracker::new(signals),
            zero_handles_calls: AtomicUsize::new(0),
        })
    }

    /// Clear then set signal bits
    ///
    /// # Returns
    ///
    /// - `Err(RxStatus::InvalidArgs)` if either mask has bits outside
    ///   [`EVENT_SIGNALABLE`]
    pub fn signal(&self, clear: Signals, set: Signals) -> RxResult<()> {
        if !EVENT_SIGNALABLE.contains(clear | set) {
            return Err(RxStatus::InvalidArgs);
        }
        self.tracker.update_state(clear, set);
        Ok(())
    }

    /// Current signals
    pub fn signals(&self) -> Signals {
        self.tracker.signals()
    }

    /// Number of zero-handles callbacks received
    pub fn zero_handles_calls(&self) -> usize {
        self.zero_handles_calls.load(Ordering::Acquire)
    }
}

impl Dispatcher for EventDispatcher {
    fn base(&self) -> &DispatcherBase {
        &self.base
    }

    fn object_type(&self) -> ObjectType {
        ObjectType::Event
    }

    fn state_tracker(&self) -> Option<&StateTracker> {
        Some(&self.tracker)
    }

    fn on_zero_handles(&self) {
        self.zero_handles_calls.fetch_add(1, Ordering::AcqRel);
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_basic() {
        let event = EventDispatcher::create();
        assert!(event.signals().is_empty());

        event.signal(Signals::empty(), Signals::SIGNALED).unwrap();
        assert_eq!(event.signals(), Signals::SIGNALED);

        event.signal(Signals::SIGNALED, Signals::USER_1).unwrap();
        assert_eq!(event.signals(), Signals::USER_1);
    }

    #[test]
    fn test_event_rejects_object_signals() {
        let event = EventDispatcher::create();
        assert_eq!(
            event.signal(Signals::empty(), Signals::READABLE),
            Err(RxStatus::InvalidArgs)
        );
        assert_eq!(
            event.signal(Signals::LAST_HANDLE, Signals::empty()),
            Err(RxStatus::InvalidArgs)
        );
    }

    #[test]
    fn test_event_type() {
        let event = EventDispatcher::with_signals(Signals::WRITABLE);
        assert_eq!(event.object_type(), ObjectType::Event);
        assert_eq!(event.signals(), Signals::WRITABLE);
        assert_eq!(event.zero_handles_calls(), 0);
    }
}
