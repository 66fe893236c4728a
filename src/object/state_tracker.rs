// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Signal State Tracking
//!
//! A [`StateTracker`] owns an object's signal word and the list of
//! [`StateObserver`]s subscribed to it. Every change to the signal word is
//! offered to each observer; an observer answers with [`ObserverFlags`]
//! telling the tracker whether it wants to be dropped from the list.
//!
//! Observer hooks other than `on_removed` run under the tracker lock, so
//! they must not call back into the same tracker. `on_removed` always runs
//! after the lock is released.

use std::sync::Arc;

use bitflags::bitflags;

use crate::object::dispatcher::Koid;
use crate::object::handle::CapabilityId;
use crate::object::signals::Signals;
use crate::sync::SpinMutex;

bitflags! {
    /// Observer verdict returned from each hook
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ObserverFlags: u32 {
        /// The observer matched the request
        const HANDLED = 1 << 0;

        /// Drop the observer from the tracker
        const NEED_REMOVAL = 1 << 1;
    }
}

/// Subscriber to an object's signal state
pub trait StateObserver: Send + Sync {
    /// Called once when the observer is added, with the current signals
    fn on_initialize(&self, initial_state: Signals, count_hint: u64) -> ObserverFlags;

    /// Called on every signal transition while subscribed
    fn on_state_change(&self, new_state: Signals) -> ObserverFlags;

    /// Called when the handle `handle` is being deleted
    fn on_cancel(&self, handle: CapabilityId) -> ObserverFlags;

    /// Called for an explicit cancel of `(handle, port, key)`
    fn on_cancel_by_key(&self, handle: CapabilityId, port: Koid, key: u64) -> ObserverFlags;

    /// Called exactly once after the tracker has dropped the observer
    fn on_removed(&self);
}

/// Tracker state guarded by one lock
struct TrackerInner {
    /// Current signal word
    signals: Signals,

    /// Subscribed observers
    observers: Vec<Arc<dyn StateObserver>>,
}

/// Signal word plus its observers
pub struct StateTracker {
    inner: SpinMutex<TrackerInner>,
}

impl StateTracker {
    /// Create a tracker with the given initial signals
    pub fn new(signals: Signals) -> Self {
        Self {
            inner: SpinMutex::new(TrackerInner {
                signals,
                observers: Vec::new(),
            }),
        }
    }

    /// Current signals
    pub fn signals(&self) -> Signals {
        self.inner.lock().signals
    }

    /// Number of subscribed observers
    pub fn observer_count(&self) -> usize {
        self.inner.lock().observers.len()
    }

    /// Subscribe `observer`
    ///
    /// The observer sees the current signals immediately; if it asks for
    /// removal at that point it is never kept.
    pub fn add_observer(&self, observer: Arc<dyn StateObserver>) {
        let removed = {
            let mut inner = self.inner.lock();
            let flags = observer.on_initialize(inner.signals, 1);
            if flags.contains(ObserverFlags::NEED_REMOVAL) {
                Some(observer)
            } else {
                inner.observers.push(observer);
                None
            }
        };

        if let Some(observer) = removed {
            observer.on_removed();
        }
    }

    /// Clear then set signal bits, notifying observers if anything changed
    pub fn update_state(&self, clear: Signals, set: Signals) {
        let removed = {
            let mut inner = self.inner.lock();
            Self::update_state_locked(&mut inner, clear, set)
        };
        Self::finish_removal(removed);
    }

    /// Track whether exactly one handle references the object
    ///
    /// Called by the handle table, under the arena lock, whenever the
    /// handle count moves between one and two.
    pub fn update_last_handle_signal(&self, handle_count: u32) {
        let (clear, set) = if handle_count == 1 {
            (Signals::empty(), Signals::LAST_HANDLE)
        } else {
            (Signals::LAST_HANDLE, Signals::empty())
        };
        self.update_state(clear, set);
    }

    /// Drop every observer pinned to `handle`
    ///
    /// Returns whether any observer matched.
    pub fn cancel(&self, handle: CapabilityId) -> bool {
        self.remove_matching(|observer| observer.on_cancel(handle))
    }

    /// Drop every observer registered for `(handle, port, key)`
    ///
    /// Returns whether any observer matched.
    pub fn cancel_by_key(&self, handle: CapabilityId, port: Koid, key: u64) -> bool {
        self.remove_matching(|observer| observer.on_cancel_by_key(handle, port, key))
    }

    fn update_state_locked(
        inner: &mut TrackerInner,
        clear: Signals,
        set: Signals,
    ) -> Vec<Arc<dyn StateObserver>> {
        let previous = inner.signals;
        inner.signals = (previous - clear) | set;
        if inner.signals == previous {
            return Vec::new();
        }

        let signals = inner.signals;
        let mut removed = Vec::new();
        inner.observers.retain(|observer| {
            let flags = observer.on_state_change(signals);
            if flags.contains(ObserverFlags::NEED_REMOVAL) {
                removed.push(Arc::clone(observer));
                false
            } else {
                true
            }
        });
        removed
    }

    fn remove_matching<F>(&self, mut hook: F) -> bool
    where
        F: FnMut(&Arc<dyn StateObserver>) -> ObserverFlags,
    {
        let mut handled = false;
        let removed = {
            let mut inner = self.inner.lock();
            let mut removed = Vec::new();
            inner.observers.retain(|observer| {
                let flags = hook(observer);
                handled |= flags.contains(ObserverFlags::HANDLED);
                if flags.contains(ObserverFlags::NEED_REMOVAL) {
                    removed.push(Arc::clone(observer));
                    false
                } else {
                    true
                }
            });
            removed
        };
        Self::finish_removal(removed);
        handled
    }

    fn finish_removal(removed: Vec<Arc<dyn StateObserver>>) {
        for observer in removed {
            observer.on_removed();
        }
    }
}

impl core::fmt::Debug for StateTracker {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("StateTracker")
            .field("signals", &inner.signals)
            .field("observers", &inner.observers.len())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicUsize, Ordering};

    /// Counts fires and removals
    struct Recorder {
        trigger: Signals,
        handle: CapabilityId,
        fires: AtomicUsize,
        removed: AtomicUsize,
        one_shot: bool,
    }

    impl Recorder {
        fn new(trigger: Signals, handle: CapabilityId, one_shot: bool) -> Arc<Self> {
            Arc::new(Self {
                trigger,
                handle,
                fires: AtomicUsize::new(0),
                removed: AtomicUsize::new(0),
                one_shot,
            })
        }

        fn check(&self, state: Signals) -> ObserverFlags {
            if !self.trigger.intersects(state) {
                return ObserverFlags::empty();
            }
            self.fires.fetch_add(1, Ordering::SeqCst);
            if self.one_shot {
                ObserverFlags::NEED_REMOVAL
            } else {
                ObserverFlags::empty()
            }
        }
    }

    impl StateObserver for Recorder {
        fn on_initialize(&self, initial_state: Signals, _count_hint: u64) -> ObserverFlags {
            self.check(initial_state)
        }

        fn on_state_change(&self, new_state: Signals) -> ObserverFlags {
            self.check(new_state)
        }

        fn on_cancel(&self, handle: CapabilityId) -> ObserverFlags {
            if handle == self.handle {
                ObserverFlags::HANDLED | ObserverFlags::NEED_REMOVAL
            } else {
                ObserverFlags::empty()
            }
        }

        fn on_cancel_by_key(&self, handle: CapabilityId, _port: Koid, _key: u64) -> ObserverFlags {
            self.on_cancel(handle)
        }

        fn on_removed(&self) {
            self.removed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_update_state_notifies_on_change_only() {
        let tracker = StateTracker::new(Signals::WRITABLE);
        let recorder = Recorder::new(Signals::READABLE, CapabilityId::from_raw(1), false);
        tracker.add_observer(recorder.clone());
        assert_eq!(recorder.fires.load(Ordering::SeqCst), 0);

        tracker.update_state(Signals::empty(), Signals::READABLE);
        assert_eq!(tracker.signals(), Signals::READABLE | Signals::WRITABLE);
        assert_eq!(recorder.fires.load(Ordering::SeqCst), 1);

        // No change, no notification
        tracker.update_state(Signals::empty(), Signals::READABLE);
        assert_eq!(recorder.fires.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.observer_count(), 1);
    }

    #[test]
    fn test_one_shot_removed_at_initialize() {
        let tracker = StateTracker::new(Signals::READABLE);
        let recorder = Recorder::new(Signals::READABLE, CapabilityId::from_raw(1), true);
        tracker.add_observer(recorder.clone());

        assert_eq!(recorder.fires.load(Ordering::SeqCst), 1);
        assert_eq!(recorder.removed.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.observer_count(), 0);
    }

    #[test]
    fn test_cancel_only_matching_handle() {
        let tracker = StateTracker::new(Signals::empty());
        let a = Recorder::new(Signals::READABLE, CapabilityId::from_raw(1), false);
        let b = Recorder::new(Signals::READABLE, CapabilityId::from_raw(2), false);
        tracker.add_observer(a.clone());
        tracker.add_observer(b.clone());

        assert!(tracker.cancel(CapabilityId::from_raw(1)));
        assert_eq!(a.removed.load(Ordering::SeqCst), 1);
        assert_eq!(b.removed.load(Ordering::SeqCst), 0);
        assert_eq!(tracker.observer_count(), 1);

        assert!(!tracker.cancel(CapabilityId::from_raw(1)));
        assert!(tracker.cancel_by_key(CapabilityId::from_raw(2), 0, 0));
        assert_eq!(tracker.observer_count(), 0);
    }

    #[test]
    fn test_last_handle_signal() {
        let tracker = StateTracker::new(Signals::empty());
        tracker.update_last_handle_signal(1);
        assert!(tracker.signals().contains(Signals::LAST_HANDLE));
        tracker.update_last_handle_signal(2);
        assert!(!tracker.signals().contains(Signals::LAST_HANDLE));
    }
}
