// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Port Observers
//!
//! A [`PortObserver`] subscribes a port to one object's signals. It carries
//! its own packet, so queuing a signal notification never allocates; the
//! port queue holds a reference to the observer while the packet is pending.
//!
//! The observer lives in two places at once: the watched object's
//! [`StateTracker`](crate::object::StateTracker) and, while its packet is
//! queued, the port. It is reclaimed only after both let go, tracked by
//! [`ObserverLifecycle`].

use std::sync::{Arc, Weak};

use crate::object::dispatcher::{Dispatcher, Koid};
use crate::object::handle::CapabilityId;
use crate::object::port::{PacketPayload, PacketType, PortDispatcher, PortPacketData, SignalPacket, WaitAsyncMode};
use crate::object::signals::Signals;
use crate::object::state_tracker::{ObserverFlags, StateObserver};
use crate::sync::{SpinMutex, SpinMutexGuard};

/// Where an observer is in its teardown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserverLifecycle {
    /// In its object's tracker
    Subscribed,

    /// Out of the tracker, packet still queued
    Removed,

    /// Released by the port; the key is free again
    Reclaimed,
}

/// Embedded packet state, guarded by the observer's packet lock
///
/// Only touched with the owning port's lock held.
#[derive(Debug)]
pub(crate) struct ObserverPacket {
    /// In the port queue
    pub(crate) queued: bool,

    /// Signals at the last queue
    pub(crate) observed: Signals,

    /// Trigger count at the last queue
    pub(crate) count: u64,

    /// Teardown progress
    pub(crate) lifecycle: ObserverLifecycle,
}

/// Signal subscription feeding a port
pub struct PortObserver {
    /// Self reference used to enqueue
    this: Weak<PortObserver>,

    /// Once or repeating
    mode: WaitAsyncMode,

    /// Signals that fire the observer
    trigger: Signals,

    /// Packet key
    key: u64,

    /// Handle the wait was registered through
    handle: CapabilityId,

    /// Destination port
    port: Arc<PortDispatcher>,

    /// Embedded packet
    packet: SpinMutex<ObserverPacket>,
}

impl PortObserver {
    pub(crate) fn new(
        mode: WaitAsyncMode,
        handle: CapabilityId,
        port: Arc<PortDispatcher>,
        key: u64,
        trigger: Signals,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            mode,
            trigger,
            key,
            handle,
            port,
            packet: SpinMutex::new(ObserverPacket {
                queued: false,
                observed: Signals::empty(),
                count: 0,
                lifecycle: ObserverLifecycle::Subscribed,
            }),
        })
    }

    /// Packet key
    pub fn key(&self) -> u64 {
        self.key
    }

    /// Handle the wait was registered through
    pub fn handle(&self) -> CapabilityId {
        self.handle
    }

    /// Trigger signals
    pub fn trigger(&self) -> Signals {
        self.trigger
    }

    /// Once or repeating
    pub fn mode(&self) -> WaitAsyncMode {
        self.mode
    }

    /// Teardown progress
    pub fn lifecycle(&self) -> ObserverLifecycle {
        self.packet.lock().lifecycle
    }

    pub(crate) fn packet(&self) -> SpinMutexGuard<'_, ObserverPacket> {
        self.packet.lock()
    }

    /// Copy of the embedded packet as it would be delivered
    pub(crate) fn packet_data(&self, packet: &ObserverPacket) -> PortPacketData {
        let packet_type = match self.mode {
            WaitAsyncMode::Once => PacketType::SignalOne,
            WaitAsyncMode::Repeating => PacketType::SignalRepeating,
        };
        PortPacketData {
            key: self.key,
            packet_type,
            status: 0,
            payload: PacketPayload::Signal(SignalPacket {
                trigger: self.trigger,
                observed: packet.observed,
                count: packet.count,
            }),
        }
    }

    fn maybe_queue(&self, new_state: Signals, count: u64) -> ObserverFlags {
        if !self.trigger.intersects(new_state) {
            return ObserverFlags::empty();
        }

        let queued = match self.this.upgrade() {
            Some(this) => self.port.queue_signal(this, new_state, count),
            None => return ObserverFlags::NEED_REMOVAL,
        };

        if self.mode == WaitAsyncMode::Once || queued.is_err() {
            ObserverFlags::NEED_REMOVAL
        } else {
            ObserverFlags::empty()
        }
    }
}

impl StateObserver for PortObserver {
    fn on_initialize(&self, initial_state: Signals, count_hint: u64) -> ObserverFlags {
        self.maybe_queue(initial_state, count_hint)
    }

    fn on_state_change(&self, new_state: Signals) -> ObserverFlags {
        self.maybe_queue(new_state, 1)
    }

    fn on_cancel(&self, handle: CapabilityId) -> ObserverFlags {
        if handle == self.handle {
            ObserverFlags::HANDLED | ObserverFlags::NEED_REMOVAL
        } else {
            ObserverFlags::empty()
        }
    }

    fn on_cancel_by_key(&self, handle: CapabilityId, port: Koid, key: u64) -> ObserverFlags {
        if handle == self.handle && port == self.port.koid() && key == self.key {
            ObserverFlags::HANDLED | ObserverFlags::NEED_REMOVAL
        } else {
            ObserverFlags::empty()
        }
    }

    fn on_removed(&self) {
        self.port.on_observer_removed(self);
    }
}

impl core::fmt::Debug for PortObserver {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PortObserver")
            .field("key", &self.key)
            .field("handle", &self.handle)
            .field("trigger", &self.trigger)
            .field("mode", &self.mode)
            .finish()
    }
}
