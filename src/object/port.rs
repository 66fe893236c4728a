// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Port Objects
//!
//! A port is a FIFO packet queue that threads block on. Packets come from
//! two places:
//!
//! - **User packets**: queued explicitly, heap-allocated per call, freed
//!   once delivered
//! - **Signal packets**: queued by a [`PortObserver`] when the object it
//!   watches enters a trigger state; the packet lives inside the observer
//!
//! # State Machine
//!
//! ```text
//!   Open ──(last handle closed)──► Closing ──(queue drained)──► Closed
//! ```
//!
//! Only an `Open` port accepts packets. Closing unbinds every linked
//! exception port, then drains the queue, reclaiming observers whose
//! packets were still pending.
//!
//! # Observer Reclamation
//!
//! An observer leaves its object's tracker before it is reclaimed. If its
//! packet is still queued at that moment it is marked `Removed`, and
//! whoever takes the packet off the queue (dequeue, cancel, or the close
//! drain) reclaims it. Otherwise it is reclaimed on the spot.
//!
//! # Usage
//!
//! ```rust
//! use rustux_object::object::PortDispatcher;
//! use rustux_object::sync::Deadline;
//!
//! let port = PortDispatcher::create();
//! port.queue_user(7, b"ping")?;
//! let packet = port.dequeue(Deadline::infinite())?;
//! assert_eq!(packet.key, 7);
//! # Ok::<(), rustux_object::RxStatus>(())
//! ```

use std::any::Any;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use log::{debug, trace};

use crate::object::dispatcher::{Dispatcher, DispatcherBase, ObjectType};
use crate::object::exception_port::ExceptionPortLink;
use crate::object::handle::{CapabilityId, Handle};
use crate::object::port_observer::{ObserverLifecycle, ObserverPacket, PortObserver};
use crate::object::signals::Signals;
use crate::status::{RxResult, RxStatus};
use crate::sync::{Deadline, Semaphore, SpinMutex};

/// Size of the user payload carried by a packet
pub const PORT_USER_PAYLOAD_SIZE: usize = 32;

/// Default number of user packets a port holds before refusing more
pub const MAX_PENDING_USER_PACKETS: usize = 2048;

/// ============================================================================
/// Packets
/// ============================================================================

/// Packet type
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    /// Queued by user code
    User = 0,

    /// From a wait-once observer
    SignalOne = 1,

    /// From a repeating observer
    SignalRepeating = 2,
}

impl PacketType {
    /// Get raw value
    pub const fn into_raw(self) -> u32 {
        self as u32
    }
}

/// Signal packet payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalPacket {
    /// Signals the observer was waiting for
    pub trigger: Signals,

    /// Object signals at the time the packet was queued
    pub observed: Signals,

    /// Number of times the trigger was observed
    pub count: u64,
}

/// Packet payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketPayload {
    /// Opaque user bytes
    User([u8; PORT_USER_PAYLOAD_SIZE]),

    /// Signal notification
    Signal(SignalPacket),
}

/// Packet as delivered by [`PortDispatcher::dequeue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortPacketData {
    /// Caller-chosen correlation value
    pub key: u64,

    /// Packet type
    pub packet_type: PacketType,

    /// Status reported with the packet
    pub status: i32,

    /// Payload
    pub payload: PacketPayload,
}

impl PortPacketData {
    /// User payload, if this is a user packet
    pub fn user(&self) -> Option<&[u8; PORT_USER_PAYLOAD_SIZE]> {
        match &self.payload {
            PacketPayload::User(bytes) => Some(bytes),
            PacketPayload::Signal(_) => None,
        }
    }

    /// Signal payload, if this is a signal packet
    pub fn signal(&self) -> Option<&SignalPacket> {
        match &self.payload {
            PacketPayload::Signal(signal) => Some(signal),
            PacketPayload::User(_) => None,
        }
    }
}

/// An entry in the port queue
enum QueuedPacket {
    /// Ephemeral user packet
    User(Box<PortPacketData>),

    /// Packet embedded in an observer
    Signal(Arc<PortObserver>),
}

/// ============================================================================
/// Wait Options
/// ============================================================================

/// Observer mode for `make_observers`
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaitAsyncMode {
    /// Queue one packet, then unsubscribe
    Once = 0,

    /// Queue a packet on every trigger until canceled
    Repeating = 1,
}

impl TryFrom<u32> for WaitAsyncMode {
    type Error = RxStatus;

    fn try_from(raw: u32) -> RxResult<Self> {
        match raw {
            0 => Ok(Self::Once),
            1 => Ok(Self::Repeating),
            _ => Err(RxStatus::InvalidArgs),
        }
    }
}

/// ============================================================================
/// Port
/// ============================================================================

/// Port lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortState {
    /// Accepting packets
    Open,

    /// Last handle closed; draining
    Closing,

    /// Drained
    Closed,
}

/// Port state guarded by the port lock
struct PortInner {
    /// Lifecycle state
    state: PortState,

    /// Pending packets, oldest first
    packets: VecDeque<QueuedPacket>,

    /// Linked exception ports
    eports: Vec<Arc<dyn ExceptionPortLink>>,

    /// Keys held by observers not yet reclaimed
    bound_keys: HashSet<u64>,

    /// User packets currently queued
    user_packets: usize,
}

/// Port object
pub struct PortDispatcher {
    /// Dispatcher base
    base: DispatcherBase,

    /// User packet budget
    max_user_packets: usize,

    /// Queue and lifecycle
    inner: SpinMutex<PortInner>,

    /// Counts queued packets; `dequeue` blocks on it
    sema: Semaphore,
}

impl PortDispatcher {
    /// Create a new open port
    pub fn create() -> Arc<Self> {
        Self::create_with_budget(MAX_PENDING_USER_PACKETS)
    }

    /// Create a port that holds at most `max_user_packets` user packets
    pub fn create_with_budget(max_user_packets: usize) -> Arc<Self> {
        Arc::new(Self {
            base: DispatcherBase::new(),
            max_user_packets,
            inner: SpinMutex::new(PortInner {
                state: PortState::Open,
                packets: VecDeque::new(),
                eports: Vec::new(),
                bound_keys: HashSet::new(),
                user_packets: 0,
            }),
            sema: Semaphore::new(),
        })
    }

    /// Lifecycle state
    pub fn state(&self) -> PortState {
        self.inner.lock().state
    }

    /// Whether the port has stopped accepting packets
    pub fn is_closed(&self) -> bool {
        self.state() != PortState::Open
    }

    /// Number of queued packets
    pub fn pending_count(&self) -> usize {
        self.inner.lock().packets.len()
    }

    /// Number of observers feeding this port that are not yet reclaimed
    pub fn observer_count(&self) -> usize {
        self.inner.lock().bound_keys.len()
    }

    /// Queue a user packet
    ///
    /// # Returns
    ///
    /// - `Err(RxStatus::InvalidArgs)` if `data` exceeds the payload size
    /// - `Err(RxStatus::BadState)` if the port is closing or closed
    /// - `Err(RxStatus::ShouldWait)` if the user packet budget is used up
    pub fn queue_user(&self, key: u64, data: &[u8]) -> RxResult<()> {
        if data.len() > PORT_USER_PAYLOAD_SIZE {
            return Err(RxStatus::InvalidArgs);
        }
        let mut payload = [0u8; PORT_USER_PAYLOAD_SIZE];
        payload[..data.len()].copy_from_slice(data);

        let packet = Box::new(PortPacketData {
            key,
            packet_type: PacketType::User,
            status: 0,
            payload: PacketPayload::User(payload),
        });

        let mut inner = self.inner.lock();
        if inner.state != PortState::Open {
            return Err(RxStatus::BadState);
        }
        if inner.user_packets >= self.max_user_packets {
            return Err(RxStatus::ShouldWait);
        }
        inner.user_packets += 1;
        inner.packets.push_back(QueuedPacket::User(packet));
        self.sema.post();

        trace!("port {}: user packet queued, key {}", self.koid(), key);
        Ok(())
    }

    /// Queue an observer's embedded packet
    ///
    /// Succeeds without queuing anything if the packet is already pending,
    /// so a repeating trigger is delivered once per drain.
    pub(crate) fn queue_signal(
        &self,
        observer: Arc<PortObserver>,
        observed: Signals,
        count: u64,
    ) -> RxResult<()> {
        let mut inner = self.inner.lock();
        if inner.state != PortState::Open {
            return Err(RxStatus::BadState);
        }

        {
            let mut packet = observer.packet();
            if packet.queued {
                return Ok(());
            }
            packet.queued = true;
            packet.observed = observed;
            packet.count = count;
        }

        trace!("port {}: signal packet queued, key {}", self.koid(), observer.key());
        inner.packets.push_back(QueuedPacket::Signal(observer));
        self.sema.post();
        Ok(())
    }

    /// Take the oldest packet, blocking until one arrives or `deadline`
    ///
    /// # Returns
    ///
    /// - The packet on success
    /// - `Err(RxStatus::TimedOut)` if the deadline passed with the queue empty
    pub fn dequeue(&self, deadline: Deadline) -> RxResult<PortPacketData> {
        loop {
            self.sema.wait(deadline)?;

            let (data, released) = {
                let mut inner = self.inner.lock();
                let Some(packet) = inner.packets.pop_front() else {
                    // The packet this count stood for was canceled
                    continue;
                };
                match packet {
                    QueuedPacket::User(data) => {
                        inner.user_packets -= 1;
                        (*data, None)
                    }
                    QueuedPacket::Signal(observer) => {
                        let data = self.take_signal_locked(&mut inner, &observer);
                        (data, Some(observer))
                    }
                }
            };

            drop(released);
            trace!("port {}: packet delivered, key {}", self.koid(), data.key);
            return Ok(data);
        }
    }

    /// Subscribe to `handle`'s object on behalf of this port
    ///
    /// # Returns
    ///
    /// - `Err(RxStatus::NotSupported)` if the object has no signal state
    /// - `Err(RxStatus::BadState)` if the port is closing or closed
    /// - `Err(RxStatus::AlreadyBound)` if a live observer already holds `key`
    pub fn make_observers(
        self: &Arc<Self>,
        mode: WaitAsyncMode,
        handle: &Handle,
        key: u64,
        signals: Signals,
    ) -> RxResult<()> {
        let tracker = handle
            .dispatcher()
            .state_tracker()
            .ok_or(RxStatus::NotSupported)?;

        {
            let mut inner = self.inner.lock();
            if inner.state != PortState::Open {
                return Err(RxStatus::BadState);
            }
            if !inner.bound_keys.insert(key) {
                return Err(RxStatus::AlreadyBound);
            }
        }

        let observer = PortObserver::new(mode, handle.id(), Arc::clone(self), key, signals);
        tracker.add_observer(observer);
        Ok(())
    }

    /// Drop queued signal packets for `(handle, key)`
    ///
    /// Packets already taken by a concurrent `dequeue` are not affected.
    /// Returns whether anything was removed.
    pub fn cancel_queued(&self, handle: CapabilityId, key: u64) -> bool {
        let mut removed = Vec::new();
        {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            inner.packets.retain(|packet| match packet {
                QueuedPacket::Signal(observer)
                    if observer.handle() == handle && observer.key() == key =>
                {
                    removed.push(Arc::clone(observer));
                    false
                }
                _ => true,
            });

            for observer in &removed {
                let mut packet = observer.packet();
                packet.queued = false;
                if packet.lifecycle == ObserverLifecycle::Removed {
                    Self::reclaim_locked(inner, &mut packet, observer.key());
                }
                // A dequeuer may already hold this count; it will find the
                // queue short and wait again.
                self.sema.try_wait();
            }
        }

        if !removed.is_empty() {
            trace!(
                "port {}: canceled {} queued packet(s) for {:?}, key {}",
                self.koid(),
                removed.len(),
                handle,
                key
            );
        }
        !removed.is_empty()
    }

    /// Cancel the wait registered for `(handle, key)` and drop its packets
    ///
    /// # Returns
    ///
    /// - `Err(RxStatus::NotFound)` if neither an observer nor a packet matched
    pub fn cancel(self: &Arc<Self>, handle: &Handle, key: u64) -> RxResult<()> {
        let mut found = false;
        if let Some(tracker) = handle.dispatcher().state_tracker() {
            found |= tracker.cancel_by_key(handle.id(), self.koid(), key);
        }
        found |= self.cancel_queued(handle.id(), key);

        if found {
            Ok(())
        } else {
            Err(RxStatus::NotFound)
        }
    }

    /// Tie an exception port's binding to this port's lifetime
    pub fn link_exception_port(&self, eport: Arc<dyn ExceptionPortLink>) -> RxResult<()> {
        let mut inner = self.inner.lock();
        if inner.state != PortState::Open {
            return Err(RxStatus::BadState);
        }
        inner.eports.push(eport);
        Ok(())
    }

    /// Undo [`link_exception_port`](Self::link_exception_port)
    ///
    /// Returns whether `eport` was linked.
    pub fn unlink_exception_port(&self, eport: &dyn ExceptionPortLink) -> bool {
        let target = eport as *const dyn ExceptionPortLink as *const ();
        let unlinked = {
            let mut inner = self.inner.lock();
            let position = inner
                .eports
                .iter()
                .position(|linked| Arc::as_ptr(linked) as *const () == target);
            position.map(|index| inner.eports.swap_remove(index))
        };
        unlinked.is_some()
    }

    /// Observer bookkeeping once its tracker has dropped it
    pub(crate) fn on_observer_removed(&self, observer: &PortObserver) {
        let mut inner = self.inner.lock();
        let mut packet = observer.packet();
        assert_eq!(
            packet.lifecycle,
            ObserverLifecycle::Subscribed,
            "port observer removed twice"
        );

        if packet.queued {
            packet.lifecycle = ObserverLifecycle::Removed;
            trace!("port {}: observer key {} reclaim deferred", self.koid(), observer.key());
        } else {
            Self::reclaim_locked(&mut inner, &mut packet, observer.key());
        }
    }

    fn take_signal_locked(&self, inner: &mut PortInner, observer: &PortObserver) -> PortPacketData {
        let mut packet = observer.packet();
        assert!(packet.queued, "dequeued signal packet not marked queued");
        packet.queued = false;
        let data = observer.packet_data(&packet);

        if packet.lifecycle == ObserverLifecycle::Removed {
            Self::reclaim_locked(inner, &mut packet, observer.key());
        }
        data
    }

    fn reclaim_locked(inner: &mut PortInner, packet: &mut ObserverPacket, key: u64) {
        assert_ne!(
            packet.lifecycle,
            ObserverLifecycle::Reclaimed,
            "port observer reclaimed twice"
        );
        packet.lifecycle = ObserverLifecycle::Reclaimed;
        let bound = inner.bound_keys.remove(&key);
        assert!(bound, "reclaimed observer key {} was not bound", key);
        trace!("observer key {} reclaimed", key);
    }
}

impl Dispatcher for PortDispatcher {
    fn base(&self) -> &DispatcherBase {
        &self.base
    }

    fn object_type(&self) -> ObjectType {
        ObjectType::Port
    }

    fn on_zero_handles(&self) {
        {
            let mut inner = self.inner.lock();
            if inner.state != PortState::Open {
                return;
            }
            inner.state = PortState::Closing;
        }

        // The exception port may call back into this port
        loop {
            let eport = self.inner.lock().eports.pop();
            match eport {
                Some(eport) => eport.on_port_zero_handles(),
                None => break,
            }
        }

        let mut drained = 0usize;
        while self.dequeue(Deadline::past()).is_ok() {
            drained += 1;
        }

        self.inner.lock().state = PortState::Closed;
        debug!("port {}: closed, {} packet(s) drained", self.koid(), drained);
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl core::fmt::Debug for PortDispatcher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("PortDispatcher")
            .field("koid", &self.koid())
            .field("state", &inner.state)
            .field("pending", &inner.packets.len())
            .field("observers", &inner.bound_keys.len())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
