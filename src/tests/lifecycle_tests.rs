// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Teardown & Re-entrancy Tests
//!
//! Zero-handles teardown and exception port callbacks run without any lock
//! held; these tests call back into the arena and the port from inside them.

use core::sync::atomic::{AtomicUsize, Ordering};
use std::any::Any;
use std::sync::Arc;

use crate::object::{
    Dispatcher, DispatcherBase, EventDispatcher, ExceptionPort, ExceptionPortLink, HandleOwner,
    HandleSlab, ObjectType, PortDispatcher, PortState, Rights, Signals, WaitAsyncMode,
};
use crate::status::RxStatus;
use crate::sync::{Deadline, SpinMutex};

/// Object that closes a handle it holds when its own last handle goes away
struct Holder {
    base: DispatcherBase,
    held: SpinMutex<Option<HandleOwner>>,
}

impl Holder {
    fn new(held: HandleOwner) -> Arc<Self> {
        Arc::new(Self {
            base: DispatcherBase::new(),
            held: SpinMutex::new(Some(held)),
        })
    }
}

impl Dispatcher for Holder {
    fn base(&self) -> &DispatcherBase {
        &self.base
    }

    fn object_type(&self) -> ObjectType {
        ObjectType::Process
    }

    fn on_zero_handles(&self) {
        let held = self.held.lock().take();
        drop(held);
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Exception port link that pokes its port while being unbound
struct Reentrant {
    port: Arc<PortDispatcher>,
    handle: SpinMutex<Option<HandleOwner>>,
    queue_result: SpinMutex<Option<Result<(), RxStatus>>>,
    calls: AtomicUsize,
}

impl ExceptionPortLink for Reentrant {
    fn on_port_zero_handles(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.queue_result.lock() = Some(self.port.queue_user(99, b"late"));
        self.port.cancel_queued(crate::object::CapabilityId::from_raw(1), 1);
        self.port.unlink_exception_port(self);

        let handle = self.handle.lock().take();
        drop(handle);
    }
}

#[test]
fn test_zero_handles_cascades_through_arena() {
    let slab = Arc::new(HandleSlab::new(16));
    let event = EventDispatcher::create();
    let inner = slab.make_handle(event.clone(), Rights::WAIT).unwrap();

    let holder = Holder::new(inner);
    let outer = slab.make_handle(holder.clone(), Rights::WAIT).unwrap();
    assert_eq!(slab.outstanding(), 2);

    // Deleting the outer handle deletes the inner one from inside teardown
    drop(outer);
    assert_eq!(slab.outstanding(), 0);
    assert_eq!(event.zero_handles_calls(), 1);
    assert_eq!(holder.handle_count(), 0);
}

#[test]
fn test_port_zero_handles_is_idempotent() {
    let slab = Arc::new(HandleSlab::new(16));
    let port = PortDispatcher::create();
    let event = EventDispatcher::create();
    let event_handle = slab.make_handle(event.clone(), Rights::DEFAULT_EVENT).unwrap();

    port.make_observers(WaitAsyncMode::Repeating, &event_handle, 1, Signals::SIGNALED).unwrap();
    event.signal(Signals::empty(), Signals::SIGNALED).unwrap();
    port.queue_user(2, b"user").unwrap();
    assert_eq!(port.pending_count(), 2);

    let port_handle = slab.make_handle(port.clone(), Rights::DEFAULT_PORT).unwrap();
    drop(port_handle);
    assert_eq!(port.state(), PortState::Closed);
    assert!(port.is_closed());
    assert_eq!(port.pending_count(), 0);

    port.on_zero_handles();
    assert_eq!(port.state(), PortState::Closed);
    assert_eq!(port.pending_count(), 0);
    assert_eq!(port.queue_user(3, b"x"), Err(RxStatus::BadState));

    // The observer is still subscribed until its next trigger or cancel
    drop(event_handle);
    assert_eq!(port.observer_count(), 0);
}

#[test]
fn test_exception_port_callback_may_reenter() {
    let slab = Arc::new(HandleSlab::new(16));
    let port = PortDispatcher::create();
    let other_port = PortDispatcher::create();
    let other_handle = slab.make_handle(other_port.clone(), Rights::DEFAULT_PORT).unwrap();

    let link = Arc::new(Reentrant {
        port: port.clone(),
        handle: SpinMutex::new(Some(other_handle)),
        queue_result: SpinMutex::new(None),
        calls: AtomicUsize::new(0),
    });
    port.link_exception_port(link.clone()).unwrap();
    let bound = ExceptionPort::bind(&port, 5).unwrap();

    let port_handle = slab.make_handle(port.clone(), Rights::DEFAULT_PORT).unwrap();
    drop(port_handle);

    assert_eq!(link.calls.load(Ordering::SeqCst), 1);
    assert_eq!(*link.queue_result.lock(), Some(Err(RxStatus::BadState)));
    assert!(!bound.is_bound());
    assert_eq!(other_port.state(), PortState::Closed);
    assert_eq!(port.state(), PortState::Closed);
    assert_eq!(slab.outstanding(), 0);
}

#[test]
fn test_unlinked_exception_port_not_notified() {
    let port = PortDispatcher::create();
    let bound = ExceptionPort::bind(&port, 1).unwrap();
    let link: Arc<dyn ExceptionPortLink> = bound.clone();

    assert!(port.unlink_exception_port(link.as_ref()));
    assert!(!port.unlink_exception_port(link.as_ref()));

    port.on_zero_handles();
    // Unlinked directly on the port, so the binding never heard about it
    assert!(bound.is_bound());
}

#[test]
fn test_cancel_then_drain_never_yields_key() {
    let slab = Arc::new(HandleSlab::new(16));
    let port = PortDispatcher::create();
    let event = EventDispatcher::create();
    let a = slab.make_handle(event.clone(), Rights::DEFAULT_EVENT).unwrap();
    let b = slab.dup_handle(&a, Rights::DEFAULT_EVENT, false).unwrap();

    port.make_observers(WaitAsyncMode::Repeating, &a, 1, Signals::USER_0).unwrap();
    port.make_observers(WaitAsyncMode::Repeating, &b, 2, Signals::USER_0).unwrap();
    port.queue_user(1, b"user key one").unwrap();
    event.signal(Signals::empty(), Signals::USER_0).unwrap();
    assert_eq!(port.pending_count(), 3);

    // Same key on another handle and user packets are untouched
    assert!(port.cancel_queued(a.id(), 1));
    assert_eq!(port.pending_count(), 2);
    assert!(!port.cancel_queued(a.id(), 1));
    assert_eq!(port.pending_count(), 2);

    let mut drained = Vec::new();
    while let Ok(packet) = port.dequeue(Deadline::past()) {
        drained.push((packet.key, packet.signal().is_some()));
    }
    assert_eq!(drained, vec![(1, false), (2, true)]);

    // The canceled packet's observer stays subscribed and can fire again
    event.signal(Signals::USER_0, Signals::empty()).unwrap();
    event.signal(Signals::empty(), Signals::USER_0).unwrap();
    assert_eq!(port.pending_count(), 2);
}

#[test]
fn test_handle_close_reclaims_after_port_close() {
    let slab = Arc::new(HandleSlab::new(16));
    let port = PortDispatcher::create();
    let event = EventDispatcher::create();
    let handle = slab.make_handle(event.clone(), Rights::DEFAULT_EVENT).unwrap();

    port.make_observers(WaitAsyncMode::Once, &handle, 1, Signals::SIGNALED).unwrap();
    port.on_zero_handles();
    assert_eq!(port.observer_count(), 1);

    drop(handle);
    assert_eq!(event.state_tracker().unwrap().observer_count(), 0);
    assert_eq!(port.observer_count(), 0);
}
