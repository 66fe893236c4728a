// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Kernel Objects & Ports (Zircon-style)
//!
//! This module implements the capability handle table and the port object.
//! All objects are reached through handles with rights; ports deliver user
//! packets and signal notifications from observed objects.
//!
//! # Design
//!
//! - **Capability IDs**: Generation-tagged slot indices minted by a
//!   fixed-capacity [`HandleSlab`]
//! - **Handle counting**: The arena lock orders every count change; the
//!   last delete triggers the object's zero-handles teardown
//! - **Observers**: Objects with signal state keep a [`StateTracker`];
//!   ports subscribe to it through [`PortObserver`]s
//! - **Lock order**: arena, state tracker, port, observer packet
//!
//! # Modules
//!
//! - [`handle`] - Handles, rights and capability IDs
//! - [`handle_slab`] - Capability ID arena
//! - [`handle_table`] - make/dup/delete handle lifecycle
//! - [`process_handles`] - Per-process handle tables
//! - [`dispatcher`] - Object base and downcasting
//! - [`state_tracker`] - Signal state and observers
//! - [`event`] - Event objects
//! - [`port`] - Port objects
//! - [`port_observer`] - Signal subscriptions feeding ports
//! - [`exception_port`] - Exception port bindings

pub mod dispatcher;
pub mod event;
pub mod exception_port;
pub mod handle;
pub mod handle_slab;
pub mod handle_table;
pub mod port;
pub mod port_observer;
pub mod process_handles;
pub mod signals;
pub mod state_tracker;

// Re-exports
pub use dispatcher::{
    alloc_koid, downcast_dispatcher, Dispatcher, DispatcherBase, Koid, ObjectType, KOID_INVALID,
};
pub use event::{EventDispatcher, EVENT_SIGNALABLE};
pub use exception_port::{ExceptionPort, ExceptionPortLink};
pub use handle::{CapabilityId, Handle, HandleOwner, Rights};
pub use handle_slab::{HandleSlab, RawSlot, HANDLE_RESERVED_BITS, HIGH_HANDLE_COUNT, MAX_HANDLE_COUNT};
pub use port::{
    PacketPayload, PacketType, PortDispatcher, PortPacketData, PortState, SignalPacket,
    WaitAsyncMode, MAX_PENDING_USER_PACKETS, PORT_USER_PAYLOAD_SIZE,
};
pub use port_observer::{ObserverLifecycle, PortObserver};
pub use process_handles::ProcessHandleTable;
pub use signals::Signals;
pub use state_tracker::{ObserverFlags, StateObserver, StateTracker};
