// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! # Rustux Object Layer - Handles and Ports
//!
//! The capability handle table and the port object of the Rustux kernel
//! object model, built as a hosted library.
//!
//! - **Handle arena**: Fixed-capacity slab minting generation-tagged
//!   capability IDs; a stale ID never resolves to a newer handle
//! - **Handle lifecycle**: make/dup/delete with exact per-object handle
//!   counts, the `LAST_HANDLE` signal, and zero-handles teardown
//! - **Ports**: FIFO packet queues fed by user code and by signal observers
//!   on other objects, with cancellation and exception port links
//!
//! ## Architecture
//!
//! ```text
//! src/
//! ├── status.rs          # RxStatus error codes
//! ├── sync/              # Spin locks, semaphore, deadlines
//! ├── object/            # Handles, dispatchers, events, ports
//! ├── syscall/           # Typed syscall entry points
//! └── lib.rs             # This file
//! ```
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use rustux_object::object::{
//!     EventDispatcher, HandleSlab, PortDispatcher, Rights, Signals, WaitAsyncMode,
//! };
//! use rustux_object::sync::Deadline;
//!
//! let slab = Arc::new(HandleSlab::new(1024));
//! let event = EventDispatcher::create();
//! let handle = slab.make_handle(event.clone(), Rights::DEFAULT_EVENT)?;
//!
//! let port = PortDispatcher::create();
//! port.make_observers(WaitAsyncMode::Once, &handle, 42, Signals::SIGNALED)?;
//! event.signal(Signals::empty(), Signals::SIGNALED)?;
//!
//! let packet = port.dequeue(Deadline::infinite())?;
//! assert_eq!(packet.key, 42);
//! # Ok::<(), rustux_object::RxStatus>(())
//! ```

pub mod object;
pub mod status;
pub mod sync;
pub mod syscall;

pub use status::{RxResult, RxStatus};

#[cfg(test)]
mod tests;
