// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Kernel Synchronization Primitives
//!
//! # Primitives
//!
//! - **SpinMutex**: Spin-based mutual exclusion lock for short critical sections
//! - **Semaphore**: Counting semaphore with deadline-bounded waits
//! - **Deadline**: Absolute wait deadline
//!
//! # Lock Order
//!
//! Outer to inner: handle arena, state tracker, port, observer packet,
//! semaphore. Callbacks into other objects (zero-handles, exception port
//! notification, observer removal) run with none of these held.

pub mod deadline;
pub mod semaphore;

// Re-exports
pub use deadline::Deadline;
pub use semaphore::Semaphore;
pub use spin::{Mutex as SpinMutex, MutexGuard as SpinMutexGuard};
