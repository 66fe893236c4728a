// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Counting Semaphore
//!
//! Ports use a semaphore to park threads in `dequeue` until a packet
//! arrives or their deadline passes. Each `post` releases exactly one
//! waiter (or banks one count for the next caller).
//!
//! # Usage
//!
//! ```rust
//! use rustux_object::sync::{Deadline, Semaphore};
//!
//! let sema = Semaphore::new();
//! sema.post();
//! assert!(sema.wait(Deadline::past()).is_ok());
//! assert!(sema.wait(Deadline::past()).is_err());
//! ```

use parking_lot::{Condvar, Mutex};

use crate::status::{RxResult, RxStatus};
use crate::sync::Deadline;

/// Counting semaphore with deadline-bounded waits
#[derive(Debug, Default)]
pub struct Semaphore {
    /// Banked count
    count: Mutex<u64>,

    /// Signalled once per post
    cond: Condvar,
}

impl Semaphore {
    /// Create a semaphore with a zero count
    pub const fn new() -> Self {
        Self {
            count: parking_lot::const_mutex(0),
            cond: Condvar::new(),
        }
    }

    /// Increment the count and release one waiter
    pub fn post(&self) {
        let mut count = self.count.lock();
        *count += 1;
        self.cond.notify_one();
    }

    /// Take one count, blocking until one is available or `deadline` passes
    ///
    /// # Returns
    ///
    /// - `Ok(())` if a count was taken
    /// - `Err(RxStatus::TimedOut)` if the deadline elapsed first
    pub fn wait(&self, deadline: Deadline) -> RxResult<()> {
        let mut count = self.count.lock();
        loop {
            if *count > 0 {
                *count -= 1;
                return Ok(());
            }
            match deadline {
                Deadline::Infinite => self.cond.wait(&mut count),
                Deadline::At(at) => {
                    if self.cond.wait_until(&mut count, at).timed_out() && *count == 0 {
                        return Err(RxStatus::TimedOut);
                    }
                }
            }
        }
    }

    /// Take one count without blocking
    pub fn try_wait(&self) -> bool {
        let mut count = self.count.lock();
        if *count > 0 {
            *count -= 1;
            true
        } else {
            false
        }
    }

    /// Current banked count
    pub fn count(&self) -> u64 {
        *self.count.lock()
    }
}

// ============================================================================
// Tests
// ============================================================================
