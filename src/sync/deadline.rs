// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Wait Deadlines

use std::time::{Duration, Instant};

/// Absolute deadline for a blocking wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deadline {
    /// Wait forever
    Infinite,

    /// Give up at this instant
    At(Instant),
}

impl Deadline {
    /// Never expires
    pub const fn infinite() -> Self {
        Self::Infinite
    }

    /// Expires `timeout` from now
    pub fn after(timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(at) => Self::At(at),
            None => Self::Infinite,
        }
    }

    /// Expires at `at`
    pub const fn at(at: Instant) -> Self {
        Self::At(at)
    }

    /// Already expired; turns a wait into a poll
    pub fn past() -> Self {
        Self::At(Instant::now())
    }

    /// Check whether the deadline has elapsed
    pub fn has_expired(&self) -> bool {
        match self {
            Self::Infinite => false,
            Self::At(at) => Instant::now() >= *at,
        }
    }
}
