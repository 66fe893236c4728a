// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Status Codes
//!
//! Every recoverable failure in the object layer is reported as an
//! [`RxStatus`]. The raw values are bit-compatible with the Zircon
//! `zx_status_t` codes so they can cross the syscall boundary unchanged.
//!
//! Kernel invariant violations (double free, handle count underflow,
//! reclaiming an observer twice) are not statuses: they panic.

use thiserror::Error;

/// Result type using RxStatus
pub type RxResult<T> = Result<T, RxStatus>;

/// Status return type
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RxStatus {
    /// The object cannot be used for the requested operation
    #[error("operation not supported")]
    NotSupported,

    /// The handle arena (or another bounded pool) is exhausted
    #[error("no memory")]
    NoMemory,

    /// Malformed argument
    #[error("invalid arguments")]
    InvalidArgs,

    /// Handle value does not name a live handle
    #[error("bad handle")]
    BadHandle,

    /// Handle names an object of the wrong type
    #[error("wrong object type")]
    WrongType,

    /// Object is not in a state that permits the operation
    #[error("bad state")]
    BadState,

    /// Deadline elapsed
    #[error("timed out")]
    TimedOut,

    /// Temporarily unable to proceed; try again later
    #[error("should wait")]
    ShouldWait,

    /// Nothing matched the request
    #[error("not found")]
    NotFound,

    /// The resource is already bound to another user
    #[error("already bound")]
    AlreadyBound,

    /// Handle lacks a required right
    #[error("access denied")]
    AccessDenied,
}

impl RxStatus {
    /// Raw status value (Zircon numbering, always negative)
    pub const fn into_raw(self) -> i32 {
        match self {
            Self::NotSupported => -2,
            Self::NoMemory => -4,
            Self::InvalidArgs => -10,
            Self::BadHandle => -11,
            Self::WrongType => -12,
            Self::BadState => -20,
            Self::TimedOut => -21,
            Self::ShouldWait => -22,
            Self::NotFound => -25,
            Self::AlreadyBound => -27,
            Self::AccessDenied => -30,
        }
    }

    /// Create from raw value
    ///
    /// Returns `None` for `0` (success) and for codes this layer never produces.
    pub const fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            -2 => Some(Self::NotSupported),
            -4 => Some(Self::NoMemory),
            -10 => Some(Self::InvalidArgs),
            -11 => Some(Self::BadHandle),
            -12 => Some(Self::WrongType),
            -20 => Some(Self::BadState),
            -21 => Some(Self::TimedOut),
            -22 => Some(Self::ShouldWait),
            -25 => Some(Self::NotFound),
            -27 => Some(Self::AlreadyBound),
            -30 => Some(Self::AccessDenied),
            _ => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_codes_are_zircon_compatible() {
        assert_eq!(RxStatus::NoMemory.into_raw(), -4);
        assert_eq!(RxStatus::BadState.into_raw(), -20);
        assert_eq!(RxStatus::TimedOut.into_raw(), -21);
        assert_eq!(RxStatus::AlreadyBound.into_raw(), -27);
    }

    #[test]
    fn test_from_raw() {
        for status in [
            RxStatus::NotSupported,
            RxStatus::NoMemory,
            RxStatus::InvalidArgs,
            RxStatus::BadHandle,
            RxStatus::WrongType,
            RxStatus::BadState,
            RxStatus::TimedOut,
            RxStatus::ShouldWait,
            RxStatus::NotFound,
            RxStatus::AlreadyBound,
            RxStatus::AccessDenied,
        ] {
            assert_eq!(RxStatus::from_raw(status.into_raw()), Some(status));
        }
        assert_eq!(RxStatus::from_raw(0), None);
        assert_eq!(RxStatus::from_raw(-999), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(RxStatus::NotSupported.to_string(), "operation not supported");
    }
}
