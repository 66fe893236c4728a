// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Object Signals
//!
//! Every observable object exposes a 32-bit signal word. The low bits are
//! object-specific, bit 23 tracks single-handle ownership, and the top
//! eight bits are free for user code.

use bitflags::bitflags;

bitflags! {
    /// Observable signal state of an object
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Signals: u32 {
        const READABLE = 1 << 0;
        const WRITABLE = 1 << 1;
        const PEER_CLOSED = 1 << 2;
        const SIGNALED = 1 << 3;

        /// Exactly one handle references the object
        const LAST_HANDLE = 1 << 23;

        const USER_0 = 1 << 24;
        const USER_1 = 1 << 25;
        const USER_2 = 1 << 26;
        const USER_3 = 1 << 27;
        const USER_4 = 1 << 28;
        const USER_5 = 1 << 29;
        const USER_6 = 1 << 30;
        const USER_7 = 1 << 31;

        const USER_ALL = 0xff << 24;
    }
}
