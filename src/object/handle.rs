// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Handle & Rights Model
//!
//! This module implements the capability-based handle system.
//! All kernel resources are accessed through handles with rights,
//! ensuring fine-grained access control.
//!
//! # Design
//!
//! - **Handles**: Capability tokens referencing kernel objects
//! - **Rights**: Bitmask specifying permitted operations
//! - **Capability IDs**: Packed (generation, slot index) values minted by
//!   the [`HandleSlab`]; a stale ID never aliases a newer handle
//! - **Ownership**: A live handle is owned by exactly one [`HandleOwner`];
//!   dropping the owner deletes the handle
//!
//! # Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use rustux_object::object::{EventDispatcher, HandleSlab, Rights};
//!
//! let slab = Arc::new(HandleSlab::new(64));
//! let handle = slab.make_handle(EventDispatcher::create(), Rights::READ | Rights::WRITE)?;
//! handle.require(Rights::READ)?;
//! # Ok::<(), rustux_object::RxStatus>(())
//! ```

use core::fmt;
use core::ops::Deref;
use core::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bitflags::bitflags;

use crate::object::dispatcher::{Dispatcher, Koid, ObjectType, KOID_INVALID};
use crate::object::handle_slab::HandleSlab;
use crate::status::{RxResult, RxStatus};

// ============================================================================
// Handle Rights
// ============================================================================

bitflags! {
    /// Handle rights bitmask
    ///
    /// Rights are permissions that control what operations can be performed
    /// on a kernel object through a handle.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Rights: u32 {
        const DUPLICATE = 1 << 0;
        const TRANSFER = 1 << 1;
        const READ = 1 << 2;
        const WRITE = 1 << 3;
        const EXECUTE = 1 << 4;
        const MAP = 1 << 5;
        const GET_PROPERTY = 1 << 6;
        const SET_PROPERTY = 1 << 7;
        const ENUMERATE = 1 << 8;
        const DESTROY = 1 << 9;
        const SET_POLICY = 1 << 10;
        const GET_POLICY = 1 << 11;
        const SIGNAL = 1 << 12;
        const SIGNAL_PEER = 1 << 13;
        const WAIT = 1 << 14;
        const INSPECT = 1 << 15;

        /// Keep same rights on dup; never stored in a handle
        const SAME_RIGHTS = 1 << 31;
    }
}

impl Rights {
    /// Basic rights (TRANSFER | DUPLICATE | WAIT | INSPECT)
    pub const BASIC: Self = Self::TRANSFER
        .union(Self::DUPLICATE)
        .union(Self::WAIT)
        .union(Self::INSPECT);

    /// Read/write on an object's state
    pub const IO: Self = Self::READ.union(Self::WRITE);

    /// Default rights for a new event handle
    pub const DEFAULT_EVENT: Self = Self::BASIC.union(Self::SIGNAL);

    /// Default rights for a new port handle
    pub const DEFAULT_PORT: Self = Self::TRANSFER
        .union(Self::DUPLICATE)
        .union(Self::IO)
        .union(Self::INSPECT);

    /// Require specific rights
    ///
    /// # Returns
    ///
    /// - Ok(()) if all rights are present
    /// - Err(RxStatus::AccessDenied) if any right is missing
    pub fn require(self, required: Self) -> RxResult<()> {
        if self.contains(required) {
            Ok(())
        } else {
            Err(RxStatus::AccessDenied)
        }
    }
}

/// ============================================================================
/// Capability ID
/// ============================================================================

/// Packed handle identity: reserved bits, generation, slot index
///
/// The layout is defined by the [`HandleSlab`] that minted the value; see
/// [`HandleSlab::id_for`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CapabilityId(u32);

impl CapabilityId {
    /// Never minted by any slab
    pub const INVALID: Self = Self(0);

    /// Create from raw value
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Get raw value
    pub const fn into_raw(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for CapabilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CapabilityId({:#010x})", self.0)
    }
}

/// ============================================================================
/// Handle
/// ============================================================================

/// Handle to a kernel object
///
/// A handle is a capability token that references a kernel object
/// and specifies what operations are permitted on it.
pub struct Handle {
    /// Referenced object
    dispatcher: Arc<dyn Dispatcher>,

    /// Rights mask
    rights: Rights,

    /// Capability ID of the slot this handle occupies
    base_value: CapabilityId,

    /// Process whose handle table holds this handle
    process_id: AtomicU64,
}

impl Handle {
    pub(crate) fn new(dispatcher: Arc<dyn Dispatcher>, rights: Rights, base_value: CapabilityId) -> Self {
        Self {
            dispatcher,
            rights,
            base_value,
            process_id: AtomicU64::new(KOID_INVALID),
        }
    }

    /// Referenced object
    pub fn dispatcher(&self) -> &Arc<dyn Dispatcher> {
        &self.dispatcher
    }

    /// Get the rights for this handle
    pub fn rights(&self) -> Rights {
        self.rights
    }

    /// Get handle capability ID
    pub fn id(&self) -> CapabilityId {
        self.base_value
    }

    /// Owning process, or `KOID_INVALID` if not in any process table
    pub fn process_id(&self) -> Koid {
        self.process_id.load(Ordering::Acquire)
    }

    /// Record the owning process
    pub fn set_process_id(&self, process_id: Koid) {
        self.process_id.store(process_id, Ordering::Release);
    }

    /// Get the object type for this handle
    pub fn object_type(&self) -> ObjectType {
        self.dispatcher.object_type()
    }

    /// Check if handle has specific rights
    pub fn has_rights(&self, rights: Rights) -> bool {
        self.rights.contains(rights)
    }

    /// Require specific rights
    pub fn require(&self, required: Rights) -> RxResult<()> {
        self.rights.require(required)
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("id", &self.base_value)
            .field("koid", &self.dispatcher.koid())
            .field("type", &self.object_type())
            .field("rights", &self.rights)
            .finish()
    }
}

/// ============================================================================
/// Handle Owner
/// ============================================================================

/// Owned handle that auto-deletes on drop
///
/// This is a RAII wrapper that returns the handle's slot to the arena
/// (and releases its dispatcher reference) when it goes out of scope.
pub struct HandleOwner {
    /// The owned handle; `None` only during drop
    handle: Option<Handle>,

    /// Arena the handle's slot belongs to
    slab: Arc<HandleSlab>,
}

impl HandleOwner {
    pub(crate) fn new(handle: Handle, slab: Arc<HandleSlab>) -> Self {
        Self {
            handle: Some(handle),
            slab,
        }
    }

    /// Get the underlying handle
    pub fn get(&self) -> &Handle {
        match &self.handle {
            Some(handle) => handle,
            None => unreachable!("handle owner used after delete"),
        }
    }

    /// Arena the handle lives in
    pub fn slab(&self) -> &Arc<HandleSlab> {
        &self.slab
    }
}

impl Deref for HandleOwner {
    type Target = Handle;

    fn deref(&self) -> &Handle {
        self.get()
    }
}

impl Drop for HandleOwner {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.slab.destroy_handle(handle);
        }
    }
}

impl fmt::Debug for HandleOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("HandleOwner").field(&self.handle).finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::EventDispatcher;

    #[test]
    fn test_rights_basic() {
        let rights = Rights::READ | Rights::WRITE;

        assert!(rights.contains(Rights::READ));
        assert!(rights.contains(Rights::WRITE));
        assert!(!rights.contains(Rights::EXECUTE));

        let combined = rights | Rights::EXECUTE;
        assert!(combined.contains(Rights::EXECUTE));

        let removed = combined - Rights::READ;
        assert!(!removed.contains(Rights::READ));
        assert!(removed.contains(Rights::WRITE));
    }

    #[test]
    fn test_rights_require() {
        let rights = Rights::READ | Rights::WRITE;

        assert!(rights.require(Rights::READ).is_ok());
        assert!(rights.require(Rights::WRITE).is_ok());
        assert_eq!(rights.require(Rights::EXECUTE), Err(RxStatus::AccessDenied));
    }

    #[test]
    fn test_rights_zircon_values() {
        assert_eq!(Rights::DUPLICATE.bits(), 0x1);
        assert_eq!(Rights::WAIT.bits(), 0x4000);
        assert_eq!(Rights::SAME_RIGHTS.bits(), 0x8000_0000);
        assert!(!Rights::DEFAULT_PORT.contains(Rights::SAME_RIGHTS));
    }

    #[test]
    fn test_handle_basic() {
        let slab = Arc::new(HandleSlab::new(16));
        let event = EventDispatcher::create();
        let handle = slab.make_handle(event.clone(), Rights::READ | Rights::WRITE).unwrap();

        assert_eq!(handle.object_type(), ObjectType::Event);
        assert!(handle.has_rights(Rights::READ));
        assert!(!handle.has_rights(Rights::SIGNAL));
        assert_eq!(handle.dispatcher().koid(), event.koid());
        assert_eq!(handle.process_id(), KOID_INVALID);

        handle.set_process_id(42);
        assert_eq!(handle.process_id(), 42);
    }

    #[test]
    fn test_handle_owner_drop_deletes() {
        let slab = Arc::new(HandleSlab::new(16));
        let event = EventDispatcher::create();

        {
            let _owner = slab.make_handle(event.clone(), Rights::DEFAULT_EVENT).unwrap();
            assert_eq!(event.handle_count(), 1);
            assert_eq!(slab.outstanding(), 1);
        } // owner is dropped here, deleting the handle

        assert_eq!(event.handle_count(), 0);
        assert_eq!(slab.outstanding(), 0);
        assert_eq!(event.zero_handles_calls(), 1);
    }
}
