// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Per-Process Handle Table
//!
//! A process sees its handles as bare capability IDs. The table maps each
//! ID back to the [`HandleOwner`] it holds, enforces rights on lookup, and
//! implements duplicate/replace/close on top of the shared [`HandleSlab`].
//!
//! Capability IDs are unique across the whole arena, and a freed slot is
//! reissued with a new generation, so an ID that was closed (or belongs to
//! another process) simply misses the map and reports `BadHandle`.
//!
//! Owners taken out of the map are always dropped after the map lock is
//! released; deleting a handle can run zero-handles teardown, which may in
//! turn close more handles.

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;

use crate::object::dispatcher::{alloc_koid, downcast_dispatcher, Dispatcher, Koid, KOID_INVALID};
use crate::object::handle::{CapabilityId, Handle, HandleOwner, Rights};
use crate::object::handle_slab::HandleSlab;
use crate::status::{RxResult, RxStatus};
use crate::sync::SpinMutex;

/// Handles held by one process
pub struct ProcessHandleTable {
    /// Process object ID stamped into each held handle
    koid: Koid,

    /// Arena every held handle was minted from
    slab: Arc<HandleSlab>,

    /// Held handles by capability ID
    handles: SpinMutex<HashMap<CapabilityId, HandleOwner>>,
}

impl ProcessHandleTable {
    /// Create an empty table for a new process
    pub fn new(slab: Arc<HandleSlab>) -> Self {
        Self {
            koid: alloc_koid(),
            slab,
            handles: SpinMutex::new(HashMap::new()),
        }
    }

    /// Owning process ID
    pub fn koid(&self) -> Koid {
        self.koid
    }

    /// Arena handles are minted from
    pub fn slab(&self) -> &Arc<HandleSlab> {
        &self.slab
    }

    /// Number of held handles
    pub fn count(&self) -> usize {
        self.handles.lock().len()
    }

    /// Take ownership of `owner`
    ///
    /// # Panics
    ///
    /// If `owner` was minted by a different arena.
    pub fn add(&self, owner: HandleOwner) -> CapabilityId {
        assert!(
            Arc::ptr_eq(owner.slab(), &self.slab),
            "handle from a different arena added to process {}",
            self.koid
        );
        let id = owner.id();
        owner.set_process_id(self.koid);
        self.handles.lock().insert(id, owner);
        id
    }

    /// Create a handle to `dispatcher` and take ownership of it
    pub fn make(&self, dispatcher: Arc<dyn Dispatcher>, rights: Rights) -> RxResult<CapabilityId> {
        let owner = self.slab.make_handle(dispatcher, rights)?;
        Ok(self.add(owner))
    }

    /// Object and rights behind `id`
    pub fn get(&self, id: CapabilityId) -> RxResult<(Arc<dyn Dispatcher>, Rights)> {
        let handles = self.handles.lock();
        let owner = handles.get(&id).ok_or(RxStatus::BadHandle)?;
        Ok((Arc::clone(owner.dispatcher()), owner.rights()))
    }

    /// Typed object behind `id`, checked against `required` rights
    ///
    /// # Returns
    ///
    /// - `Err(RxStatus::BadHandle)` if `id` is not held
    /// - `Err(RxStatus::WrongType)` if the object is not a `T`
    /// - `Err(RxStatus::AccessDenied)` if a required right is missing
    pub fn get_dispatcher_with_rights<T: Dispatcher>(
        &self,
        id: CapabilityId,
        required: Rights,
    ) -> RxResult<Arc<T>> {
        let (dispatcher, rights) = self.get(id)?;
        let dispatcher = downcast_dispatcher::<T>(dispatcher).ok_or(RxStatus::WrongType)?;
        rights.require(required)?;
        Ok(dispatcher)
    }

    /// Run `f` on the handle behind `id` with the table locked
    ///
    /// `f` must not call back into this table.
    pub fn with_handle<R, F>(&self, id: CapabilityId, f: F) -> RxResult<R>
    where
        F: FnOnce(&Handle) -> RxResult<R>,
    {
        let handles = self.handles.lock();
        let owner = handles.get(&id).ok_or(RxStatus::BadHandle)?;
        f(owner.get())
    }

    /// Give up ownership of `id`
    pub fn remove(&self, id: CapabilityId) -> RxResult<HandleOwner> {
        let owner = self.handles.lock().remove(&id).ok_or(RxStatus::BadHandle)?;
        owner.set_process_id(KOID_INVALID);
        Ok(owner)
    }

    /// Delete the handle `id`
    pub fn close(&self, id: CapabilityId) -> RxResult<()> {
        let owner = self.remove(id)?;
        drop(owner);
        Ok(())
    }

    /// Duplicate `id` with `rights`
    ///
    /// Requires `DUPLICATE` on the source. `SAME_RIGHTS` keeps the source's
    /// rights; otherwise `rights` must be a subset of them.
    pub fn duplicate(&self, id: CapabilityId, rights: Rights) -> RxResult<CapabilityId> {
        let owner = {
            let handles = self.handles.lock();
            let source = handles.get(&id).ok_or(RxStatus::BadHandle)?;
            source.require(Rights::DUPLICATE)?;
            let rights = resolve_rights(source.rights(), rights)?;
            self.slab.dup_handle(source, rights, false)?
        };
        Ok(self.add(owner))
    }

    /// Replace `id` with a new handle carrying `rights`
    ///
    /// The source handle is deleted on success and kept on failure.
    pub fn replace(&self, id: CapabilityId, rights: Rights) -> RxResult<CapabilityId> {
        let (owner, replaced) = {
            let mut handles = self.handles.lock();
            let source = handles.get(&id).ok_or(RxStatus::BadHandle)?;
            let rights = resolve_rights(source.rights(), rights)?;
            let owner = self.slab.dup_handle(source, rights, true)?;
            (owner, handles.remove(&id))
        };
        drop(replaced);
        Ok(self.add(owner))
    }

    /// Delete every held handle
    pub fn clear(&self) {
        let handles = std::mem::take(&mut *self.handles.lock());
        if !handles.is_empty() {
            debug!("process {}: closing {} handle(s)", self.koid, handles.len());
        }
        drop(handles);
    }
}

impl Drop for ProcessHandleTable {
    fn drop(&mut self) {
        self.clear();
    }
}

impl core::fmt::Debug for ProcessHandleTable {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ProcessHandleTable")
            .field("koid", &self.koid)
            .field("count", &self.count())
            .finish()
    }
}

/// Rights for a duplicate of a handle holding `current`
fn resolve_rights(current: Rights, requested: Rights) -> RxResult<Rights> {
    if requested.contains(Rights::SAME_RIGHTS) {
        Ok(current)
    } else if current.contains(requested) {
        Ok(requested)
    } else {
        Err(RxStatus::InvalidArgs)
    }
}

// ============================================================================
// Tests
// ============================================================================
