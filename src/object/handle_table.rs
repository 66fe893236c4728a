// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Handle Lifecycle
//!
//! `make_handle`, `dup_handle` and `delete_handle` tie together the arena,
//! the handle value, and the dispatcher's handle count.
//!
//! The handle count is only ever changed while the arena lock is held, so
//! the transitions that drive the `LAST_HANDLE` signal (0 -> 1 and 2 -> 1
//! set it, 1 -> 2 clears it) are seen in the same order as slot allocation
//! and free. The zero-handles callback
//! runs after the arena lock is released, because tearing an object down
//! may delete further handles.

use std::sync::Arc;

use log::trace;

use crate::object::dispatcher::Dispatcher;
use crate::object::handle::{Handle, HandleOwner, Rights};
use crate::object::handle_slab::HandleSlab;
use crate::status::{RxResult, RxStatus};

impl HandleSlab {
    /// Create a handle to `dispatcher` with `rights`
    ///
    /// # Returns
    ///
    /// - The owning handle on success
    /// - `Err(RxStatus::NoMemory)` if the arena is full
    pub fn make_handle(
        self: &Arc<Self>,
        dispatcher: Arc<dyn Dispatcher>,
        rights: Rights,
    ) -> RxResult<HandleOwner> {
        self.insert_handle(dispatcher, rights, true)
    }

    /// Create a second handle to the object `source` refers to
    ///
    /// `is_replace` marks the first half of a replace: the caller is about
    /// to delete `source`, so the object is not flagged as multiply held.
    ///
    /// # Panics
    ///
    /// If `rights` is not a subset of the source handle's rights; callers
    /// validate user-supplied rights before getting here.
    pub fn dup_handle(
        self: &Arc<Self>,
        source: &Handle,
        rights: Rights,
        is_replace: bool,
    ) -> RxResult<HandleOwner> {
        assert!(
            source.rights().contains(rights),
            "dup_handle: rights {:?} exceed source rights {:?}",
            rights,
            source.rights()
        );
        self.insert_handle(Arc::clone(source.dispatcher()), rights, !is_replace)
    }

    /// Delete a handle
    ///
    /// Equivalent to dropping the owner.
    pub fn delete_handle(&self, handle: HandleOwner) {
        drop(handle);
    }

    fn insert_handle(
        self: &Arc<Self>,
        dispatcher: Arc<dyn Dispatcher>,
        rights: Rights,
        notify_multiple: bool,
    ) -> RxResult<HandleOwner> {
        assert!(
            !rights.contains(Rights::SAME_RIGHTS),
            "SAME_RIGHTS must be resolved before creating a handle"
        );

        let handle = {
            let mut state = self.lock();
            let slot = self.allocate_locked(&mut state).ok_or(RxStatus::NoMemory)?;
            let id = self.id_for_locked(&state, slot);

            let count = dispatcher.base().inc_handle_count();
            if count == 1 || (count == 2 && notify_multiple) {
                if let Some(tracker) = dispatcher.state_tracker() {
                    tracker.update_last_handle_signal(count);
                }
            }

            Handle::new(dispatcher, rights, id)
        };

        trace!("handle {:?} created for koid {}", handle.id(), handle.dispatcher().koid());
        Ok(HandleOwner::new(handle, Arc::clone(self)))
    }

    /// Tear down a handle; reached from `HandleOwner::drop`
    pub(crate) fn destroy_handle(&self, handle: Handle) {
        let dispatcher = Arc::clone(handle.dispatcher());
        let id = handle.id();

        if let Some(tracker) = dispatcher.state_tracker() {
            tracker.cancel(id);
        }

        let zero_handles = {
            let mut state = self.lock();
            let slot = self
                .lookup_locked(&state, id)
                .unwrap_or_else(|| panic!("delete of stale handle {:?}", id));
            self.free_locked(&mut state, slot);

            let count = dispatcher.base().dec_handle_count();
            if count == 1 {
                if let Some(tracker) = dispatcher.state_tracker() {
                    tracker.update_last_handle_signal(count);
                }
            }
            count == 0
        };

        drop(handle);
        trace!("handle {:?} deleted", id);

        if zero_handles {
            dispatcher.on_zero_handles();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
