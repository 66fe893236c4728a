// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! System Call Interface
//!
//! Typed entry points for the handle and port syscalls, each operating on
//! the calling process's [`ProcessHandleTable`], plus a raw dispatcher for
//! the calls whose arguments are all scalars.
//!
//! # Rights
//!
//! | Syscall | Required rights |
//! |---------|-----------------|
//! | `object_signal` | `SIGNAL` |
//! | `object_wait_async` | `WAIT` on the object, `WRITE` on the port |
//! | `port_queue` | `WRITE` |
//! | `port_wait` | `READ` |
//! | `port_cancel` | `WRITE` on the port |
//! | `handle_duplicate` | `DUPLICATE` |
//!
//! # Error Return Convention
//!
//! ```text
//! Success: return value (positive or zero)
//! Failure: return negative error code
//! ```

use std::sync::Arc;

use log::trace;

use crate::object::{
    CapabilityId, EventDispatcher, PortDispatcher, PortPacketData, ProcessHandleTable, Rights,
    Signals, WaitAsyncMode,
};
use crate::status::{RxResult, RxStatus};
use crate::sync::Deadline;

// ============================================================================
// Common Syscall Types
// ============================================================================

/// Syscall return type
pub type SyscallRet = isize;

/// System call arguments
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct SyscallArgs {
    /// Syscall number
    pub number: u32,

    /// Arguments (up to 6)
    pub args: [usize; 6],
}

impl SyscallArgs {
    /// Create new syscall arguments
    pub const fn new(number: u32, args: [usize; 6]) -> Self {
        Self { number, args }
    }

    /// Get argument at index
    pub const fn arg(&self, index: usize) -> usize {
        if index < 6 {
            self.args[index]
        } else {
            0
        }
    }

    /// Get argument as u32
    pub const fn arg_u32(&self, index: usize) -> u32 {
        self.arg(index) as u32
    }

    /// Get argument as u64
    pub const fn arg_u64(&self, index: usize) -> u64 {
        self.arg(index) as u64
    }

    /// Get argument as a capability ID
    pub const fn arg_handle(&self, index: usize) -> CapabilityId {
        CapabilityId::from_raw(self.arg_u32(index))
    }
}

/// Convert error code to negative return value
#[inline]
pub const fn err_to_ret(err: RxStatus) -> SyscallRet {
    err.into_raw() as SyscallRet
}

/// Convert success value to return value
#[inline]
pub const fn ok_to_ret(val: usize) -> SyscallRet {
    val as SyscallRet
}

fn handle_to_ret(result: RxResult<CapabilityId>) -> SyscallRet {
    match result {
        Ok(id) => ok_to_ret(id.into_raw() as usize),
        Err(err) => err_to_ret(err),
    }
}

fn unit_to_ret(result: RxResult<()>) -> SyscallRet {
    match result {
        Ok(()) => ok_to_ret(0),
        Err(err) => err_to_ret(err),
    }
}

/// ============================================================================
/// Events & Signals
/// ============================================================================

/// Create an event
pub fn sys_event_create(table: &ProcessHandleTable, options: u32) -> RxResult<CapabilityId> {
    if options != 0 {
        return Err(RxStatus::InvalidArgs);
    }
    table.make(EventDispatcher::create(), Rights::DEFAULT_EVENT)
}

/// Clear then set signals on an event
pub fn sys_object_signal(
    table: &ProcessHandleTable,
    handle: CapabilityId,
    clear_mask: u32,
    set_mask: u32,
) -> RxResult<()> {
    let event = table.get_dispatcher_with_rights::<EventDispatcher>(handle, Rights::SIGNAL)?;
    let clear = Signals::from_bits(clear_mask).ok_or(RxStatus::InvalidArgs)?;
    let set = Signals::from_bits(set_mask).ok_or(RxStatus::InvalidArgs)?;
    event.signal(clear, set)
}

/// ============================================================================
/// Ports
/// ============================================================================

/// Create a port
pub fn sys_port_create(table: &ProcessHandleTable, options: u32) -> RxResult<CapabilityId> {
    if options != 0 {
        return Err(RxStatus::InvalidArgs);
    }
    table.make(PortDispatcher::create(), Rights::DEFAULT_PORT)
}

/// Queue a user packet
pub fn sys_port_queue(
    table: &ProcessHandleTable,
    port: CapabilityId,
    key: u64,
    data: &[u8],
) -> RxResult<()> {
    let port = table.get_dispatcher_with_rights::<PortDispatcher>(port, Rights::WRITE)?;
    port.queue_user(key, data)
}

/// Wait for the next packet
///
/// The table is not locked while waiting.
pub fn sys_port_wait(
    table: &ProcessHandleTable,
    port: CapabilityId,
    deadline: Deadline,
) -> RxResult<PortPacketData> {
    let port = table.get_dispatcher_with_rights::<PortDispatcher>(port, Rights::READ)?;
    port.dequeue(deadline)
}

/// Cancel the wait `source` registered on `port` under `key`
pub fn sys_port_cancel(
    table: &ProcessHandleTable,
    port: CapabilityId,
    source: CapabilityId,
    key: u64,
) -> RxResult<()> {
    let port = table.get_dispatcher_with_rights::<PortDispatcher>(port, Rights::WRITE)?;
    table.with_handle(source, |handle| port.cancel(handle, key))
}

/// Ask for a packet on `port` when `object` asserts any of `signals`
pub fn sys_object_wait_async(
    table: &ProcessHandleTable,
    object: CapabilityId,
    port: CapabilityId,
    key: u64,
    signals: u32,
    options: u32,
) -> RxResult<()> {
    let mode = WaitAsyncMode::try_from(options)?;
    let port: Arc<PortDispatcher> = table.get_dispatcher_with_rights(port, Rights::WRITE)?;
    let signals = Signals::from_bits(signals).ok_or(RxStatus::InvalidArgs)?;
    table.with_handle(object, |handle| {
        handle.require(Rights::WAIT)?;
        port.make_observers(mode, handle, key, signals)
    })
}

/// ============================================================================
/// Handles
/// ============================================================================

/// Duplicate a handle
pub fn sys_handle_duplicate(
    table: &ProcessHandleTable,
    handle: CapabilityId,
    rights: u32,
) -> RxResult<CapabilityId> {
    let rights = Rights::from_bits(rights).ok_or(RxStatus::InvalidArgs)?;
    table.duplicate(handle, rights)
}

/// Replace a handle with one carrying `rights`
pub fn sys_handle_replace(
    table: &ProcessHandleTable,
    handle: CapabilityId,
    rights: u32,
) -> RxResult<CapabilityId> {
    let rights = Rights::from_bits(rights).ok_or(RxStatus::InvalidArgs)?;
    table.replace(handle, rights)
}

/// Close a handle; closing `CapabilityId::INVALID` is a no-op
pub fn sys_handle_close(table: &ProcessHandleTable, handle: CapabilityId) -> RxResult<()> {
    if handle == CapabilityId::INVALID {
        return Ok(());
    }
    table.close(handle)
}

/// ============================================================================
/// Syscall Dispatcher
/// ============================================================================

/// Dispatch a raw syscall for `table`'s process
///
/// Calls that move packets through user memory (`PORT_QUEUE`, `PORT_WAIT`)
/// have no scalar form and report `NotSupported` here.
pub fn syscall_dispatch(table: &ProcessHandleTable, args: SyscallArgs) -> SyscallRet {
    trace!("syscall {:#x} from process {}", args.number, table.koid());

    match args.number {
        number::HANDLE_CLOSE => unit_to_ret(sys_handle_close(table, args.arg_handle(0))),
        number::HANDLE_DUPLICATE => {
            handle_to_ret(sys_handle_duplicate(table, args.arg_handle(0), args.arg_u32(1)))
        }
        number::HANDLE_REPLACE => {
            handle_to_ret(sys_handle_replace(table, args.arg_handle(0), args.arg_u32(1)))
        }
        number::EVENT_CREATE => handle_to_ret(sys_event_create(table, args.arg_u32(0))),
        number::OBJECT_SIGNAL => unit_to_ret(sys_object_signal(
            table,
            args.arg_handle(0),
            args.arg_u32(1),
            args.arg_u32(2),
        )),
        number::OBJECT_WAIT_ASYNC => unit_to_ret(sys_object_wait_async(
            table,
            args.arg_handle(0),
            args.arg_handle(1),
            args.arg_u64(2),
            args.arg_u32(3),
            args.arg_u32(4),
        )),
        number::PORT_CREATE => handle_to_ret(sys_port_create(table, args.arg_u32(0))),
        number::PORT_CANCEL => unit_to_ret(sys_port_cancel(
            table,
            args.arg_handle(0),
            args.arg_handle(1),
            args.arg_u64(2),
        )),
        _ => err_to_ret(RxStatus::NotSupported),
    }
}

/// ============================================================================
/// Syscall Numbers
/// ============================================================================

/// System call numbers
pub mod number {
    /// Handles (0x07, 0x30-0x3F)
    pub const HANDLE_CLOSE: u32 = 0x07;
    pub const HANDLE_DUPLICATE: u32 = 0x31;
    pub const HANDLE_REPLACE: u32 = 0x33;

    /// IPC & Sync (0x20-0x2F)
    pub const EVENT_CREATE: u32 = 0x23;
    pub const OBJECT_SIGNAL: u32 = 0x25;
    pub const OBJECT_WAIT_ASYNC: u32 = 0x28;
    pub const PORT_CREATE: u32 = 0x29;
    pub const PORT_QUEUE: u32 = 0x2A;
    pub const PORT_WAIT: u32 = 0x2B;
    pub const PORT_CANCEL: u32 = 0x2C;

    /// Maximum defined syscall number
    pub const MAX_SYSCALL: u32 = 0x33;
}
