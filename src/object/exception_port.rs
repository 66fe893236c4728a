// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Exception Port Binding
//!
//! An exception port is a binding from some exception source to a
//! [`PortDispatcher`]. The port keeps a link to every binding that targets
//! it; when the port loses its last handle it tells each binding to let go
//! before draining.

use std::sync::Arc;

use log::debug;

use crate::object::dispatcher::Dispatcher;
use crate::object::port::PortDispatcher;
use crate::status::RxResult;
use crate::sync::SpinMutex;

/// Something the port notifies when it closes
pub trait ExceptionPortLink: Send + Sync {
    /// The port lost its last handle
    ///
    /// Called with no port lock held; may call back into the port.
    fn on_port_zero_handles(&self);
}

/// Binding to a port
pub struct ExceptionPort {
    /// Key for packets this binding would deliver
    key: u64,

    /// Bound port, cleared on unbind
    port: SpinMutex<Option<Arc<PortDispatcher>>>,
}

impl ExceptionPort {
    /// Bind to `port`
    ///
    /// # Returns
    ///
    /// - `Err(RxStatus::BadState)` if the port is already closing
    pub fn bind(port: &Arc<PortDispatcher>, key: u64) -> RxResult<Arc<Self>> {
        let eport = Arc::new(Self {
            key,
            port: SpinMutex::new(Some(Arc::clone(port))),
        });
        port.link_exception_port(eport.clone())?;
        debug!("exception port bound to port {}, key {}", port.koid(), key);
        Ok(eport)
    }

    /// Detach from the port
    ///
    /// Returns whether the binding was still attached.
    pub fn unbind(&self) -> bool {
        let port = self.port.lock().take();
        match port {
            Some(port) => {
                port.unlink_exception_port(self);
                true
            }
            None => false,
        }
    }

    /// Whether the binding still holds its port
    pub fn is_bound(&self) -> bool {
        self.port.lock().is_some()
    }

    /// Packet key
    pub fn key(&self) -> u64 {
        self.key
    }
}

impl ExceptionPortLink for ExceptionPort {
    fn on_port_zero_handles(&self) {
        let port = self.port.lock().take();
        if let Some(port) = port {
            debug!("exception port unbound: port {} closed", port.koid());
        }
    }
}

impl core::fmt::Debug for ExceptionPort {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ExceptionPort")
            .field("key", &self.key)
            .field("bound", &self.is_bound())
            .finish()
    }
}
