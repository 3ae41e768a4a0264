//! Shared transport context.
//!
//! Senders and receivers in one process share a single [`Context`] so that
//! socket defaults are configured in one place and open sockets can be
//! counted. The handle is explicit and cheaply cloneable; constructors take
//! it as a parameter instead of reaching for a hidden global.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::transport::SocketOptions;

/// Process-wide transport context handle.
///
/// Create one at startup and pass clones to every [`crate::Sender`] and
/// [`crate::Receiver`]. Cloning is an `Arc` bump.
#[derive(Debug, Clone, Default)]
pub struct Context {
    inner: Arc<ContextInner>,
}

#[derive(Debug, Default)]
struct ContextInner {
    defaults: SocketOptions,
    open_sockets: AtomicUsize,
}

impl Context {
    /// Create a context with default socket options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context with custom default socket options.
    ///
    /// Sockets opened through this context start from these options; a
    /// sender/receiver config can still override them per socket.
    pub fn with_defaults(defaults: SocketOptions) -> Self {
        Self { inner: Arc::new(ContextInner { defaults, open_sockets: AtomicUsize::new(0) }) }
    }

    /// Default socket options for sockets opened through this context.
    pub fn defaults(&self) -> &SocketOptions {
        &self.inner.defaults
    }

    /// Effective options for one socket: the per-socket override when the
    /// config carries one, the context defaults otherwise.
    pub fn socket_options(&self, per_socket: Option<&SocketOptions>) -> SocketOptions {
        per_socket.unwrap_or(&self.inner.defaults).clone()
    }

    /// Number of currently open sockets attached to this context.
    pub fn open_sockets(&self) -> usize {
        self.inner.open_sockets.load(Ordering::Relaxed)
    }

    pub(crate) fn socket_opened(&self) {
        self.inner.open_sockets.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn socket_closed(&self) {
        self.inner.open_sockets.fetch_sub(1, Ordering::Relaxed);
    }
}
