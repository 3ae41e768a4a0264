//! Handler registration for the receive loop.
//!
//! Handlers are registered from arbitrary tasks and dispatched synchronously
//! from the receive loop, always in the fixed order main header → data
//! header (only on change) → values. Dispatch iterates an immutable
//! snapshot, so registration never races a running dispatch.

use std::sync::{Arc, Mutex};

use crate::types::{DataHeader, MainHeader, Message};

struct Registry<T: ?Sized> {
    entries: Mutex<Vec<Arc<T>>>,
}

impl<T: ?Sized> Default for Registry<T> {
    fn default() -> Self {
        Self { entries: Mutex::new(Vec::new()) }
    }
}

impl<T: ?Sized> Registry<T> {
    fn add(&self, handler: Arc<T>) {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).push(handler);
    }

    fn snapshot(&self) -> Vec<Arc<T>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

type MainHeaderFn = dyn Fn(&MainHeader) + Send + Sync;
type DataHeaderFn = dyn Fn(&Arc<DataHeader>) + Send + Sync;
type MessageFn = dyn Fn(&Message) + Send + Sync;
type FlagFn = dyn Fn(bool) + Send + Sync;
type ConnectionFn = dyn Fn(usize) + Send + Sync;

/// Callback surface of a receiver.
#[derive(Default)]
pub struct Handlers {
    main_header: Registry<MainHeaderFn>,
    data_header: Registry<DataHeaderFn>,
    values: Registry<MessageFn>,
    idle: Registry<FlagFn>,
    inactive: Registry<FlagFn>,
    connection: Registry<ConnectionFn>,
}

impl Handlers {
    /// Fires for every received message.
    pub fn on_main_header(&self, f: impl Fn(&MainHeader) + Send + Sync + 'static) {
        self.main_header.add(Arc::new(f));
    }

    /// Fires only when the data header actually changes (new hash).
    pub fn on_data_header(&self, f: impl Fn(&Arc<DataHeader>) + Send + Sync + 'static) {
        self.data_header.add(Arc::new(f));
    }

    /// Fires with the decoded value map of every message.
    pub fn on_values(&self, f: impl Fn(&Message) + Send + Sync + 'static) {
        self.values.add(Arc::new(f));
    }

    /// Edge-triggered: fires once per idle transition, in either direction.
    pub fn on_idle(&self, f: impl Fn(bool) + Send + Sync + 'static) {
        self.idle.add(Arc::new(f));
    }

    /// Edge-triggered: fires once per inactive transition.
    pub fn on_inactive(&self, f: impl Fn(bool) + Send + Sync + 'static) {
        self.inactive.add(Arc::new(f));
    }

    /// Fires with the running connection count on every (re)connect.
    pub fn on_connection(&self, f: impl Fn(usize) + Send + Sync + 'static) {
        self.connection.add(Arc::new(f));
    }

    pub(crate) fn fire_main_header(&self, header: &MainHeader) {
        for handler in self.main_header.snapshot() {
            handler(header);
        }
    }

    pub(crate) fn fire_data_header(&self, header: &Arc<DataHeader>) {
        for handler in self.data_header.snapshot() {
            handler(header);
        }
    }

    pub(crate) fn fire_values(&self, message: &Message) {
        for handler in self.values.snapshot() {
            handler(message);
        }
    }

    pub(crate) fn fire_idle(&self, idle: bool) {
        for handler in self.idle.snapshot() {
            handler(idle);
        }
    }

    pub(crate) fn fire_inactive(&self, inactive: bool) {
        for handler in self.inactive.snapshot() {
            handler(inactive);
        }
    }

    pub(crate) fn fire_connection(&self, count: usize) {
        for handler in self.connection.snapshot() {
            handler(count);
        }
    }
}
