//! Notification of finished exchanges
//!
//! Listeners are notified in the order they were registered. Every listener is
//! notified of every event; what a listener returns is only reported back to
//! the caller, it never stops the notification of the listeners after it.

use heapless::Vec;

use crate::{config::Role, frame::Frame};

/// How many listeners can be registered with one handler set
pub const MAX_LISTENERS: usize = 4;

/// An exchange that ran to completion
///
/// Holds the two timestamp sets needed to compute the time of flight. Both
/// are complete on either side of the exchange.
#[derive(Clone, Copy, Debug)]
pub struct Completed<'a> {
    /// The side of the exchange this node was on
    pub role: Role,

    /// The first round trip
    ///
    /// `request_timestamp`/`response_timestamp` are requester time,
    /// `reception_timestamp`/`transmission_timestamp` responder time.
    pub first: &'a Frame,

    /// The second round trip
    ///
    /// `request_timestamp`/`response_timestamp` are responder time,
    /// `reception_timestamp`/`transmission_timestamp` requester time.
    pub second: &'a Frame,
}

/// Gets told when an exchange ends
pub trait Listener {
    /// An exchange ran to completion
    ///
    /// Returns whether the listener made use of the result.
    fn complete(&mut self, _exchange: &Completed) -> bool {
        false
    }

    /// An exchange was aborted because a transmission could not be scheduled
    fn start_tx_error(&mut self) -> bool {
        false
    }
}

/// The listeners registered with a handler set
#[derive(Default)]
pub struct Listeners<'l> {
    list: Vec<&'l mut dyn Listener, MAX_LISTENERS>,
}

impl<'l> Listeners<'l> {
    /// Creates an empty registry
    pub fn new() -> Self {
        Listeners { list: Vec::new() }
    }

    /// Adds a listener after the ones already registered
    ///
    /// Hands the listener back if the registry is full.
    pub fn register(&mut self, listener: &'l mut dyn Listener) -> Result<(), &'l mut dyn Listener> {
        self.list.push(listener)
    }

    /// Number of registered listeners
    pub fn len(&self) -> usize {
        self.list.len()
    }

    /// Whether no listener is registered
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Tells every listener about a completed exchange
    ///
    /// Returns how many listeners made use of it.
    pub fn complete(&mut self, exchange: &Completed) -> usize {
        let mut used = 0;
        for listener in self.list.iter_mut() {
            if listener.complete(exchange) {
                used += 1;
            }
        }
        used
    }

    /// Tells every listener about an aborted exchange
    pub fn start_tx_error(&mut self) -> usize {
        let mut used = 0;
        for listener in self.list.iter_mut() {
            if listener.start_tx_error() {
                used += 1;
            }
        }
        used
    }
}
