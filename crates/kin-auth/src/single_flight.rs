//! At most one outstanding exchange, shared by every concurrent caller.

use futures::FutureExt as _;
use futures::future::{BoxFuture, Shared};

pub type SharedFlight<T> = Shared<BoxFuture<'static, T>>;

/// The in-flight slot.
///
/// Set synchronously before the first await and cleared by the flight itself
/// when it settles. Each flight gets an id so a flight that was detached (by
/// logout) cannot clear its successor.
pub struct InFlightSlot<T: Clone> {
    current: Option<(u64, SharedFlight<T>)>,
    next_id: u64,
}

impl<T: Clone + Send + Sync + 'static> InFlightSlot<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            current: None,
            next_id: 0,
        }
    }

    /// The pending flight, if any.
    #[must_use]
    pub fn current(&self) -> Option<SharedFlight<T>> {
        self.current.as_ref().map(|(_, flight)| flight.clone())
    }

    /// Join the pending flight, or start one built by `start(id)`.
    ///
    /// Returns the flight and whether this call started it.
    pub fn join_or_start<F>(&mut self, start: F) -> (SharedFlight<T>, bool)
    where
        F: FnOnce(u64) -> BoxFuture<'static, T>,
    {
        if let Some(flight) = self.current() {
            return (flight, false);
        }
        let id = self.next_id;
        self.next_id += 1;
        let flight = start(id).shared();
        self.current = Some((id, flight.clone()));
        (flight, true)
    }

    /// Clear the slot if it still holds flight `id`.
    pub fn settle(&mut self, id: u64) -> bool {
        if self.current.as_ref().is_some_and(|(current, _)| *current == id) {
            self.current = None;
            true
        } else {
            false
        }
    }

    /// Forget the pending flight without cancelling callers already awaiting it.
    pub fn detach(&mut self) -> bool {
        self.current.take().is_some()
    }

    #[must_use]
    pub const fn is_occupied(&self) -> bool {
        self.current.is_some()
    }
}

impl<T: Clone + Send + Sync + 'static> Default for InFlightSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}
