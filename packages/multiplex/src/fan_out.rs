//! Fan-out set: sends each value to exactly one ready endpoint.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crossbeam_channel::{Receiver, Select, Sender};

use crate::{AddError, Error};

/// A value that could not be delivered by [`FanOut::send`].
#[derive(thiserror::Error, PartialEq, Eq)]
pub enum SendError<T> {
    #[error("Fan-out set is closed")]
    Closed(T),
    #[error("Fan-out set has no live endpoints")]
    Disconnected(T),
}

impl<T> SendError<T> {
    /// Returns the value that failed to send.
    #[must_use]
    pub fn into_inner(self) -> T {
        match self {
            Self::Closed(value) | Self::Disconnected(value) => value,
        }
    }
}

impl<T> std::fmt::Debug for SendError<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed(_) => f.write_str("Closed(..)"),
            Self::Disconnected(_) => f.write_str("Disconnected(..)"),
        }
    }
}

struct Live<T> {
    endpoints: Vec<Sender<T>>,
    closed: bool,
}

/// A dynamic set of output endpoints.
///
/// Every [`send`](Self::send) call, including the time it spends blocked waiting for a
/// ready endpoint, is serialized through one dispatch lock. When several endpoints can
/// accept a value at once, one of them is picked uniformly at random.
///
/// The set owns the [`Sender`]s added to it, so [`close_all`](Self::close_all) closes
/// each endpoint as long as no other sender clones of it are alive elsewhere.
pub struct FanOut<T> {
    dispatch: Mutex<()>,
    live: Mutex<Live<T>>,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
}

impl<T> Default for FanOut<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> From<Vec<Sender<T>>> for FanOut<T> {
    fn from(endpoints: Vec<Sender<T>>) -> Self {
        let (wake_tx, wake_rx) = crossbeam_channel::bounded(1);

        Self {
            dispatch: Mutex::new(()),
            live: Mutex::new(Live {
                endpoints,
                closed: false,
            }),
            wake_tx,
            wake_rx,
        }
    }
}

impl<T> FanOut<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::from(vec![])
    }

    fn live(&self) -> MutexGuard<'_, Live<T>> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds an endpoint to the live set.
    ///
    /// Safe to call while other threads are blocked in [`send`](Self::send); a blocked
    /// send rescans and may deliver to the new endpoint.
    ///
    /// # Errors
    ///
    /// * If the set has already been closed. The endpoint is handed back.
    pub fn add(&self, endpoint: Sender<T>) -> Result<(), AddError<Sender<T>>> {
        let mut live = self.live();
        if live.closed {
            return Err(AddError::Closed(endpoint));
        }
        live.endpoints.push(endpoint);
        drop(live);

        // A full wake slot already guarantees a rescan.
        let _ = self.wake_tx.try_send(());

        Ok(())
    }

    /// Blocks until exactly one live endpoint accepts `value`.
    ///
    /// Endpoints whose receivers have all been dropped are removed from the set when a
    /// delivery to them fails, and the value is offered to the remaining endpoints.
    ///
    /// Only a send that is already waiting on at least one endpoint picks up endpoints
    /// added later. A set with no endpoints fails immediately instead of waiting for an
    /// [`add`](Self::add).
    ///
    /// # Errors
    ///
    /// * If the set has been closed
    /// * If the set has no live endpoints left
    pub fn send(&self, value: T) -> Result<(), SendError<T>> {
        let _dispatch = self.dispatch.lock().unwrap_or_else(PoisonError::into_inner);
        let mut value = value;

        loop {
            let snapshot = {
                let live = self.live();
                if live.closed {
                    return Err(SendError::Closed(value));
                }
                if live.endpoints.is_empty() {
                    return Err(SendError::Disconnected(value));
                }
                live.endpoints.clone()
            };

            let mut select = Select::new();
            for endpoint in &snapshot {
                select.send(endpoint);
            }
            let wake = select.recv(&self.wake_rx);

            let oper = select.select();
            let index = oper.index();

            if index == wake {
                let _ = oper.recv(&self.wake_rx);
                continue;
            }

            match oper.send(&snapshot[index], value) {
                Ok(()) => return Ok(()),
                Err(crossbeam_channel::SendError(returned)) => {
                    log::debug!("send: endpoint {index} has no receivers, removing it");
                    self.remove(&snapshot[index]);
                    value = returned;
                }
            }
        }
    }

    fn remove(&self, endpoint: &Sender<T>) {
        let mut live = self.live();
        if let Some(position) = live
            .endpoints
            .iter()
            .position(|x| x.same_channel(endpoint))
        {
            live.endpoints.swap_remove(position);
        }
    }

    /// Closes every live endpoint by dropping the senders held by this set.
    ///
    /// Waits for an in-flight [`send`](Self::send) to finish first. Must only be called
    /// once all producers have stopped sending.
    ///
    /// # Errors
    ///
    /// * If the set was already closed
    pub fn close_all(&self) -> Result<usize, Error> {
        let endpoints = {
            let _dispatch = self.dispatch.lock().unwrap_or_else(PoisonError::into_inner);
            let mut live = self.live();

            if live.closed {
                return Err(Error::AlreadyClosed);
            }

            live.closed = true;
            std::mem::take(&mut live.endpoints)
        };

        let count = endpoints.len();
        drop(endpoints);

        log::debug!("close_all: closed {count} endpoint(s)");

        Ok(count)
    }

    /// Number of live endpoints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live().endpoints.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.live().closed
    }

    /// Snapshot of the live endpoints.
    ///
    /// The returned senders are clones, so holding on to them keeps those endpoints open
    /// after [`close_all`](Self::close_all).
    #[must_use]
    pub fn endpoints(&self) -> Vec<Sender<T>> {
        self.live().endpoints.clone()
    }
}
