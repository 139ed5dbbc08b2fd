//! Endpoint construction.
//!
//! An endpoint is a `crossbeam-channel` channel. Its writing half ([`Sender`]) is owned by
//! whoever produces into it, usually a [`FanOut`](crate::FanOut); its reading half
//! ([`Receiver`]) is handed to the next stage. The endpoint is closed once every sender
//! has been dropped, and receivers keep yielding buffered values until it is drained.

use crossbeam_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};

/// Buffering of a single endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capacity {
    /// Rendezvous endpoint: a send completes only once a receiver takes the value.
    #[default]
    Unbuffered,
    /// Holds up to `n` values before senders block.
    Bounded(usize),
    /// Never blocks senders.
    Unbounded,
}

impl From<usize> for Capacity {
    fn from(value: usize) -> Self {
        match value {
            0 => Self::Unbuffered,
            n => Self::Bounded(n),
        }
    }
}

/// Creates a single endpoint with the given buffering.
#[must_use]
pub fn channel<T>(capacity: Capacity) -> (Sender<T>, Receiver<T>) {
    match capacity {
        Capacity::Unbuffered => crossbeam_channel::bounded(0),
        Capacity::Bounded(n) => crossbeam_channel::bounded(n),
        Capacity::Unbounded => crossbeam_channel::unbounded(),
    }
}

/// Creates `count` endpoints, returning their senders and receivers in matching order.
#[must_use]
pub fn channels<T>(count: usize, capacity: Capacity) -> (Vec<Sender<T>>, Vec<Receiver<T>>) {
    (0..count).map(|_| channel(capacity)).unzip()
}
