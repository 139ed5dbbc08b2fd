//! Fan-out/fan-in multiplexing over a dynamic set of channels.
//!
//! [`FanOut`] delivers each value to exactly one of its endpoints that is ready to accept
//! it, and [`FanIn`] yields values from whichever of its endpoints has one, dropping
//! endpoints once they are closed and drained. Both sets can grow while other threads are
//! blocked on them.
//!
//! On top of the two sets sit worker pools ([`ProducerPool`], [`TransformPool`],
//! [`ConsumerPool`]) and a chainable [`Pipeline`] that wires them together.
//!
//! # Example
//!
//! ```rust
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! use switchy_multiplex::{Capacity, OutputConfig, Pipeline, PipelineConfig};
//!
//! # fn main() -> Result<(), switchy_multiplex::Error> {
//! let total = AtomicUsize::new(0);
//! let total = std::sync::Arc::new(total);
//!
//! Pipeline::<usize>::new(PipelineConfig::default())
//!     .produce(OutputConfig::new(2, Capacity::Bounded(4)), |_worker, out| {
//!         for i in 0..10 {
//!             if out.send(i).is_err() {
//!                 break;
//!             }
//!         }
//!     })?
//!     .process(OutputConfig::default(), |value: usize, out| {
//!         let _ = out.send(value * 2);
//!     })?
//!     .consume_and_wait({
//!         let total = total.clone();
//!         move |value| {
//!             total.fetch_add(value, Ordering::SeqCst);
//!         }
//!     })?;
//!
//! let producers = PipelineConfig::default().producers;
//! assert_eq!(total.load(Ordering::SeqCst), producers * 90);
//! # Ok(())
//! # }
//! ```

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

pub mod config;
pub mod endpoint;
pub mod fan_in;
pub mod fan_out;
pub mod pipeline;
pub mod pool;
mod worker;

pub use config::{ConfigError, OutputConfig, PipelineConfig};
pub use crossbeam_channel::{Receiver, Sender};
pub use endpoint::{Capacity, channel, channels};
pub use fan_in::FanIn;
pub use fan_out::{FanOut, SendError};
pub use pipeline::{Pipeline, PipelineHandle};
pub use pool::{ConsumerPool, ProducerPool, TransformPool};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Pipeline must start with a producer")]
    NotStarted,
    #[error("Already started")]
    AlreadyStarted,
    #[error("Fan-out set is already closed")]
    AlreadyClosed,
    #[error("Invalid config: {0}")]
    InvalidConfig(&'static str),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("{count} worker(s) panicked in stage '{stage}'")]
    WorkerPanicked { stage: String, count: usize },
}

/// Rejection of an endpoint passed to [`FanOut::add`] or [`FanIn::add`].
///
/// The rejected endpoint is handed back to the caller.
#[derive(thiserror::Error)]
pub enum AddError<E> {
    #[error("Fan-out set is closed")]
    Closed(E),
    #[error("Fan-in set is exhausted")]
    Exhausted(E),
}

impl<E> AddError<E> {
    /// Returns the endpoint that was rejected.
    #[must_use]
    pub fn into_inner(self) -> E {
        match self {
            Self::Closed(endpoint) | Self::Exhausted(endpoint) => endpoint,
        }
    }
}

impl<E> std::fmt::Debug for AddError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed(_) => f.write_str("Closed(..)"),
            Self::Exhausted(_) => f.write_str("Exhausted(..)"),
        }
    }
}
