//! Pipeline and stage configuration.

use std::num::ParseIntError;

use serde::{Deserialize, Serialize};

use crate::{Capacity, Error};

pub const PRODUCERS_ENV: &str = "MULTIPLEX_PRODUCERS";
pub const TRANSFORMERS_ENV: &str = "MULTIPLEX_TRANSFORMERS";
pub const CONSUMERS_ENV: &str = "MULTIPLEX_CONSUMERS";

const DEFAULT_WORKERS: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid number in {name}: {source}")]
    InvalidNumber {
        name: &'static str,
        source: ParseIntError,
    },
}

/// Worker counts for each kind of pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub producers: usize,
    pub transformers: usize,
    pub consumers: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            producers: DEFAULT_WORKERS,
            transformers: DEFAULT_WORKERS,
            consumers: DEFAULT_WORKERS,
        }
    }
}

fn default_env_usize(name: &'static str, default: usize) -> Result<usize, ConfigError> {
    std::env::var(name).map_or(Ok(default), |value| {
        value
            .trim()
            .parse()
            .map_err(|source| ConfigError::InvalidNumber { name, source })
    })
}

impl PipelineConfig {
    #[must_use]
    pub const fn new(producers: usize, transformers: usize, consumers: usize) -> Self {
        Self {
            producers,
            transformers,
            consumers,
        }
    }

    /// Reads worker counts from `MULTIPLEX_PRODUCERS`, `MULTIPLEX_TRANSFORMERS` and
    /// `MULTIPLEX_CONSUMERS`, using the defaults for unset variables.
    ///
    /// # Errors
    ///
    /// * If a set variable is not a valid number
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        Ok(Self {
            producers: default_env_usize(PRODUCERS_ENV, defaults.producers)?,
            transformers: default_env_usize(TRANSFORMERS_ENV, defaults.transformers)?,
            consumers: default_env_usize(CONSUMERS_ENV, defaults.consumers)?,
        })
    }

    /// # Errors
    ///
    /// * If any worker count is zero
    pub const fn validate(&self) -> Result<(), Error> {
        if self.producers == 0 || self.transformers == 0 || self.consumers == 0 {
            return Err(Error::InvalidConfig("every stage needs at least one worker"));
        }
        Ok(())
    }
}

/// Output endpoints created by a producing or transforming stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub endpoints: usize,
    pub capacity: Capacity,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            endpoints: 1,
            capacity: Capacity::Unbuffered,
        }
    }
}

impl OutputConfig {
    #[must_use]
    pub const fn new(endpoints: usize, capacity: Capacity) -> Self {
        Self {
            endpoints,
            capacity,
        }
    }

    /// # Errors
    ///
    /// * If `endpoints` is zero
    pub const fn validate(&self) -> Result<(), Error> {
        if self.endpoints == 0 {
            return Err(Error::InvalidConfig("a stage needs at least one output endpoint"));
        }
        Ok(())
    }
}
