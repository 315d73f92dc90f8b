//! Limits and sizes shared by the reactor, its connections and their ways.

use std::time::Duration;

use thiserror::Error;

const DEFAULT_BUFFER_CAPACITY: usize = 8 * 1024;
const MIN_BUFFER_CAPACITY: usize = 64;
const DEFAULT_MAX_HEADER_BYTES: usize = 8 * 1024;
const DEFAULT_MAX_HEADER_NUM: usize = 64;
const DEFAULT_MAX_ENTITY_SIZE: u64 = 8 * 1024 * 1024;
const DEFAULT_BLOCKING_WORKERS: usize = 4;
const DEFAULT_BLOCKING_READ_SIZE: usize = 8 * 1024;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("buffer capacity {capacity} is smaller than {min}")]
    BufferTooSmall { capacity: usize, min: usize },

    #[error("{name} must not be zero")]
    Zero { name: &'static str },
}

/// Configuration of a [`Reactor`](crate::reactor::Reactor).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    buffer_capacity: usize,
    max_header_bytes: usize,
    max_header_num: usize,
    max_entity_size: u64,
    blocking_workers: usize,
    blocking_read_size: usize,
    idle_timeout: Option<Duration>,
}

impl TransportConfig {
    pub fn builder() -> TransportConfigBuilder {
        TransportConfigBuilder { config: TransportConfig::default() }
    }

    /// Capacity of the byte buffer of every way.
    pub fn buffer_capacity(&self) -> usize {
        self.buffer_capacity
    }

    /// Limit on the start line plus all header lines of one inbound message.
    pub fn max_header_bytes(&self) -> usize {
        self.max_header_bytes
    }

    pub fn max_header_num(&self) -> usize {
        self.max_header_num
    }

    /// Limit on the body of one inbound message.
    pub fn max_entity_size(&self) -> u64 {
        self.max_entity_size
    }

    pub fn blocking_workers(&self) -> usize {
        self.blocking_workers
    }

    pub fn blocking_read_size(&self) -> usize {
        self.blocking_read_size
    }

    /// How long a connection may go without moving a byte before it is closed.
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            max_header_bytes: DEFAULT_MAX_HEADER_BYTES,
            max_header_num: DEFAULT_MAX_HEADER_NUM,
            max_entity_size: DEFAULT_MAX_ENTITY_SIZE,
            blocking_workers: DEFAULT_BLOCKING_WORKERS,
            blocking_read_size: DEFAULT_BLOCKING_READ_SIZE,
            idle_timeout: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransportConfigBuilder {
    config: TransportConfig,
}

impl TransportConfigBuilder {
    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.config.buffer_capacity = capacity;
        self
    }

    pub fn max_header_bytes(mut self, max: usize) -> Self {
        self.config.max_header_bytes = max;
        self
    }

    pub fn max_header_num(mut self, max: usize) -> Self {
        self.config.max_header_num = max;
        self
    }

    pub fn max_entity_size(mut self, max: u64) -> Self {
        self.config.max_entity_size = max;
        self
    }

    pub fn blocking_workers(mut self, workers: usize) -> Self {
        self.config.blocking_workers = workers;
        self
    }

    pub fn blocking_read_size(mut self, size: usize) -> Self {
        self.config.blocking_read_size = size;
        self
    }

    pub fn idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    pub fn build(self) -> Result<TransportConfig, ConfigError> {
        let config = self.config;

        if config.buffer_capacity < MIN_BUFFER_CAPACITY {
            return Err(ConfigError::BufferTooSmall { capacity: config.buffer_capacity, min: MIN_BUFFER_CAPACITY });
        }

        let non_zero = [
            ("max_header_bytes", config.max_header_bytes),
            ("max_header_num", config.max_header_num),
            ("blocking_workers", config.blocking_workers),
            ("blocking_read_size", config.blocking_read_size),
        ];
        if let Some((name, _)) = non_zero.into_iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Zero { name });
        }

        Ok(config)
    }
}
