//! Driver Error Types

use thiserror::Error;
use vfifo::FifoError;

/// Errors raised while configuring, opening or closing a port
#[derive(Debug, Error)]
pub enum DriverError {
    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration loaded but unusable
    #[error("Invalid port configuration: {0}")]
    InvalidConfig(String),

    /// Ring buffer storage rejected
    #[error("Ring buffer error: {0}")]
    Fifo(#[from] FifoError),

    /// Port handle and interrupt handler were opened separately
    #[error("Port handle and interrupt handler belong to different ports")]
    ForeignHalves,
}

impl From<config::ConfigError> for DriverError {
    fn from(err: config::ConfigError) -> Self {
        DriverError::Config(err.to_string())
    }
}
