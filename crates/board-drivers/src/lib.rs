//! Board Drivers
//!
//! Interrupt-driven USART and SPI ports. Each port stages received and
//! outgoing words in a pair of [`vfifo`] rings: the interrupt handler moves
//! one word per firing between the rings and the peripheral's data register,
//! and the task side reads and writes whole buffers with a timeout.
//!
//! Real hardware plugs in through the [`Peripheral`] trait; [`sim`] provides
//! a software peripheral for tests and host-side demos.

pub mod config;
pub mod error;
pub mod peripheral;
pub mod port;
pub mod sim;
pub mod spi;
pub mod usart;

pub use config::{PortConfig, PortMode};
pub use error::DriverError;
pub use peripheral::Peripheral;
pub use port::{open, ClosedPort, InterruptHandler, InterruptTask, PortHandle, PortStatus};

use tracing::subscriber::SetGlobalDefaultError;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Install the global fmt subscriber at INFO
pub fn init_logging() -> Result<(), SetGlobalDefaultError> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
}
