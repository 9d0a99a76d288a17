//! Port configuration

use crate::error::DriverError;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Environment variable prefix read by [`PortConfig::load`]
pub const ENV_PREFIX: &str = "VFIFO";

/// Largest ring a port may ask for, per direction
pub const MAX_BUFFER_SLOTS: usize = 1 << 20;

/// Which directions of the port are in use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortMode {
    /// Receive only
    Rx,
    /// Transmit only
    Tx,
    /// Full duplex
    RxTx,
}

impl PortMode {
    /// Receive interrupt is serviced in this mode
    pub fn receives(self) -> bool {
        matches!(self, PortMode::Rx | PortMode::RxTx)
    }

    /// Writes are accepted in this mode
    pub fn transmits(self) -> bool {
        matches!(self, PortMode::Tx | PortMode::RxTx)
    }
}

/// Port configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortConfig {
    /// Label used in logs and metrics
    pub name: String,

    /// Directions in use
    pub mode: PortMode,

    /// Usable slots in each of the RX and TX rings
    pub buffer_slots: usize,

    /// Line rate in bits per second
    pub baud_rate: u32,

    /// Default read timeout (milliseconds)
    pub read_timeout_ms: u64,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            name: "usart1".to_string(),
            mode: PortMode::RxTx,
            buffer_slots: 128,
            baud_rate: 115_200,
            read_timeout_ms: 1000,
        }
    }
}

impl PortConfig {
    /// Console-style port: small rings, slow line
    pub fn console() -> Self {
        Self {
            buffer_slots: 64,
            baud_rate: 9600,
            ..Default::default()
        }
    }

    /// SPI bus port: deep rings, fast clock, short timeout
    pub fn spi() -> Self {
        Self {
            name: "spi1".to_string(),
            buffer_slots: 512,
            baud_rate: 8_000_000,
            read_timeout_ms: 100,
            ..Default::default()
        }
    }

    /// Load from an optional file plus `VFIFO_*` environment variables.
    ///
    /// Fields missing from both sources keep their defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, DriverError> {
        Self::load_with_prefix(path, ENV_PREFIX)
    }

    /// Like [`PortConfig::load`] with a custom environment prefix
    pub fn load_with_prefix(path: Option<&Path>, prefix: &str) -> Result<Self, DriverError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            debug!("Loading port configuration from {}", path.display());
            builder = builder.add_source(File::from(path));
        }
        builder = builder.add_source(
            Environment::with_prefix(prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: PortConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings a port cannot run with
    pub fn validate(&self) -> Result<(), DriverError> {
        if self.buffer_slots == 0 {
            return Err(DriverError::InvalidConfig(format!(
                "{}: buffer_slots must be at least 1",
                self.name
            )));
        }
        if self.buffer_slots > MAX_BUFFER_SLOTS {
            return Err(DriverError::InvalidConfig(format!(
                "{}: buffer_slots must be at most {}, got {}",
                self.name, MAX_BUFFER_SLOTS, self.buffer_slots
            )));
        }
        if self.baud_rate == 0 {
            return Err(DriverError::InvalidConfig(format!(
                "{}: baud_rate must be non-zero",
                self.name
            )));
        }
        Ok(())
    }

    /// Default read timeout
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Time on the wire for one 10-bit frame (start, 8 data, stop)
    pub fn word_time(&self) -> Duration {
        Duration::from_nanos(10 * 1_000_000_000 / u64::from(self.baud_rate.max(1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(PortConfig::default().validate().is_ok());
        assert!(PortConfig::console().validate().is_ok());
        assert!(PortConfig::spi().validate().is_ok());
    }

    #[test]
    fn test_zero_slots_rejected() {
        let config = PortConfig {
            buffer_slots: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(DriverError::InvalidConfig(_))));
    }

    #[test]
    fn test_oversized_rings_rejected() {
        let config = PortConfig {
            buffer_slots: MAX_BUFFER_SLOTS,
            ..Default::default()
        };
        assert!(config.validate().is_ok());

        for buffer_slots in [MAX_BUFFER_SLOTS + 1, usize::MAX] {
            let config = PortConfig {
                buffer_slots,
                ..Default::default()
            };
            assert!(matches!(config.validate(), Err(DriverError::InvalidConfig(_))));
        }
    }

    #[test]
    fn test_word_time() {
        let config = PortConfig {
            baud_rate: 10_000,
            ..Default::default()
        };
        assert_eq!(config.word_time(), Duration::from_millis(1));
    }

    #[test]
    fn test_mode_directions() {
        assert!(PortMode::Rx.receives() && !PortMode::Rx.transmits());
        assert!(!PortMode::Tx.receives() && PortMode::Tx.transmits());
        assert!(PortMode::RxTx.receives() && PortMode::RxTx.transmits());
    }

    #[test]
    fn test_load_from_file_keeps_missing_defaults() {
        let path = std::env::temp_dir().join(format!("vfifo-port-{}.toml", std::process::id()));
        std::fs::write(&path, "name = \"uart4\"\nbuffer_slots = 32\nmode = \"rx\"\n").unwrap();

        let config = PortConfig::load_with_prefix(Some(&path), "VFIFO_TEST_FILE").unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.name, "uart4");
        assert_eq!(config.buffer_slots, 32);
        assert_eq!(config.mode, PortMode::Rx);
        assert_eq!(config.baud_rate, PortConfig::default().baud_rate);
    }

    #[test]
    fn test_load_from_environment() {
        std::env::set_var("VFIFO_TEST_ENV_BAUD_RATE", "9600");
        std::env::set_var("VFIFO_TEST_ENV_READ_TIMEOUT_MS", "250");

        let config = PortConfig::load_with_prefix(None, "VFIFO_TEST_ENV").unwrap();
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.read_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let path = std::env::temp_dir().join(format!("vfifo-bad-{}.toml", std::process::id()));
        std::fs::write(&path, "buffer_slots = 0\n").unwrap();

        let result = PortConfig::load_with_prefix(Some(&path), "VFIFO_TEST_BAD");
        std::fs::remove_file(&path).ok();
        assert!(matches!(result, Err(DriverError::InvalidConfig(_))));
    }
}
