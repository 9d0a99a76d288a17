//! USART front end: byte-wide ports

use crate::config::PortConfig;
use crate::error::DriverError;
use crate::peripheral::Peripheral;
use crate::port::{self, deadline_after, time_left, InterruptHandler, PortHandle};
use std::time::Duration;

/// Task side of a USART
pub type UsartHandle = PortHandle<u8>;

/// Interrupt side of a USART
pub type UsartInterrupt<P> = InterruptHandler<u8, P>;

/// Open a USART with self-allocated rings
pub fn open<P: Peripheral<u8>>(
    config: &PortConfig,
    peripheral: P,
) -> Result<(UsartHandle, UsartInterrupt<P>), DriverError> {
    port::open(config, peripheral)
}

impl PortHandle<u8> {
    /// Queue a string for transmission, returns bytes queued
    pub fn write_str(&mut self, text: &str) -> usize {
        self.write(text.as_bytes())
    }

    /// Append bytes to `out` until `delimiter` (included), `max` bytes or
    /// `timeout`, whichever comes first. Returns bytes appended.
    pub async fn read_until(
        &mut self,
        delimiter: u8,
        out: &mut Vec<u8>,
        max: usize,
        timeout: Duration,
    ) -> usize {
        let deadline = deadline_after(timeout);
        let start = out.len();
        let mut byte = [0u8; 1];

        while out.len() - start < max {
            let left = time_left(deadline);
            if self.read(&mut byte, left).await == 0 {
                break;
            }
            out.push(byte[0]);
            if byte[0] == delimiter {
                break;
            }
        }
        out.len() - start
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedPeripheral;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_read_until_stops_at_delimiter() {
        let (line, periph) = SimulatedPeripheral::<u8>::new();
        let (mut port, handler) = open(&PortConfig::console(), periph).unwrap();
        let irq = handler.spawn(Duration::from_millis(1));
        line.inject(b"AT\r\nOK\r\n");

        let mut reply = Vec::new();
        assert_eq!(port.read_until(b'\n', &mut reply, 64, Duration::MAX).await, 4);
        assert_eq!(reply, b"AT\r\n");
        assert_eq!(port.read_until(b'\n', &mut reply, 64, Duration::from_secs(1)).await, 4);
        assert_eq!(reply, b"AT\r\nOK\r\n");

        irq.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_until_respects_max_and_timeout() {
        let (line, periph) = SimulatedPeripheral::<u8>::new();
        let (mut port, handler) = open(&PortConfig::console(), periph).unwrap();
        let irq = handler.spawn(Duration::from_millis(1));
        line.inject(b"abcdef");

        let mut out = Vec::new();
        assert_eq!(port.read_until(b'\n', &mut out, 3, Duration::from_secs(1)).await, 3);
        assert_eq!(out, b"abc");

        out.clear();
        let start = Instant::now();
        assert_eq!(port.read_until(b'\n', &mut out, 64, Duration::from_millis(30)).await, 3);
        assert_eq!(out, b"def");
        assert!(start.elapsed() >= Duration::from_millis(30));

        irq.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_str_goes_out_on_the_wire() {
        let (line, periph) = SimulatedPeripheral::<u8>::new();
        let (mut port, handler) = open(&PortConfig::console(), periph).unwrap();
        let irq = handler.spawn(Duration::from_millis(1));

        assert_eq!(port.write_str("hello\r\n"), 7);
        assert!(port.flush(Duration::from_secs(1)).await);
        assert_eq!(line.take_transmitted(), b"hello\r\n");

        irq.stop().await.unwrap();
    }
}
