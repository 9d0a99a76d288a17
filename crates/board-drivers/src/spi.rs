//! SPI front end: 16-bit frames, full duplex
//!
//! Every word clocked out clocks one word in, so a transfer writes the TX
//! words and then reads back the same number of RX words.

use crate::config::PortConfig;
use crate::error::DriverError;
use crate::peripheral::Peripheral;
use crate::port::{self, deadline_after, time_left, InterruptHandler, PortHandle};
use std::time::Duration;

/// Task side of an SPI port
pub type SpiHandle = PortHandle<u16>;

/// Interrupt side of an SPI port
pub type SpiInterrupt<P> = InterruptHandler<u16, P>;

/// Open an SPI port with self-allocated rings
pub fn open<P: Peripheral<u16>>(
    config: &PortConfig,
    peripheral: P,
) -> Result<(SpiHandle, SpiInterrupt<P>), DriverError> {
    port::open(config, peripheral)
}

impl PortHandle<u16> {
    /// Clock out `tx` and collect the words clocked in.
    ///
    /// Transfers `min(tx.len(), rx.len())` words, feeding the TX ring in
    /// chunks when it is smaller than the transfer. Returns words received.
    pub async fn transfer(&mut self, tx: &[u16], rx: &mut [u16], timeout: Duration) -> usize {
        let deadline = deadline_after(timeout);
        let want = tx.len().min(rx.len());
        let mut sent = 0;
        let mut received = 0;

        while received < want {
            if sent < want {
                sent += self.write(&tx[sent..want]);
            }
            let left = time_left(deadline);
            let n = self.read(&mut rx[received..sent], left).await;
            if n == 0 {
                break;
            }
            received += n;
        }
        received
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedPeripheral;

    #[tokio::test(start_paused = true)]
    async fn test_transfer_over_loopback() {
        let (_line, periph) = SimulatedPeripheral::<u16>::loopback();
        let (mut port, handler) = open(&PortConfig::spi(), periph).unwrap();
        let irq = handler.spawn(Duration::from_millis(1));

        let tx = [0x0102, 0xbeef, 0xffff];
        let mut rx = [0u16; 3];
        assert_eq!(port.transfer(&tx, &mut rx, Duration::MAX).await, 3);
        assert_eq!(rx, tx);

        irq.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_transfer_larger_than_rings() {
        let config = PortConfig {
            buffer_slots: 4,
            ..PortConfig::spi()
        };
        let (line, periph) = SimulatedPeripheral::<u16>::loopback();
        let (mut port, handler) = open(&config, periph).unwrap();
        let irq = handler.spawn(Duration::from_millis(1));

        let tx: Vec<u16> = (0..10).map(|i| i * 0x101).collect();
        let mut rx = vec![0u16; 10];
        assert_eq!(port.transfer(&tx, &mut rx, Duration::from_secs(1)).await, 10);
        assert_eq!(rx, tx);
        assert_eq!(line.take_transmitted(), tx);
        assert_eq!(port.overruns(), 0);

        irq.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_transfer_times_out_without_clock() {
        let (_line, periph) = SimulatedPeripheral::<u16>::new();
        let (mut port, _handler) = open(&PortConfig::spi(), periph).unwrap();

        let mut rx = [0u16; 2];
        assert_eq!(port.transfer(&[1, 2], &mut rx, Duration::from_millis(10)).await, 0);
    }
}
