//! Loopback demo: a simulated USART whose TX line is wired to its RX line.
//!
//! Usage: `loopback [config.toml]`. `VFIFO_*` environment variables
//! override the file.

use anyhow::Context;
use board_drivers::sim::SimulatedPeripheral;
use board_drivers::{init_logging, usart, PortConfig};
use std::path::PathBuf;
use tracing::info;

const MESSAGE: &str = "The quick brown fox jumps over the lazy dog\r\n";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging()?;

    info!("=== vfifo loopback v{} ===", env!("CARGO_PKG_VERSION"));

    let path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = PortConfig::load(path.as_deref()).context("loading port configuration")?;

    let (line, peripheral) = SimulatedPeripheral::<u8>::loopback();
    let (mut port, handler) = usart::open(&config, peripheral)?;
    let irq = handler.spawn(config.word_time());

    let queued = port.write_str(MESSAGE);
    info!("Queued {}/{} bytes", queued, MESSAGE.len());

    let mut echo = Vec::with_capacity(queued);
    let received = port
        .read_until(b'\n', &mut echo, queued, config.read_timeout())
        .await;
    info!("Echoed {} bytes: {:?}", received, String::from_utf8_lossy(&echo));

    let flushed = port.flush(config.read_timeout()).await;
    let handler = irq.stop().await.context("interrupt task panicked")?;

    println!("{}", serde_json::to_string_pretty(&port.status())?);
    info!(
        "Flushed: {}, on the wire: {} bytes",
        flushed,
        line.take_transmitted().len()
    );

    let closed = port.close(handler)?;
    info!("{} closed", closed.config().name);
    Ok(())
}
