//! Interrupt-Driven Port
//!
//! A port owns one RX ring and one TX ring. The [`InterruptHandler`] is the
//! producer of the RX ring and the consumer of the TX ring; the task-side
//! [`PortHandle`] holds the opposite halves. Neither side takes a lock: the
//! handler moves one word per firing, and the task side blocks (with a
//! timeout) on a notification the handler raises once enough words arrived.

use crate::config::PortConfig;
use crate::error::DriverError;
use crate::peripheral::Peripheral;
use metrics::{counter, Counter};
use serde::Serialize;
use std::sync::atomic::{fence, AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Notify};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use std::future::Future;
use vfifo::{reunite, Backing, Consumer, FifoError, Occupancy, Producer, RingBuffer};

/// Upper bound on interrupts serviced per tick of a spawned interrupt source
const MAX_BURST: usize = 1024;

/// Deadline `timeout` from now, or `None` when it lies beyond what an
/// `Instant` can represent (wait forever).
pub(crate) fn deadline_after(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}

/// Time left until `deadline`; `Duration::MAX` when there is none
pub(crate) fn time_left(deadline: Option<Instant>) -> Duration {
    match deadline {
        Some(deadline) => deadline.saturating_duration_since(Instant::now()),
        None => Duration::MAX,
    }
}

/// Await `future` until `deadline`. Returns `None` if the deadline passed first.
async fn until<F: Future>(deadline: Option<Instant>, future: F) -> Option<F::Output> {
    match deadline {
        Some(deadline) => time::timeout_at(deadline, future).await.ok(),
        None => Some(future.await),
    }
}

/// State shared between the handler and the task side
struct PortSignals {
    name: String,
    /// Receive interrupt enabled
    rx_enabled: AtomicBool,
    /// Transmit interrupt enabled; doubles as the "sending" flag
    tx_active: AtomicBool,
    /// Words a blocked reader still waits for (0 = nobody waiting)
    rx_expect: AtomicUsize,
    rx_ready: Notify,
    tx_idle: Notify,
    overruns: AtomicU64,
    overrun_counter: Counter,
}

impl PortSignals {
    fn new(config: &PortConfig) -> Self {
        Self {
            name: config.name.clone(),
            rx_enabled: AtomicBool::new(config.mode.receives()),
            tx_active: AtomicBool::new(false),
            rx_expect: AtomicUsize::new(0),
            rx_ready: Notify::new(),
            tx_idle: Notify::new(),
            overruns: AtomicU64::new(0),
            overrun_counter: counter!(
                "board_drivers_rx_overruns_total",
                "port" => config.name.clone()
            ),
        }
    }
}

/// Snapshot of a port's rings and flags
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortStatus {
    pub name: String,
    pub rx: Occupancy,
    pub tx: Occupancy,
    pub sending: bool,
    pub overruns: u64,
}

/// Open a port with self-allocated rings of `config.buffer_slots` each.
pub fn open<W, P>(
    config: &PortConfig,
    peripheral: P,
) -> Result<(PortHandle<W>, InterruptHandler<W, P>), DriverError>
where
    W: Copy + Default + 'static,
    P: Peripheral<W>,
{
    Ok(ClosedPort::new(config.clone(), peripheral)?.reopen())
}

/// A port that is not running: rings are empty, interrupts are off
pub struct ClosedPort<W: Copy + 'static, P> {
    config: PortConfig,
    peripheral: P,
    rx: RingBuffer<'static, W>,
    tx: RingBuffer<'static, W>,
}

impl<W: Copy + Default + 'static, P> ClosedPort<W, P> {
    /// Validate `config` and allocate both rings
    pub fn new(config: PortConfig, peripheral: P) -> Result<Self, DriverError> {
        config.validate()?;
        Ok(Self {
            rx: RingBuffer::try_new(config.buffer_slots)?,
            tx: RingBuffer::try_new(config.buffer_slots)?,
            config,
            peripheral,
        })
    }

    /// Validate `config` and build both rings over caller-placed storage.
    ///
    /// Each storage slice needs `config.buffer_slots + 1` elements.
    pub fn with_storage(
        config: PortConfig,
        peripheral: P,
        rx_storage: &'static mut [W],
        tx_storage: &'static mut [W],
    ) -> Result<Self, DriverError> {
        config.validate()?;
        let slots = config
            .buffer_slots
            .checked_add(1)
            .ok_or(FifoError::CapacityOverflow {
                requested: config.buffer_slots,
            })?;
        Ok(Self {
            rx: RingBuffer::init(slots, Backing::Borrowed(rx_storage))?,
            tx: RingBuffer::init(slots, Backing::Borrowed(tx_storage))?,
            config,
            peripheral,
        })
    }
}

impl<W: Copy + 'static, P> ClosedPort<W, P> {
    /// Start the port: enable the receive interrupt (if the mode receives)
    /// and hand out the two sides.
    pub fn reopen(self) -> (PortHandle<W>, InterruptHandler<W, P>) {
        let signals = Arc::new(PortSignals::new(&self.config));
        let (rx_producer, rx_consumer) = self.rx.split();
        let (tx_producer, tx_consumer) = self.tx.split();

        info!(
            "{}: opened ({} slots per direction, {:?})",
            self.config.name,
            rx_consumer.capacity(),
            self.config.mode
        );

        let handle = PortHandle {
            config: self.config,
            rx: rx_consumer,
            tx: tx_producer,
            signals: Arc::clone(&signals),
            reported_overruns: 0,
        };
        let handler = InterruptHandler {
            peripheral: self.peripheral,
            rx: rx_producer,
            tx: tx_consumer,
            signals,
        };
        (handle, handler)
    }

    /// Port configuration
    pub fn config(&self) -> &PortConfig {
        &self.config
    }

    /// Give the peripheral back
    pub fn into_peripheral(self) -> P {
        self.peripheral
    }
}

/// Task-side half of an open port
pub struct PortHandle<W: Copy + 'static> {
    config: PortConfig,
    rx: Consumer<'static, W>,
    tx: Producer<'static, W>,
    signals: Arc<PortSignals>,
    reported_overruns: u64,
}

impl<W: Copy + 'static> PortHandle<W> {
    /// Queue as many of `words` as fit in the TX ring and start the
    /// transmit interrupt. Returns how many were queued; never blocks.
    pub fn write(&mut self, words: &[W]) -> usize {
        if words.is_empty() {
            return 0;
        }
        if !self.config.mode.transmits() {
            debug!("{}: write ignored, port is receive-only", self.signals.name);
            return 0;
        }

        let queued = self.tx.put_block(words);
        if queued > 0 {
            self.signals.tx_active.store(true, Ordering::Release);
        }
        queued
    }

    /// Read up to `buf.len()` words, waiting at most `timeout` for them.
    ///
    /// Returns as soon as `buf` is full; on timeout returns whatever arrived.
    /// A zero timeout only drains what is already buffered; `Duration::MAX`
    /// waits until `buf` is full.
    pub async fn read(&mut self, buf: &mut [W], timeout: Duration) -> usize {
        if buf.is_empty() {
            return 0;
        }

        let deadline = deadline_after(timeout);
        let mut received = self.rx.get_block(buf);

        while received < buf.len() {
            let remaining = buf.len() - received;
            self.signals.rx_expect.store(remaining, Ordering::SeqCst);
            // Pairs with the fence in `on_rx_ready`: either the handler sees
            // the new threshold, or this side sees the words it queued.
            fence(Ordering::SeqCst);

            if self.rx.used_slots() >= remaining || self.rx.is_full() {
                self.signals.rx_expect.store(0, Ordering::Relaxed);
            } else if until(deadline, self.signals.rx_ready.notified())
                .await
                .is_none()
            {
                self.signals.rx_expect.store(0, Ordering::Relaxed);
                received += self.rx.get_block(&mut buf[received..]);
                debug!(
                    "{}: read timed out with {}/{} words",
                    self.signals.name,
                    received,
                    buf.len()
                );
                break;
            }

            received += self.rx.get_block(&mut buf[received..]);
        }

        self.report_overruns();
        received
    }

    /// Read with the configured default timeout
    pub async fn read_default(&mut self, buf: &mut [W]) -> usize {
        let timeout = self.config.read_timeout();
        self.read(buf, timeout).await
    }

    /// Wait until the transmit interrupt has drained the TX ring.
    ///
    /// Returns `false` if it was still sending when `timeout` expired.
    pub async fn flush(&self, timeout: Duration) -> bool {
        let deadline = deadline_after(timeout);
        loop {
            let idle = self.signals.tx_idle.notified();
            tokio::pin!(idle);
            idle.as_mut().enable();

            if !self.is_sending() {
                return true;
            }
            if until(deadline, idle).await.is_none() {
                return !self.is_sending();
            }
        }
    }

    /// Words waiting in the RX ring
    pub fn bytes_waiting(&self) -> usize {
        self.rx.used_slots()
    }

    /// Free slots in the TX ring
    pub fn tx_free(&self) -> usize {
        self.tx.free_slots()
    }

    /// Transmit interrupt is running
    pub fn is_sending(&self) -> bool {
        self.signals.tx_active.load(Ordering::Acquire)
    }

    /// Received words dropped because the RX ring was full
    pub fn overruns(&self) -> u64 {
        self.signals.overruns.load(Ordering::Relaxed)
    }

    /// Port name
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Port configuration
    pub fn config(&self) -> &PortConfig {
        &self.config
    }

    /// Snapshot of both rings and flags
    pub fn status(&self) -> PortStatus {
        PortStatus {
            name: self.config.name.clone(),
            rx: self.rx.occupancy(),
            tx: self.tx.occupancy(),
            sending: self.is_sending(),
            overruns: self.overruns(),
        }
    }

    /// Stop the port and reset both rings.
    ///
    /// Takes both halves so that nothing can touch the rings while they are
    /// reset. Unread and unsent words are discarded.
    pub fn close<P>(self, handler: InterruptHandler<W, P>) -> Result<ClosedPort<W, P>, DriverError> {
        if !Arc::ptr_eq(&self.signals, &handler.signals) {
            return Err(DriverError::ForeignHalves);
        }

        self.signals.rx_enabled.store(false, Ordering::Release);
        self.signals.tx_active.store(false, Ordering::Release);

        let discarded_rx = self.rx.used_slots();
        let discarded_tx = self.tx.used_slots();

        let mut rx = reunite(handler.rx, self.rx).map_err(|_| DriverError::ForeignHalves)?;
        let mut tx = reunite(self.tx, handler.tx).map_err(|_| DriverError::ForeignHalves)?;
        rx.reset();
        tx.reset();

        if discarded_rx + discarded_tx > 0 {
            debug!(
                "{}: discarded {} rx and {} tx words on close",
                self.config.name, discarded_rx, discarded_tx
            );
        }
        info!("{}: closed", self.config.name);

        Ok(ClosedPort {
            config: self.config,
            peripheral: handler.peripheral,
            rx,
            tx,
        })
    }

    fn report_overruns(&mut self) {
        let total = self.overruns();
        if total > self.reported_overruns {
            warn!(
                "{}: {} received words dropped, RX ring full",
                self.signals.name,
                total - self.reported_overruns
            );
            self.reported_overruns = total;
        }
    }
}

/// Interrupt-side half of an open port
pub struct InterruptHandler<W: Copy + 'static, P> {
    peripheral: P,
    rx: Producer<'static, W>,
    tx: Consumer<'static, W>,
    signals: Arc<PortSignals>,
}

impl<W: Copy + 'static, P: Peripheral<W>> InterruptHandler<W, P> {
    /// Service one interrupt firing: at most one word in each direction.
    ///
    /// Returns `false` if neither direction had anything to do.
    pub fn on_interrupt(&mut self) -> bool {
        let received = self.on_rx_ready();
        let transmitted = self.on_tx_empty();
        received || transmitted
    }

    /// Receive-register-not-empty handler
    pub fn on_rx_ready(&mut self) -> bool {
        if !self.signals.rx_enabled.load(Ordering::Acquire) || !self.peripheral.rx_ready() {
            return false;
        }

        let word = self.peripheral.read_data();
        if !self.rx.try_put(word) {
            self.signals.overruns.fetch_add(1, Ordering::Relaxed);
            self.signals.overrun_counter.increment(1);
        }

        fence(Ordering::SeqCst);
        let expect = self.signals.rx_expect.load(Ordering::Relaxed);
        if expect > 0
            && (self.rx.used_slots() >= expect || self.rx.is_full())
            && self
                .signals
                .rx_expect
                .compare_exchange(expect, 0, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
        {
            self.signals.rx_ready.notify_one();
        }
        true
    }

    /// Transmit-register-empty handler
    pub fn on_tx_empty(&mut self) -> bool {
        if !self.signals.tx_active.load(Ordering::Acquire) || !self.peripheral.tx_ready() {
            return false;
        }

        match self.tx.try_get() {
            Some(word) => self.peripheral.write_data(word),
            None => {
                // The swap reads the writer's latest `true`, so anything it
                // queued before enabling is visible to the check below.
                self.signals.tx_active.swap(false, Ordering::AcqRel);
                if self.tx.is_empty() {
                    self.signals.tx_idle.notify_waiters();
                } else {
                    self.signals.tx_active.store(true, Ordering::Release);
                }
            }
        }
        true
    }
}

impl<W, P> InterruptHandler<W, P>
where
    W: Copy + Send + 'static,
    P: Peripheral<W> + Send + 'static,
{
    /// Drive the handler from a tokio task, firing every `period` until
    /// stopped. Each tick services pending interrupts back to back.
    pub fn spawn(self, period: Duration) -> InterruptTask<W, P> {
        let (stop, mut stopped) = oneshot::channel::<()>();
        let period = period.max(Duration::from_micros(1));
        let mut handler = self;

        let join = tokio::spawn(async move {
            debug!("{}: interrupt source running every {:?}", handler.signals.name, period);
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut stopped => break,
                    _ = ticker.tick() => {
                        for _ in 0..MAX_BURST {
                            if !handler.on_interrupt() {
                                break;
                            }
                        }
                    }
                }
            }

            debug!("{}: interrupt source stopped", handler.signals.name);
            handler
        });

        InterruptTask { stop, join }
    }
}

/// A handler running on its own task
pub struct InterruptTask<W: Copy + 'static, P> {
    stop: oneshot::Sender<()>,
    join: JoinHandle<InterruptHandler<W, P>>,
}

impl<W: Copy + 'static, P> InterruptTask<W, P> {
    /// Stop firing and get the handler back
    pub async fn stop(self) -> Result<InterruptHandler<W, P>, JoinError> {
        // The task may already have exited; joining reports that.
        let _ = self.stop.send(());
        self.join.await
    }
}
