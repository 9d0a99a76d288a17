//! Simulated peripheral for tests and host-side demos
//!
//! A [`SimLine`] is the wire: words injected on it show up in the receive
//! register, and words written to the transmit register are collected on it
//! (or fed straight back to the receive side in loopback mode).

use crate::peripheral::Peripheral;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
struct Wire<W> {
    inbound: VecDeque<W>,
    transmitted: Vec<W>,
    loopback: bool,
}

/// Test-side handle on the simulated wire
#[derive(Debug)]
pub struct SimLine<W> {
    wire: Arc<Mutex<Wire<W>>>,
}

impl<W> Clone for SimLine<W> {
    fn clone(&self) -> Self {
        Self {
            wire: Arc::clone(&self.wire),
        }
    }
}

impl<W: Copy> SimLine<W> {
    fn lock(&self) -> MutexGuard<'_, Wire<W>> {
        self.wire.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make words arrive at the receive register, oldest first
    pub fn inject(&self, words: &[W]) {
        self.lock().inbound.extend(words.iter().copied());
    }

    /// Words still waiting to be read by the peripheral
    pub fn pending_inbound(&self) -> usize {
        self.lock().inbound.len()
    }

    /// Take everything transmitted so far
    pub fn take_transmitted(&self) -> Vec<W> {
        std::mem::take(&mut self.lock().transmitted)
    }
}

/// Peripheral whose data register is backed by a [`SimLine`]
#[derive(Debug)]
pub struct SimulatedPeripheral<W> {
    line: SimLine<W>,
}

impl<W: Copy + Default> SimulatedPeripheral<W> {
    /// Peripheral plus the line that feeds it
    pub fn new() -> (SimLine<W>, Self) {
        Self::with_wire(false)
    }

    /// Peripheral whose transmit output is wired to its own receive input
    pub fn loopback() -> (SimLine<W>, Self) {
        Self::with_wire(true)
    }

    fn with_wire(loopback: bool) -> (SimLine<W>, Self) {
        let line = SimLine {
            wire: Arc::new(Mutex::new(Wire {
                inbound: VecDeque::new(),
                transmitted: Vec::new(),
                loopback,
            })),
        };
        (line.clone(), Self { line })
    }
}

impl<W: Copy + Default> Peripheral<W> for SimulatedPeripheral<W> {
    fn rx_ready(&self) -> bool {
        !self.line.lock().inbound.is_empty()
    }

    fn read_data(&mut self) -> W {
        // Reading an empty register yields whatever was last latched; zero
        // stands in for that here.
        self.line.lock().inbound.pop_front().unwrap_or_default()
    }

    fn tx_ready(&self) -> bool {
        true
    }

    fn write_data(&mut self, word: W) {
        let mut wire = self.line.lock();
        if wire.loopback {
            wire.inbound.push_back(word);
        }
        wire.transmitted.push(word);
    }
}
