//! Hardware data register abstraction

/// The data register and status flags of a word-oriented peripheral.
///
/// Implementations wrap the real USART/SPI registers; the interrupt handler
/// calls these once per interrupt firing and never blocks on them.
pub trait Peripheral<W> {
    /// Receive register holds an unread word
    fn rx_ready(&self) -> bool;

    /// Read (and clear) the receive register
    fn read_data(&mut self) -> W;

    /// Transmit register can accept a word
    fn tx_ready(&self) -> bool;

    /// Load the transmit register
    fn write_data(&mut self, word: W);
}
