//! FIFO Error Types

use crate::split::{Consumer, Producer};
use std::fmt;
use thiserror::Error;

/// Errors raised while constructing a ring buffer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FifoError {
    /// Borrowed storage holds fewer slots than were requested
    #[error("Storage too short: requested {requested} slots, storage holds {available}")]
    StorageTooShort { requested: usize, available: usize },

    /// Usable capacity plus the reserved slot overflows `usize`
    #[error("Capacity of {requested} usable slots overflows the slot count")]
    CapacityOverflow { requested: usize },
}

/// Returned by [`crate::reunite`] when the halves come from different rings.
///
/// Both halves are handed back untouched.
#[derive(Error)]
#[error("Producer and consumer belong to different ring buffers")]
pub struct ReuniteError<'s, T: Copy> {
    pub producer: Producer<'s, T>,
    pub consumer: Consumer<'s, T>,
}

impl<T: Copy> fmt::Debug for ReuniteError<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReuniteError")
            .field("producer", &self.producer)
            .field("consumer", &self.consumer)
            .finish()
    }
}
