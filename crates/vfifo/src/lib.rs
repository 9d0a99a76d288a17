//! Lock-Free Ring Buffer
//!
//! Fixed-capacity SPSC FIFO used as the staging area between interrupt
//! handlers and task-level reads and writes. One context produces, the other
//! consumes, and neither ever blocks or takes a lock.
//!
//! ```
//! use vfifo::RingBuffer;
//!
//! let (mut tx, mut rx) = RingBuffer::<u8>::new(4).split();
//! assert_eq!(tx.put_block(b"abcdef"), 4);
//! assert_eq!(rx.try_get(), Some(b'a'));
//! ```

mod error;
mod ring;
mod split;
mod storage;

pub use error::{FifoError, ReuniteError};
pub use ring::{Occupancy, RingBuffer};
pub use split::{reunite, Consumer, Producer};
pub use storage::Backing;
