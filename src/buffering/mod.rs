//! FIFO block queue between the producer and consumer roles.
//!
//! The audio callback pushes `SampleBlock`s with a non-blocking `send`; the
//! consumer pops with `recv_timeout` so it notices recording-state changes
//! promptly. An unbounded channel is safe here — the queue depth is bounded
//! in practice by the recording duration of one hold-to-talk session.

pub mod chunk;

use crossbeam_channel::{unbounded, Receiver, Sender};

use chunk::SampleBlock;

/// Producer half — held by the audio capture callback.
pub type BlockSender = Sender<SampleBlock>;

/// Consumer half — held by the session consumer loop.
pub type BlockReceiver = Receiver<SampleBlock>;

/// Create a matched producer/consumer pair for one recording session.
///
/// A fresh queue is created per session so stale blocks from a previous
/// session can never leak into the next one.
pub fn create_block_queue() -> (BlockSender, BlockReceiver) {
    unbounded()
}
