//! Crate-wide error type.
//!
//! Only conditions that abort a transfer are errors.  Receive timeouts,
//! out-of-order frames and ACKs outside the window are handled inside the
//! engines and never surface here.

use thiserror::Error;

use crate::channel::ChannelError;
use crate::chunk::SourceError;
use crate::frame::FrameError;

#[derive(Debug, Error)]
pub enum GbnError {
    /// A datagram could not be decoded, or a chunk did not fit a frame.
    #[error("malformed frame: {0}")]
    Frame(#[from] FrameError),
    /// Send or receive failed for a reason other than a timeout.
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("sink write failed: {0}")]
    Sink(#[source] std::io::Error),
    /// The configured retransmission budget ran out without progress.
    #[error("no acknowledgement after {0} consecutive retransmissions")]
    RetriesExceeded(u32),
}
