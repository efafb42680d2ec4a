//! `gbn-arq` — reliable file transfer over UDP with Go-Back-N ARQ.
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────────┐    Data / EOT     ┌────────────────┐
//!  │  GbnSender   │──────────────────▶│  GbnReceiver   │
//!  │ (window of 7)│                   │ (window of 1)  │
//!  └──┬────────▲──┘◀──────────────────└──▲──────────┬──┘
//!     │        │       Ack / EOT-ACK     │          │
//!  ChunkSource │                         │      ChunkSink
//!     ┌────────┴─────────────────────────┴───┐
//!     │              Channel                 │
//!     │   UdpChannel  |  simulator::link     │
//!     └──────────────────────────────────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`frame`]     — fixed 38-byte wire format (encode / decode)
//! - [`seq`]       — protocol constants and modulo-8 sequence arithmetic
//! - [`channel`]   — datagram channel trait and its tokio UDP implementation
//! - [`chunk`]     — 30-byte chunk sources and byte sinks
//! - [`window`]    — sender sliding window
//! - [`state`]     — sender state machine transitions
//! - [`timer`]     — timeout configuration and retransmission bookkeeping
//! - [`sender`]    — Go-Back-N sender engine
//! - [`receiver`]  — Go-Back-N receiver engine
//! - [`event`]     — transfer event recording (in memory or log files)
//! - [`simulator`] — lossy / duplicating in-memory link for testing
//! - [`error`]     — crate error type

pub mod channel;
pub mod chunk;
pub mod error;
pub mod event;
pub mod frame;
pub mod receiver;
pub mod sender;
pub mod seq;
pub mod simulator;
pub mod state;
pub mod timer;
pub mod window;

pub use channel::{Channel, ChannelError, Recv, UdpChannel};
pub use chunk::{Chunk, ChunkSink, ChunkSource, ReaderSource, SourceError, WriterSink};
pub use error::GbnError;
pub use event::{Event, EventLog, EventSink, FileEventLog, NoEvents};
pub use frame::{Frame, FrameError, FrameKind};
pub use receiver::{GbnReceiver, ReceiveReport};
pub use sender::{GbnSender, SendReport};
pub use timer::TimerConfig;
