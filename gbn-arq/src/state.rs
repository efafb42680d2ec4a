//! Sender state machine.
//!
//! [`SenderState`] is the whole of the sender's protocol state.  It is owned
//! by one [`crate::sender::GbnSender`] loop and changed only through the
//! transitions below, each of which returns what the loop has to do next
//! (transmit, rewind the source, start the EOT handshake).  No I/O happens
//! here.
//!
//! ```text
//!            fill / top up            Ack in window
//!   ┌──────────────────────────┐   ┌────────────────┐
//!   ▼                          │   ▼                │
//! Transferring ──timeout──▶ resend window ──────────┘
//!   │  │
//!   │  └──Ack outside window──▶ Resync (draining) ──quiet timeout──▶ Transferring
//!   │
//!   └──quiet timeout, all acked──▶ EOT handshake ──EOT-ACK──▶ Terminated
//!                                        │
//!                                        └──other reply──▶ Transferring
//! ```

use crate::frame::Frame;
use crate::seq::{seq_for_chunk, seq_prev, WINDOW_SIZE};
use crate::window::{InFlight, Window};

/// Occupancy of the send window, recomputed at the top of every cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowClass {
    Empty,
    Partial,
    Full,
}

/// Classify a window holding `outstanding` of `window_size` frames.
pub fn classify(outstanding: usize, window_size: usize) -> WindowClass {
    if outstanding == 0 {
        WindowClass::Empty
    } else if outstanding >= window_size {
        WindowClass::Full
    } else {
        WindowClass::Partial
    }
}

/// Result of feeding an `Ack(n)` to the sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckOutcome {
    /// The sender is draining after a resync or while requesting EOT.
    Discarded,
    /// `count` frames were acknowledged.  `final_ack` marks the end-of-file
    /// case that releases the entire remaining window.
    Advanced { count: usize, final_ack: bool },
    /// The ACK fell outside the window; the window was discarded.
    Resync(Resync),
}

/// The post-state of a resynchronisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resync {
    /// The ACK that triggered it.
    pub ack: u8,
    /// Chunk index the source must be rewound to.
    pub rewind_to: u64,
    /// New window base, `rewind_to mod MAX_SEQ`.
    pub base: u8,
}

/// What a receive timeout means for the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutAction {
    /// Frames are outstanding; retransmit the window next cycle.
    Resend,
    /// Nothing to do yet.
    Idle,
    /// Everything is sent and acknowledged; run the EOT handshake.
    BeginEot,
}

#[derive(Debug, Default)]
pub struct SenderState {
    window: Window,
    /// Chunks cumulatively acknowledged; also the index of the chunk at `base`.
    acked: u64,
    /// Index of the next chunk to read from the source.
    sent: u64,
    /// The source has handed out its last chunk.
    source_done: bool,
    resend: bool,
    send_eot: bool,
    /// Discard ACKs and send nothing until a receive times out.
    draining: bool,
    terminated: bool,
}

impl SenderState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn classify(&self) -> WindowClass {
        classify(self.window.outstanding(), WINDOW_SIZE)
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn base(&self) -> u8 {
        self.window.base()
    }

    pub fn next_seq(&self) -> u8 {
        self.window.next_seq()
    }

    pub fn outstanding(&self) -> usize {
        self.window.outstanding()
    }

    pub fn acked(&self) -> u64 {
        self.acked
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn source_done(&self) -> bool {
        self.source_done
    }

    pub fn is_draining(&self) -> bool {
        self.draining
    }

    pub fn eot_requested(&self) -> bool {
        self.send_eot
    }

    pub fn resend_requested(&self) -> bool {
        self.resend
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// `true` when the window has room and the source has more chunks.
    ///
    /// Filling an empty window and topping up a partial one are the same
    /// rule; only a full window or an exhausted source stops it.
    pub fn wants_fill(&self) -> bool {
        !self.draining && !self.source_done && self.classify() != WindowClass::Full
    }

    /// Record a freshly transmitted frame for chunk [`SenderState::sent`].
    pub fn admit(&mut self, frame: Frame) {
        debug_assert_eq!(frame.seq, seq_for_chunk(self.sent));
        self.window.push(InFlight {
            seq: frame.seq,
            chunk: self.sent,
            frame,
            tx_count: 1,
        });
        self.sent += 1;
    }

    pub fn mark_source_done(&mut self) {
        self.source_done = true;
    }

    /// Consume a pending retransmission request.
    pub fn take_resend(&mut self) -> bool {
        std::mem::take(&mut self.resend)
    }

    pub fn note_retransmit(&mut self) {
        self.window.on_retransmit();
    }

    /// Process `Ack(ack)`: every frame up to and including `ack` was delivered.
    pub fn acknowledge(&mut self, ack: u8) -> AckOutcome {
        if self.draining {
            return AckOutcome::Discarded;
        }

        if self.is_final_ack(ack) {
            let count = self.release(self.window.outstanding());
            return AckOutcome::Advanced {
                count,
                final_ack: true,
            };
        }

        match self.window.covered_by(ack) {
            Some(covered) => {
                let count = self.release(covered);
                AckOutcome::Advanced {
                    count,
                    final_ack: false,
                }
            }
            None => AckOutcome::Resync(self.resync(ack)),
        }
    }

    /// The source is exhausted, fewer than `WINDOW_SIZE - 1` frames are out,
    /// and `ack` names the last frame ever transmitted.
    ///
    /// The last transmitted frame is always inside the window, so
    /// [`Window::covered_by`] would release the same `outstanding` frames.
    /// This rule only marks the release as final; it never changes what is
    /// released.
    fn is_final_ack(&self, ack: u8) -> bool {
        self.source_done
            && self.window.outstanding() > 0
            && self.window.outstanding() < WINDOW_SIZE - 1
            && ack == seq_prev(seq_for_chunk(self.sent))
    }

    fn release(&mut self, count: usize) -> usize {
        let released = self.window.release(count);
        for entry in &released {
            debug_assert_eq!(entry.chunk, self.acked, "window out of step with source");
            self.acked += 1;
        }
        released.len()
    }

    /// Discard the window and restart it at the first unacknowledged chunk.
    ///
    /// An ACK outside the window cannot be reconciled with the frames in
    /// flight, so nothing it claims is trusted: the source rewinds to
    /// `acked`, which is exactly what the receiver has confirmed, and the
    /// window restarts at the sequence number the receiver expects next.
    pub fn resync(&mut self, ack: u8) -> Resync {
        let base = seq_for_chunk(self.acked);
        self.window.reset(base);
        self.sent = self.acked;
        self.source_done = false;
        self.resend = false;
        self.draining = true;
        Resync {
            ack,
            rewind_to: self.acked,
            base,
        }
    }

    /// A receive timed out.
    pub fn on_timeout(&mut self) -> TimeoutAction {
        if self.window.outstanding() > 0 {
            if self.draining {
                return TimeoutAction::Idle;
            }
            self.resend = true;
            return TimeoutAction::Resend;
        }

        self.draining = false;
        if self.source_done && self.acked == self.sent {
            self.send_eot = true;
            self.draining = true;
            return TimeoutAction::BeginEot;
        }
        TimeoutAction::Idle
    }

    /// The EOT reply was not an EOT-ACK.  Returns the chunk index the source
    /// must be rewound to.
    pub fn resume_after_eot(&mut self) -> u64 {
        self.send_eot = false;
        self.draining = false;
        self.window.reset(seq_for_chunk(self.acked));
        self.sent = self.acked;
        self.source_done = false;
        self.acked
    }

    /// `true` when an EOT-ACK for `seq` closes the transfer: every chunk is
    /// sent and acknowledged and `seq` is the EOT's sequence number.
    ///
    /// Such an EOT-ACK can reach the normal cycle when a stale reply to the
    /// EOT was consumed first and the sender resumed.
    pub fn confirms_close(&self, seq: u8) -> bool {
        self.source_done
            && self.window.outstanding() == 0
            && self.acked == self.sent
            && seq == self.window.base()
    }

    /// The transfer is over.
    pub fn finish(&mut self) {
        self.send_eot = false;
        self.terminated = true;
    }
}
