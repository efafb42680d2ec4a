//! Go-Back-N receiver engine.
//!
//! The receiver window is one frame wide: only the frame whose sequence
//! number equals the cursor (`expected`) is accepted.  Everything else is
//! discarded without buffering and answered by re-asserting the last frame
//! that was accepted, so every `Ack(n)` the receiver sends means "all frames
//! through `n` are delivered".
//!
//! [`ReceiverState`] holds the decision logic and does no I/O.
//! [`GbnReceiver`] runs it against a [`Channel`] and a [`ChunkSink`].

use tokio::time::Instant;

use crate::channel::{Channel, Recv};
use crate::chunk::ChunkSink;
use crate::error::GbnError;
use crate::event::{Event, EventSink};
use crate::frame::{Frame, FrameKind};
use crate::seq::{seq_add, seq_prev};
use crate::timer::TimerConfig;

/// What to do with one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// In-order Data: append its payload, then send `reply`.
    Deliver { reply: Frame },
    /// The EOT for the current cursor.  `repeated` is set when the EOT was
    /// already accepted once and this is the sender retrying it.
    Finish { reply: Frame, repeated: bool },
    /// Out of order or duplicate: discard it and send `reply`.
    Reject { reply: Frame },
    /// Not a frame a receiver answers (an ACK kind).
    Ignore,
}

/// Receive cursor.
#[derive(Debug, Default)]
pub struct ReceiverState {
    /// Sequence number of the next frame to accept.
    expected: u8,
    /// Sequence number of the accepted EOT; the cursor is frozen once set.
    eot_seq: Option<u8>,
}

impl ReceiverState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expected(&self) -> u8 {
        self.expected
    }

    pub fn is_finished(&self) -> bool {
        self.eot_seq.is_some()
    }

    /// The ACK that re-asserts the last accepted frame.
    pub fn reassertion(&self) -> Frame {
        Frame::ack(seq_prev(self.expected))
    }

    pub fn on_frame(&mut self, frame: &Frame) -> Verdict {
        match (frame.kind, self.eot_seq) {
            (FrameKind::Ack | FrameKind::EotAck, _) => Verdict::Ignore,

            (FrameKind::Data, None) if frame.seq == self.expected => {
                self.expected = seq_add(self.expected, 1);
                Verdict::Deliver {
                    reply: Frame::ack(frame.seq),
                }
            }

            (FrameKind::Eot, None) if frame.seq == self.expected => {
                self.eot_seq = Some(frame.seq);
                Verdict::Finish {
                    reply: Frame::eot_ack(frame.seq),
                    repeated: false,
                }
            }

            (FrameKind::Eot, Some(eot)) if frame.seq == eot => Verdict::Finish {
                reply: Frame::eot_ack(eot),
                repeated: true,
            },

            (FrameKind::Data | FrameKind::Eot, _) => Verdict::Reject {
                reply: self.reassertion(),
            },
        }
    }
}

/// Counters describing a finished transfer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiveReport {
    /// Data frames delivered to the sink.
    pub chunks: u64,
    pub bytes: u64,
    /// Frames discarded as out of order or duplicate.
    pub rejected: u64,
}

pub struct GbnReceiver<C, K, E> {
    channel: C,
    sink: K,
    events: E,
    config: TimerConfig,
    state: ReceiverState,
    report: ReceiveReport,
}

impl<C, K, E> GbnReceiver<C, K, E>
where
    C: Channel,
    K: ChunkSink,
    E: EventSink,
{
    pub fn new(channel: C, sink: K, events: E, config: TimerConfig) -> Self {
        Self {
            channel,
            sink,
            events,
            config,
            state: ReceiverState::new(),
            report: ReceiveReport::default(),
        }
    }

    pub fn state(&self) -> &ReceiverState {
        &self.state
    }

    pub fn into_parts(self) -> (C, K, E) {
        (self.channel, self.sink, self.events)
    }

    /// Accept frames until the EOT arrives, then linger if configured.
    pub async fn run(&mut self) -> Result<ReceiveReport, GbnError> {
        log::info!("[gbn:recv] waiting for data");
        while !self.state.is_finished() {
            match self.channel.recv(self.config.ack_timeout).await? {
                Recv::Timeout => log::trace!("[gbn:recv] idle"),
                Recv::Datagram(bytes) => {
                    let frame = Frame::decode(&bytes)?;
                    self.handle(frame).await?;
                }
            }
        }
        self.sink.finish().map_err(GbnError::Sink)?;
        log::info!(
            "[gbn:recv] transfer finished: {} chunk(s), {} byte(s), {} rejected",
            self.report.chunks,
            self.report.bytes,
            self.report.rejected
        );

        self.linger().await?;
        Ok(self.report.clone())
    }

    async fn handle(&mut self, frame: Frame) -> Result<(), GbnError> {
        let reply = match self.state.on_frame(&frame) {
            Verdict::Ignore => {
                log::debug!("[gbn:recv] ← {frame} ignored");
                return Ok(());
            }
            Verdict::Deliver { reply } => {
                self.sink.append(frame.payload()).map_err(GbnError::Sink)?;
                self.events.record(Event::Arrival { seq: frame.seq });
                self.report.chunks += 1;
                self.report.bytes += frame.len() as u64;
                log::debug!("[gbn:recv] ← {frame} delivered");
                reply
            }
            Verdict::Finish { reply, repeated } => {
                if !repeated {
                    self.events.record(Event::EotArrival { seq: frame.seq });
                }
                log::debug!("[gbn:recv] ← {frame}{}", if repeated { " (again)" } else { "" });
                reply
            }
            Verdict::Reject { reply } => {
                self.report.rejected += 1;
                log::debug!(
                    "[gbn:recv] ← {frame} out of order, expecting seq={}",
                    self.state.expected()
                );
                reply
            }
        };

        self.channel.send(&reply.encode()).await?;
        log::debug!("[gbn:recv] → {reply}");
        Ok(())
    }

    /// Keep answering for `config.linger` so a lost EOT-ACK can be repaired.
    async fn linger(&mut self) -> Result<(), GbnError> {
        if self.config.linger.is_zero() {
            return Ok(());
        }
        let deadline = Instant::now() + self.config.linger;
        log::debug!("[gbn:recv] lingering for {:?}", self.config.linger);

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(());
            }
            if let Recv::Datagram(bytes) = self.channel.recv(remaining).await? {
                let frame = Frame::decode(&bytes)?;
                self.handle(frame).await?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::NoEvents;
    use crate::seq::MAX_SEQ;
    use crate::simulator::{link, SimulatorConfig};

    fn data(seq: u8) -> Frame {
        Frame::data(seq, &[seq; 4]).unwrap()
    }

    #[test]
    fn in_order_frames_advance_cursor_and_ack_themselves() {
        let mut r = ReceiverState::new();
        for seq in 0..MAX_SEQ {
            assert_eq!(
                r.on_frame(&data(seq)),
                Verdict::Deliver {
                    reply: Frame::ack(seq)
                }
            );
        }
        assert_eq!(r.expected(), 0);
    }

    #[test]
    fn out_of_order_before_any_delivery_reasserts_seven() {
        let mut r = ReceiverState::new();
        assert_eq!(
            r.on_frame(&data(3)),
            Verdict::Reject {
                reply: Frame::ack(7)
            }
        );
        assert_eq!(r.expected(), 0);
    }

    #[test]
    fn gap_is_answered_with_last_in_order_seq() {
        let mut r = ReceiverState::new();
        r.on_frame(&data(0));
        r.on_frame(&data(1));
        for seq in [3, 4, 5] {
            assert_eq!(
                r.on_frame(&data(seq)),
                Verdict::Reject {
                    reply: Frame::ack(1)
                }
            );
        }
        assert_eq!(r.expected(), 2);
    }

    #[test]
    fn duplicate_is_rejected_without_advancing() {
        let mut r = ReceiverState::new();
        r.on_frame(&data(0));
        assert_eq!(
            r.on_frame(&data(0)),
            Verdict::Reject {
                reply: Frame::ack(0)
            }
        );
        assert_eq!(r.expected(), 1);
    }

    #[test]
    fn eot_must_match_cursor() {
        let mut r = ReceiverState::new();
        r.on_frame(&data(0));
        assert_eq!(
            r.on_frame(&Frame::eot(4)),
            Verdict::Reject {
                reply: Frame::ack(0)
            }
        );
        assert!(!r.is_finished());

        assert_eq!(
            r.on_frame(&Frame::eot(1)),
            Verdict::Finish {
                reply: Frame::eot_ack(1),
                repeated: false
            }
        );
        assert!(r.is_finished());
    }

    #[test]
    fn finished_cursor_is_frozen() {
        let mut r = ReceiverState::new();
        r.on_frame(&Frame::eot(0));
        assert_eq!(
            r.on_frame(&data(0)),
            Verdict::Reject {
                reply: Frame::ack(7)
            }
        );
        assert_eq!(
            r.on_frame(&Frame::eot(0)),
            Verdict::Finish {
                reply: Frame::eot_ack(0),
                repeated: true
            }
        );
        assert_eq!(r.expected(), 0);
    }

    #[test]
    fn ack_kinds_are_ignored() {
        let mut r = ReceiverState::new();
        assert_eq!(r.on_frame(&Frame::ack(0)), Verdict::Ignore);
        assert_eq!(r.on_frame(&Frame::eot_ack(0)), Verdict::Ignore);
        assert_eq!(r.expected(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn engine_delivers_in_order_and_answers_every_frame() {
        let (mut peer, channel) = link(SimulatorConfig::default(), SimulatorConfig::default());
        let mut receiver = GbnReceiver::new(channel, Vec::new(), NoEvents, TimerConfig::default());

        let script = [
            Frame::data(0, b"ab").unwrap(),
            Frame::data(2, b"XX").unwrap(),
            Frame::data(1, b"cd").unwrap(),
            Frame::data(1, b"cd").unwrap(),
            Frame::eot(2),
        ];
        for frame in &script {
            peer.send(&frame.encode()).await.unwrap();
        }

        let report = receiver.run().await.unwrap();
        assert_eq!(
            report,
            ReceiveReport {
                chunks: 2,
                bytes: 4,
                rejected: 2
            }
        );

        let mut replies = Vec::new();
        let wait = TimerConfig::default().ack_timeout;
        while let Recv::Datagram(bytes) = peer.recv(wait).await.unwrap() {
            replies.push(Frame::decode(&bytes).unwrap());
        }
        assert_eq!(
            replies,
            vec![
                Frame::ack(0),
                Frame::ack(0),
                Frame::ack(1),
                Frame::ack(1),
                Frame::eot_ack(2),
            ]
        );

        let (_, sink, _) = receiver.into_parts();
        assert_eq!(sink, b"abcd");
    }
}
