//! Go-Back-N sender engine.
//!
//! [`GbnSender`] drives one file transfer: it keeps the send window full
//! from a [`ChunkSource`], waits for ACKs with a bounded receive that doubles
//! as the retransmission timer, retransmits the whole window when that timer
//! expires, and closes the transfer with the EOT handshake.
//!
//! Each [`GbnSender::step`] is one cycle, evaluated in fixed order:
//!
//! 1. classify the window (empty / partial / full);
//! 2. fill or top up the window while the source has chunks;
//! 3. retransmit the window if the last cycle timed out;
//! 4. wait for one inbound frame (or the timeout);
//! 5. run the EOT handshake if the timeout asked for it.
//!
//! Protocol decisions live in [`SenderState`]; this module performs the I/O
//! they call for.

use crate::channel::{Channel, Recv};
use crate::chunk::{Chunk, ChunkSource};
use crate::error::GbnError;
use crate::event::{Event, EventSink};
use crate::frame::{Frame, FrameKind};
use crate::state::{AckOutcome, SenderState, TimeoutAction};
use crate::timer::{RetransmitTimer, TimerConfig};

/// Counters describing a finished (or running) transfer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendReport {
    /// Chunks acknowledged by the receiver.
    pub chunks: u64,
    /// First transmissions of Data frames, including those repeated after a resync.
    pub transmissions: u64,
    /// Data frames retransmitted on timeout.
    pub retransmissions: u64,
    pub resyncs: u64,
    /// The receiver answered the EOT with an EOT-ACK.
    pub eot_confirmed: bool,
}

pub struct GbnSender<C, S, E> {
    channel: C,
    source: S,
    events: E,
    timer: RetransmitTimer,
    state: SenderState,
    report: SendReport,
}

impl<C, S, E> GbnSender<C, S, E>
where
    C: Channel,
    S: ChunkSource,
    E: EventSink,
{
    pub fn new(channel: C, source: S, events: E, config: TimerConfig) -> Self {
        Self {
            channel,
            source,
            events,
            timer: RetransmitTimer::new(config),
            state: SenderState::new(),
            report: SendReport::default(),
        }
    }

    pub fn state(&self) -> &SenderState {
        &self.state
    }

    pub fn report(&self) -> &SendReport {
        &self.report
    }

    pub fn into_parts(self) -> (C, S, E) {
        (self.channel, self.source, self.events)
    }

    /// Run cycles until the EOT handshake ends the transfer.
    pub async fn run(&mut self) -> Result<SendReport, GbnError> {
        log::info!("[gbn:send] transfer started");
        while !self.state.is_terminated() {
            self.step().await?;
        }
        self.report.chunks = self.state.acked();
        log::info!(
            "[gbn:send] transfer finished: {} chunk(s), {} retransmission(s), {} resync(s)",
            self.report.chunks,
            self.report.retransmissions,
            self.report.resyncs
        );
        Ok(self.report.clone())
    }

    /// One cycle of the sender loop.
    pub async fn step(&mut self) -> Result<(), GbnError> {
        if !self.state.is_draining() {
            if self.state.wants_fill() {
                self.fill_window().await?;
            }
            if self.state.take_resend() {
                self.retransmit_window().await?;
            }
        }

        match self.channel.recv(self.timer.wait()).await? {
            Recv::Timeout => self.on_timeout()?,
            Recv::Datagram(bytes) => {
                let frame = Frame::decode(&bytes)?;
                self.on_frame(frame)?;
            }
        }

        if self.state.eot_requested() {
            self.end_of_transmission().await?;
        }
        self.report.chunks = self.state.acked();
        Ok(())
    }

    /// Transmit new chunks until the window is full or the source runs dry.
    async fn fill_window(&mut self) -> Result<(), GbnError> {
        log::debug!(
            "[gbn:send] window {:?}, filling from chunk {}",
            self.state.classify(),
            self.state.sent()
        );
        while self.state.wants_fill() {
            let (bytes, last) = match self.source.next_chunk()? {
                Chunk::Data { bytes, last } => (bytes, last),
                Chunk::Exhausted => {
                    self.state.mark_source_done();
                    break;
                }
            };

            let frame = Frame::data(self.state.next_seq(), &bytes)?;
            self.channel.send(&frame.encode()).await?;
            self.events.record(Event::Sent { seq: frame.seq });
            self.report.transmissions += 1;
            log::debug!(
                "[gbn:send] → {frame} chunk={} in_flight={}",
                self.state.sent(),
                self.state.outstanding() + 1
            );

            self.state.admit(frame);
            if last {
                self.state.mark_source_done();
            }
        }
        Ok(())
    }

    /// Retransmit every in-flight frame in its original order (go back N).
    async fn retransmit_window(&mut self) -> Result<(), GbnError> {
        let frames: Vec<Frame> = self
            .state
            .window()
            .entries()
            .map(|e| e.frame.clone())
            .collect();
        let first_chunk = self.state.window().entries().next().map(|e| e.chunk);
        log::debug!(
            "[gbn:send] timeout, retransmitting {} frame(s) from seq {} (chunk {:?})",
            frames.len(),
            self.state.base(),
            first_chunk
        );
        for frame in frames {
            self.channel.send(&frame.encode()).await?;
            self.events.record(Event::Resent { seq: frame.seq });
            self.report.retransmissions += 1;
        }
        self.state.note_retransmit();
        Ok(())
    }

    fn on_timeout(&mut self) -> Result<(), GbnError> {
        match self.state.on_timeout() {
            TimeoutAction::Resend => {
                self.timer.expired()?;
                log::debug!(
                    "[gbn:send] timeout with {} outstanding (expiry {})",
                    self.state.outstanding(),
                    self.timer.consecutive_expiries()
                );
            }
            TimeoutAction::Idle => log::trace!("[gbn:send] timeout, idle"),
            TimeoutAction::BeginEot => {
                log::debug!("[gbn:send] all {} chunk(s) acknowledged", self.state.acked())
            }
        }
        Ok(())
    }

    fn on_frame(&mut self, frame: Frame) -> Result<(), GbnError> {
        match frame.kind {
            FrameKind::Ack => {}
            FrameKind::EotAck if self.state.confirms_close(frame.seq) => {
                self.events.record(Event::EotAckReceived { seq: frame.seq });
                log::debug!("[gbn:send] ← {frame} after resuming, closed");
                self.report.eot_confirmed = true;
                self.state.finish();
                return Ok(());
            }
            _ => {
                log::debug!("[gbn:send] ← {frame} ignored");
                return Ok(());
            }
        }
        let ack = frame.seq;

        match self.state.acknowledge(ack) {
            AckOutcome::Discarded => {
                log::debug!("[gbn:send] ← ACK {ack} dropped while draining");
            }
            AckOutcome::Advanced { count, final_ack } => {
                self.events.record(Event::AckReceived { seq: ack });
                if count > 0 {
                    self.timer.restart();
                }
                log::debug!(
                    "[gbn:send] ← ACK {ack} (slid {count}{}) base={} outstanding={}",
                    if final_ack { ", final" } else { "" },
                    self.state.base(),
                    self.state.outstanding()
                );
            }
            AckOutcome::Resync(resync) => {
                self.events.record(Event::AckReceived { seq: ack });
                self.events.record(Event::Resync {
                    ack,
                    base: resync.base,
                });
                self.source.seek_to_chunk(resync.rewind_to)?;
                self.report.resyncs += 1;
                log::info!(
                    "[gbn:send] ← ACK {ack} outside window; resync to chunk {} base={}",
                    resync.rewind_to,
                    resync.base
                );
            }
        }
        Ok(())
    }

    /// Send EOT and wait for the EOT-ACK without re-entering the cycle.
    ///
    /// A timeout re-sends the EOT, up to `eot_attempts` transmissions in
    /// total.  Any reply other than an EOT-ACK puts the sender back into the
    /// normal cycle with the source rewound to the last acknowledged chunk.
    async fn end_of_transmission(&mut self) -> Result<(), GbnError> {
        let attempts = self.timer.config().eot_attempts.max(1);

        for attempt in 1..=attempts {
            let eot = Frame::eot(self.state.base());
            self.channel.send(&eot.encode()).await?;
            self.events.record(Event::EotSent { seq: eot.seq });
            log::debug!("[gbn:send] → {eot} (attempt {attempt}/{attempts})");

            let bytes = match self.channel.recv(self.timer.wait()).await? {
                Recv::Timeout => continue,
                Recv::Datagram(bytes) => bytes,
            };
            let reply = Frame::decode(&bytes)?;

            if reply.kind == FrameKind::EotAck {
                self.events.record(Event::EotAckReceived { seq: reply.seq });
                log::debug!("[gbn:send] ← {reply}, closed");
                self.report.eot_confirmed = true;
                self.state.finish();
                return Ok(());
            }

            let rewind_to = self.state.resume_after_eot();
            self.source.seek_to_chunk(rewind_to)?;
            log::info!(
                "[gbn:send] ← {reply} while awaiting EOT-ACK; resuming at chunk {rewind_to} base={}",
                self.state.base()
            );
            return Ok(());
        }

        log::warn!("[gbn:send] EOT not acknowledged after {attempts} attempt(s); closing");
        self.state.finish();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::time::Duration;

    use super::*;
    use crate::channel::ChannelError;
    use crate::chunk::{ReaderSource, SourceError};
    use crate::event::EventLog;
    use crate::frame::PAYLOAD_CAPACITY;

    /// Replays a script of receive outcomes and records every frame sent.
    /// An empty script times out.
    #[derive(Default)]
    struct Scripted {
        inbound: VecDeque<Recv>,
        sent: Vec<Frame>,
    }

    impl Scripted {
        fn push_frame(&mut self, frame: Frame) {
            self.inbound.push_back(Recv::Datagram(frame.encode().to_vec()));
        }

        fn take_sent(&mut self) -> Vec<(FrameKind, u8)> {
            self.sent.drain(..).map(|f| (f.kind, f.seq)).collect()
        }
    }

    impl Channel for Scripted {
        async fn send(&mut self, datagram: &[u8]) -> Result<(), ChannelError> {
            self.sent.push(Frame::decode(datagram).expect("engine sent a bad frame"));
            Ok(())
        }

        async fn recv(&mut self, _wait: Duration) -> Result<Recv, ChannelError> {
            Ok(self.inbound.pop_front().unwrap_or(Recv::Timeout))
        }
    }

    /// Chunk `k` is 30 copies of byte `k`.
    fn indexed_source(chunks: u8) -> ReaderSource<std::io::Cursor<Vec<u8>>> {
        let bytes: Vec<u8> = (0..chunks)
            .flat_map(|k| std::iter::repeat(k).take(PAYLOAD_CAPACITY))
            .collect();
        ReaderSource::from_bytes(bytes)
    }

    fn sender(
        chunks: u8,
        config: TimerConfig,
    ) -> GbnSender<Scripted, ReaderSource<std::io::Cursor<Vec<u8>>>, EventLog> {
        GbnSender::new(
            Scripted::default(),
            indexed_source(chunks),
            EventLog::new(),
            config,
        )
    }

    fn data(seqs: impl IntoIterator<Item = u8>) -> Vec<(FrameKind, u8)> {
        seqs.into_iter().map(|s| (FrameKind::Data, s)).collect()
    }

    #[tokio::test]
    async fn first_cycle_fills_window_with_consecutive_seqs() {
        let mut s = sender(10, TimerConfig::default());
        s.step().await.unwrap();
        assert_eq!(s.channel.take_sent(), data(0..7));
        assert_eq!(s.state().outstanding(), 7);
        // Empty script → timeout → resend requested.
        assert!(s.state().resend_requested());
    }

    #[tokio::test]
    async fn timeout_retransmits_whole_window_unchanged() {
        let mut s = sender(10, TimerConfig::default());
        s.step().await.unwrap();
        s.channel.take_sent();

        s.step().await.unwrap();
        assert_eq!(s.channel.take_sent(), data(0..7));
        assert_eq!(s.state().base(), 0);
        assert_eq!(s.state().outstanding(), 7);
        assert!(s.state().window().entries().all(|e| e.tx_count == 2));
        assert_eq!(s.report().retransmissions, 7);
    }

    #[tokio::test]
    async fn cumulative_ack_slides_and_tops_up() {
        let mut s = sender(10, TimerConfig::default());
        s.channel.push_frame(Frame::ack(2));
        s.step().await.unwrap();
        s.channel.take_sent();
        assert_eq!(s.state().base(), 3);
        assert_eq!(s.state().outstanding(), 4);

        s.channel.push_frame(Frame::ack(3));
        s.step().await.unwrap();
        // Top up with chunks 7, 8, 9 carrying seqs 7, 0, 1.
        assert_eq!(s.channel.take_sent(), data([7, 0, 1]));
        assert_eq!(s.state().base(), 4);
        assert!(s.state().source_done());
    }

    #[tokio::test]
    async fn ack_outside_window_rewinds_source_and_drains() {
        let mut s = sender(12, TimerConfig::default());
        s.channel.push_frame(Frame::ack(0));
        s.step().await.unwrap();
        s.channel.take_sent();

        // Window is now 1..=7 after the top-up; 0 is the only seq outside it.
        s.channel.push_frame(Frame::ack(0));
        s.step().await.unwrap();
        assert_eq!(s.channel.take_sent(), data([7]));
        assert_eq!(s.state().outstanding(), 0);
        assert_eq!(s.state().base(), 1);
        assert!(s.state().is_draining());
        assert_eq!(s.report().resyncs, 1);

        // Stale ACKs are dropped while draining; nothing is sent.
        s.channel.push_frame(Frame::ack(4));
        s.step().await.unwrap();
        assert!(s.channel.take_sent().is_empty());

        // Quiet timeout ends draining; the refill restarts at chunk 1.
        s.step().await.unwrap();
        s.step().await.unwrap();
        let resent = std::mem::take(&mut s.channel.sent);
        assert_eq!(
            resent.iter().map(|f| f.seq).collect::<Vec<_>>(),
            vec![1, 2, 3, 4, 5, 6, 7]
        );
        assert_eq!(resent[0].payload(), &[1u8; PAYLOAD_CAPACITY][..]);
        assert_eq!(resent[6].payload(), &[7u8; PAYLOAD_CAPACITY][..]);
    }

    #[tokio::test]
    async fn three_chunk_transfer_ends_with_eot_handshake() {
        let mut s = sender(3, TimerConfig::default());
        s.channel.push_frame(Frame::ack(0));
        s.channel.push_frame(Frame::ack(1));
        s.channel.push_frame(Frame::ack(2));
        s.channel.inbound.push_back(Recv::Timeout);
        s.channel.push_frame(Frame::eot_ack(3));

        let report = s.run().await.unwrap();
        assert!(report.eot_confirmed);
        assert_eq!(report.chunks, 3);
        assert_eq!(
            s.channel.take_sent(),
            vec![
                (FrameKind::Data, 0),
                (FrameKind::Data, 1),
                (FrameKind::Data, 2),
                (FrameKind::Eot, 3),
            ]
        );
        assert_eq!(
            s.events.snapshot(),
            vec![
                Event::Sent { seq: 0 },
                Event::Sent { seq: 1 },
                Event::Sent { seq: 2 },
                Event::AckReceived { seq: 0 },
                Event::AckReceived { seq: 1 },
                Event::AckReceived { seq: 2 },
                Event::EotSent { seq: 3 },
                Event::EotAckReceived { seq: 3 },
            ]
        );
    }

    #[tokio::test]
    async fn final_partial_window_ack_releases_everything() {
        let mut s = sender(3, TimerConfig::default());
        s.channel.push_frame(Frame::ack(2));
        s.step().await.unwrap();
        assert_eq!(s.state().outstanding(), 0);
        assert_eq!(s.state().acked(), 3);
    }

    #[tokio::test]
    async fn non_eot_ack_reply_resumes_cycle_at_acked_chunk() {
        let mut s = sender(2, TimerConfig::default());
        s.channel.push_frame(Frame::ack(1));
        s.channel.inbound.push_back(Recv::Timeout);
        // A stale duplicate ACK answers the first EOT.
        s.channel.push_frame(Frame::ack(1));
        s.step().await.unwrap();
        s.step().await.unwrap();
        assert!(!s.state().is_terminated());
        assert!(!s.state().eot_requested());
        assert_eq!(s.state().base(), 2);
        assert_eq!(s.state().sent(), 2);
        assert_eq!(
            s.channel.take_sent(),
            vec![(FrameKind::Data, 0), (FrameKind::Data, 1), (FrameKind::Eot, 2)]
        );

        // Source is at its end: nothing to refill, next quiet timeout retries EOT.
        s.channel.inbound.push_back(Recv::Timeout);
        s.channel.push_frame(Frame::eot_ack(2));
        let report = s.run().await.unwrap();
        assert!(report.eot_confirmed);
        assert_eq!(s.channel.take_sent(), vec![(FrameKind::Eot, 2)]);
    }

    #[tokio::test]
    async fn eot_ack_behind_stale_reply_still_closes() {
        let mut s = sender(2, TimerConfig::default());
        s.channel.push_frame(Frame::ack(1));
        s.channel.inbound.push_back(Recv::Timeout);
        // The duplicate ACK answers the EOT; the real EOT-ACK is right behind it.
        s.channel.push_frame(Frame::ack(1));
        s.channel.push_frame(Frame::eot_ack(2));

        let report = s.run().await.unwrap();
        assert!(report.eot_confirmed);
        assert_eq!(report.chunks, 2);
        assert_eq!(
            s.channel.take_sent(),
            vec![(FrameKind::Data, 0), (FrameKind::Data, 1), (FrameKind::Eot, 2)]
        );
        assert_eq!(
            s.events.snapshot().last(),
            Some(&Event::EotAckReceived { seq: 2 })
        );
    }

    #[tokio::test]
    async fn unanswered_eot_gives_up_after_configured_attempts() {
        let mut s = sender(1, TimerConfig::default().with_eot_attempts(3));
        s.channel.push_frame(Frame::ack(0));
        let report = s.run().await.unwrap();
        assert!(!report.eot_confirmed);
        assert_eq!(report.chunks, 1);
        assert_eq!(
            s.channel.take_sent(),
            vec![
                (FrameKind::Data, 0),
                (FrameKind::Eot, 1),
                (FrameKind::Eot, 1),
                (FrameKind::Eot, 1),
            ]
        );
    }

    #[tokio::test]
    async fn empty_source_goes_straight_to_eot() {
        let mut s = sender(0, TimerConfig::default());
        s.channel.inbound.push_back(Recv::Timeout);
        s.channel.push_frame(Frame::eot_ack(0));
        let report = s.run().await.unwrap();
        assert!(report.eot_confirmed);
        assert_eq!(report.chunks, 0);
        assert_eq!(s.channel.take_sent(), vec![(FrameKind::Eot, 0)]);
    }

    #[tokio::test]
    async fn retry_budget_aborts_silent_transfer() {
        let mut s = sender(4, TimerConfig::default().with_max_retries(Some(2)));
        let err = s.run().await.unwrap_err();
        assert!(matches!(err, GbnError::RetriesExceeded(2)));
        // One first transmission plus two full retransmissions.
        assert_eq!(s.report().retransmissions, 8);
    }

    #[tokio::test]
    async fn malformed_datagram_aborts() {
        let mut s = sender(4, TimerConfig::default());
        s.channel.inbound.push_back(Recv::Datagram(vec![0u8; 5]));
        let err = s.step().await.unwrap_err();
        assert!(matches!(err, GbnError::Frame(_)));
    }

    struct Vanishing;

    impl ChunkSource for Vanishing {
        fn next_chunk(&mut self) -> Result<Chunk, SourceError> {
            Err(SourceError::Truncated { index: 0, count: 1 })
        }

        fn seek_to_chunk(&mut self, _index: u64) -> Result<(), SourceError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn truncated_source_aborts() {
        let mut s = GbnSender::new(
            Scripted::default(),
            Vanishing,
            EventLog::new(),
            TimerConfig::default(),
        );
        let err = s.step().await.unwrap_err();
        assert!(matches!(
            err,
            GbnError::Source(SourceError::Truncated { index: 0, .. })
        ));
        assert!(s.channel.sent.is_empty());
    }
}
