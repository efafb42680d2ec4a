//! In-memory network simulator for deterministic testing.
//!
//! Real networks drop and duplicate datagrams.  To exercise the
//! retransmission and resynchronisation paths without depending on actual
//! network conditions, [`link`] connects two [`SimChannel`]s through tokio
//! channels and applies a fault model to each direction independently:
//!
//! | Fault          | Description                                         |
//! |----------------|-----------------------------------------------------|
//! | Scripted drop  | Drop the next `times` frames of a kind and seqNum.  |
//! | Packet loss    | Drop a frame with probability `loss_rate`.          |
//! | Duplication    | Deliver a frame twice with probability `duplicate_rate`. |
//!
//! Faults are applied in that order.  Randomness comes from a seeded
//! `StdRng`, so a failing run can be replayed exactly.  Delivery order is
//! preserved: there is no reordering.
//!
//! Every frame offered to either direction is appended to a shared [`Trace`]
//! along with what happened to it.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::channel::{Channel, ChannelError, Recv};
use crate::frame::{Frame, FrameKind};

/// Drop the next `times` frames with this kind and sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropRule {
    pub kind: FrameKind,
    pub seq: u8,
    pub times: u32,
}

/// Fault model for one direction of a link.
///
/// All probabilities are clamped to `[0.0, 1.0]`.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Probability that any given frame is silently dropped.
    pub loss_rate: f64,
    /// Probability that a delivered frame is delivered twice.
    pub duplicate_rate: f64,
    pub seed: u64,
    pub drops: Vec<DropRule>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        // No faults: a transparent pass-through.
        Self {
            loss_rate: 0.0,
            duplicate_rate: 0.0,
            seed: 0,
            drops: Vec::new(),
        }
    }
}

impl SimulatorConfig {
    pub fn with_loss_rate(mut self, rate: f64) -> Self {
        self.loss_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn with_duplicate_rate(mut self, rate: f64) -> Self {
        self.duplicate_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn drop_frame(mut self, kind: FrameKind, seq: u8, times: u32) -> Self {
        self.drops.push(DropRule { kind, seq, times });
        self
    }
}

/// Which end of a link sent a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    A,
    B,
}

/// What the simulator did with a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fate {
    Delivered,
    Duplicated,
    /// Removed by a [`DropRule`].
    Dropped,
    /// Removed by random loss.
    Lost,
}

#[derive(Debug, Clone)]
pub struct TraceEntry {
    pub from: Side,
    pub frame: Frame,
    pub fate: Fate,
}

/// Shared, append-only record of every frame offered to a link.
#[derive(Debug, Clone, Default)]
pub struct Trace {
    entries: Arc<Mutex<Vec<TraceEntry>>>,
}

impl Trace {
    pub fn entries(&self) -> Vec<TraceEntry> {
        match self.entries.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Entries offered by `side`, in send order.
    pub fn sent_by(&self, side: Side) -> Vec<TraceEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.from == side)
            .collect()
    }

    fn push(&self, entry: TraceEntry) {
        if let Ok(mut guard) = self.entries.lock() {
            guard.push(entry);
        }
    }
}

/// Per-direction fault state.
#[derive(Debug)]
struct Faults {
    config: SimulatorConfig,
    rng: StdRng,
}

impl Faults {
    fn new(config: SimulatorConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self { config, rng }
    }

    fn decide(&mut self, frame: Option<&Frame>) -> Fate {
        if let Some(frame) = frame {
            let scripted = self
                .config
                .drops
                .iter_mut()
                .find(|r| r.times > 0 && r.kind == frame.kind && r.seq == frame.seq);
            if let Some(rule) = scripted {
                rule.times -= 1;
                return Fate::Dropped;
            }
        }
        if self.rng.random_bool(self.config.loss_rate) {
            return Fate::Lost;
        }
        if self.rng.random_bool(self.config.duplicate_rate) {
            return Fate::Duplicated;
        }
        Fate::Delivered
    }
}

/// One end of a simulated link.
#[derive(Debug)]
pub struct SimChannel {
    side: Side,
    tx: UnboundedSender<Vec<u8>>,
    rx: UnboundedReceiver<Vec<u8>>,
    faults: Faults,
    trace: Trace,
}

/// Create two connected channels.  `a_to_b` shapes what A sends,
/// `b_to_a` what B sends.
pub fn link(a_to_b: SimulatorConfig, b_to_a: SimulatorConfig) -> (SimChannel, SimChannel) {
    let (tx_ab, rx_ab) = unbounded_channel();
    let (tx_ba, rx_ba) = unbounded_channel();
    let trace = Trace::default();

    let a = SimChannel {
        side: Side::A,
        tx: tx_ab,
        rx: rx_ba,
        faults: Faults::new(a_to_b),
        trace: trace.clone(),
    };
    let b = SimChannel {
        side: Side::B,
        tx: tx_ba,
        rx: rx_ab,
        faults: Faults::new(b_to_a),
        trace,
    };
    (a, b)
}

impl SimChannel {
    pub fn trace(&self) -> Trace {
        self.trace.clone()
    }
}

impl Channel for SimChannel {
    async fn send(&mut self, datagram: &[u8]) -> Result<(), ChannelError> {
        let frame = Frame::decode(datagram).ok();
        let fate = self.faults.decide(frame.as_ref());
        if let Some(frame) = frame {
            log::trace!("[gbn:sim] {:?} {frame} {fate:?}", self.side);
            self.trace.push(TraceEntry {
                from: self.side,
                frame,
                fate,
            });
        }

        let copies = match fate {
            Fate::Dropped | Fate::Lost => 0,
            Fate::Delivered => 1,
            Fate::Duplicated => 2,
        };
        for _ in 0..copies {
            // Datagram semantics: a vanished peer is not the sender's problem.
            let _ = self.tx.send(datagram.to_vec());
        }
        Ok(())
    }

    async fn recv(&mut self, wait: Duration) -> Result<Recv, ChannelError> {
        match tokio::time::timeout(wait, self.rx.recv()).await {
            Ok(Some(datagram)) => Ok(Recv::Datagram(datagram)),
            Ok(None) => {
                tokio::time::sleep(wait).await;
                Ok(Recv::Timeout)
            }
            Err(_elapsed) => Ok(Recv::Timeout),
        }
    }
}
