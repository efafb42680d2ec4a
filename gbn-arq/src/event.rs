//! Transfer events and where they are recorded.
//!
//! Engines report every frame they send or accept through an [`EventSink`].
//! Recording is best effort: a sink must never fail a transfer, and must
//! not wait on the network.
//!
//! [`FileEventLog`] does a blocking write and flush per event on the engine's
//! task.  At one short line per frame that is negligible next to the receive
//! timeout, but a sink backed by slow storage would stall the loop; such a
//! sink should buffer and hand writes off to `tokio::task::spawn_blocking`.
//!
//! [`FileEventLog`] writes the classic per-role log files, one decimal
//! sequence number per line:
//!
//! | file               | events                          |
//! |--------------------|---------------------------------|
//! | `clientseqnum.log` | `Sent`, `EotSent`               |
//! | `clientack.log`    | `AckReceived`, `EotAckReceived` |
//! | `arrival.log`      | `Arrival`, `EotArrival`         |

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

pub const SEQNUM_LOG: &str = "clientseqnum.log";
pub const ACK_LOG: &str = "clientack.log";
pub const ARRIVAL_LOG: &str = "arrival.log";

/// Something worth recording about a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Sender transmitted a chunk for the first time.
    Sent { seq: u8 },
    /// Sender retransmitted an unacknowledged chunk.
    Resent { seq: u8 },
    /// Sender accepted an ACK for processing.
    AckReceived { seq: u8 },
    /// Sender discarded its window after an ACK outside it.
    Resync { ack: u8, base: u8 },
    EotSent { seq: u8 },
    EotAckReceived { seq: u8 },
    /// Receiver delivered an in-order Data frame.
    Arrival { seq: u8 },
    /// Receiver accepted the EOT frame.
    EotArrival { seq: u8 },
}

/// Destination for [`Event`]s.
///
/// `record` is called synchronously from the engine loop.
pub trait EventSink: Send {
    fn record(&mut self, event: Event);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoEvents;

impl EventSink for NoEvents {
    fn record(&mut self, _event: Event) {}
}

/// Cloneable in-memory recorder; every clone appends to the same list.
#[derive(Debug, Default, Clone)]
pub struct EventLog {
    events: Arc<Mutex<Vec<Event>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far.
    pub fn snapshot(&self) -> Vec<Event> {
        match self.events.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Sequence numbers of the events `pick` selects, in order.
    pub fn seqs(&self, pick: impl Fn(&Event) -> Option<u8>) -> Vec<u8> {
        self.snapshot().iter().filter_map(pick).collect()
    }
}

impl EventSink for EventLog {
    fn record(&mut self, event: Event) {
        if let Ok(mut guard) = self.events.lock() {
            guard.push(event);
        }
    }
}

// ---------------------------------------------------------------------------
// FileEventLog
// ---------------------------------------------------------------------------

/// Writes sequence numbers to the role's log files.
///
/// A write failure disables that file after a single warning.
#[derive(Debug, Default)]
pub struct FileEventLog {
    seqnum: Option<BufWriter<File>>,
    ack: Option<BufWriter<File>>,
    arrival: Option<BufWriter<File>>,
}

impl FileEventLog {
    /// Create `clientseqnum.log` and `clientack.log` in `dir`.
    pub fn for_sender(dir: &Path) -> std::io::Result<Self> {
        Ok(Self {
            seqnum: Some(BufWriter::new(File::create(dir.join(SEQNUM_LOG))?)),
            ack: Some(BufWriter::new(File::create(dir.join(ACK_LOG))?)),
            arrival: None,
        })
    }

    /// Create `arrival.log` in `dir`.
    pub fn for_receiver(dir: &Path) -> std::io::Result<Self> {
        Ok(Self {
            seqnum: None,
            ack: None,
            arrival: Some(BufWriter::new(File::create(dir.join(ARRIVAL_LOG))?)),
        })
    }

    fn write_line(slot: &mut Option<BufWriter<File>>, seq: u8) {
        let Some(out) = slot.as_mut() else { return };
        if let Err(e) = writeln!(out, "{seq}").and_then(|_| out.flush()) {
            log::warn!("[gbn:events] log write failed, disabling file: {e}");
            *slot = None;
        }
    }
}

impl EventSink for FileEventLog {
    fn record(&mut self, event: Event) {
        match event {
            Event::Sent { seq } | Event::EotSent { seq } => Self::write_line(&mut self.seqnum, seq),
            Event::AckReceived { seq } | Event::EotAckReceived { seq } => {
                Self::write_line(&mut self.ack, seq)
            }
            Event::Arrival { seq } | Event::EotArrival { seq } => {
                Self::write_line(&mut self.arrival, seq)
            }
            Event::Resent { .. } | Event::Resync { .. } => {}
        }
    }
}
