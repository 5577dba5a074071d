//! Latest-value snapshot publication for observers on other threads.
//!
//! The loop thread owns the encoder; everyone else reads copies through a
//! single-slot channel where a new snapshot replaces any unread one.

use crossbeam_channel as xch;

use crate::quadrature::EncoderSnapshot;
use crate::sampler::SensorPhase;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snapshot {
    pub encoder: EncoderSnapshot,
    pub residual_mm: f64,
    pub cycles: u64,
    pub phase: SensorPhase,
}

/// Create a connected publisher/reader pair.
pub fn channel() -> (SnapshotPublisher, SnapshotReader) {
    let (tx, rx) = xch::bounded(1);
    (
        SnapshotPublisher {
            tx,
            evict: rx.clone(),
        },
        SnapshotReader {
            rx,
            last: None,
            closed: false,
        },
    )
}

/// Loop-side handle. Publishing never blocks.
pub struct SnapshotPublisher {
    tx: xch::Sender<Snapshot>,
    evict: xch::Receiver<Snapshot>,
}

impl SnapshotPublisher {
    pub fn publish(&self, snap: Snapshot) {
        // Single producer: after evicting, the slot is free.
        let _ = self.evict.try_recv();
        let _ = self.tx.try_send(snap);
    }
}

/// Observer-side handle; remembers the last snapshot it saw.
pub struct SnapshotReader {
    rx: xch::Receiver<Snapshot>,
    last: Option<Snapshot>,
    closed: bool,
}

impl SnapshotReader {
    /// Most recent snapshot, or the previous one if nothing new arrived.
    pub fn latest(&mut self) -> Option<Snapshot> {
        loop {
            match self.rx.try_recv() {
                Ok(s) => self.last = Some(s),
                Err(xch::TryRecvError::Empty) => break,
                Err(xch::TryRecvError::Disconnected) => {
                    self.closed = true;
                    break;
                }
            }
        }
        self.last
    }

    /// True once `latest` has drained the channel after the publisher left.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}
