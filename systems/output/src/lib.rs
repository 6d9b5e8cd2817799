#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Bounded per-rig output queue with downstream backpressure.
//!
//! Removals push their harvested records into the queue; the queue is
//! flushed toward a downstream acceptor in small batches every step. The
//! flush gate stays closed on a fresh rig and after a power outage until the
//! next removal succeeds, so a rig never dumps its queue while idle.

use std::collections::VecDeque;

use quarry_rig_core::{
    Acceptance, BlockPos, DownstreamAcceptor, Environment, MaterialRecord, OutputTuning,
};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Outcome of a single flush.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Records handed to the downstream acceptor.
    pub moved: u32,
    /// Records dropped into the environment.
    pub ejected: u32,
}

impl FlushReport {
    /// Reports whether any record left the queue.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.moved == 0 && self.ejected == 0
    }
}

/// Queue of harvested records waiting to leave the rig.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputManager {
    queue: VecDeque<MaterialRecord>,
    flush_gate: bool,
}

impl OutputManager {
    /// Creates an empty queue with a closed flush gate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Reports whether the queue holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Reports whether the flush gate is open.
    #[must_use]
    pub const fn is_gate_open(&self) -> bool {
        self.flush_gate
    }

    /// Reports whether another removal may enqueue its records.
    ///
    /// The record count of a removal is only known once the cell is gone, so
    /// a removal is admitted while one slot is free. The queue may therefore
    /// exceed `capacity` by at most one removal's records minus one.
    #[must_use]
    pub fn has_room(&self, tuning: &OutputTuning) -> bool {
        self.queue.len() < tuning.capacity
    }

    /// Appends the records produced by a removal.
    pub fn push<I>(&mut self, records: I)
    where
        I: IntoIterator<Item = MaterialRecord>,
    {
        self.queue.extend(records);
    }

    /// Closes the flush gate after the power source ran dry.
    pub fn on_power_lost(&mut self) {
        self.flush_gate = false;
    }

    /// Opens the flush gate after a removal went through.
    pub fn on_removal_succeeded(&mut self) {
        self.flush_gate = true;
    }

    /// Moves queued records out of the rig.
    ///
    /// With an acceptor, at most `batch` records are offered in queue order;
    /// the first rejected record goes back to the front and flushing stops.
    /// Without an acceptor every queued record is ejected at `eject_at`.
    pub fn flush<E>(
        &mut self,
        acceptor: Option<&mut dyn DownstreamAcceptor>,
        env: &mut E,
        eject_at: BlockPos,
        batch: usize,
    ) -> FlushReport
    where
        E: Environment + ?Sized,
    {
        let mut report = FlushReport::default();
        if !self.flush_gate || self.queue.is_empty() {
            return report;
        }

        match acceptor {
            Some(acceptor) => {
                for _ in 0..batch {
                    let Some(record) = self.queue.pop_front() else {
                        break;
                    };
                    if acceptor.try_accept(&record) == Acceptance::Rejected {
                        self.queue.push_front(record);
                        trace!(remaining = self.queue.len(), "downstream rejected record");
                        break;
                    }
                    report.moved += 1;
                }
            }
            None => {
                for record in self.queue.drain(..) {
                    env.eject(eject_at, record);
                    report.ejected += 1;
                }
            }
        }

        report
    }
}
