//! Poll bookkeeping: sequence numbers for out-of-order protection and
//! failure accounting for silent retry.

use tracing::{debug, info, warn};

use crate::backend::BackendError;

const LOG_TARGET: &str = "runtime::poller";

#[derive(Debug, Default)]
pub struct SnapshotPoller {
    next_seq: u64,
    newest_applied: Option<u64>,
    /// Polls issued before this sequence predate the last command response.
    fence: u64,
    in_flight: usize,
    consecutive_failures: u32,
}

impl SnapshotPoller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Allocates the sequence number for a new fetch.
    pub fn issue(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.in_flight += 1;
        seq
    }

    /// Invalidates every fetch issued so far. Called when a command response
    /// replaces the snapshot.
    pub fn fence(&mut self) {
        self.fence = self.next_seq;
    }

    /// Settles a successful fetch. Returns `false` when the result is older
    /// than what was already applied and must be discarded.
    pub fn accept(&mut self, seq: u64) -> bool {
        self.settle();
        if self.consecutive_failures > 0 {
            info!(
                target = LOG_TARGET,
                failures = self.consecutive_failures,
                "snapshot polling recovered"
            );
            self.consecutive_failures = 0;
        }
        if seq < self.fence || self.newest_applied.is_some_and(|newest| seq <= newest) {
            debug!(target = LOG_TARGET, seq, "discarding out-of-order poll result");
            return false;
        }
        self.newest_applied = Some(seq);
        true
    }

    /// Settles a failed fetch; the last known snapshot stays in place and the
    /// next tick retries.
    pub fn record_failure(&mut self, seq: u64, err: &BackendError) {
        self.settle();
        self.consecutive_failures += 1;
        if self.consecutive_failures == 1 {
            warn!(target = LOG_TARGET, seq, error = %err, "snapshot poll failed; retrying next tick");
        } else {
            debug!(
                target = LOG_TARGET,
                seq,
                failures = self.consecutive_failures,
                error = %err,
                "snapshot poll still failing"
            );
        }
    }

    fn settle(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }
}
