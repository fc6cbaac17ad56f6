use crate::session::SessionOutcome;

/// Counters kept by the server, for logging and inspection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    /// Sessions accepted and not yet reaped.
    pub connected_clients: usize,
    pub accepted_total: u64,
    /// Periods handed to the device in full.
    pub periods_written: u64,
    /// Periods the device refused because it was still busy.
    pub periods_dropped: u64,
    pub device_errors: u64,
    /// Payloads dropped because their session had already contributed.
    pub messages_deferred: u64,
}

impl Diagnostics {
    #[inline(always)]
    pub fn record(&mut self, outcome: &SessionOutcome) {
        if let SessionOutcome::Deferred = outcome {
            self.messages_deferred = self.messages_deferred.strict_add(1);
        }
    }
}
