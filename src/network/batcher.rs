//! Frame Batcher
//!
//! Relay-side accumulator. Envelopes that pass signature checks are queued
//! untouched; on every tick everything queued since the previous tick is
//! drained into one numbered, timed report.

use serde_json::Value;
use tokio::time::Instant;

use crate::crypto::keys::KeyPair;
use crate::game::action::RequestId;
use crate::network::auth::SignedEnvelope;
use crate::network::protocol::{batch_report_request, BatchReportParams};
use crate::network::server::RelayError;

/// Accumulates envelopes between ticks.
#[derive(Debug)]
pub struct FrameBatcher {
    pending: Vec<Value>,
    next_frame: u64,
    last_drain: Instant,
}

impl FrameBatcher {
    /// Create a batcher whose first frame covers time since `start`.
    pub fn new(start: Instant) -> Self {
        Self {
            pending: Vec::new(),
            next_frame: 0,
            last_drain: start,
        }
    }

    /// Queue an envelope for the next report.
    pub fn push(&mut self, envelope: Value) {
        self.pending.push(envelope);
    }

    /// Number of envelopes waiting.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Number the next report will carry.
    pub fn next_frame(&self) -> u64 {
        self.next_frame
    }

    /// Drain everything queued into the next report.
    ///
    /// Elapsed time is measured from the previous drain to `now`, so a late
    /// tick reports the real delta rather than the nominal interval.
    pub fn drain(&mut self, now: Instant) -> BatchReportParams {
        let elapsed = now.saturating_duration_since(self.last_drain);
        let params = BatchReportParams {
            frame_number: self.next_frame,
            delta_events: std::mem::take(&mut self.pending),
            delta_timing: u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX),
        };

        self.next_frame += 1;
        self.last_drain = now;
        params
    }

    /// Drain and seal the report under the relay key, ready for broadcast.
    pub fn drain_sealed(&mut self, now: Instant, keys: &KeyPair) -> Result<(u64, String), RelayError> {
        let params = self.drain(now);
        let payload = batch_report_request(&params, RequestId::new_v4())?;
        let text = SignedEnvelope::seal(payload, keys)?.to_json()?;
        Ok((params.frame_number, text))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use crate::crypto::fixtures;
    use crate::network::auth::ReportVerifier;
    use serde_json::json;

    #[test]
    fn test_frames_number_from_zero() {
        let start = Instant::now();
        let mut batcher = FrameBatcher::new(start);

        let first = batcher.drain(start + Duration::from_millis(16));
        let second = batcher.drain(start + Duration::from_millis(40));

        assert_eq!(first.frame_number, 0);
        assert_eq!(second.frame_number, 1);
        assert_eq!(batcher.next_frame(), 2);
        assert_eq!(first.delta_timing, 16_000_000);
        assert_eq!(second.delta_timing, 24_000_000);
    }

    #[test]
    fn test_empty_ticks_still_report() {
        let start = Instant::now();
        let mut batcher = FrameBatcher::new(start);
        let report = batcher.drain(start + Duration::from_millis(17));
        assert!(report.delta_events.is_empty());
        assert_eq!(report.delta_timing, 17_000_000);
    }

    #[test]
    fn test_drain_preserves_arrival_order() {
        let start = Instant::now();
        let mut batcher = FrameBatcher::new(start);
        for n in 0..3 {
            batcher.push(json!({ "n": n }));
        }
        assert_eq!(batcher.pending_len(), 3);

        let report = batcher.drain(start);
        assert_eq!(report.delta_events, vec![json!({"n": 0}), json!({"n": 1}), json!({"n": 2})]);
        assert_eq!(batcher.pending_len(), 0);
        assert_eq!(report.delta_timing, 0);

        // Nothing leaks into the following frame
        assert!(batcher.drain(start).delta_events.is_empty());
    }

    #[test]
    fn test_sealed_report_opens_on_peer() {
        let relay = fixtures::relay();
        let start = Instant::now();
        let mut batcher = FrameBatcher::new(start);

        let (number, text) = batcher.drain_sealed(start + Duration::from_millis(5), relay).unwrap();
        assert_eq!(number, 0);

        let verified = ReportVerifier::new(relay.public_key_pem()).unwrap().open_report(&text).unwrap();
        assert_eq!(verified.frame.number, 0);
        assert_eq!(verified.frame.elapsed_ns, 5_000_000);
        assert!(verified.frame.events.is_empty());
    }
}
