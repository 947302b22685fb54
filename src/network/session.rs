//! Peer Session
//!
//! One replica of the world on the peer side. Reports are authenticated
//! outside the lock, then sequenced and applied while holding it, so no two
//! frames ever interleave. Local actions go straight to the outbound queue
//! and never wait on frame application.

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::core::hash::StateHash;
use crate::crypto::keys::KeyError;
use crate::game::action::Action;
use crate::game::config::WorldConfig;
use crate::game::events::GameEventData;
use crate::game::state::{MatchPhase, WorldState};
use crate::game::tick::{apply_frame, FrameResult};
use crate::network::auth::{AuthError, ReportVerifier};

/// Frame ordering violations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SequenceError {
    /// Frame number at or below the last applied one
    #[error("stale frame {received} (last applied {last_applied})")]
    Stale {
        /// Number carried by the report
        received: u64,
        /// Last frame applied by this session
        last_applied: u64,
    },
}

/// Why a report was not applied.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Report failed authentication
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Report arrived out of order
    #[error(transparent)]
    Sequence(#[from] SequenceError),
}

/// Per-session counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    /// Reports applied
    pub frames_applied: u64,
    /// Reports rejected as stale or duplicate
    pub stale_frames: u64,
    /// Forward jumps in frame numbering
    pub frame_gaps: u64,
    /// Frame numbers skipped over by those jumps
    pub missing_frames: u64,
    /// Reports rejected by authentication
    pub rejected_reports: u64,
    /// Inner events dropped by authentication
    pub rejected_events: u64,
}

/// Sequencing verdict for an incoming frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sequencing {
    /// First report seen; becomes the baseline
    Baseline,
    /// Exactly the next frame
    InOrder,
    /// Later than expected; `missing` frames never arrived
    Gap {
        /// Number of skipped frames
        missing: u64,
    },
}

/// Classify `received` against the last applied frame.
pub fn check_sequence(last_applied: Option<u64>, received: u64) -> Result<Sequencing, SequenceError> {
    let Some(last) = last_applied else {
        return Ok(Sequencing::Baseline);
    };
    if received <= last {
        return Err(SequenceError::Stale { received, last_applied: last });
    }
    match received - last - 1 {
        0 => Ok(Sequencing::InOrder),
        missing => Ok(Sequencing::Gap { missing }),
    }
}

struct SessionInner {
    world: WorldState,
    last_frame: Option<u64>,
    stats: SessionStats,
}

/// A peer's replica plus its outbound action queue.
pub struct PeerSession {
    config: WorldConfig,
    verifier: ReportVerifier,
    inner: Mutex<SessionInner>,
    outbound: mpsc::UnboundedSender<Action>,
}

impl PeerSession {
    /// Create a session trusting reports from `relay_public_pem`.
    ///
    /// Returns the session and the receiving end of its outbound queue.
    pub fn new(
        config: WorldConfig,
        relay_public_pem: &str,
    ) -> Result<(Self, mpsc::UnboundedReceiver<Action>), KeyError> {
        let verifier = ReportVerifier::new(relay_public_pem)?;
        let (outbound, outbound_rx) = mpsc::unbounded_channel();

        let session = Self {
            config,
            verifier,
            inner: Mutex::new(SessionInner {
                world: WorldState::new(),
                last_frame: None,
                stats: SessionStats::default(),
            }),
            outbound,
        };
        Ok((session, outbound_rx))
    }

    /// World configuration in use.
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Queue a local action for sending. Never blocks.
    ///
    /// Returns `false` once the sending side has shut down.
    pub fn queue_action(&self, action: Action) -> bool {
        self.outbound.send(action).is_ok()
    }

    /// Authenticate, sequence and apply one report.
    pub async fn handle_report(&self, text: &str) -> Result<FrameResult, SessionError> {
        let verified = match self.verifier.open_report(text) {
            Ok(verified) => verified,
            Err(err) => {
                self.inner.lock().await.stats.rejected_reports += 1;
                return Err(err.into());
            }
        };
        let frame = verified.frame;

        let mut inner = self.inner.lock().await;
        inner.stats.rejected_events += verified.rejected_events as u64;

        match check_sequence(inner.last_frame, frame.number) {
            Ok(Sequencing::Baseline) => {
                debug!(frame = frame.number, "first report; baseline set");
            }
            Ok(Sequencing::InOrder) => {}
            Ok(Sequencing::Gap { missing }) => {
                warn!(frame = frame.number, missing, "frame gap; applying anyway");
                inner.stats.frame_gaps += 1;
                inner.stats.missing_frames += missing;
            }
            Err(err) => {
                inner.stats.stale_frames += 1;
                return Err(err.into());
            }
        }

        let inner = &mut *inner;
        let result = apply_frame(&mut inner.world, &frame, &self.config);
        inner.last_frame = Some(frame.number);
        inner.stats.frames_applied += 1;

        for action in &result.outbound {
            if self.outbound.send(*action).is_err() {
                debug!(frame = frame.number, method = action.method(), "outbound queue closed; re-announcement dropped");
            }
        }
        log_events(&result);

        Ok(result)
    }

    /// Clone of the current world.
    pub async fn snapshot(&self) -> WorldState {
        self.inner.lock().await.world.clone()
    }

    /// Hash of the current world.
    pub async fn state_hash(&self) -> StateHash {
        self.inner.lock().await.world.compute_hash()
    }

    /// Current match phase.
    pub async fn phase(&self) -> MatchPhase {
        self.inner.lock().await.world.phase
    }

    /// Last applied frame number.
    pub async fn last_frame(&self) -> Option<u64> {
        self.inner.lock().await.last_frame
    }

    /// Session counters.
    pub async fn stats(&self) -> SessionStats {
        self.inner.lock().await.stats.clone()
    }
}

fn log_events(result: &FrameResult) {
    for event in &result.events {
        match &event.data {
            GameEventData::PhaseChanged { old_phase, new_phase } => {
                info!(frame = event.frame, "match phase {} -> {}", old_phase, new_phase);
            }
            GameEventData::PlayerEliminated { player_id } => {
                info!(frame = event.frame, player = %player_id, "player eliminated");
            }
            GameEventData::MatchFinished { winner_id: Some(winner) } => {
                info!(frame = event.frame, winner = %winner, "match finished");
            }
            GameEventData::MatchFinished { winner_id: None } => {
                info!(frame = event.frame, "match finished with no survivor");
            }
            GameEventData::PlayerSpawned { player_id, .. } => {
                debug!(frame = event.frame, player = %player_id, "player spawned");
            }
            _ => {}
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use crate::crypto::fixtures;
    use crate::crypto::keys::KeyPair;
    use crate::game::action::{Direction, RequestId};
    use crate::network::auth::SignedEnvelope;
    use crate::network::protocol::{action_request, batch_report_request, BatchReportParams};

    const FRAME_NS: u64 = 16_666_667;

    fn signed_action(action: Action, keys: &KeyPair) -> Value {
        SignedEnvelope::seal(action_request(&action, RequestId::new_v4()), keys)
            .unwrap()
            .to_value()
            .unwrap()
    }

    fn report_text(number: u64, events: Vec<Value>, keys: &KeyPair) -> String {
        let params = BatchReportParams {
            frame_number: number,
            delta_events: events,
            delta_timing: FRAME_NS,
        };
        let payload = batch_report_request(&params, RequestId::Number(number as i64)).unwrap();
        SignedEnvelope::seal(payload, keys).unwrap().to_json().unwrap()
    }

    fn new_session() -> (PeerSession, mpsc::UnboundedReceiver<Action>) {
        PeerSession::new(WorldConfig::bounded(), fixtures::relay().public_key_pem()).unwrap()
    }

    #[test]
    fn test_check_sequence() {
        assert_eq!(check_sequence(None, 42), Ok(Sequencing::Baseline));
        assert_eq!(check_sequence(Some(4), 5), Ok(Sequencing::InOrder));
        assert_eq!(check_sequence(Some(4), 8), Ok(Sequencing::Gap { missing: 3 }));
        assert_eq!(
            check_sequence(Some(4), 4),
            Err(SequenceError::Stale { received: 4, last_applied: 4 })
        );
        assert!(check_sequence(Some(4), 0).is_err());
    }

    #[tokio::test]
    async fn test_report_applies_and_reannounces() {
        let (session, mut outbound) = new_session();
        let relay = fixtures::relay();
        let alice = fixtures::alice();

        let text = report_text(0, vec![signed_action(Action::Join, alice)], relay);
        let result = session.handle_report(&text).await.unwrap();

        assert_eq!(result.outbound, vec![Action::Join]);
        assert_eq!(outbound.try_recv().unwrap(), Action::Join);
        assert_eq!(session.last_frame().await, Some(0));

        let world = session.snapshot().await;
        assert_eq!(world.join_order.len(), 1);
        assert_eq!(world.join_order[0].as_str(), alice.public_key_pem());
    }

    #[tokio::test]
    async fn test_report_applies_after_outbound_closed() {
        let (session, outbound) = new_session();
        drop(outbound);

        let text = report_text(0, vec![signed_action(Action::Join, fixtures::alice())], fixtures::relay());
        let result = session.handle_report(&text).await.unwrap();

        assert_eq!(result.outbound, vec![Action::Join]);
        assert_eq!(session.snapshot().await.join_order.len(), 1);
        assert_eq!(session.last_frame().await, Some(0));
    }

    #[tokio::test]
    async fn test_stale_and_duplicate_frames_rejected() {
        let (session, _outbound) = new_session();
        let relay = fixtures::relay();

        session.handle_report(&report_text(3, Vec::new(), relay)).await.unwrap();
        let before = session.state_hash().await;

        let duplicate = session.handle_report(&report_text(3, Vec::new(), relay)).await;
        assert!(matches!(duplicate, Err(SessionError::Sequence(SequenceError::Stale { .. }))));
        let older = session.handle_report(&report_text(1, Vec::new(), relay)).await;
        assert!(older.is_err());

        assert_eq!(session.state_hash().await, before);
        assert_eq!(session.stats().await.stale_frames, 2);
    }

    #[tokio::test]
    async fn test_gap_is_counted_and_applied() {
        let (session, _outbound) = new_session();
        let relay = fixtures::relay();

        session.handle_report(&report_text(0, Vec::new(), relay)).await.unwrap();
        session.handle_report(&report_text(5, Vec::new(), relay)).await.unwrap();

        let stats = session.stats().await;
        assert_eq!(stats.frames_applied, 2);
        assert_eq!(stats.frame_gaps, 1);
        assert_eq!(stats.missing_frames, 4);
        assert_eq!(session.last_frame().await, Some(5));
    }

    #[tokio::test]
    async fn test_untrusted_report_changes_nothing() {
        let (session, _outbound) = new_session();
        let alice = fixtures::alice();

        let text = report_text(0, vec![signed_action(Action::Join, alice)], alice);
        let result = session.handle_report(&text).await;

        assert!(matches!(result, Err(SessionError::Auth(AuthError::Untrusted { .. }))));
        assert!(session.snapshot().await.players.is_empty());
        assert_eq!(session.last_frame().await, None);
        assert_eq!(session.stats().await.rejected_reports, 1);
    }

    #[tokio::test]
    async fn test_two_sessions_agree() {
        let (first, _rx1) = new_session();
        let (second, _rx2) = new_session();
        let relay = fixtures::relay();
        let alice = fixtures::alice();
        let bob = fixtures::bob();

        let reports = vec![
            report_text(0, vec![signed_action(Action::Join, alice), signed_action(Action::Join, bob)], relay),
            report_text(1, vec![signed_action(Action::StartMatch, bob)], relay),
            report_text(2, vec![
                signed_action(Action::moving(Direction::Right), alice),
                signed_action(Action::shoot(400, 300), bob),
            ], relay),
            report_text(3, Vec::new(), relay),
        ];

        for text in &reports {
            first.handle_report(text).await.unwrap();
            second.handle_report(text).await.unwrap();
            assert_eq!(first.state_hash().await, second.state_hash().await);
        }
        assert_eq!(first.phase().await, MatchPhase::Active);
    }

    #[tokio::test]
    async fn test_local_actions_do_not_touch_world() {
        let (session, mut outbound) = new_session();
        let before = session.state_hash().await;

        assert!(session.queue_action(Action::moving(Direction::Up)));
        assert_eq!(outbound.try_recv().unwrap(), Action::moving(Direction::Up));
        assert_eq!(session.state_hash().await, before);

        drop(outbound);
        assert!(!session.queue_action(Action::Join));
    }
}
