//! Envelope Authentication
//!
//! Every message on the wire is a signed envelope:
//!
//! ```json
//! {"payload": {...}, "signature": "<base64>", "public_key": "<PEM>"}
//! ```
//!
//! The signature covers the canonical JSON of `payload`. Reports are opened
//! twice: the outer envelope must come from the trusted relay, and each
//! inner envelope is opened on its own so a single forged action never
//! poisons the rest of the frame.

use serde::{Serialize, Deserialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::crypto::canonical::canonicalize_map;
use crate::crypto::keys::{canonical_public_pem, parse_public_key, KeyError, KeyPair};
use crate::crypto::signer::verify_with_key;
use crate::crypto::CodecError;
use crate::game::action::AuthoredAction;
use crate::game::state::PlayerId;
use crate::game::tick::Frame;
use crate::network::protocol::{decode_action, decode_message, Message, ProtocolError};

/// Envelope rejection reasons.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Not an envelope at all
    #[error("malformed envelope: {0}")]
    Malformed(String),

    /// `public_key` is not an RSA public key
    #[error("invalid signer key: {0}")]
    BadKey(String),

    /// Signature does not match the payload
    #[error("signature verification failed for {signer}")]
    BadSignature {
        /// Short form of the claimed signer
        signer: String,
    },

    /// Properly signed, but not by the trusted relay
    #[error("report signed by untrusted identity {signer}")]
    Untrusted {
        /// Short form of the actual signer
        signer: String,
    },

    /// Signed payload is not a batch report
    #[error("expected batch.report, got {0}")]
    NotAReport(String),

    /// Signed payload could not be decoded
    #[error("undecodable payload: {0}")]
    Payload(#[from] ProtocolError),

    /// Payload could not be canonicalized
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// A signed message as it travels on the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SignedEnvelope {
    /// Signed content
    pub payload: Map<String, Value>,
    /// Base64 PKCS#1 v1.5 signature over the canonical payload
    pub signature: String,
    /// Signer's public key PEM
    pub public_key: String,
}

impl SignedEnvelope {
    /// Sign `payload` under `keys`.
    pub fn seal(payload: Map<String, Value>, keys: &KeyPair) -> Result<Self, CodecError> {
        let signature = keys.sign(&canonicalize_map(&payload)?)?;
        Ok(Self {
            payload,
            signature,
            public_key: keys.public_key_pem().to_string(),
        })
    }

    /// Interpret a JSON value as an envelope.
    ///
    /// Transports that wrap deliveries as `{"content": ..., "remote_addr": ...}`
    /// are unwrapped first.
    pub fn from_value(value: &Value) -> Result<Self, AuthError> {
        let inner = match value.get("content") {
            Some(content) if value.get("payload").is_none() => content,
            _ => value,
        };
        let inner = match inner {
            // Some transports deliver the content as a JSON string
            Value::String(text) => {
                return serde_json::from_str::<Value>(text)
                    .map_err(|e| AuthError::Malformed(e.to_string()))
                    .and_then(|parsed| Self::from_value(&parsed));
            }
            other => other,
        };
        Self::deserialize(inner).map_err(|e| AuthError::Malformed(e.to_string()))
    }

    /// Parse an envelope from wire text.
    pub fn from_json(text: &str) -> Result<Self, AuthError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| AuthError::Malformed(e.to_string()))?;
        Self::from_value(&value)
    }

    /// Serialize to wire text.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize to a JSON value (for embedding in a report).
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// Verify the signature and return the signer's identity.
    ///
    /// The identity is the canonical PEM of `public_key`, so cosmetic
    /// differences in the transmitted PEM never split one signer in two.
    pub fn open(&self) -> Result<PlayerId, AuthError> {
        let public_key = parse_public_key(&self.public_key).map_err(bad_key)?;
        let message = canonicalize_map(&self.payload)?;

        if !verify_with_key(&message, &self.signature, &public_key) {
            return Err(AuthError::BadSignature {
                signer: PlayerId::new(self.public_key.as_str()).short(),
            });
        }

        let identity = canonical_public_pem(&self.public_key).map_err(bad_key)?;
        Ok(PlayerId::new(identity))
    }
}

fn bad_key(err: KeyError) -> AuthError {
    AuthError::BadKey(err.to_string())
}

/// Open an inner envelope and decode the action it carries.
pub fn open_action(value: &Value) -> Result<AuthoredAction, AuthError> {
    let envelope = SignedEnvelope::from_value(value)?;
    let author = envelope.open()?;
    let (request_id, action) = decode_action(&envelope.payload)?;
    Ok(AuthoredAction {
        author,
        request_id,
        action,
    })
}

/// A report that passed outer and inner authentication.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedReport {
    /// Frame built from the surviving actions
    pub frame: Frame,
    /// Inner envelopes dropped during authentication
    pub rejected_events: usize,
}

/// Opens relay reports on the peer side.
#[derive(Debug, Clone)]
pub struct ReportVerifier {
    trusted_relay: PlayerId,
}

impl ReportVerifier {
    /// Trust reports signed by the key in `relay_public_pem`.
    pub fn new(relay_public_pem: &str) -> Result<Self, KeyError> {
        Ok(Self {
            trusted_relay: PlayerId::new(canonical_public_pem(relay_public_pem)?),
        })
    }

    /// Identity of the trusted relay.
    pub fn trusted_relay(&self) -> &PlayerId {
        &self.trusted_relay
    }

    /// Authenticate a report and its contents.
    ///
    /// The outer envelope is all-or-nothing. Inner envelopes that fail are
    /// dropped one at a time with a warning and counted.
    pub fn open_report(&self, text: &str) -> Result<VerifiedReport, AuthError> {
        let envelope = SignedEnvelope::from_json(text)?;
        let signer = envelope.open()?;
        if signer != self.trusted_relay {
            return Err(AuthError::Untrusted { signer: signer.short() });
        }

        let params = match decode_message(&envelope.payload)? {
            Message::BatchReport { params, .. } => params,
            other => return Err(AuthError::NotAReport(other.method().to_string())),
        };

        let mut events = Vec::with_capacity(params.delta_events.len());
        let mut rejected_events = 0;
        for (index, raw) in params.delta_events.iter().enumerate() {
            match open_action(raw) {
                Ok(action) => events.push(action),
                Err(err) => {
                    rejected_events += 1;
                    match err {
                        AuthError::Malformed(_) | AuthError::Payload(_) => {
                            debug!(frame = params.frame_number, index, error = %err, "dropping undecodable event")
                        }
                        _ => warn!(frame = params.frame_number, index, error = %err, "dropping unauthenticated event"),
                    }
                }
            }
        }

        Ok(VerifiedReport {
            frame: Frame::new(params.frame_number, params.delta_timing, events),
            rejected_events,
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::fixtures;
    use crate::game::action::{Action, Direction, RequestId};
    use crate::network::protocol::{action_request, batch_report_request, BatchReportParams};
    use serde_json::json;

    fn sealed(action: Action, keys: &KeyPair) -> SignedEnvelope {
        SignedEnvelope::seal(action_request(&action, RequestId::Number(1)), keys).unwrap()
    }

    fn report(number: u64, events: Vec<Value>, keys: &KeyPair) -> String {
        let params = BatchReportParams {
            frame_number: number,
            delta_events: events,
            delta_timing: 16_666_667,
        };
        let payload = batch_report_request(&params, RequestId::Number(0)).unwrap();
        SignedEnvelope::seal(payload, keys).unwrap().to_json().unwrap()
    }

    #[test]
    fn test_seal_then_open() {
        let alice = fixtures::alice();
        let envelope = sealed(Action::Join, alice);
        let signer = envelope.open().unwrap();
        assert_eq!(signer.as_str(), alice.public_key_pem());
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let mut envelope = sealed(Action::shoot(10, 10), fixtures::alice());
        envelope.payload["params"]["target_x"] = json!(11);
        assert!(matches!(envelope.open(), Err(AuthError::BadSignature { .. })));
    }

    #[test]
    fn test_swapped_key_rejected() {
        let mut envelope = sealed(Action::Join, fixtures::alice());
        envelope.public_key = fixtures::bob().public_key_pem().to_string();
        assert!(matches!(envelope.open(), Err(AuthError::BadSignature { .. })));

        envelope.public_key = "not a key".into();
        assert!(matches!(envelope.open(), Err(AuthError::BadKey(_))));
    }

    #[test]
    fn test_cosmetic_pem_differences_share_identity() {
        let alice = fixtures::alice();
        let mut envelope = sealed(Action::Join, alice);
        envelope.public_key = format!("{}\r\n", alice.public_key_pem().replace('\n', "\r\n"));
        assert_eq!(envelope.open().unwrap().as_str(), alice.public_key_pem());
    }

    #[test]
    fn test_from_value_unwraps_content() {
        let envelope = sealed(Action::StartMatch, fixtures::alice());
        let wrapped = json!({"remote_addr": "127.0.0.1:5000", "content": envelope.to_value().unwrap()});
        assert_eq!(SignedEnvelope::from_value(&wrapped).unwrap(), envelope);

        let as_text = json!({"remote_addr": "x", "content": envelope.to_json().unwrap()});
        assert_eq!(SignedEnvelope::from_value(&as_text).unwrap(), envelope);

        assert!(matches!(
            SignedEnvelope::from_value(&json!({"payload": 1})),
            Err(AuthError::Malformed(_))
        ));
    }

    #[test]
    fn test_open_report_filters_inner_events() {
        let relay = fixtures::relay();
        let alice = fixtures::alice();
        let bob = fixtures::bob();
        let verifier = ReportVerifier::new(relay.public_key_pem()).unwrap();

        let mut forged = sealed(Action::moving(Direction::Right), bob);
        forged.public_key = alice.public_key_pem().to_string();

        let events = vec![
            sealed(Action::Join, alice).to_value().unwrap(),
            forged.to_value().unwrap(),
            json!("garbage"),
            sealed(Action::shoot(5, 6), bob).to_value().unwrap(),
        ];
        let verified = verifier.open_report(&report(4, events, relay)).unwrap();

        assert_eq!(verified.rejected_events, 2);
        assert_eq!(verified.frame.number, 4);
        assert_eq!(verified.frame.elapsed_ns, 16_666_667);
        let authors: Vec<_> = verified.frame.events.iter().map(|e| e.author.as_str()).collect();
        assert_eq!(authors, vec![alice.public_key_pem(), bob.public_key_pem()]);
        assert_eq!(verified.frame.events[1].action, Action::shoot(5, 6));
    }

    #[test]
    fn test_report_from_untrusted_signer_rejected() {
        let verifier = ReportVerifier::new(fixtures::relay().public_key_pem()).unwrap();
        let text = report(0, Vec::new(), fixtures::alice());
        assert!(matches!(verifier.open_report(&text), Err(AuthError::Untrusted { .. })));
    }

    #[test]
    fn test_untrusted_signer_checked_before_payload() {
        let verifier = ReportVerifier::new(fixtures::relay().public_key_pem()).unwrap();

        let action = sealed(Action::Join, fixtures::alice()).to_json().unwrap();
        assert!(matches!(verifier.open_report(&action), Err(AuthError::Untrusted { .. })));

        let mut payload = Map::new();
        payload.insert("jsonrpc".to_string(), json!("1.0"));
        let junk = SignedEnvelope::seal(payload, fixtures::bob()).unwrap().to_json().unwrap();
        assert!(matches!(verifier.open_report(&junk), Err(AuthError::Untrusted { .. })));
    }

    #[test]
    fn test_signed_action_is_not_a_report() {
        let relay = fixtures::relay();
        let verifier = ReportVerifier::new(relay.public_key_pem()).unwrap();
        let text = sealed(Action::Join, relay).to_json().unwrap();
        assert!(matches!(verifier.open_report(&text), Err(AuthError::NotAReport(_))));
    }

    #[test]
    fn test_garbage_report_rejected() {
        let verifier = ReportVerifier::new(fixtures::relay().public_key_pem()).unwrap();
        assert!(matches!(verifier.open_report("{"), Err(AuthError::Malformed(_))));
        assert!(matches!(verifier.open_report("[]"), Err(AuthError::Malformed(_))));
    }
}
