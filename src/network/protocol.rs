//! Protocol Messages
//!
//! JSON-RPC 2.0 request shapes exchanged through the relay. Every message is
//! the `payload` of a signed envelope; this module only deals with the
//! payload itself.
//!
//! | method | params |
//! |---|---|
//! | `player.join` | `{}` |
//! | `game.start` | `{}` |
//! | `player.move` | `{"direction": "w" \| "a" \| "s" \| "d"}` |
//! | `player.shoot` | `{"target_x": int, "target_y": int}` |
//! | `batch.report` | `{"frameNumber": int, "deltaEvents": [envelope], "deltaTiming": int}` |

use serde::{Serialize, Deserialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::game::action::{Action, Direction, RequestId};

/// Protocol version carried in every request.
pub const JSONRPC_VERSION: &str = "2.0";

/// Method name of relay frame reports.
pub const BATCH_REPORT_METHOD: &str = "batch.report";

/// Wire decoding failures.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Payload does not have the request shape
    #[error("malformed request: {0}")]
    Malformed(#[from] serde_json::Error),

    /// `jsonrpc` field other than "2.0"
    #[error("unsupported jsonrpc version {0:?}")]
    Version(String),

    /// Method outside the known set
    #[error("unknown method {0:?}")]
    UnknownMethod(String),

    /// Params do not fit the method
    #[error("invalid params for {method}: {reason}")]
    InvalidParams {
        /// Method being decoded
        method: String,
        /// What was wrong
        reason: String,
    },
}

fn default_version() -> String {
    JSONRPC_VERSION.to_string()
}

/// A JSON-RPC request before method dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Always "2.0"
    #[serde(default = "default_version")]
    pub jsonrpc: String,
    /// Method name
    pub method: String,
    /// Method parameters
    pub params: Value,
    /// Request id; senders that omit it get a fresh one
    #[serde(default = "RequestId::new_v4")]
    pub id: RequestId,
}

impl RpcRequest {
    /// Parse a request from an envelope payload.
    pub fn from_payload(payload: &Map<String, Value>) -> Result<Self, ProtocolError> {
        let request: RpcRequest = serde_json::from_value(Value::Object(payload.clone()))?;
        if request.jsonrpc != JSONRPC_VERSION {
            return Err(ProtocolError::Version(request.jsonrpc));
        }
        Ok(request)
    }

    /// Convert to an envelope payload.
    pub fn into_payload(self) -> Map<String, Value> {
        let mut payload = Map::new();
        payload.insert("jsonrpc".into(), Value::String(self.jsonrpc));
        payload.insert("method".into(), Value::String(self.method));
        payload.insert("params".into(), self.params);
        payload.insert("id".into(), request_id_value(&self.id));
        payload
    }

    fn invalid(&self, reason: impl ToString) -> ProtocolError {
        ProtocolError::InvalidParams {
            method: self.method.clone(),
            reason: reason.to_string(),
        }
    }
}

fn request_id_value(id: &RequestId) -> Value {
    match id {
        RequestId::Number(n) => Value::from(*n),
        RequestId::Text(s) => Value::String(s.clone()),
    }
}

#[derive(Deserialize)]
struct MoveParams {
    direction: Direction,
}

#[derive(Deserialize)]
struct ShootParams {
    target_x: i64,
    target_y: i64,
}

/// Parameters of a `batch.report`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReportParams {
    /// Sequence number, starting at 0
    pub frame_number: u64,
    /// Envelopes received since the previous report, untouched
    pub delta_events: Vec<Value>,
    /// Real time since the previous report (ns)
    pub delta_timing: u64,
}

/// A decoded payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// A player action
    Action {
        /// Request id
        id: RequestId,
        /// The action
        action: Action,
    },
    /// A relay frame report
    BatchReport {
        /// Request id
        id: RequestId,
        /// Report contents
        params: BatchReportParams,
    },
}

impl Message {
    /// Method name of this message.
    pub fn method(&self) -> &'static str {
        match self {
            Message::Action { action, .. } => action.method(),
            Message::BatchReport { .. } => BATCH_REPORT_METHOD,
        }
    }
}

/// Decode any payload by method.
pub fn decode_message(payload: &Map<String, Value>) -> Result<Message, ProtocolError> {
    let request = RpcRequest::from_payload(payload)?;

    if request.method == BATCH_REPORT_METHOD {
        let params: BatchReportParams =
            serde_json::from_value(request.params.clone()).map_err(|e| request.invalid(e))?;
        return Ok(Message::BatchReport { id: request.id, params });
    }

    let action = decode_params(&request)?;
    Ok(Message::Action { id: request.id, action })
}

/// Decode a payload that must be a player action.
pub fn decode_action(payload: &Map<String, Value>) -> Result<(RequestId, Action), ProtocolError> {
    let request = RpcRequest::from_payload(payload)?;
    let action = decode_params(&request)?;
    Ok((request.id, action))
}

fn decode_params(request: &RpcRequest) -> Result<Action, ProtocolError> {
    // Extra keys are tolerated; non-object params are not
    if !request.params.is_object() {
        return Err(request.invalid("params must be an object"));
    }

    match request.method.as_str() {
        "player.join" => Ok(Action::Join),
        "game.start" => Ok(Action::StartMatch),
        "player.move" => {
            let params: MoveParams =
                serde_json::from_value(request.params.clone()).map_err(|e| request.invalid(e))?;
            Ok(Action::moving(params.direction))
        }
        "player.shoot" => {
            let params: ShootParams =
                serde_json::from_value(request.params.clone()).map_err(|e| request.invalid(e))?;
            Ok(Action::shoot(params.target_x, params.target_y))
        }
        other => Err(ProtocolError::UnknownMethod(other.to_string())),
    }
}

/// Build the request payload for a player action.
pub fn action_request(action: &Action, id: RequestId) -> Map<String, Value> {
    let params = match action {
        Action::Join | Action::StartMatch => json!({}),
        Action::Move { direction } => json!({ "direction": direction.key() }),
        Action::Shoot { target_x, target_y } => json!({ "target_x": target_x, "target_y": target_y }),
    };

    RpcRequest {
        jsonrpc: default_version(),
        method: action.method().to_string(),
        params,
        id,
    }
    .into_payload()
}

/// Build the request payload for a frame report.
pub fn batch_report_request(
    params: &BatchReportParams,
    id: RequestId,
) -> Result<Map<String, Value>, ProtocolError> {
    Ok(RpcRequest {
        jsonrpc: default_version(),
        method: BATCH_REPORT_METHOD.to_string(),
        params: serde_json::to_value(params)?,
        id,
    }
    .into_payload())
}

// =============================================================================
// TESTS
// =============================================================================
