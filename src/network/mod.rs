//! Network Layer
//!
//! Relay server, peer client and the authentication that sits between the
//! wire and the simulation. This layer is **non-deterministic**; all world
//! changes go through `game::tick::apply_frame`.

pub mod auth;
pub mod protocol;
pub mod batcher;
pub mod session;
pub mod server;
pub mod client;

pub use auth::{AuthError, ReportVerifier, SignedEnvelope, VerifiedReport, open_action};
pub use protocol::{BatchReportParams, Message, ProtocolError, RpcRequest};
pub use batcher::FrameBatcher;
pub use session::{PeerSession, SequenceError, SessionError, SessionStats};
pub use server::{RelayConfig, RelayError, RelayServer};
pub use client::{PeerClient, PeerConfig, PeerError, seal_action};
