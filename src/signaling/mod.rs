//! Signaling contract and transports
//!
//! Signaling messages are JSON objects discriminated by a `type` field. The
//! transport itself is pluggable: the client sends through [`SignalingSender`]
//! and receives messages from an `mpsc` channel the transport feeds. A
//! WebSocket reference transport lives in [`ws`].

pub mod ws;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Platform hint carried by an offer, used for codec selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformHint {
    #[default]
    Generic,
    /// Mac hardware H.264 encode has a color-accuracy issue; prefer VP9
    Mac,
}

/// SDP offer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferPayload {
    pub sdp: String,
    #[serde(
        rename = "platformHint",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub platform_hint: Option<PlatformHint>,
}

/// SDP answer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerPayload {
    pub sdp: String,
}

/// ICE candidate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidatePayload {
    pub candidate: String,
    #[serde(rename = "sdpMid")]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex")]
    pub sdp_mline_index: Option<u16>,
}

/// Signaling message union, discriminated by `type`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SignalingMessage {
    Offer(OfferPayload),
    Answer(AnswerPayload),
    IceCandidate(CandidatePayload),
    HealthCheck,
    HealthCheckAck,
    ConnectAck,
}

/// Outbound half of a signaling transport
#[async_trait]
pub trait SignalingSender: Send + Sync {
    /// Send a typed signaling message
    async fn send(&self, message: SignalingMessage) -> Result<()>;

    /// Forward a connection statistics record for server-side logging
    async fn send_stats(&self, record: serde_json::Value) -> Result<()>;
}
