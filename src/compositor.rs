//! Compositor collaborator contract
//!
//! The video compositor consumes the remote track and reports the render
//! latency it measures, which the stats collector merges into its reports.

use async_trait::async_trait;
use std::sync::Arc;
use webrtc::track::track_remote::TrackRemote;

/// Downstream consumer of the remotely rendered video
#[async_trait]
pub trait Compositor: Send + Sync {
    /// Accept a remote media track as the new render source
    async fn accept_remote_track(&self, track: Arc<TrackRemote>);

    /// Stop consuming remote video (the local placeholder takes over)
    async fn disable(&self);

    /// Latest end-to-end latency measured by the compositor (ms)
    fn latency_ms(&self) -> f64;
}
