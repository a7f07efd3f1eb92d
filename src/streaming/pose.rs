//! Camera pose streaming
//!
//! Once per render tick the camera world transform goes out on the input
//! channel as 17 little-endian f64 values: the 16 row-major matrix elements
//! followed by the frame identifier. During the warm-up window after a
//! connection every tick sends so the server locks onto the camera quickly;
//! afterwards only movement beyond the configured thresholds does.

use bytes::{BufMut, Bytes, BytesMut};
use std::sync::Arc;
use tracing::{debug, trace};
use webrtc::data_channel::data_channel_state::RTCDataChannelState;

use crate::config::ClientConfig;
use crate::error::Result;
use crate::math::Mat4;
use crate::scene::Scene;
use crate::session::{PendingPose, PoseSample, Session, SessionSlot, SessionState};

/// Encoded pose payload size: (16 + 1) * 8 bytes
pub const POSE_PAYLOAD_LEN: usize = 136;

/// Encode a transform and frame identifier for the input channel
pub fn encode_pose(transform: &Mat4, frame_id: u32) -> Bytes {
    let mut buf = BytesMut::with_capacity(POSE_PAYLOAD_LEN);
    for value in transform.elements() {
        buf.put_f64_le(*value);
    }
    buf.put_f64_le(frame_id as f64);
    buf.freeze()
}

/// Streams camera poses on the input channel
pub struct PoseStreamer {
    config: ClientConfig,
    scene: Arc<dyn Scene>,
    slot: SessionSlot,
}

impl PoseStreamer {
    pub fn new(config: ClientConfig, scene: Arc<dyn Scene>, slot: SessionSlot) -> Self {
        Self {
            config,
            scene,
            slot,
        }
    }

    /// Whether a sample should go out this tick.
    ///
    /// The last-sent pose updates per component as a side effect, so a slow
    /// drift below both thresholds never accumulates into a send.
    fn should_send(&self, session: &Session, sample: &PoseSample) -> bool {
        let changed = session.update_last_pose(
            sample,
            self.config.position_threshold,
            self.config.rotation_threshold,
        );
        session.in_warmup(self.config.pose_warmup()) || changed
    }

    /// Sample and (maybe) send the current camera pose.
    ///
    /// Returns whether a pose went out. A tick without a Connected session or
    /// an open input channel is a no-op.
    pub async fn tick(&self) -> Result<bool> {
        let Some(session) = self.slot.read().await.clone() else {
            return Ok(false);
        };
        if session.state() != SessionState::Connected {
            return Ok(false);
        }
        if session.input_channel().ready_state() != RTCDataChannelState::Open {
            trace!("Input channel not open, skipping pose");
            return Ok(false);
        }

        let transform = self.scene.camera_world_transform();
        let sample = PoseSample::from_transform(&transform);
        if !self.should_send(&session, &sample) {
            return Ok(false);
        }

        let frame_id = session.current_frame_id();
        let payload = encode_pose(&transform, frame_id);
        session.input_channel().send(&payload).await?;
        session.advance_frame_id();

        let pose = match (
            self.scene.immersive_presentation_active(),
            self.scene.stereo_camera_transforms(),
        ) {
            (true, Some((left, right))) => PendingPose::Stereo(left, right),
            _ => PendingPose::Mono(transform),
        };
        session.ledger().record(frame_id, pose);
        debug!("Pose sent, frame {}", frame_id);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{Mat4, Vec3};
    use crate::session::FrameLedger;
    use std::time::Duration;
    use webrtc::api::APIBuilder;
    use webrtc::peer_connection::configuration::RTCConfiguration;

    async fn session() -> Session {
        let api = APIBuilder::new().build();
        let pc = Arc::new(
            api.new_peer_connection(RTCConfiguration::default())
                .await
                .unwrap(),
        );
        let input = pc.create_data_channel("client-input", None).await.unwrap();
        let status = pc.create_data_channel("client-status", None).await.unwrap();
        Session::new(pc, input, status, FrameLedger::new(16, Duration::from_secs(2)))
    }

    fn streamer(warmup_ms: u64) -> PoseStreamer {
        let config = ClientConfig {
            pose_warmup_ms: warmup_ms,
            ..ClientConfig::default()
        };
        PoseStreamer::new(config, crate::test_support::StubScene::new(), Default::default())
    }

    #[test]
    fn test_encode_pose_layout() {
        let mut transform = Mat4::IDENTITY;
        transform.0[3] = 1.5;
        let payload = encode_pose(&transform, 300);

        assert_eq!(payload.len(), POSE_PAYLOAD_LEN);
        let element = f64::from_le_bytes(payload[24..32].try_into().unwrap());
        assert_eq!(element, 1.5);
        let frame_id = f64::from_le_bytes(payload[128..136].try_into().unwrap());
        assert_eq!(frame_id, 300.0);
    }

    #[tokio::test]
    async fn test_warmup_sends_unchanged_pose() {
        let s = streamer(1_000);
        let session = session().await;
        session.mark_connected();

        let sample = PoseSample::from_transform(&Mat4::IDENTITY);
        assert!(s.should_send(&session, &sample));
        // same pose again: still inside warm-up, still sends
        assert!(s.should_send(&session, &sample));
    }

    #[tokio::test]
    async fn test_thresholds_gate_after_warmup() {
        let s = streamer(0);
        let session = session().await;
        session.mark_connected();

        let origin = PoseSample::from_transform(&Mat4::IDENTITY);
        // first sample has nothing to compare against
        assert!(s.should_send(&session, &origin));
        assert!(!s.should_send(&session, &origin));

        let mut nudged = origin;
        nudged.position = Vec3 {
            x: 0.005,
            y: 0.0,
            z: 0.0,
        };
        assert!(!s.should_send(&session, &nudged), "sub-threshold move must not send");

        let mut moved = origin;
        moved.position = Vec3 {
            x: 0.05,
            y: 0.0,
            z: 0.0,
        };
        assert!(s.should_send(&session, &moved));
        assert!(!s.should_send(&session, &moved), "resend of same pose must not send");
    }

    #[tokio::test]
    async fn test_sub_threshold_drift_never_accumulates() {
        let s = streamer(0);
        let session = session().await;
        session.mark_connected();

        let origin = PoseSample::from_transform(&Mat4::IDENTITY);
        assert!(s.should_send(&session, &origin));

        // Each step is below threshold relative to the last *sent* pose, and
        // the reference does not creep along with the drift.
        for i in 1..=5 {
            let mut drifted = origin;
            drifted.position = Vec3 {
                x: 0.001 * i as f64,
                y: 0.0,
                z: 0.0,
            };
            assert!(!s.should_send(&session, &drifted));
        }
    }

    #[tokio::test]
    async fn test_first_send_carries_frame_id_zero() {
        let session = session().await;
        // the counter advances after a send, so the first payload carries 0
        assert_eq!(session.current_frame_id(), 0);
        session.advance_frame_id();
        assert_eq!(session.current_frame_id(), 100);
    }

    #[tokio::test]
    async fn test_tick_without_session_is_noop() {
        let s = streamer(1_000);
        assert!(!s.tick().await.unwrap());
    }
}
