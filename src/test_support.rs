//! Shared test doubles for the collaborator traits

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use webrtc::track::track_remote::TrackRemote;

use crate::compositor::Compositor;
use crate::error::Result;
use crate::math::Mat4;
use crate::scene::Scene;
use crate::signaling::{SignalingMessage, SignalingSender};

/// Signaling sender that records every outbound message
#[derive(Default)]
pub struct RecordingSignaling {
    pub sent: Mutex<Vec<SignalingMessage>>,
    pub stats: Mutex<Vec<serde_json::Value>>,
}

impl RecordingSignaling {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent(&self) -> Vec<SignalingMessage> {
        self.sent.lock().clone()
    }

    pub fn count(&self, predicate: impl Fn(&SignalingMessage) -> bool) -> usize {
        self.sent.lock().iter().filter(|m| predicate(m)).count()
    }
}

#[async_trait]
impl SignalingSender for RecordingSignaling {
    async fn send(&self, message: SignalingMessage) -> Result<()> {
        self.sent.lock().push(message);
        Ok(())
    }

    async fn send_stats(&self, record: serde_json::Value) -> Result<()> {
        self.stats.lock().push(record);
        Ok(())
    }
}

/// Scene stub with a settable camera transform
pub struct StubScene {
    pub transform: Mutex<Mat4>,
    pub stereo: Mutex<Option<(Mat4, Mat4)>>,
    pub presenting: Mutex<bool>,
    pub vr_mode: Mutex<bool>,
    pub ar_mode: Mutex<bool>,
    pub placeholder_visible: Mutex<bool>,
}

impl Default for StubScene {
    fn default() -> Self {
        Self {
            transform: Mutex::new(Mat4::IDENTITY),
            stereo: Mutex::new(None),
            presenting: Mutex::new(false),
            vr_mode: Mutex::new(false),
            ar_mode: Mutex::new(false),
            placeholder_visible: Mutex::new(true),
        }
    }
}

impl StubScene {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl Scene for StubScene {
    fn camera_world_transform(&self) -> Mat4 {
        *self.transform.lock()
    }

    fn stereo_camera_transforms(&self) -> Option<(Mat4, Mat4)> {
        *self.stereo.lock()
    }

    fn immersive_presentation_active(&self) -> bool {
        *self.presenting.lock()
    }

    fn is_vr_mode(&self) -> bool {
        *self.vr_mode.lock()
    }

    fn is_ar_mode(&self) -> bool {
        *self.ar_mode.lock()
    }

    fn set_placeholder_visible(&self, visible: bool) {
        *self.placeholder_visible.lock() = visible;
    }
}

/// Compositor stub counting disables
#[derive(Default)]
pub struct StubCompositor {
    pub tracks: AtomicUsize,
    pub disables: AtomicUsize,
    pub latency: Mutex<f64>,
}

impl StubCompositor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl Compositor for StubCompositor {
    async fn accept_remote_track(&self, _track: Arc<TrackRemote>) {
        self.tracks.fetch_add(1, Ordering::SeqCst);
    }

    async fn disable(&self) {
        self.disables.fetch_add(1, Ordering::SeqCst);
    }

    fn latency_ms(&self) -> f64 {
        *self.latency.lock()
    }
}
