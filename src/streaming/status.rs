//! Device status reporting
//!
//! Tells the server about the viewing device over the status channel: stereo
//! presentation entry and exit, and changes to the parameters the server
//! needs to render correctly (IPD, dual-camera capability, eye projections).
//! Each observed change produces exactly one message.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;
use webrtc::data_channel::data_channel_state::RTCDataChannelState;

use crate::config::ClientConfig;
use crate::error::Result;
use crate::scene::Scene;
use crate::session::{SessionSlot, SessionState};

/// Full status record sent on entry and on parameter changes
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatusRecord {
    #[serde(rename = "isVRMode")]
    pub is_vr_mode: bool,
    #[serde(rename = "isARMode")]
    pub is_ar_mode: bool,
    #[serde(rename = "hasDualCameras")]
    pub has_dual_cameras: bool,
    pub ipd: f64,
    #[serde(rename = "leftProjection")]
    pub left_projection: Option<Vec<f64>>,
    #[serde(rename = "rightProjection")]
    pub right_projection: Option<Vec<f64>>,
    pub timestamp: i64,
}

/// Minimal record sent when presentation ends
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PresentationEnded {
    #[serde(rename = "isVRMode")]
    pub is_vr_mode: bool,
    pub timestamp: i64,
}

/// What the last sent status looked like, without the timestamp
#[derive(Debug, Clone, PartialEq)]
struct StatusSnapshot {
    presenting: bool,
    is_vr_mode: bool,
    is_ar_mode: bool,
    has_dual_cameras: bool,
    ipd: f64,
    left_projection: Option<Vec<f64>>,
    right_projection: Option<Vec<f64>>,
}

/// One status message due for the channel
#[derive(Debug, Clone, PartialEq)]
pub enum StatusUpdate {
    Full(StatusRecord),
    Ended(PresentationEnded),
}

/// Reports device status changes over the status channel
pub struct StatusReporter {
    scene: Arc<dyn Scene>,
    slot: SessionSlot,
    ipd: Mutex<f64>,
    configured_dual_cameras: bool,
    projections: Mutex<(Option<Vec<f64>>, Option<Vec<f64>>)>,
    last: Mutex<Option<StatusSnapshot>>,
}

impl StatusReporter {
    pub fn new(config: &ClientConfig, scene: Arc<dyn Scene>, slot: SessionSlot) -> Self {
        Self {
            scene,
            slot,
            ipd: Mutex::new(config.ipd),
            configured_dual_cameras: config.has_dual_cameras,
            projections: Mutex::new((None, None)),
            last: Mutex::new(None),
        }
    }

    /// Update the interpupillary distance reported to the server
    pub fn set_ipd(&self, ipd: f64) {
        *self.ipd.lock() = ipd;
    }

    /// Update the per-eye projection matrices (row-major elements)
    pub fn set_projections(&self, left: Option<Vec<f64>>, right: Option<Vec<f64>>) {
        *self.projections.lock() = (left, right);
    }

    fn snapshot(&self) -> StatusSnapshot {
        let is_vr_mode = self.scene.is_vr_mode();
        let is_ar_mode = self.scene.is_ar_mode();
        let (left, right) = self.projections.lock().clone();
        StatusSnapshot {
            presenting: self.scene.immersive_presentation_active(),
            is_vr_mode,
            is_ar_mode,
            // VR headsets without passthrough have two cameras; otherwise
            // the embedder says so explicitly
            has_dual_cameras: (is_vr_mode && !is_ar_mode) || self.configured_dual_cameras,
            ipd: *self.ipd.lock(),
            left_projection: left,
            right_projection: right,
        }
    }

    /// Decide whether the current device state warrants a message.
    ///
    /// Comparison is against the last *sent* snapshot, so repeated ticks with
    /// an unchanged state stay silent.
    fn next_update(&self) -> Option<StatusUpdate> {
        let current = self.snapshot();
        let mut last = self.last.lock();

        let update = match &*last {
            // First observation outside a presentation seeds the snapshot
            // silently; only entry, exit, or a parameter change sends.
            None if !current.presenting => {
                *last = Some(current);
                return None;
            }
            Some(prev) if *prev == current => return None,
            Some(prev) if prev.presenting && !current.presenting => {
                StatusUpdate::Ended(PresentationEnded {
                    is_vr_mode: false,
                    timestamp: chrono::Utc::now().timestamp_millis(),
                })
            }
            _ => StatusUpdate::Full(StatusRecord {
                is_vr_mode: current.is_vr_mode,
                is_ar_mode: current.is_ar_mode,
                has_dual_cameras: current.has_dual_cameras,
                ipd: current.ipd,
                left_projection: current.left_projection.clone(),
                right_projection: current.right_projection.clone(),
                timestamp: chrono::Utc::now().timestamp_millis(),
            }),
        };
        *last = Some(current);
        Some(update)
    }

    /// Check for changes and send at most one status message
    pub async fn tick(&self) -> Result<bool> {
        let Some(session) = self.slot.read().await.clone() else {
            return Ok(false);
        };
        if session.state() != SessionState::Connected {
            return Ok(false);
        }
        if session.status_channel().ready_state() != RTCDataChannelState::Open {
            return Ok(false);
        }

        let Some(update) = self.next_update() else {
            return Ok(false);
        };
        let text = match &update {
            StatusUpdate::Full(record) => serde_json::to_string(record)?,
            StatusUpdate::Ended(record) => serde_json::to_string(record)?,
        };
        session.status_channel().send_text(text).await?;
        debug!(
            "Status sent: {}",
            match update {
                StatusUpdate::Full(_) => "full record",
                StatusUpdate::Ended(_) => "presentation ended",
            }
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::StubScene;

    fn reporter(scene: Arc<StubScene>) -> StatusReporter {
        StatusReporter::new(&ClientConfig::default(), scene, Default::default())
    }

    #[test]
    fn test_entering_presentation_sends_full_record_once() {
        let scene = StubScene::new();
        let r = reporter(scene.clone());
        *scene.presenting.lock() = true;
        *scene.vr_mode.lock() = true;

        let update = r.next_update().expect("entry must produce a record");
        match update {
            StatusUpdate::Full(record) => {
                assert!(record.is_vr_mode);
                assert!(record.has_dual_cameras, "VR without AR implies dual cameras");
                assert_eq!(record.ipd, 0.064);
            }
            other => panic!("Expected full record, got {:?}", other),
        }
        assert!(r.next_update().is_none(), "unchanged state must stay silent");
    }

    #[test]
    fn test_exiting_presentation_sends_minimal_record() {
        let scene = StubScene::new();
        let r = reporter(scene.clone());
        *scene.presenting.lock() = true;
        *scene.vr_mode.lock() = true;
        r.next_update().unwrap();

        *scene.presenting.lock() = false;
        *scene.vr_mode.lock() = false;
        let update = r.next_update().expect("exit must produce a record");
        let StatusUpdate::Ended(record) = update else {
            panic!("Expected minimal record");
        };
        assert!(!record.is_vr_mode);

        let value = serde_json::to_value(&record).unwrap();
        let keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["isVRMode", "timestamp"]);
    }

    #[test]
    fn test_exit_record_mode_flag_is_false_even_if_scene_lags() {
        let scene = StubScene::new();
        let r = reporter(scene.clone());
        *scene.presenting.lock() = true;
        *scene.vr_mode.lock() = true;
        r.next_update().unwrap();

        // presentation over, but the scene has not cleared its mode flag yet
        *scene.presenting.lock() = false;
        let StatusUpdate::Ended(record) = r.next_update().unwrap() else {
            panic!("Expected minimal record");
        };
        assert!(!record.is_vr_mode);
    }

    #[test]
    fn test_no_record_without_entry_exit_or_change() {
        let scene = StubScene::new();
        let r = reporter(scene.clone());

        // first observation with no presentation stays silent
        assert!(r.next_update().is_none());
        assert!(r.next_update().is_none());

        // a parameter change still sends
        r.set_ipd(0.07);
        let StatusUpdate::Full(record) = r.next_update().unwrap() else {
            panic!("Expected full record");
        };
        assert_eq!(record.ipd, 0.07);
    }

    #[test]
    fn test_ipd_change_sends_exactly_one_message() {
        let scene = StubScene::new();
        let r = reporter(scene.clone());
        *scene.presenting.lock() = true;
        *scene.vr_mode.lock() = true;
        r.next_update().unwrap();

        r.set_ipd(0.068);
        let update = r.next_update().expect("IPD change must produce a record");
        let StatusUpdate::Full(record) = update else {
            panic!("Expected full record");
        };
        assert_eq!(record.ipd, 0.068);
        assert!(r.next_update().is_none());
    }

    #[test]
    fn test_projection_change_compares_by_value() {
        let scene = StubScene::new();
        let r = reporter(scene.clone());
        *scene.presenting.lock() = true;
        r.next_update().unwrap();

        let proj: Vec<f64> = (0..16).map(|i| i as f64).collect();
        r.set_projections(Some(proj.clone()), Some(proj.clone()));
        assert!(r.next_update().is_some());

        // setting an equal vector again is not a change
        r.set_projections(Some(proj.clone()), Some(proj));
        assert!(r.next_update().is_none());
    }

    #[test]
    fn test_ar_mode_suppresses_implied_dual_cameras() {
        let scene = StubScene::new();
        let r = reporter(scene.clone());
        *scene.presenting.lock() = true;
        *scene.vr_mode.lock() = true;
        *scene.ar_mode.lock() = true;

        let StatusUpdate::Full(record) = r.next_update().unwrap() else {
            panic!("Expected full record");
        };
        assert!(!record.has_dual_cameras);
    }
}
