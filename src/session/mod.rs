//! Render session state and ownership
//!
//! A [`Session`] is created when an offer arrives and destroyed only by
//! reactive teardown; there is no explicit close operation. It exclusively
//! owns the peer connection and its two data channels, the pose frame
//! counter, and the pending-frame ledger used for latency correlation.

pub mod codec;
pub mod monitor;
pub mod negotiator;

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, RwLock};
use webrtc::data_channel::RTCDataChannel;
use webrtc::peer_connection::RTCPeerConnection;

use crate::math::{Mat4, Quat, Vec3};

/// Label of the reliable ordered channel carrying pose records
pub const INPUT_CHANNEL_LABEL: &str = "client-input";
/// Label of the reliable ordered channel carrying status records
pub const STATUS_CHANNEL_LABEL: &str = "client-status";
/// Frame identifier step between consecutive pose sends
pub const FRAME_ID_STEP: u32 = 100;

/// Shared slot holding the single live session, if any
pub type SessionSlot = Arc<RwLock<Option<Arc<Session>>>>;

/// Session negotiation state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Negotiating,
    AnswerSent,
    AwaitingAnswer,
    Connected,
    Disconnected,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Negotiating => write!(f, "negotiating"),
            SessionState::AnswerSent => write!(f, "answer-sent"),
            SessionState::AwaitingAnswer => write!(f, "awaiting-answer"),
            SessionState::Connected => write!(f, "connected"),
            SessionState::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// Why a live connection was torn down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    IceDisconnected,
    InputChannelClosed,
    StatusChannelClosed,
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisconnectReason::IceDisconnected => write!(f, "ICE disconnected"),
            DisconnectReason::InputChannelClosed => write!(f, "input channel closed"),
            DisconnectReason::StatusChannelClosed => write!(f, "status channel closed"),
        }
    }
}

/// Asynchronous notification funnelled onto the client's event queue
#[derive(Debug, Clone, Copy)]
pub enum ClientEvent {
    LinkLost(DisconnectReason),
}

/// Pose sample compared against the last sent sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseSample {
    pub position: Vec3,
    pub orientation: Quat,
}

impl PoseSample {
    pub fn from_transform(transform: &Mat4) -> Self {
        Self {
            position: transform.translation(),
            orientation: transform.rotation(),
        }
    }
}

/// Advance a frame identifier by one send step, wrapping at 2^32
pub fn next_frame_id(frame_id: u32) -> u32 {
    frame_id.wrapping_add(FRAME_ID_STEP)
}

/// Outgoing pose(s) recorded for a sent frame
#[derive(Debug, Clone, Copy)]
pub enum PendingPose {
    Mono(Mat4),
    /// Left/right eye transforms during immersive stereo presentation
    Stereo(Mat4, Mat4),
}

/// A sent frame awaiting latency correlation
#[derive(Debug, Clone, Copy)]
pub struct PendingFrame {
    pub pose: PendingPose,
    pub captured_at: Instant,
}

/// Bounded frameID -> pose mapping
///
/// The server echoes frame identifiers with rendered frames; the compositor
/// takes entries back out to correlate them. Entries are evicted by age and
/// by count on insert so an unanswered stretch cannot grow the map unbounded.
pub struct FrameLedger {
    entries: Mutex<HashMap<u32, PendingFrame>>,
    max_entries: usize,
    max_age: Duration,
}

impl FrameLedger {
    pub fn new(max_entries: usize, max_age: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_entries,
            max_age,
        }
    }

    /// Record a sent frame, evicting stale and excess entries
    pub fn record(&self, frame_id: u32, pose: PendingPose) {
        let mut entries = self.entries.lock();
        let max_age = self.max_age;
        entries.retain(|_, frame| frame.captured_at.elapsed() <= max_age);
        if entries.len() >= self.max_entries {
            // Oldest-first eviction keeps the most recently sent frames
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, frame)| frame.captured_at)
                .map(|(id, _)| *id)
            {
                entries.remove(&oldest);
            }
        }
        entries.insert(
            frame_id,
            PendingFrame {
                pose,
                captured_at: Instant::now(),
            },
        );
    }

    /// Take the pending frame for a rendered frame identifier
    pub fn take(&self, frame_id: u32) -> Option<PendingFrame> {
        self.entries.lock().remove(&frame_id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// One negotiation attempt's exclusive context
pub struct Session {
    id: String,
    pc: Arc<RTCPeerConnection>,
    input: Arc<RTCDataChannel>,
    status: Arc<RTCDataChannel>,
    state_tx: watch::Sender<SessionState>,
    state_rx: watch::Receiver<SessionState>,
    frame_id: Mutex<u32>,
    last_pose: Mutex<Option<PoseSample>>,
    connected_at: Mutex<Option<Instant>>,
    ledger: FrameLedger,
}

impl Session {
    pub fn new(
        pc: Arc<RTCPeerConnection>,
        input: Arc<RTCDataChannel>,
        status: Arc<RTCDataChannel>,
        ledger: FrameLedger,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(SessionState::Negotiating);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            pc,
            input,
            status,
            state_tx,
            state_rx,
            frame_id: Mutex::new(0),
            last_pose: Mutex::new(None),
            connected_at: Mutex::new(None),
            ledger,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn pc(&self) -> &Arc<RTCPeerConnection> {
        &self.pc
    }

    pub fn input_channel(&self) -> &Arc<RTCDataChannel> {
        &self.input
    }

    pub fn status_channel(&self) -> &Arc<RTCDataChannel> {
        &self.status
    }

    pub fn ledger(&self) -> &FrameLedger {
        &self.ledger
    }

    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    pub fn set_state(&self, state: SessionState) {
        let _ = self.state_tx.send(state);
    }

    /// Subscribe to state changes
    pub fn state_watch(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    /// Mark the session connected and anchor the pose warm-up window
    pub fn mark_connected(&self) {
        *self.connected_at.lock() = Some(Instant::now());
        self.set_state(SessionState::Connected);
    }

    /// Whether the pose warm-up window is still open
    pub fn in_warmup(&self, warmup: Duration) -> bool {
        match *self.connected_at.lock() {
            Some(at) => at.elapsed() < warmup,
            None => true,
        }
    }

    /// Frame identifier the next pose send will carry
    pub fn current_frame_id(&self) -> u32 {
        *self.frame_id.lock()
    }

    /// Advance the frame counter after a send
    pub fn advance_frame_id(&self) {
        let mut frame_id = self.frame_id.lock();
        *frame_id = next_frame_id(*frame_id);
    }

    /// Compare a sample against the last sent pose, updating each component
    /// that moved beyond its threshold. Returns whether anything moved.
    pub fn update_last_pose(&self, sample: &PoseSample, pos_eps: f64, rot_eps: f64) -> bool {
        let mut last = self.last_pose.lock();
        match &mut *last {
            None => {
                *last = Some(*sample);
                true
            }
            Some(prev) => {
                let mut changed = false;
                if prev.position.distance_to(sample.position) > pos_eps {
                    prev.position = sample.position;
                    changed = true;
                }
                if prev.orientation.angle_to(sample.orientation) > rot_eps {
                    prev.orientation = sample.orientation;
                    changed = true;
                }
                changed
            }
        }
    }
}
