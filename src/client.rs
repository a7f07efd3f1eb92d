//! Client orchestration
//!
//! One logical event queue: the run loop selects over inbound signaling and
//! the internal notifications the connection handlers push (ICE state drops,
//! channel closes). Everything that mutates the session flows through here;
//! the per-tick pose and status producers only read it.

use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::compositor::Compositor;
use crate::config::ClientConfig;
use crate::error::Result;
use crate::scene::Scene;
use crate::session::monitor::ConnectionMonitor;
use crate::session::negotiator::SessionNegotiator;
use crate::session::{ClientEvent, SessionSlot, SessionState};
use crate::signaling::{SignalingMessage, SignalingSender};
use crate::streaming::pose::PoseStreamer;
use crate::streaming::stats::spawn_stats_loop;
use crate::streaming::status::StatusReporter;

/// Hybrid rendering client: negotiates sessions and keeps them streaming
pub struct RenderClient {
    config: ClientConfig,
    signaling: Arc<dyn SignalingSender>,
    compositor: Arc<dyn Compositor>,
    slot: SessionSlot,
    negotiator: SessionNegotiator,
    monitor: ConnectionMonitor,
    pose: PoseStreamer,
    status: StatusReporter,
    events_tx: mpsc::UnboundedSender<ClientEvent>,
    // Locked once for the lifetime of run()
    events_rx: Mutex<mpsc::UnboundedReceiver<ClientEvent>>,
}

impl RenderClient {
    pub fn new(
        config: ClientConfig,
        signaling: Arc<dyn SignalingSender>,
        scene: Arc<dyn Scene>,
        compositor: Arc<dyn Compositor>,
    ) -> Self {
        let slot: SessionSlot = Default::default();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let negotiator = SessionNegotiator::new(
            config.clone(),
            signaling.clone(),
            scene.clone(),
            compositor.clone(),
            slot.clone(),
            events_tx.clone(),
        );
        let monitor = ConnectionMonitor::new(
            signaling.clone(),
            scene.clone(),
            compositor.clone(),
            slot.clone(),
        );
        let pose = PoseStreamer::new(config.clone(), scene.clone(), slot.clone());
        let status = StatusReporter::new(&config, scene, slot.clone());
        Self {
            config,
            signaling,
            compositor,
            slot,
            negotiator,
            monitor,
            pose,
            status,
            events_tx,
            events_rx: Mutex::new(events_rx),
        }
    }

    /// Status reporter handle for embedder-driven parameter updates
    pub fn status_reporter(&self) -> &StatusReporter {
        &self.status
    }

    /// Drive the per-render-tick producers
    pub async fn tick(&self) -> Result<()> {
        self.pose.tick().await?;
        self.status.tick().await?;
        Ok(())
    }

    /// Run until the signaling stream ends.
    ///
    /// Announces readiness first; the server is expected to respond with an
    /// offer, and to offer again after every disconnection.
    pub async fn run(&self, mut signaling_rx: mpsc::Receiver<SignalingMessage>) -> Result<()> {
        let mut events_rx = self.events_rx.lock().await;
        self.monitor.announce_ready().await?;
        info!("Render client ready, awaiting offer");

        loop {
            tokio::select! {
                message = signaling_rx.recv() => {
                    let Some(message) = message else {
                        info!("Signaling stream ended, stopping");
                        return Ok(());
                    };
                    self.handle_signaling(message).await;
                }
                event = events_rx.recv() => {
                    // The sender half lives in self, so recv never yields None here
                    if let Some(event) = event {
                        self.handle_event(event).await;
                    }
                }
            }
        }
    }

    async fn handle_signaling(&self, message: SignalingMessage) {
        match message {
            SignalingMessage::Offer(offer) => {
                if let Err(e) = self.negotiator.on_offer(offer).await {
                    warn!("Offer handling failed: {}", e);
                }
            }
            SignalingMessage::Answer(answer) => match self.negotiator.on_answer(answer).await {
                Ok(()) => self.start_stats_loop().await,
                Err(e) => warn!("Answer handling failed: {}", e),
            },
            SignalingMessage::IceCandidate(candidate) => {
                if let Err(e) = self.negotiator.on_ice_candidate(candidate).await {
                    warn!("ICE candidate handling failed: {}", e);
                }
            }
            SignalingMessage::HealthCheck => {
                if let Err(e) = self.monitor.on_health_check().await {
                    warn!("Health check ack failed: {}", e);
                }
            }
            SignalingMessage::HealthCheckAck | SignalingMessage::ConnectAck => {
                debug!("Ignoring server-bound message echoed back");
            }
        }
    }

    async fn handle_event(&self, event: ClientEvent) {
        match event {
            ClientEvent::LinkLost(reason) => {
                if let Err(e) = self.monitor.on_link_lost(reason).await {
                    warn!("Teardown failed: {}", e);
                }
            }
        }
    }

    async fn start_stats_loop(&self) {
        let Some(session) = self.slot.read().await.clone() else {
            return;
        };
        if session.state() != SessionState::Connected {
            return;
        }
        spawn_stats_loop(
            self.config.clone(),
            session,
            self.signaling.clone(),
            self.compositor.clone(),
        );
    }

    #[cfg(test)]
    pub(crate) fn slot(&self) -> SessionSlot {
        self.slot.clone()
    }

    #[cfg(test)]
    pub(crate) fn events_sender(&self) -> mpsc::UnboundedSender<ClientEvent> {
        self.events_tx.clone()
    }
}
