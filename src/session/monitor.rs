//! Reactive connection teardown
//!
//! Disconnection is a uniform transition no matter what triggered it: ICE
//! falling over or either data channel closing. Teardown runs once per live
//! session and finishes by re-announcing readiness so the server can start a
//! fresh offer.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{DisconnectReason, SessionSlot, SessionState};
use crate::compositor::Compositor;
use crate::error::Result;
use crate::scene::Scene;
use crate::signaling::{SignalingMessage, SignalingSender};

/// Tears down lost connections and answers health checks
pub struct ConnectionMonitor {
    signaling: Arc<dyn SignalingSender>,
    scene: Arc<dyn Scene>,
    compositor: Arc<dyn Compositor>,
    slot: SessionSlot,
    health_checks: AtomicU32,
}

impl ConnectionMonitor {
    pub fn new(
        signaling: Arc<dyn SignalingSender>,
        scene: Arc<dyn Scene>,
        compositor: Arc<dyn Compositor>,
        slot: SessionSlot,
    ) -> Self {
        Self {
            signaling,
            scene,
            compositor,
            slot,
            health_checks: AtomicU32::new(0),
        }
    }

    /// Announce readiness for a fresh offer
    pub async fn announce_ready(&self) -> Result<()> {
        self.signaling.send(SignalingMessage::ConnectAck).await
    }

    /// Answer a server health check
    pub async fn on_health_check(&self) -> Result<()> {
        let count = self.health_checks.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Health check {} acknowledged", count);
        self.signaling.send(SignalingMessage::HealthCheckAck).await
    }

    #[cfg(test)]
    pub fn health_check_count(&self) -> u32 {
        self.health_checks.load(Ordering::SeqCst)
    }

    /// Tear down the live session after a lost link.
    ///
    /// A second notification for the same loss (ICE and a channel close both
    /// fire) finds the slot empty or the session no longer Connected and does
    /// nothing.
    pub async fn on_link_lost(&self, reason: DisconnectReason) -> Result<()> {
        let session = {
            let mut slot = self.slot.write().await;
            match slot.as_ref() {
                Some(session) if session.state() == SessionState::Connected => slot.take(),
                Some(session) => {
                    debug!(
                        "Ignoring link loss ({}) while {}",
                        reason,
                        session.state()
                    );
                    return Ok(());
                }
                None => {
                    debug!("Ignoring link loss ({}): no session", reason);
                    return Ok(());
                }
            }
        };
        let Some(session) = session else {
            return Ok(());
        };

        info!("Session {} lost: {}", session.id(), reason);
        session.set_state(SessionState::Disconnected);
        self.scene.set_placeholder_visible(true);
        self.compositor.disable().await;
        if let Err(e) = session.pc().close().await {
            warn!("Failed to close peer connection: {}", e);
        }
        self.health_checks.store(0, Ordering::SeqCst);

        // Readiness re-announced; the server offers again to reconnect
        self.announce_ready().await
    }
}
