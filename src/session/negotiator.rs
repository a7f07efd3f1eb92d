//! Session negotiation
//!
//! Drives the offer -> answer -> reverse-offer -> answer exchange. The
//! client answers the server's offer, then immediately issues its own offer
//! over the same connection so the server can attach tracks later without a
//! full restart.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;

use super::codec::{order_codecs, receiver_codec_capabilities, CodecPreference};
use super::{
    ClientEvent, DisconnectReason, FrameLedger, Session, SessionSlot, SessionState,
    INPUT_CHANNEL_LABEL, STATUS_CHANNEL_LABEL,
};
use crate::compositor::Compositor;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::scene::Scene;
use crate::signaling::{
    AnswerPayload, CandidatePayload, OfferPayload, PlatformHint, SignalingMessage, SignalingSender,
};

/// Drives SDP negotiation and owns session creation
pub struct SessionNegotiator {
    config: ClientConfig,
    signaling: Arc<dyn SignalingSender>,
    scene: Arc<dyn Scene>,
    compositor: Arc<dyn Compositor>,
    slot: SessionSlot,
    events: mpsc::UnboundedSender<ClientEvent>,
}

impl SessionNegotiator {
    pub fn new(
        config: ClientConfig,
        signaling: Arc<dyn SignalingSender>,
        scene: Arc<dyn Scene>,
        compositor: Arc<dyn Compositor>,
        slot: SessionSlot,
        events: mpsc::UnboundedSender<ClientEvent>,
    ) -> Self {
        Self {
            config,
            signaling,
            scene,
            compositor,
            slot,
            events,
        }
    }

    /// Handle an incoming offer: build a fresh session and answer it.
    ///
    /// Any prior session is torn down first; the replacement is only admitted
    /// once the previous peer connection has been closed.
    pub async fn on_offer(&self, offer: OfferPayload) -> Result<()> {
        if let Some(prior) = self.slot.write().await.take() {
            warn!("Offer received while session {} is alive, superseding", prior.id());
            prior.set_state(SessionState::Disconnected);
            if let Err(e) = prior.pc().close().await {
                warn!("Failed to close superseded peer connection: {}", e);
            }
        }

        let pc = self.build_peer_connection().await?;
        self.register_connection_handlers(&pc);

        // Channels are created before the remote description is applied so
        // they are part of the negotiated description.
        let input = self
            .create_channel(&pc, INPUT_CHANNEL_LABEL, DisconnectReason::InputChannelClosed)
            .await?;
        let status = self
            .create_channel(&pc, STATUS_CHANNEL_LABEL, DisconnectReason::StatusChannelClosed)
            .await?;

        let ledger = FrameLedger::new(
            self.config.ledger_max_entries,
            self.config.ledger_max_age(),
        );
        let session = Arc::new(Session::new(pc, input, status, ledger));
        info!("Session {} negotiating", session.id());
        *self.slot.write().await = Some(session.clone());

        let remote = RTCSessionDescription::offer(offer.sdp)?;
        session.pc().set_remote_description(remote).await?;
        session.set_state(SessionState::AnswerSent);

        self.create_answer(&session, offer.platform_hint.unwrap_or_default())
            .await
    }

    /// Generate the answer, then the reverse offer
    async fn create_answer(&self, session: &Arc<Session>, hint: PlatformHint) -> Result<()> {
        // Ordering is irrevocable once the answer exists
        self.apply_codec_preferences(session, hint).await;

        let pc = session.pc();
        let answer = pc.create_answer(None).await?;
        pc.set_local_description(answer).await?;
        let local = pc
            .local_description()
            .await
            .ok_or_else(|| ClientError::Negotiation("local answer missing".to_string()))?;
        self.signaling
            .send(SignalingMessage::Answer(AnswerPayload { sdp: local.sdp }))
            .await?;
        debug!("Answer sent for session {}", session.id());

        let reverse = pc.create_offer(None).await?;
        pc.set_local_description(reverse).await?;
        let local = pc
            .local_description()
            .await
            .ok_or_else(|| ClientError::Negotiation("local offer missing".to_string()))?;
        self.signaling
            .send(SignalingMessage::Offer(OfferPayload {
                sdp: local.sdp,
                platform_hint: None,
            }))
            .await?;
        session.set_state(SessionState::AwaitingAnswer);
        debug!("Reverse offer sent for session {}", session.id());
        Ok(())
    }

    /// Handle the server's answer to the reverse offer
    pub async fn on_answer(&self, answer: AnswerPayload) -> Result<()> {
        let session = self
            .slot
            .read()
            .await
            .clone()
            .ok_or_else(|| ClientError::InvalidState("answer without an active session".into()))?;
        if session.state() != SessionState::AwaitingAnswer {
            return Err(ClientError::InvalidState(format!(
                "answer received while {}",
                session.state()
            )));
        }

        let remote = RTCSessionDescription::answer(answer.sdp)?;
        session.pc().set_remote_description(remote).await?;
        session.mark_connected();
        self.scene.set_placeholder_visible(false);
        info!("Session {} connected", session.id());
        Ok(())
    }

    /// Apply a remote ICE candidate.
    ///
    /// Candidates arriving before the session is connected are dropped, not
    /// queued; the server re-offers on reconnect so nothing replays them.
    pub async fn on_ice_candidate(&self, candidate: CandidatePayload) -> Result<()> {
        let Some(session) = self.slot.read().await.clone() else {
            debug!("Dropping ICE candidate: no session");
            return Ok(());
        };
        if session.state() != SessionState::Connected {
            debug!(
                "Dropping ICE candidate while {}",
                session.state()
            );
            return Ok(());
        }

        session
            .pc()
            .add_ice_candidate(RTCIceCandidateInit {
                candidate: candidate.candidate,
                sdp_mid: candidate.sdp_mid,
                sdp_mline_index: candidate.sdp_mline_index,
                username_fragment: None,
            })
            .await?;
        Ok(())
    }

    /// Bias the video transceiver toward the preferred codec for the
    /// offering platform. A failure here degrades quality, not correctness,
    /// so it is logged and negotiation continues.
    async fn apply_codec_preferences(&self, session: &Arc<Session>, hint: PlatformHint) {
        let preference = CodecPreference::for_platform(hint);
        let transceivers = session.pc().get_transceivers().await;
        let Some(video) = transceivers
            .iter()
            .find(|t| t.kind() == RTPCodecType::Video)
        else {
            debug!("No video transceiver, skipping codec preferences");
            return;
        };

        let ordered = order_codecs(receiver_codec_capabilities(), &preference);
        if let Err(e) = video.set_codec_preferences(ordered).await {
            warn!("Failed to set codec preferences: {}", e);
        } else {
            debug!("Codec preference applied: {}", preference.mime_type);
        }
    }

    async fn build_peer_connection(&self) -> Result<Arc<RTCPeerConnection>> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| ClientError::Negotiation(format!("failed to register codecs: {e}")))?;

        let registry = register_default_interceptors(Registry::new(), &mut media_engine)
            .map_err(|e| ClientError::Negotiation(format!("failed to register interceptors: {e}")))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let mut ice_servers = vec![];
        if !self.config.stun_server.is_empty() {
            ice_servers.push(RTCIceServer {
                urls: vec![self.config.stun_server.clone()],
                ..Default::default()
            });
        }

        let rtc_config = RTCConfiguration {
            ice_servers,
            bundle_policy: RTCBundlePolicy::Balanced,
            ..Default::default()
        };

        Ok(Arc::new(api.new_peer_connection(rtc_config).await?))
    }

    /// Register ICE/track handlers; must run before the remote description
    /// is applied.
    fn register_connection_handlers(&self, pc: &Arc<RTCPeerConnection>) {
        let signaling = self.signaling.clone();
        pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let signaling = signaling.clone();
            Box::pin(async move {
                let Some(candidate) = candidate else { return };
                match candidate.to_json() {
                    Ok(init) => {
                        let msg = SignalingMessage::IceCandidate(CandidatePayload {
                            candidate: init.candidate,
                            sdp_mid: init.sdp_mid,
                            sdp_mline_index: init.sdp_mline_index,
                        });
                        if let Err(e) = signaling.send(msg).await {
                            warn!("Failed to send ICE candidate: {}", e);
                        }
                    }
                    Err(e) => warn!("Failed to serialize ICE candidate: {}", e),
                }
            })
        }));

        let compositor = self.compositor.clone();
        pc.on_track(Box::new(move |track, _receiver, _transceiver| {
            let compositor = compositor.clone();
            Box::pin(async move {
                info!("Remote {} track received", track.kind());
                compositor.accept_remote_track(track).await;
            })
        }));

        let events = self.events.clone();
        pc.on_ice_connection_state_change(Box::new(move |state: RTCIceConnectionState| {
            debug!("ICE connection state: {}", state);
            if state == RTCIceConnectionState::Disconnected {
                let _ = events.send(ClientEvent::LinkLost(DisconnectReason::IceDisconnected));
            }
            Box::pin(async {})
        }));
    }

    async fn create_channel(
        &self,
        pc: &Arc<RTCPeerConnection>,
        label: &str,
        close_reason: DisconnectReason,
    ) -> Result<Arc<RTCDataChannel>> {
        let channel = pc
            .create_data_channel(
                label,
                Some(RTCDataChannelInit {
                    ordered: Some(true),
                    ..Default::default()
                }),
            )
            .await?;

        let opened = label.to_string();
        channel.on_open(Box::new(move || {
            debug!("Data channel '{}' open", opened);
            Box::pin(async {})
        }));

        let events = self.events.clone();
        channel.on_close(Box::new(move || {
            let _ = events.send(ClientEvent::LinkLost(close_reason));
            Box::pin(async {})
        }));

        Ok(channel)
    }
}
