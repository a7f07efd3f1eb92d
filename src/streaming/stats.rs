//! Periodic connection statistics
//!
//! A loop spawned when a session connects. Each pass condenses the peer
//! connection's stats report into one flat record, merges the compositor's
//! current latency figure, and forwards it over signaling for server-side
//! logging. Losing the Connected state is the only exit condition.

use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::stats::StatsReportType;

use crate::compositor::Compositor;
use crate::config::ClientConfig;
use crate::session::{Session, SessionState};
use crate::signaling::SignalingSender;

/// Per-data-channel slice of a stats record
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChannelStats {
    pub label: String,
    #[serde(rename = "messagesSent")]
    pub messages_sent: u32,
    #[serde(rename = "bytesSent")]
    pub bytes_sent: usize,
}

/// Condensed connection statistics forwarded over signaling
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ConnectionStatsRecord {
    #[serde(rename = "rttMs")]
    pub rtt_ms: Option<f64>,
    #[serde(rename = "packetsSent")]
    pub packets_sent: u32,
    #[serde(rename = "packetsReceived")]
    pub packets_received: u32,
    #[serde(rename = "bytesSent")]
    pub bytes_sent: u64,
    #[serde(rename = "bytesReceived")]
    pub bytes_received: u64,
    #[serde(rename = "inboundPacketsReceived")]
    pub inbound_packets_received: u32,
    #[serde(rename = "inboundBytesReceived")]
    pub inbound_bytes_received: u64,
    pub channels: Vec<ChannelStats>,
    #[serde(rename = "latencyMs")]
    pub latency_ms: f64,
    pub timestamp: i64,
}

/// Condense a full stats report into the forwarded record.
///
/// Network-level totals come from the nominated candidate pair; media totals
/// from inbound RTP entries; channel totals per data channel.
pub async fn condense_stats(pc: &RTCPeerConnection, latency_ms: f64) -> ConnectionStatsRecord {
    let report = pc.get_stats().await;
    let mut record = ConnectionStatsRecord {
        rtt_ms: None,
        packets_sent: 0,
        packets_received: 0,
        bytes_sent: 0,
        bytes_received: 0,
        inbound_packets_received: 0,
        inbound_bytes_received: 0,
        channels: Vec::new(),
        latency_ms,
        timestamp: chrono::Utc::now().timestamp_millis(),
    };

    for stat in report.reports.values() {
        match stat {
            StatsReportType::CandidatePair(pair) if pair.nominated => {
                record.packets_sent = pair.packets_sent as u32;
                record.packets_received = pair.packets_received as u32;
                record.bytes_sent = pair.bytes_sent as u64;
                record.bytes_received = pair.bytes_received as u64;
                record.rtt_ms = Some(pair.current_round_trip_time * 1000.0);
            }
            StatsReportType::InboundRTP(inbound) => {
                record.inbound_packets_received += inbound.packets_received as u32;
                record.inbound_bytes_received += inbound.bytes_received as u64;
            }
            StatsReportType::DataChannel(channel) => {
                record.channels.push(ChannelStats {
                    label: channel.label.clone(),
                    messages_sent: channel.messages_sent as u32,
                    bytes_sent: channel.bytes_sent as usize,
                });
            }
            _ => {}
        }
    }

    record
}

/// Run the stats loop for one session's lifetime
pub fn spawn_stats_loop(
    config: ClientConfig,
    session: Arc<Session>,
    signaling: Arc<dyn SignalingSender>,
    compositor: Arc<dyn Compositor>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let interval = config.stats_interval();
        debug!(
            "Stats loop started for session {} ({:?} interval)",
            session.id(),
            interval
        );
        loop {
            if session.state() != SessionState::Connected {
                break;
            }
            let record = condense_stats(session.pc(), compositor.latency_ms()).await;
            match serde_json::to_value(&record) {
                Ok(value) => {
                    if let Err(e) = signaling.send_stats(value).await {
                        warn!("Failed to forward stats: {}", e);
                        break;
                    }
                }
                Err(e) => warn!("Failed to serialize stats record: {}", e),
            }
            tokio::time::sleep(interval).await;
        }
        debug!("Stats loop stopped for session {}", session.id());
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::FrameLedger;
    use crate::test_support::{RecordingSignaling, StubCompositor};
    use std::time::Duration;
    use webrtc::api::APIBuilder;
    use webrtc::peer_connection::configuration::RTCConfiguration;

    async fn session() -> Arc<Session> {
        let api = APIBuilder::new().build();
        let pc = Arc::new(
            api.new_peer_connection(RTCConfiguration::default())
                .await
                .unwrap(),
        );
        let input = pc.create_data_channel("client-input", None).await.unwrap();
        let status = pc.create_data_channel("client-status", None).await.unwrap();
        Arc::new(Session::new(
            pc,
            input,
            status,
            FrameLedger::new(16, Duration::from_secs(2)),
        ))
    }

    #[tokio::test]
    async fn test_condensed_record_carries_latency_and_channels() {
        let session = session().await;
        let record = condense_stats(session.pc(), 12.5).await;

        assert_eq!(record.latency_ms, 12.5);
        // no nominated pair yet on an unconnected peer
        assert!(record.rtt_ms.is_none());
        let labels: Vec<_> = record.channels.iter().map(|c| c.label.as_str()).collect();
        assert!(labels.contains(&"client-input"));
        assert!(labels.contains(&"client-status"));

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["latencyMs"], 12.5);
        assert!(value["timestamp"].as_i64().unwrap() > 0);
    }

    #[tokio::test]
    async fn test_loop_exits_when_connection_lost() {
        let session = session().await;
        session.mark_connected();
        let signaling = RecordingSignaling::new();
        let compositor = StubCompositor::new();
        *compositor.latency.lock() = 3.0;

        let config = ClientConfig {
            stats_interval_ms: 10,
            ..ClientConfig::default()
        };
        let handle = spawn_stats_loop(
            config,
            session.clone(),
            signaling.clone(),
            compositor,
        );

        tokio::time::sleep(Duration::from_millis(35)).await;
        session.set_state(SessionState::Disconnected);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("stats loop must exit once disconnected")
            .unwrap();

        let stats = signaling.stats.lock();
        assert!(!stats.is_empty());
        assert_eq!(stats[0]["latencyMs"], 3.0);
    }
}
