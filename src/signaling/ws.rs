//! WebSocket signaling transport
//!
//! Reference transport carrying the JSON signaling contract over a WebSocket
//! connection. Frames that fail to decode are logged and dropped rather than
//! forwarded half-parsed.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::{SignalingMessage, SignalingSender};
use crate::error::{ClientError, Result};

/// Outbound frame queued for the writer task
enum OutboundFrame {
    Message(SignalingMessage),
    Stats(serde_json::Value),
}

/// Signaling over a WebSocket connection
pub struct WsSignaling {
    outbound: mpsc::Sender<OutboundFrame>,
}

impl WsSignaling {
    /// Connect to a signaling server and split into a sender handle and the
    /// inbound message stream.
    pub async fn connect(url: &str) -> Result<(Self, mpsc::Receiver<SignalingMessage>)> {
        let (stream, _) = connect_async(url)
            .await
            .map_err(|e| ClientError::Transport(format!("WebSocket connect failed: {e}")))?;
        info!("Signaling connected: {}", url);

        let (mut sink, mut source) = stream.split();
        let (out_tx, mut out_rx) = mpsc::channel::<OutboundFrame>(64);
        let (in_tx, in_rx) = mpsc::channel::<SignalingMessage>(64);

        // Writer: serialize queued frames onto the socket
        tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                let text = match frame {
                    OutboundFrame::Message(msg) => serde_json::to_string(&msg),
                    OutboundFrame::Stats(record) => {
                        serde_json::to_string(&serde_json::json!({ "type": "stats", "data": record }))
                    }
                };
                let text = match text {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("Failed to serialize signaling frame: {}", e);
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(text)).await {
                    warn!("Signaling send failed: {}", e);
                    break;
                }
            }
            debug!("Signaling writer stopped");
        });

        // Reader: decode inbound frames into typed messages
        tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                match frame {
                    Ok(Message::Text(text)) => match serde_json::from_str(&text) {
                        Ok(msg) => {
                            if in_tx.send(msg).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!("Dropping malformed signaling frame: {}", e),
                    },
                    Ok(Message::Close(_)) => {
                        info!("Signaling connection closed by server");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("Signaling receive failed: {}", e);
                        break;
                    }
                }
            }
            debug!("Signaling reader stopped");
        });

        Ok((Self { outbound: out_tx }, in_rx))
    }
}

#[async_trait]
impl SignalingSender for WsSignaling {
    async fn send(&self, message: SignalingMessage) -> Result<()> {
        self.outbound
            .send(OutboundFrame::Message(message))
            .await
            .map_err(|_| ClientError::Transport("signaling writer closed".to_string()))
    }

    async fn send_stats(&self, record: serde_json::Value) -> Result<()> {
        self.outbound
            .send(OutboundFrame::Stats(record))
            .await
            .map_err(|_| ClientError::Transport("signaling writer closed".to_string()))
    }
}
