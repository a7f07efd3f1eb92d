//! Hybrid rendering client
//!
//! Offloads rendering to a remote render server over WebRTC: negotiates the
//! peer connection through an out-of-band signaling channel, streams the
//! camera pose every render tick on a reliable ordered data channel, receives
//! the rendered video stream, and recovers from disconnection by
//! re-announcing readiness.

pub mod client;
pub mod compositor;
pub mod config;
pub mod error;
pub mod math;
pub mod scene;
pub mod session;
pub mod signaling;
pub mod streaming;

#[cfg(test)]
pub(crate) mod test_support;

pub use client::RenderClient;
pub use compositor::Compositor;
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use scene::Scene;
pub use signaling::{SignalingMessage, SignalingSender};
