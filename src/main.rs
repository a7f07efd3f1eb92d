use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::{Parser, ValueEnum};
use parking_lot::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use webrtc::track::track_remote::TrackRemote;

use hybrid_render_client::config::ClientConfig;
use hybrid_render_client::math::{Mat4, Vec3};
use hybrid_render_client::scene::Scene;
use hybrid_render_client::signaling::ws::WsSignaling;
use hybrid_render_client::{Compositor, RenderClient};

/// Log level for the application
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

/// Headless render client for smoke-testing against a render server
#[derive(Parser, Debug)]
#[command(name = "hybrid-render-client")]
#[command(version, about = "Thin client streaming camera poses to a remote render server", long_about = None)]
struct CliArgs {
    /// Signaling server WebSocket URL
    #[arg(
        short = 'u',
        long,
        value_name = "URL",
        default_value = "ws://127.0.0.1:8787/signal"
    )]
    url: String,

    /// STUN server (empty string disables STUN)
    #[arg(long, value_name = "URL")]
    stun_server: Option<String>,

    /// Connection statistics interval in milliseconds
    #[arg(long, value_name = "MS")]
    stats_interval_ms: Option<u64>,

    /// Render tick interval in milliseconds
    #[arg(short = 't', long, value_name = "MS", default_value = "16")]
    tick_ms: u64,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short = 'l', long, value_name = "LEVEL", default_value = "info")]
    log_level: LogLevel,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Camera on a slow orbit so the server sees continuous movement
struct ScriptedScene {
    angle: Mutex<f64>,
    placeholder: Mutex<bool>,
}

impl ScriptedScene {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            angle: Mutex::new(0.0),
            placeholder: Mutex::new(true),
        })
    }

    fn advance(&self, step: f64) {
        let mut angle = self.angle.lock();
        *angle = (*angle + step) % std::f64::consts::TAU;
    }
}

impl Scene for ScriptedScene {
    fn camera_world_transform(&self) -> Mat4 {
        let angle = *self.angle.lock();
        Mat4::from_rotation_y(
            angle,
            Vec3::new(2.0 * angle.cos(), 1.6, 2.0 * angle.sin()),
        )
    }

    fn stereo_camera_transforms(&self) -> Option<(Mat4, Mat4)> {
        None
    }

    fn immersive_presentation_active(&self) -> bool {
        false
    }

    fn is_vr_mode(&self) -> bool {
        false
    }

    fn is_ar_mode(&self) -> bool {
        false
    }

    fn set_placeholder_visible(&self, visible: bool) {
        let mut placeholder = self.placeholder.lock();
        if *placeholder != visible {
            *placeholder = visible;
            tracing::info!("Placeholder {}", if visible { "shown" } else { "hidden" });
        }
    }
}

/// Compositor that only logs what it would display
struct LoggingCompositor;

#[async_trait]
impl Compositor for LoggingCompositor {
    async fn accept_remote_track(&self, track: Arc<TrackRemote>) {
        tracing::info!("Remote {} track attached", track.kind());
    }

    async fn disable(&self) {
        tracing::info!("Compositor disabled");
    }

    fn latency_ms(&self) -> f64 {
        0.0
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    init_logging(args.log_level, args.verbose);

    tracing::info!(
        "Starting hybrid-render-client v{}",
        env!("CARGO_PKG_VERSION")
    );

    let mut config = ClientConfig::default();
    if let Some(stun) = args.stun_server {
        config.stun_server = stun;
    }
    if let Some(interval) = args.stats_interval_ms {
        config.stats_interval_ms = interval;
    }

    let (signaling, signaling_rx) = WsSignaling::connect(&args.url).await?;
    let scene = ScriptedScene::new();

    let client = Arc::new(RenderClient::new(
        config,
        Arc::new(signaling),
        scene.clone(),
        Arc::new(LoggingCompositor),
    ));

    // Render tick driver: advance the scripted camera and let the client
    // stream whatever changed
    {
        let client = client.clone();
        let scene = scene.clone();
        let tick = Duration::from_millis(args.tick_ms.max(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            loop {
                interval.tick().await;
                scene.advance(0.002);
                if let Err(e) = client.tick().await {
                    tracing::warn!("Render tick failed: {}", e);
                }
            }
        });
    }

    tokio::select! {
        result = client.run(signaling_rx) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    tracing::info!("Client shutdown complete");
    Ok(())
}

/// Initialize logging with tracing
fn init_logging(level: LogLevel, verbose_count: u8) {
    // Verbose count overrides log level
    let effective_level = match verbose_count {
        0 => level,
        1 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };

    let filter = match effective_level {
        LogLevel::Error => "hybrid_render_client=error,webrtc=error",
        LogLevel::Warn => "hybrid_render_client=warn,webrtc=error",
        LogLevel::Info => "hybrid_render_client=info,webrtc=warn",
        LogLevel::Debug => "hybrid_render_client=debug,webrtc=info",
        LogLevel::Trace => "hybrid_render_client=trace,webrtc=debug",
    };

    // Environment variable takes highest priority
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    if let Err(err) = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
    {
        eprintln!("failed to initialize tracing: {}", err);
    }
}
