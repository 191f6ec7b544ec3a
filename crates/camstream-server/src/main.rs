//! camstream streaming server, entry point.
//!
//! This binary serves live camera frames and control messages to a single
//! WebSocket consumer (typically a browser page) and answers the consumer's
//! JSON requests.  Without a camera attached it can run a synthetic test
//! pattern.
//!
//! # Usage
//!
//! ```text
//! camstream-server [OPTIONS]
//!
//! Options:
//!   --config             <PATH>       TOML configuration file
//!   --bind               <IP>         Listen address [default: 0.0.0.0]
//!   --port               <PORT>       Listen port [default: 6001]
//!   --max-pending-writes <N>          Write queue bound [default: 512]
//!   --test-pattern       <WxH@FPS>    Serve a synthetic NV12 gradient
//! ```
//!
//! # Configuration precedence
//!
//! Built-in defaults, then the `--config` file, then CLI flags and
//! environment variables.  CLI flags win over environment variables.
//!
//! | Variable                       | Flag                   |
//! |--------------------------------|------------------------|
//! | `CAMSTREAM_CONFIG`             | `--config`             |
//! | `CAMSTREAM_BIND`               | `--bind`               |
//! | `CAMSTREAM_PORT`               | `--port`               |
//! | `CAMSTREAM_MAX_PENDING_WRITES` | `--max-pending-writes` |
//! | `CAMSTREAM_TEST_PATTERN`       | `--test-pattern`       |
//!
//! # Built-in requests
//!
//! | Request             | Reply                                   |
//! |---------------------|-----------------------------------------|
//! | `ping`              | `"pong"`                                |
//! | `get-formats`       | the pixel-format catalog                |
//! | `get-configuration` | `{width, height, mirrored, rotated}`    |
//! | `need-frame`        | same as `get-configuration`, and sends the next frame |

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::{bail, Context};
use clap::Parser;
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

use camstream_server::application::{FramePublisher, RequestController, StreamServer};
use camstream_server::domain::{FileConfig, ServerConfig, TestPattern};
use camstream_server::infrastructure::{run_server, run_test_pattern};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Single-consumer WebSocket streaming server for live camera frames.
///
/// Every option is optional: anything not given falls back to the config
/// file, then to the built-in default.
#[derive(Debug, Parser)]
#[command(
    name = "camstream-server",
    about = "Streams live camera frames to a single WebSocket consumer",
    version
)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long, env = "CAMSTREAM_CONFIG")]
    config: Option<PathBuf>,

    /// IP address to bind the WebSocket server to.
    ///
    /// Use `0.0.0.0` to accept connections from the LAN, or `127.0.0.1`
    /// for local connections only.
    #[arg(long, env = "CAMSTREAM_BIND")]
    bind: Option<String>,

    /// TCP port for the WebSocket server.
    #[arg(long, env = "CAMSTREAM_PORT")]
    port: Option<u16>,

    /// Maximum number of undelivered messages before submissions are refused.
    #[arg(long, env = "CAMSTREAM_MAX_PENDING_WRITES")]
    max_pending_writes: Option<usize>,

    /// Serve a synthetic frame source, e.g. `640x480@30`.
    #[arg(long, env = "CAMSTREAM_TEST_PATTERN")]
    test_pattern: Option<TestPattern>,
}

impl Cli {
    /// Builds the effective [`ServerConfig`] from defaults, the optional
    /// config file, and the CLI overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or is invalid, if
    /// `--bind` is not an IP address, or if `--max-pending-writes` is zero.
    fn build_config(&self) -> anyhow::Result<ServerConfig> {
        let mut config = ServerConfig::default();

        if let Some(path) = &self.config {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            let file = FileConfig::from_toml_str(&text)
                .with_context(|| format!("invalid config file {}", path.display()))?;
            file.apply_to(&mut config)
                .with_context(|| format!("invalid settings in {}", path.display()))?;
        }

        if let Some(bind) = &self.bind {
            let ip: IpAddr = bind
                .parse()
                .with_context(|| format!("invalid bind address: '{bind}'"))?;
            config.bind_addr.set_ip(ip);
        }
        if let Some(port) = self.port {
            config.bind_addr.set_port(port);
        }
        if let Some(bound) = self.max_pending_writes {
            if bound == 0 {
                bail!("--max-pending-writes must be at least 1");
            }
            config.max_pending_writes = bound;
        }
        if let Some(pattern) = self.test_pattern {
            config.test_pattern = Some(pattern);
        }

        Ok(config)
    }
}

// ── Request wiring ────────────────────────────────────────────────────────────

/// Registers the requests every deployment answers.
fn register_builtin_requests(
    controller: &RequestController,
    server: &StreamServer,
    publisher: &FramePublisher,
) -> anyhow::Result<()> {
    controller.register("ping", |_| Some(json!("pong")))?;

    let formats = serde_json::to_value(server.formats()).context("failed to encode formats")?;
    controller.register("get-formats", move |_| Some(formats.clone()))?;

    let p = publisher.clone();
    controller.register("get-configuration", move |_| {
        serde_json::to_value(p.capture_info()).ok()
    })?;

    let p = publisher.clone();
    controller.register("need-frame", move |_| {
        p.request_frame();
        serde_json::to_value(p.capture_info()).ok()
    })?;

    Ok(())
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // `RUST_LOG` controls verbosity; default to `info`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.build_config()?;

    info!(
        "camstream starting: bind={}, queue bound={}, test pattern={}",
        config.bind_addr,
        config.max_pending_writes,
        config.test_pattern.is_some()
    );

    let server = Arc::new(StreamServer::new(&config));
    let publisher = FramePublisher::new(&server, config.stale_send_after);
    let controller = RequestController::new(&server);
    register_builtin_requests(&controller, &server, &publisher)?;
    controller.install();
    server.start();

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, shutting down");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    if let Some(pattern) = config.test_pattern {
        tokio::spawn(run_test_pattern(
            publisher.clone(),
            pattern,
            Arc::clone(&running),
        ));
    }

    run_server(config, Arc::clone(&server), running).await?;

    info!("camstream stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
