//! Service configuration from command-line flags and environment variables

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::{EngineConfig, PipelineConfig};

/// Command-line and environment configuration for the render service.
#[derive(Debug, Clone, Parser)]
#[command(name = "rfrender", version, about = "HTML to PDF render service")]
pub struct ServiceConfig {
    /// Address to bind; all interfaces by default so containers are reachable.
    #[arg(long, env = "HOST", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub host: IpAddr,

    /// Port to listen on.
    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Shared secret expected in the X-Render-Secret header. Without it every
    /// render request is rejected.
    #[arg(long, env = "RENDER_SECRET", hide_env_values = true)]
    pub secret: Option<String>,

    /// Chrome/Chromium binary to launch instead of auto-detecting one.
    #[arg(long = "chrome-path", env = "CHROME_PATH", value_name = "PATH")]
    pub chrome_path: Option<PathBuf>,

    /// Deadline for loading, settling and printing one document.
    #[arg(long = "render-timeout-ms", env = "RENDER_TIMEOUT_MS", default_value_t = 15_000)]
    pub render_timeout_ms: u64,

    /// Pause after the load event before printing.
    #[arg(long = "settle-ms", env = "RENDER_SETTLE_MS", default_value_t = 200)]
    pub settle_ms: u64,

    /// How long shutdown waits for in-flight requests and the engine.
    #[arg(long = "shutdown-grace-ms", env = "SHUTDOWN_GRACE_MS", default_value_t = 10_000)]
    pub shutdown_grace_ms: u64,

    /// Maximum accepted request body, in megabytes.
    #[arg(long = "body-limit-mb", env = "BODY_LIMIT_MB", default_value_t = 100)]
    pub body_limit_mb: usize,
}

impl ServiceConfig {
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// The configured secret, treating an empty value as unset.
    pub fn secret(&self) -> Option<&str> {
        self.secret.as_deref().filter(|s| !s.is_empty())
    }

    pub fn body_limit_bytes(&self) -> usize {
        self.body_limit_mb.saturating_mul(1024 * 1024)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            chrome_path: self.chrome_path.clone(),
            ..Default::default()
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            timeout_ms: self.render_timeout_ms,
            settle_ms: self.settle_ms,
        }
    }
}
