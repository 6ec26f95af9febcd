//! RFox Render Service
//!
//! Converts HTML documents into PDFs using a single, lazily started headless
//! Chrome shared by every request. Each render runs in its own isolated
//! browser context which is always torn down, including on failure and
//! timeout.
//!
//! # Components
//!
//! - **Engine Manager** ([`EngineManager`]): owns the one engine process,
//!   starts it on first use, health-checks it on reuse and shuts it down.
//! - **Render Pipeline** ([`RenderPipeline`]): validates a request, acquires
//!   the engine, renders inside a fresh context under a deadline and
//!   classifies failures.
//! - **Backends**: anything implementing [`EngineLauncher`]. The CDP backend
//!   ([`cdp::ChromeLauncher`]) is enabled by default.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use rfrender::{cdp::ChromeLauncher, EngineConfig, EngineManager, PipelineConfig, RenderPipeline, RenderRequest};
//!
//! # async fn demo() {
//! let manager = Arc::new(EngineManager::new(ChromeLauncher::new(EngineConfig::default())));
//! let pipeline = RenderPipeline::new(manager.clone(), PipelineConfig::default());
//!
//! match pipeline.render(RenderRequest::new("<html><body>Hi</body></html>")).await {
//!     Ok(out) => println!("{} bytes in {}ms", out.size, out.render_ms),
//!     Err(failure) => eprintln!("{}: {}", failure.kind, failure.message),
//! }
//!
//! manager.shutdown_engine().await;
//! # }
//! ```

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

pub mod error;
pub use error::{Error, ErrorKind, Result};

pub mod manager;
pub use manager::{EngineManager, EngineStatus};

pub mod pipeline;
pub use pipeline::{PipelineConfig, RenderFailure, RenderOutput, RenderPipeline, RenderRequest};

#[cfg(feature = "cdp")]
pub mod cdp;

pub mod config;
pub mod http;
pub mod server;

/// Millimetres per inch, used to convert page sizes for the print API.
pub const MM_PER_INCH: f64 = 25.4;

/// Configuration used when launching the rendering engine
///
/// The launch flags themselves are fixed (see [`EngineConfig::launch_args`]);
/// only the binary location and connection timeout are tunable.
///
/// # Examples
///
/// ```
/// let cfg = rfrender::EngineConfig::default();
/// assert!(cfg.chrome_path.is_none());
/// ```
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Explicit Chrome/Chromium binary; auto-detected when `None`
    pub chrome_path: Option<PathBuf>,
    /// How long the CDP connection may stay silent before it is considered dead
    pub idle_timeout: Duration,
}

impl EngineConfig {
    /// Command-line flags passed to the engine on launch. Headless mode is
    /// set by the launcher itself.
    pub fn launch_args() -> &'static [&'static str] {
        &[
            "--no-sandbox",
            "--disable-setuid-sandbox",
            "--disable-gpu",
            "--disable-dev-shm-usage",
        ]
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chrome_path: None,
            idle_timeout: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Physical page size in millimetres
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width_mm: f64,
    pub height_mm: f64,
}

impl PageSize {
    pub fn width_in(&self) -> f64 {
        self.width_mm / MM_PER_INCH
    }

    pub fn height_in(&self) -> f64 {
        self.height_mm / MM_PER_INCH
    }
}

impl Default for PageSize {
    fn default() -> Self {
        Self {
            width_mm: 80.0,
            height_mm: 80.0,
        }
    }
}

/// Starts engine processes. Implemented once per backend.
#[async_trait]
pub trait EngineLauncher: Send + Sync + 'static {
    type Engine: Engine;

    /// Launch a new engine process
    async fn launch(&self) -> Result<Self::Engine>;
}

/// A running engine process shared by concurrent renders
#[async_trait]
pub trait Engine: Send + Sync + 'static {
    type Context: RenderContext;

    /// Create an isolated context with a single blank page in it
    async fn new_context(&self) -> Result<Self::Context>;

    /// Check that the engine still answers
    async fn ping(&self) -> Result<()>;

    /// Terminate the engine process
    async fn close(&self) -> Result<()>;
}

/// An isolated browsing context owned by exactly one request
#[async_trait]
pub trait RenderContext: Send + 'static {
    /// Replace the page's document and wait for its `load` event
    async fn set_content(&mut self, html: &str) -> Result<()>;

    /// Print the current document with zero margins and backgrounds enabled
    async fn print_pdf(&mut self, size: PageSize) -> Result<Vec<u8>>;

    /// Close the page and dispose of the context
    async fn close(self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert!(config.chrome_path.is_none());
        assert_eq!(config.idle_timeout, Duration::from_secs(86_400));
    }

    #[test]
    fn test_launch_args() {
        let args = EngineConfig::launch_args();
        assert!(args.contains(&"--no-sandbox"));
        assert!(args.contains(&"--disable-gpu"));
        assert!(args.contains(&"--disable-dev-shm-usage"));
    }

    #[test]
    fn test_page_size() {
        let size = PageSize::default();
        assert_eq!(size.width_mm, 80.0);
        assert!((size.width_in() - 3.149_606).abs() < 1e-5);
        let a4 = PageSize {
            width_mm: 210.0,
            height_mm: 297.0,
        };
        assert!((a4.height_in() - 11.692_913).abs() < 1e-5);
    }
}
