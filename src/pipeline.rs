//! Per-request render pipeline
//!
//! A render validates its input, acquires the shared engine, opens a fresh
//! context and then loads, settles and prints under a single deadline. The
//! context is closed on every path, including when the caller stops waiting.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use serde::Deserialize;
use tokio::sync::oneshot;

use crate::{
    Engine, EngineLauncher, EngineManager, Error, ErrorKind, PageSize, RenderContext, Result,
};

/// Tunables for the render pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Deadline covering load, settle and print, in milliseconds
    pub timeout_ms: u64,
    /// Pause between the `load` event and printing, in milliseconds
    pub settle_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 15_000,
            settle_ms: 200,
        }
    }
}

/// A single render job as received from a caller
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderRequest {
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub width_mm: Option<f64>,
    #[serde(default)]
    pub height_mm: Option<f64>,
}

impl RenderRequest {
    pub fn new(html: impl Into<String>) -> Self {
        Self {
            html: Some(html.into()),
            ..Default::default()
        }
    }

    pub fn with_size(mut self, width_mm: f64, height_mm: f64) -> Self {
        self.width_mm = Some(width_mm);
        self.height_mm = Some(height_mm);
        self
    }

    /// Check the request and resolve defaults.
    pub fn validate(&self) -> Result<(&str, PageSize)> {
        let html = match self.html.as_deref() {
            Some(html) if !html.is_empty() => html,
            _ => return Err(Error::Validation("HTML is required".into())),
        };

        let defaults = PageSize::default();
        let width_mm = dimension("widthMm", self.width_mm, defaults.width_mm)?;
        let height_mm = dimension("heightMm", self.height_mm, defaults.height_mm)?;

        Ok((html, PageSize { width_mm, height_mm }))
    }
}

fn dimension(name: &str, value: Option<f64>, default: f64) -> Result<f64> {
    match value {
        None => Ok(default),
        Some(v) if v.is_finite() && v > 0.0 => Ok(v),
        Some(v) => Err(Error::Validation(format!(
            "{} must be a positive number, got {}",
            name, v
        ))),
    }
}

/// A successfully rendered document
#[derive(Debug, Clone)]
pub struct RenderOutput {
    pub pdf: Vec<u8>,
    pub size: usize,
    pub render_ms: u64,
}

/// A classified render failure, safe to report to callers
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct RenderFailure {
    pub kind: ErrorKind,
    pub message: String,
    pub render_ms: u64,
}

impl RenderFailure {
    fn new(err: Error, started: Instant) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
            render_ms: elapsed_ms(started),
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

/// Renders HTML to PDF against the engine held by an [`EngineManager`].
pub struct RenderPipeline<L: EngineLauncher> {
    engines: Arc<EngineManager<L>>,
    config: PipelineConfig,
}

impl<L: EngineLauncher> Clone for RenderPipeline<L> {
    fn clone(&self) -> Self {
        Self {
            engines: self.engines.clone(),
            config: self.config.clone(),
        }
    }
}

impl<L: EngineLauncher> RenderPipeline<L> {
    pub fn new(engines: Arc<EngineManager<L>>, config: PipelineConfig) -> Self {
        Self { engines, config }
    }

    pub fn engines(&self) -> &Arc<EngineManager<L>> {
        &self.engines
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Render one request to completion.
    ///
    /// Exactly one of output or failure is produced, both carrying the elapsed
    /// time. Validation happens before the engine is touched.
    pub async fn render(
        &self,
        request: RenderRequest,
    ) -> std::result::Result<RenderOutput, RenderFailure> {
        let started = Instant::now();

        let (html, size) = request
            .validate()
            .map_err(|e| RenderFailure::new(e, started))?;

        let engine = self
            .engines
            .acquire_engine()
            .await
            .map_err(|e| RenderFailure::new(e, started))?;

        // The context lives in its own task so that dropping this future
        // (client disconnect, server abort) still closes it. Dropping
        // `_cancel` tells the task to stop waiting on the page.
        let (_cancel, cancel_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(isolated_render(
            engine,
            html.to_string(),
            size,
            self.config.clone(),
            cancel_rx,
        ));
        let outcome = match task.await {
            Ok(res) => res,
            Err(e) => Err(Error::RenderError(format!("Render task failed: {}", e))),
        };

        match outcome {
            Ok(pdf) => {
                let render_ms = elapsed_ms(started);
                info!("Rendered {} byte PDF in {}ms", pdf.len(), render_ms);
                Ok(RenderOutput {
                    size: pdf.len(),
                    pdf,
                    render_ms,
                })
            }
            Err(e) => {
                let e = match e {
                    Error::Timeout(_) | Error::RenderError(_) => e,
                    other => Error::RenderError(other.to_string()),
                };
                let failure = RenderFailure::new(e, started);
                warn!(
                    "Render failed after {}ms ({}): {}",
                    failure.render_ms, failure.kind, failure.message
                );
                Err(failure)
            }
        }
    }
}

/// Open a context, render into it under the deadline and close it on every
/// path, including cancellation by the caller.
async fn isolated_render<E: Engine>(
    engine: Arc<E>,
    html: String,
    size: PageSize,
    config: PipelineConfig,
    cancelled: oneshot::Receiver<()>,
) -> Result<Vec<u8>> {
    let mut context = engine
        .new_context()
        .await
        .map_err(|e| Error::RenderError(e.to_string()))?;

    let deadline = Duration::from_millis(config.timeout_ms);
    let outcome = tokio::select! {
        res = tokio::time::timeout(deadline, drive(&mut context, &html, size, config.settle_ms)) => {
            match res {
                Ok(res) => res,
                Err(_) => Err(Error::Timeout(config.timeout_ms)),
            }
        }
        _ = cancelled => {
            debug!("Caller went away, abandoning render");
            Err(Error::RenderError("Render cancelled".into()))
        }
    };

    // Runs on every path; a failed close must not replace the outcome.
    if let Err(e) = context.close().await {
        warn!("Ignoring context cleanup failure: {}", e);
    }

    outcome
}

async fn drive<C: RenderContext>(
    context: &mut C,
    html: &str,
    size: PageSize,
    settle_ms: u64,
) -> Result<Vec<u8>> {
    context.set_content(html).await?;
    debug!("Document loaded, settling for {}ms", settle_ms);
    tokio::time::sleep(Duration::from_millis(settle_ms)).await;
    context.print_pdf(size).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_defaults() {
        let req = RenderRequest::new("<p>x</p>");
        let (html, size) = req.validate().unwrap();
        assert_eq!(html, "<p>x</p>");
        assert_eq!(size, PageSize::default());
    }

    #[test]
    fn test_validate_rejects_missing_or_empty_html() {
        for req in [RenderRequest::default(), RenderRequest::new("")] {
            let err = req.validate().unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ValidationError);
            assert_eq!(err.to_string(), "HTML is required");
        }
    }

    #[test]
    fn test_validate_dimensions() {
        let (_, size) = RenderRequest::new("x").with_size(58.0, 200.5).validate().unwrap();
        assert_eq!(size.width_mm, 58.0);
        assert_eq!(size.height_mm, 200.5);

        let err = RenderRequest::new("x").with_size(0.0, 80.0).validate().unwrap_err();
        assert!(err.to_string().starts_with("widthMm must be a positive number"));

        let err = RenderRequest::new("x")
            .with_size(80.0, f64::NAN)
            .validate()
            .unwrap_err();
        assert!(err.to_string().starts_with("heightMm"));
    }

    #[test]
    fn test_request_deserializes_camel_case() {
        let req: RenderRequest =
            serde_json::from_str(r#"{"html":"<b>a</b>","widthMm":100,"heightMm":50.5}"#).unwrap();
        assert_eq!(req.html.as_deref(), Some("<b>a</b>"));
        assert_eq!(req.width_mm, Some(100.0));
        assert_eq!(req.height_mm, Some(50.5));

        let req: RenderRequest = serde_json::from_str("{}").unwrap();
        assert!(req.html.is_none());
    }

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.timeout_ms, 15_000);
        assert_eq!(config.settle_ms, 200);
    }
}
