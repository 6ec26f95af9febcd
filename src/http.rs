//! HTTP surface: `GET /health` and `POST /render`

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine as Base64Engine;
use log::{debug, error, warn};
use serde::Serialize;
use subtle::ConstantTimeEq;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::{EngineLauncher, ErrorKind, RenderPipeline, RenderRequest};

/// Header carrying the shared secret
pub const SECRET_HEADER: &str = "x-render-secret";

/// State shared by every handler
pub struct AppState<L: EngineLauncher> {
    pipeline: RenderPipeline<L>,
    secret: Option<Arc<str>>,
}

impl<L: EngineLauncher> Clone for AppState<L> {
    fn clone(&self) -> Self {
        Self {
            pipeline: self.pipeline.clone(),
            secret: self.secret.clone(),
        }
    }
}

impl<L: EngineLauncher> AppState<L> {
    /// `secret` of `None` (or empty) rejects every render request.
    pub fn new(pipeline: RenderPipeline<L>, secret: Option<&str>) -> Self {
        Self {
            pipeline,
            secret: secret.filter(|s| !s.is_empty()).map(Arc::from),
        }
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        let Some(expected) = self.secret.as_deref() else {
            return false;
        };
        let Some(given) = headers.get(SECRET_HEADER) else {
            return false;
        };
        given.as_bytes().ct_eq(expected.as_bytes()).into()
    }
}

/// Build the service router.
pub fn router<L: EngineLauncher>(state: AppState<L>, body_limit: usize) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/render", post(render::<L>))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
    timestamp: String,
}

/// RFC 3339 only rejects years outside 0..=9999, which a sane system clock
/// never reports; the error path exists so a broken clock shows up as a
/// failed health check rather than an empty timestamp.
fn iso_timestamp(at: OffsetDateTime) -> Result<String, time::error::Format> {
    at.format(&Rfc3339)
}

async fn health() -> Response {
    match iso_timestamp(OffsetDateTime::now_utc()) {
        Ok(timestamp) => reply(
            StatusCode::OK,
            HealthBody {
                status: "ok",
                timestamp,
            },
        ),
        Err(e) => {
            error!("Cannot format health timestamp: {}", e);
            reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody {
                    message: Some(e.to_string()),
                    ..ErrorBody::plain("Clock error")
                },
            )
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RenderedBody {
    success: bool,
    pdf: String,
    size: usize,
    render_ms: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    render_ms: Option<u64>,
}

impl ErrorBody {
    fn plain(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: None,
            kind: None,
            render_ms: None,
        }
    }
}

fn reply<T: Serialize>(status: StatusCode, body: T) -> Response {
    (status, Json(body)).into_response()
}

async fn render<L: EngineLauncher>(
    State(state): State<AppState<L>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !state.authorized(&headers) {
        debug!("Rejected render request with missing or wrong secret");
        return reply(StatusCode::UNAUTHORIZED, ErrorBody::plain("Unauthorized"));
    }

    let request = if body.is_empty() {
        RenderRequest::default()
    } else {
        match serde_json::from_slice::<RenderRequest>(&body) {
            Ok(request) => request,
            Err(e) => {
                let mut err = ErrorBody::plain("Invalid request body");
                err.message = Some(e.to_string());
                return reply(StatusCode::BAD_REQUEST, err);
            }
        }
    };

    match state.pipeline.render(request).await {
        Ok(out) => reply(
            StatusCode::OK,
            RenderedBody {
                success: true,
                pdf: base64::engine::general_purpose::STANDARD.encode(&out.pdf),
                size: out.size,
                render_ms: out.render_ms,
            },
        ),
        Err(failure) if failure.kind == ErrorKind::ValidationError => {
            reply(StatusCode::BAD_REQUEST, ErrorBody::plain(failure.message))
        }
        Err(failure) => {
            warn!("Render error: {}", failure);
            reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody {
                    error: "Render failed".into(),
                    message: Some(failure.message),
                    kind: Some(failure.kind),
                    render_ms: Some(failure.render_ms),
                },
            )
        }
    }
}
