//! HTTP server exposing the dispatcher over the wire protocol.
//!
//! One route per contract: `POST /jobs/{kind}` with the serialized job as
//! the body. Dispatcher rejections map onto status codes (409 duplicate,
//! 503 queue full), malformed bodies are axum's 4xx, and execution failures
//! of request/response jobs are a 500 with the error as the body. Streamed
//! jobs commit a 200 up front and report a late failure through the
//! error-frame line instead.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::dispatcher::{Dispatcher, JobHandle};
use crate::error::CaskError;
use crate::jobs::Job;
use crate::locator::DEFAULT_PORT;
use crate::transport::ERROR_FRAME;

/// Daemon listener configuration.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub listen: SocketAddr,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
        }
    }
}

#[derive(Clone)]
struct AppState {
    dispatcher: Arc<Dispatcher>,
}

/// Run the daemon in the foreground until the process is terminated.
pub async fn serve(config: DaemonConfig, dispatcher: Arc<Dispatcher>) -> anyhow::Result<()> {
    dispatcher.start();
    let app = router(dispatcher);
    let listener = tokio::net::TcpListener::bind(config.listen).await?;
    info!(listen = %config.listen, "daemon listening");
    axum::serve(listener, app).await?;
    Ok(())
}

fn router(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .route("/jobs/{kind}", post(submit_job))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { dispatcher })
}

async fn healthz() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn submit_job(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Json(job): Json<Job>,
) -> Response {
    if job.kind() != kind {
        return (
            StatusCode::BAD_REQUEST,
            format!("job kind '{}' does not match route '{}'", job.kind(), kind),
        )
            .into_response();
    }
    let streamed = job.streamed();
    match state.dispatcher.submit(job) {
        Ok(handle) if streamed => stream_response(handle),
        Ok(handle) => gathered_response(handle).await,
        Err(e @ CaskError::DuplicateRequest(_)) => {
            (StatusCode::CONFLICT, e.to_string()).into_response()
        }
        Err(e @ CaskError::QueueFull { .. }) => {
            (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response()
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// Wait for the job and answer with one body: 200 with the output, or 500
/// with the error.
async fn gathered_response(handle: JobHandle) -> Response {
    let (output, result) = handle.gather().await;
    match result {
        Ok(()) => (StatusCode::OK, output).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// Forward job output as chunked lines while the job runs. A failure after
/// the 200 has been committed is appended as an error-frame line.
fn stream_response(mut handle: JobHandle) -> Response {
    let (tx, rx) = futures::channel::mpsc::unbounded::<Result<Bytes, Infallible>>();
    tokio::spawn(async move {
        while let Some(line) = handle.output.recv().await {
            let _ = tx.unbounded_send(Ok(Bytes::from(format!("{}\n", line))));
        }
        let failure = match handle.done.await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some("dispatcher dropped the job".to_string()),
        };
        if let Some(message) = failure {
            let _ = tx.unbounded_send(Ok(Bytes::from(format!("{}{}\n", ERROR_FRAME, message))));
        }
    });
    Body::from_stream(rx).into_response()
}
