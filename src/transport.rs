//! HTTP binding that carries a job to a remote daemon.
//!
//! A job is POSTed as JSON to `/jobs/{kind}` on the addressed daemon. The
//! response body is the job's output: a single body for request/response
//! kinds, a chunked line stream for installs. Because a streamed response
//! has already committed its 200 status when execution fails mid-way, the
//! daemon signals that with a final line prefixed by [`ERROR_FRAME`]; the
//! client strips the frame and turns it back into an execution failure.

use std::time::Duration;

use futures::StreamExt;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::dispatcher::JobHandle;
use crate::error::{CaskError, Result};
use crate::jobs::{Job, OutputSink};

/// Prefix marking the final line of a streamed response as an execution
/// failure rather than output.
pub const ERROR_FRAME: &str = "\u{1e}";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Client half of the wire protocol.
pub struct Transport {
    client: reqwest::Client,
}

impl Transport {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .read_timeout(READ_TIMEOUT)
            .build()
            .map_err(|e| CaskError::execution(format!("cannot build http client: {}", e)))?;
        Ok(Self { client })
    }

    /// Send `job` to the daemon at `host:port`.
    ///
    /// Returns immediately with a handle mirroring the local dispatcher's;
    /// the round-trip runs on its own task so one slow remote cannot block
    /// dispatch to the others. Timeouts surface as `TransportFailure`.
    pub fn dispatch(&self, host: &str, port: u16, job: &Job) -> JobHandle {
        let (sink, output) = OutputSink::channel();
        let (done_tx, done_rx) = oneshot::channel();
        let client = self.client.clone();
        let url = format!("http://{}:{}/jobs/{}", host, port, job.kind());
        let job = job.clone();
        let host = host.to_string();
        tokio::spawn(async move {
            let result = send(client, &url, &host, port, &job, &sink).await;
            let _ = done_tx.send(result);
        });
        JobHandle {
            output,
            done: done_rx,
        }
    }
}

async fn send(
    client: reqwest::Client,
    url: &str,
    host: &str,
    port: u16,
    job: &Job,
    sink: &OutputSink,
) -> Result<()> {
    trace!(%url, request = %job.request_id(), "dispatching remote job");
    let response = client
        .post(url)
        .json(job)
        .send()
        .await
        .map_err(|e| CaskError::transport(host, port, e))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let body = body.trim();
        debug!(%url, %status, "remote daemon rejected job");
        return Err(match status.as_u16() {
            409 => CaskError::DuplicateRequest(job.request_id()),
            503 => CaskError::QueueFull { lane: job.lane() },
            code if (400..500).contains(&code) => CaskError::execution(format!(
                "remote daemon rejected job as malformed ({}): {}",
                status, body
            )),
            _ => {
                if body.is_empty() {
                    CaskError::execution(format!("remote execution failed ({})", status))
                } else {
                    CaskError::execution(body)
                }
            }
        });
    }

    let mut stream = response.bytes_stream();
    let mut buf = String::new();
    let mut failure = None;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| CaskError::transport(host, port, e))?;
        buf.push_str(&String::from_utf8_lossy(&chunk));
        while let Some(pos) = buf.find('\n') {
            let line: String = buf.drain(..=pos).collect();
            deliver(line.trim_end_matches('\n'), sink, &mut failure).await;
        }
    }
    if !buf.is_empty() {
        deliver(&buf, sink, &mut failure).await;
    }

    match failure {
        Some(message) => Err(CaskError::execution(message)),
        None => Ok(()),
    }
}

async fn deliver(line: &str, sink: &OutputSink, failure: &mut Option<String>) {
    match line.strip_prefix(ERROR_FRAME) {
        Some(message) => *failure = Some(message.to_string()),
        None => sink.line(line).await,
    }
}
