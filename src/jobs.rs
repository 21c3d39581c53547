//! Dispatchable units of work.
//!
//! Every operation the CLI can fan out — install, start, stop, status,
//! environment reads and writes — is one variant of the [`Job`] enum. A job
//! carries its own [`RequestId`] for duplicate suppression, the target
//! [`Identifier`], and the operation payload, and serializes to JSON for the
//! wire protocol. Execution is a single switch on the variant; new
//! operations are new variants.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::backend::ContainerBackend;
use crate::error::{CaskError, Result};
use crate::identifier::Identifier;

/// Process-unique token correlating a request with its response and
/// suppressing duplicate submissions. Fresh per job, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(Uuid);

impl RequestId {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        RequestId(Uuid::new_v4())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Priority lane a job is queued into.
///
/// Latency-sensitive control operations ride the fast lane; long-running
/// work like installs rides the slow lane so it cannot starve them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Lane {
    Fast,
    Slow,
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lane::Fast => f.write_str("fast"),
            Lane::Slow => f.write_str("slow"),
        }
    }
}

/// An internal/external port binding, written `<internal>=<external>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortPair {
    pub internal: u16,
    pub external: u16,
}

impl FromStr for PortPair {
    type Err = CaskError;

    fn from_str(s: &str) -> Result<Self> {
        let (internal, external) = s
            .split_once('=')
            .ok_or_else(|| CaskError::execution(format!("'{}' is not an <internal>=<external> pair", s)))?;
        let parse = |v: &str| {
            v.parse::<u16>()
                .map_err(|_| CaskError::execution(format!("'{}' is not a valid port", v)))
        };
        Ok(PortPair {
            internal: parse(internal)?,
            external: parse(external)?,
        })
    }
}

/// Parse a comma separated list of port pairs.
pub fn parse_port_pairs(s: &str) -> Result<Vec<PortPair>> {
    s.split(',')
        .filter(|p| !p.is_empty())
        .map(str::parse)
        .collect()
}

/// A single environment entry, written `KEY=value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub key: String,
    pub value: String,
}

impl FromStr for EnvVar {
    type Err = CaskError;

    fn from_str(s: &str) -> Result<Self> {
        let (key, value) = s
            .split_once('=')
            .ok_or_else(|| CaskError::execution(format!("'{}' is not a KEY=value pair", s)))?;
        if key.is_empty() {
            return Err(CaskError::execution("environment key must not be empty"));
        }
        Ok(EnvVar {
            key: key.to_string(),
            value: value.to_string(),
        })
    }
}

impl fmt::Display for EnvVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// What a content-fetch job retrieves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentKind {
    Environment,
}

/// A unit of dispatchable work.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Job {
    Install {
        request_id: RequestId,
        id: Identifier,
        image: String,
        #[serde(default)]
        ports: Vec<PortPair>,
        #[serde(default)]
        env: Vec<EnvVar>,
        #[serde(default)]
        started: bool,
    },
    Start {
        request_id: RequestId,
        id: Identifier,
    },
    Stop {
        request_id: RequestId,
        id: Identifier,
    },
    Status {
        request_id: RequestId,
        id: Identifier,
    },
    PutEnvironment {
        request_id: RequestId,
        id: Identifier,
        env: Vec<EnvVar>,
    },
    PatchEnvironment {
        request_id: RequestId,
        id: Identifier,
        env: Vec<EnvVar>,
    },
    Content {
        request_id: RequestId,
        id: Identifier,
        content: ContentKind,
    },
}

impl Job {
    pub fn request_id(&self) -> RequestId {
        match self {
            Job::Install { request_id, .. }
            | Job::Start { request_id, .. }
            | Job::Stop { request_id, .. }
            | Job::Status { request_id, .. }
            | Job::PutEnvironment { request_id, .. }
            | Job::PatchEnvironment { request_id, .. }
            | Job::Content { request_id, .. } => *request_id,
        }
    }

    /// Route segment the job is posted to on a remote daemon; matches the
    /// serde tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Job::Install { .. } => "install",
            Job::Start { .. } => "start",
            Job::Stop { .. } => "stop",
            Job::Status { .. } => "status",
            Job::PutEnvironment { .. } => "put-environment",
            Job::PatchEnvironment { .. } => "patch-environment",
            Job::Content { .. } => "content",
        }
    }

    /// Installs are the only long-running jobs; everything else is a
    /// low-latency control operation.
    pub fn lane(&self) -> Lane {
        match self {
            Job::Install { .. } => Lane::Slow,
            _ => Lane::Fast,
        }
    }

    /// Whether the remote response body is a chunked progress stream rather
    /// than a single body.
    pub fn streamed(&self) -> bool {
        matches!(self, Job::Install { .. })
    }

    /// Execute the operation against the backend, writing incremental
    /// output to `sink`. This is the only place job semantics live.
    pub async fn execute(&self, backend: &dyn ContainerBackend, sink: &OutputSink) -> Result<()> {
        match self {
            Job::Install {
                id,
                image,
                ports,
                env,
                started,
                ..
            } => {
                backend.install(id, image, ports, env, sink).await?;
                if *started {
                    let msg = backend.start(id).await?;
                    sink.line(msg).await;
                }
                Ok(())
            }
            Job::Start { id, .. } => {
                let msg = backend.start(id).await?;
                sink.line(msg).await;
                Ok(())
            }
            Job::Stop { id, .. } => {
                let msg = backend.stop(id).await?;
                sink.line(msg).await;
                Ok(())
            }
            Job::Status { id, .. } => {
                let text = backend.status(id).await?;
                sink.line(text).await;
                Ok(())
            }
            Job::PutEnvironment { id, env, .. } => backend.put_environment(id, env).await,
            Job::PatchEnvironment { id, env, .. } => backend.patch_environment(id, env).await,
            Job::Content { id, content, .. } => match content {
                ContentKind::Environment => {
                    for var in backend.get_environment(id).await? {
                        sink.line(var.to_string()).await;
                    }
                    Ok(())
                }
            },
        }
    }
}

/// Sending half of a job's incremental output channel.
#[derive(Clone)]
pub struct OutputSink {
    tx: mpsc::Sender<String>,
}

impl OutputSink {
    /// Channel capacity for job output; slow readers backpressure the job.
    const CAPACITY: usize = 64;

    pub fn channel() -> (OutputSink, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(Self::CAPACITY);
        (OutputSink { tx }, rx)
    }

    /// Emit one line of output. A dropped receiver is not an error; the
    /// originator has simply stopped listening.
    pub async fn line(&self, line: impl Into<String>) {
        let _ = self.tx.send(line.into()).await;
    }
}
