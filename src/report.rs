//! Completion notification for top-level operations.

use serde::Serialize;
use tracing::{debug, trace, warn};

/// Structured record delivered when a top-level operation finishes,
/// regardless of how many targets it fanned out to.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionReport {
    pub payload: String,
    pub success: bool,
}

/// External completion sink. Without `--notify-url` there is nothing to
/// deliver; the command has already rendered its output and errors.
pub enum Reporter {
    Disabled,
    Http { url: String },
}

impl Reporter {
    pub fn from_notify_url(url: Option<String>) -> Self {
        match url {
            Some(url) => Reporter::Http { url },
            None => Reporter::Disabled,
        }
    }

    /// Deliver the report. Delivery failure is logged, never fatal; the
    /// operation itself already succeeded or failed on its own terms.
    pub async fn deliver(&self, report: &CompletionReport) {
        match self {
            Reporter::Disabled => {
                trace!(success = report.success, "no notify url, report not sent")
            }
            Reporter::Http { url } => {
                debug!(%url, success = report.success, "posting completion report");
                let posted = reqwest::Client::new().post(url).json(report).send().await;
                match posted {
                    Ok(response) if response.status().is_success() => {}
                    Ok(response) => {
                        warn!(%url, status = %response.status(), "completion report rejected")
                    }
                    Err(e) => warn!(%url, error = %e, "completion report not delivered"),
                }
            }
        }
    }
}
