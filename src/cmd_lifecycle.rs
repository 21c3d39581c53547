use anyhow::Result;

use crate::cmd_common::{gather_and_exit, parse_locators, render_sections, stream_and_exit};
use crate::jobs::{Job, RequestId};
use crate::locator::Locator;

/// `cask start <targets...>`
pub async fn cmd_start(targets: Vec<String>, notify_url: Option<String>) -> Result<()> {
    let locators = parse_locators(&targets)?;
    stream_and_exit(
        locators,
        |locator: &Locator| Job::Start {
            request_id: RequestId::new(),
            id: locator.id().clone(),
        },
        notify_url,
    )
    .await
}

/// `cask stop <targets...>`
pub async fn cmd_stop(targets: Vec<String>, notify_url: Option<String>) -> Result<()> {
    let locators = parse_locators(&targets)?;
    stream_and_exit(
        locators,
        |locator: &Locator| Job::Stop {
            request_id: RequestId::new(),
            id: locator.id().clone(),
        },
        notify_url,
    )
    .await
}

/// `cask status <targets...>`
///
/// Gathers every target's state and prints the sections separated so
/// multi-host output stays attributable.
pub async fn cmd_status(targets: Vec<String>, notify_url: Option<String>) -> Result<()> {
    let locators = parse_locators(&targets)?;
    gather_and_exit(
        locators,
        |locator: &Locator| Job::Status {
            request_id: RequestId::new(),
            id: locator.id().clone(),
        },
        notify_url,
        render_sections,
    )
    .await
}
