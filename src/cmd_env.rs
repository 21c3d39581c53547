use anyhow::Result;

use crate::cmd_common::{
    gather_and_exit, parse_locators, render_concat, split_env_args, stream_and_exit,
};
use crate::jobs::{ContentKind, Job, RequestId};
use crate::locator::Locator;

/// `cask env <targets...>` — fetch and print each target's environment.
pub async fn cmd_env(targets: Vec<String>, notify_url: Option<String>) -> Result<()> {
    let locators = parse_locators(&targets)?;
    gather_and_exit(
        locators,
        |locator: &Locator| Job::Content {
            request_id: RequestId::new(),
            id: locator.id().clone(),
            content: ContentKind::Environment,
        },
        notify_url,
        render_concat,
    )
    .await
}

/// `cask set-env <targets...> KEY=value... [--reset]`
///
/// Merges the entries into each target's environment; `--reset` replaces
/// the whole environment instead.
pub async fn cmd_set_env(
    args: Vec<String>,
    reset: bool,
    notify_url: Option<String>,
) -> Result<()> {
    let (targets, env) = split_env_args(&args)?;
    anyhow::ensure!(!env.is_empty(), "at least one KEY=value entry is required");
    let locators = parse_locators(&targets)?;

    stream_and_exit(
        locators,
        |locator: &Locator| {
            let request_id = RequestId::new();
            let id = locator.id().clone();
            if reset {
                Job::PutEnvironment {
                    request_id,
                    id,
                    env: env.clone(),
                }
            } else {
                Job::PatchEnvironment {
                    request_id,
                    id,
                    env: env.clone(),
                }
            }
        },
        notify_url,
    )
    .await
}
