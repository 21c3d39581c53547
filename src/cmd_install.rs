use anyhow::Result;

use crate::cmd_common::{parse_locators, split_env_args, stream_and_exit};
use crate::jobs::{parse_port_pairs, Job, RequestId};
use crate::locator::Locator;

/// `cask install <image> <targets...> [KEY=value...]`
///
/// Streams install progress per target in the order given; environment
/// entries in the trailing arguments apply to every target.
pub async fn cmd_install(
    image: String,
    args: Vec<String>,
    ports: Option<String>,
    start: bool,
    notify_url: Option<String>,
) -> Result<()> {
    let (targets, env) = split_env_args(&args)?;
    let ports = match ports {
        Some(list) => parse_port_pairs(&list)?,
        None => Vec::new(),
    };
    let locators = parse_locators(&targets)?;

    stream_and_exit(
        locators,
        |locator: &Locator| Job::Install {
            request_id: RequestId::new(),
            id: locator.id().clone(),
            image: image.clone(),
            ports: ports.clone(),
            env: env.clone(),
            started: start,
        },
        notify_url,
    )
    .await
}
