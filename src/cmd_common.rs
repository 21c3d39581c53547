//! Shared plumbing for the fan-out commands.

use std::sync::Arc;

use anyhow::{bail, Result};

use crate::backend::{ContainerBackend, SystemBackend};
use crate::dispatcher::{Dispatcher, DispatcherConfig};
use crate::executor::{Executor, Gathered, LocalDispatch};
use crate::jobs::{EnvVar, Job};
use crate::locator::Locator;
use crate::report::{CompletionReport, Reporter};

/// Separator between per-target sections in gathered output.
pub const SECTION_SEPARATOR: &str = "-------------";

/// Parse every target argument, reporting all malformed ones at once.
pub fn parse_locators(args: &[String]) -> Result<Vec<Locator>> {
    match Locator::parse_all(args) {
        Ok(locators) => Ok(locators),
        Err(errors) => {
            let rendered = errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("\n");
            bail!(rendered)
        }
    }
}

/// Split trailing arguments into targets and `KEY=value` environment
/// entries; anything containing `=` is an environment entry.
pub fn split_env_args(args: &[String]) -> Result<(Vec<String>, Vec<EnvVar>)> {
    let mut targets = Vec::new();
    let mut env = Vec::new();
    for arg in args {
        if arg.contains('=') {
            env.push(arg.parse::<EnvVar>()?);
        } else {
            targets.push(arg.clone());
        }
    }
    if targets.is_empty() {
        bail!("at least one target is required");
    }
    Ok((targets, env))
}

/// In-process dispatch context for local targets: a dispatcher over the
/// system backend, workers already running.
pub fn local_dispatch() -> LocalDispatch {
    let backend: Arc<dyn ContainerBackend> = Arc::new(SystemBackend::from_env());
    let dispatcher = Dispatcher::new(DispatcherConfig::default(), Arc::clone(&backend));
    dispatcher.start();
    LocalDispatch {
        dispatcher,
        init: backend,
    }
}

/// Build an executor over `locators` and stream results to stdout, then
/// report and exit; non-zero when any target failed.
pub async fn stream_and_exit<F: FnMut(&Locator) -> Job>(
    locators: Vec<Locator>,
    serial: F,
    notify_url: Option<String>,
) -> Result<()> {
    let executor = Executor::new(locators, serial)?.with_local(local_dispatch());
    executor
        .stream_and_exit(&Reporter::from_notify_url(notify_url))
        .await;
    Ok(())
}

/// Build an executor over `locators`, gather per-target output, print the
/// sections separated by [`SECTION_SEPARATOR`], report, and exit non-zero
/// when any target failed.
pub async fn gather_and_exit<F, R>(
    locators: Vec<Locator>,
    serial: F,
    notify_url: Option<String>,
    render: R,
) -> Result<()>
where
    F: FnMut(&Locator) -> Job,
    R: Fn(&[Locator], &Gathered) -> String,
{
    let targets = locators.clone();
    let executor = Executor::new(locators, serial)?.with_local(local_dispatch());
    let gathered = executor.gather().await?;

    let payload = render(&targets, &gathered);
    println!("{}", payload);
    for error in &gathered.errors {
        eprintln!("{}", error);
    }

    let success = gathered.errors.is_empty();
    Reporter::from_notify_url(notify_url)
        .deliver(&CompletionReport {
            payload,
            success,
        })
        .await;
    if !success {
        std::process::exit(1);
    }
    Ok(())
}

/// Render gathered outputs in target order, a failed target shown as such
/// in place so the section count always matches the target count.
pub fn render_sections(targets: &[Locator], gathered: &Gathered) -> String {
    targets
        .iter()
        .zip(&gathered.outputs)
        .map(|(locator, output)| match output {
            Some(text) => text.trim_end().to_string(),
            None => format!("{}: failed", locator),
        })
        .collect::<Vec<_>>()
        .join(&format!("\n{}\n", SECTION_SEPARATOR))
}

/// Render gathered outputs as one plain concatenation, no separators;
/// failed targets are skipped here and reported through the error list.
pub fn render_concat(_targets: &[Locator], gathered: &Gathered) -> String {
    gathered
        .outputs
        .iter()
        .flatten()
        .map(|output| output.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}
