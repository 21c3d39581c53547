use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::backend::{ContainerBackend, SystemBackend};
use crate::config::DaemonSettings;
use crate::daemon::{serve, DaemonConfig};
use crate::dispatcher::Dispatcher;

/// `cask daemon [-A <addr>]`
///
/// Runs the HTTP job API in the foreground. Address precedence: flag, then
/// config.toml, then the default listen address.
pub async fn cmd_daemon(listen_address: Option<String>) -> Result<()> {
    let settings = DaemonSettings::load()?;
    let listen: SocketAddr = match listen_address.or_else(|| settings.listen_address.clone()) {
        Some(addr) => addr
            .parse()
            .with_context(|| format!("'{}' is not a valid listen address", addr))?,
        None => DaemonConfig::default().listen,
    };

    let backend: Arc<dyn ContainerBackend> = Arc::new(SystemBackend::from_env());
    backend.ready().await?;

    let dispatcher = Dispatcher::new(settings.dispatcher_config(), backend);
    info!(%listen, "starting cask daemon");
    serve(DaemonConfig { listen }, dispatcher).await
}
