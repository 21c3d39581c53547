use clap::Parser;
use tracing_subscriber::EnvFilter;

use cask::args::{Cli, Commands};
use cask::{clienv, cmd_completions, cmd_daemon, cmd_env, cmd_install, cmd_lifecycle};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Logs go to stderr; stdout belongs to job output.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(clienv::log_filter()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let notify_url = cli.notify_url;

    match cli.command {
        Commands::Install {
            image,
            args,
            ports,
            start,
        } => cmd_install::cmd_install(image, args, ports, start, notify_url).await?,
        Commands::Start { targets } => cmd_lifecycle::cmd_start(targets, notify_url).await?,
        Commands::Stop { targets } => cmd_lifecycle::cmd_stop(targets, notify_url).await?,
        Commands::Status { targets } => cmd_lifecycle::cmd_status(targets, notify_url).await?,
        Commands::Env { targets } => cmd_env::cmd_env(targets, notify_url).await?,
        Commands::SetEnv { args, reset } => {
            cmd_env::cmd_set_env(args, reset, notify_url).await?
        }
        Commands::Daemon { listen_address } => cmd_daemon::cmd_daemon(listen_address).await?,
        Commands::Completions { shell } => cmd_completions::cmd_completions(shell),
    }

    Ok(())
}
