use clap::{Parser, Subcommand};
use clap_complete::Shell;

#[derive(Parser)]
#[command(name = "cask")]
#[command(version)]
#[command(about = "Install and drive container units on local and remote daemons", long_about = None)]
pub struct Cli {
    /// POST a {payload, success} completion report to this URL when done
    #[arg(long, global = true)]
    pub notify_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Install an image as a managed unit on each target
    Install {
        /// Image to install (e.g. busybox)
        image: String,

        /// Targets (id or host[:port]/id) mixed with KEY=value environment entries
        #[arg(trailing_var_arg = true, required = true)]
        args: Vec<String>,

        /// Port bindings, comma separated <internal>=<external> pairs
        #[arg(short, long)]
        ports: Option<String>,

        /// Start the unit once installed
        #[arg(long)]
        start: bool,
    },

    /// Start each target's unit
    Start {
        /// Targets (id or host[:port]/id)
        #[arg(required = true)]
        targets: Vec<String>,
    },

    /// Stop each target's unit
    Stop {
        /// Targets (id or host[:port]/id)
        #[arg(required = true)]
        targets: Vec<String>,
    },

    /// Report the state of each target's unit
    Status {
        /// Targets (id or host[:port]/id)
        #[arg(required = true)]
        targets: Vec<String>,
    },

    /// Show each target's environment
    Env {
        /// Targets (id or host[:port]/id)
        #[arg(required = true)]
        targets: Vec<String>,
    },

    /// Set environment entries on each target
    SetEnv {
        /// Targets (id or host[:port]/id) mixed with KEY=value entries
        #[arg(trailing_var_arg = true, required = true)]
        args: Vec<String>,

        /// Replace the whole environment instead of merging into it
        #[arg(long)]
        reset: bool,
    },

    /// Run the job daemon in the foreground
    Daemon {
        /// Address to listen on (default 0.0.0.0:2223)
        #[arg(short = 'A', long)]
        listen_address: Option<String>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate for
        shell: Shell,
    },
}
