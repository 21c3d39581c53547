use clap::CommandFactory;
use clap_complete::{generate, Shell};

use crate::args::Cli;

/// `cask completions <shell>`
pub fn cmd_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "cask", &mut std::io::stdout());
}
