//! Fan-out execution of container lifecycle jobs across local and remote
//! daemons: validated locators, a two-lane bounded dispatcher with duplicate
//! suppression, and an HTTP wire protocol tying them together.

pub mod args;
pub mod backend;
pub mod clienv;
pub mod cmd_common;
pub mod cmd_completions;
pub mod cmd_daemon;
pub mod cmd_env;
pub mod cmd_install;
pub mod cmd_lifecycle;
pub mod config;
pub mod daemon;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod identifier;
pub mod jobs;
pub mod locator;
pub mod report;
pub mod transport;
