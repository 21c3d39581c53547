//! Daemon side: the HTTP API in front of a dispatcher.

pub mod server;

pub use server::{serve, DaemonConfig};
