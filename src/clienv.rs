//! Environment variable access for the CLI and daemon.

use std::path::PathBuf;

const FALLBACK_CONFIG_DIR: &str = "~/.config";
const FALLBACK_DATA_DIR: &str = "/var/lib";
const CASK_SUBDIR: &str = "cask";
const DEFAULT_RUNTIME: &str = "docker";

pub const ENV_CONFIG_DIR: &str = "CASK_CONFIG_DIR";
pub const ENV_DATA_DIR: &str = "CASK_DATA_DIR";
pub const ENV_RUNTIME: &str = "CASK_RUNTIME";
pub const ENV_LOG: &str = "CASK_LOG";

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Config directory ($CASK_CONFIG_DIR or ~/.config/cask)
pub fn config_dir() -> PathBuf {
    let dir = env_opt(ENV_CONFIG_DIR).map(PathBuf::from).unwrap_or_else(|| {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(FALLBACK_CONFIG_DIR))
            .join(CASK_SUBDIR)
    });
    tracing::trace!(dir = %dir.display(), "Resolved config directory");
    dir
}

/// Data directory ($CASK_DATA_DIR or ~/.local/share/cask)
pub fn data_dir() -> PathBuf {
    let dir = env_opt(ENV_DATA_DIR).map(PathBuf::from).unwrap_or_else(|| {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from(FALLBACK_DATA_DIR))
            .join(CASK_SUBDIR)
    });
    tracing::trace!(dir = %dir.display(), "Resolved data directory");
    dir
}

/// Where per-unit environment files live.
pub fn env_dir() -> PathBuf {
    data_dir().join("env")
}

/// Container runtime binary ($CASK_RUNTIME, default `docker`)
pub fn runtime_bin() -> String {
    let bin = env_opt(ENV_RUNTIME).unwrap_or_else(|| DEFAULT_RUNTIME.to_string());
    tracing::trace!(runtime = %bin, "Resolved container runtime");
    bin
}

/// Log filter ($CASK_LOG, default `info`)
pub fn log_filter() -> String {
    env_opt(ENV_LOG).unwrap_or_else(|| "info".to_string())
}
