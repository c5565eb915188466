//! Default paths for playtimed components
//!
//! Paths are user-writable by default (no root required):
//! - Socket: `$XDG_RUNTIME_DIR/playtimed/playtimed.sock` or `/tmp/playtimed-$USER/playtimed.sock`
//! - Data: `$XDG_DATA_HOME/playtimed` or `~/.local/share/playtimed`
//! - Config: `$XDG_CONFIG_HOME/playtimed/config.toml` or `~/.config/playtimed/config.toml`

use std::path::PathBuf;

/// Environment variable for overriding the socket path
pub const PLAYTIME_SOCKET_ENV: &str = "PLAYTIME_SOCKET";

/// Environment variable for overriding the data directory
pub const PLAYTIME_DATA_DIR_ENV: &str = "PLAYTIME_DATA_DIR";

const SOCKET_FILENAME: &str = "playtimed.sock";
const CONFIG_FILENAME: &str = "config.toml";
const DATABASE_FILENAME: &str = "playtime.db";

const APP_DIR: &str = "playtimed";

/// Get the default socket path.
///
/// Order of precedence:
/// 1. `$PLAYTIME_SOCKET` environment variable (if set)
/// 2. `$XDG_RUNTIME_DIR/playtimed/playtimed.sock` (if XDG_RUNTIME_DIR is set)
/// 3. `/tmp/playtimed-$USER/playtimed.sock` (fallback)
pub fn default_socket_path() -> PathBuf {
    if let Ok(path) = std::env::var(PLAYTIME_SOCKET_ENV) {
        return PathBuf::from(path);
    }

    socket_path_without_env()
}

/// Socket path ignoring `$PLAYTIME_SOCKET`, used as the config default.
pub fn socket_path_without_env() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime_dir).join(APP_DIR).join(SOCKET_FILENAME);
    }

    let username = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    PathBuf::from(format!("/tmp/{}-{}", APP_DIR, username)).join(SOCKET_FILENAME)
}

/// Data directory used as the config default. `$PLAYTIME_DATA_DIR` is
/// applied by the daemon's argument parser, not here.
pub fn data_dir_without_env() -> PathBuf {
    if let Ok(data_home) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(data_home).join(APP_DIR);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".local")
            .join("share")
            .join(APP_DIR);
    }

    PathBuf::from("/tmp").join(APP_DIR).join("data")
}

/// Location of the budget database inside a data directory
pub fn database_path(data_dir: &std::path::Path) -> PathBuf {
    data_dir.join(DATABASE_FILENAME)
}

/// Get the default config file path.
///
/// 1. `$XDG_CONFIG_HOME/playtimed/config.toml` (if XDG_CONFIG_HOME is set)
/// 2. `~/.config/playtimed/config.toml` (fallback)
pub fn default_config_path() -> PathBuf {
    if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(config_home).join(APP_DIR).join(CONFIG_FILENAME);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join(CONFIG_FILENAME);
    }

    PathBuf::from("/etc").join(APP_DIR).join(CONFIG_FILENAME)
}
