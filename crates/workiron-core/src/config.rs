//! Shared configuration paths for WorkIron.
//!
//! Locates the state directory and the files every WorkIron interface reads.
//!
//! # Storage Structure
//!
//! All application data is stored under `~/.workiron/`:
//!
//! ```text
//! ~/.workiron/
//! ├── config/       # .env.local with API keys
//! └── store/        # Durable key/value slots (agents, preferences)
//! ```
//!
//! # Environment Variables
//!
//! - `WORKIRON_STATE_DIR`: Override the base state directory
//! - `WORKIRON_CONFIG_DIR`: Override the config directory
//! - `WORKIRON_STORE_DIR`: Override the key/value store directory

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing::debug;

/// Environment variable for custom state directory.
pub const STATE_DIR_ENV: &str = "WORKIRON_STATE_DIR";

/// Environment variable for custom config directory.
pub const CONFIG_DIR_ENV: &str = "WORKIRON_CONFIG_DIR";

/// Environment variable for custom store directory.
pub const STORE_DIR_ENV: &str = "WORKIRON_STORE_DIR";

/// Default state directory name under home.
const DEFAULT_STATE_DIR: &str = ".workiron";

const CONFIG_SUBDIR: &str = "config";
const STORE_SUBDIR: &str = "store";

static STATE_DIR_CACHE: OnceLock<PathBuf> = OnceLock::new();

/// Get the WorkIron state directory.
///
/// The state directory is determined by:
/// 1. `WORKIRON_STATE_DIR` environment variable if set
/// 2. `~/.workiron` if home directory is available
/// 3. `.workiron` in current directory as fallback
pub fn state_dir() -> PathBuf {
    STATE_DIR_CACHE
        .get_or_init(|| {
            std::env::var(STATE_DIR_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    dirs::home_dir()
                        .map(|h| h.join(DEFAULT_STATE_DIR))
                        .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR))
                })
        })
        .clone()
}

/// Get the user config directory.
///
/// Defaults to `~/.workiron/config/` or `WORKIRON_CONFIG_DIR` env var.
pub fn config_dir() -> PathBuf {
    std::env::var(CONFIG_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| state_dir().join(CONFIG_SUBDIR))
}

/// Get the key/value store directory.
///
/// Defaults to `~/.workiron/store/` or `WORKIRON_STORE_DIR` env var.
pub fn store_dir() -> PathBuf {
    std::env::var(STORE_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| state_dir().join(STORE_SUBDIR))
}

/// Get the .env.local file path.
///
/// Environment file for secrets (API keys).
pub fn env_file() -> PathBuf {
    config_dir().join(".env.local")
}

/// Ensure the config and store directories exist.
///
/// # Errors
/// Returns an error if any directory cannot be created.
pub fn ensure_all_dirs() -> std::io::Result<()> {
    create_dirs(&[config_dir(), store_dir()])
}

fn create_dirs<P: AsRef<Path>>(dirs: &[P]) -> std::io::Result<()> {
    for dir in dirs {
        std::fs::create_dir_all(dir)?;
        debug!(path = %dir.as_ref().display(), "ensured directory");
    }
    Ok(())
}

/// Load `.env.local` from the working directory, then from the config directory.
///
/// Variables already present in the environment are never overwritten, so the
/// working-directory file wins over the config-directory one.
pub fn load_env_files() {
    if dotenvy::from_filename(".env.local").is_ok() {
        debug!("loaded .env.local from working directory");
    }

    let env_path = env_file();
    if env_path.exists() && dotenvy::from_path(&env_path).is_ok() {
        debug!(path = %env_path.display(), "loaded .env.local from config directory");
    }
}
