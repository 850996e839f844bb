//! WorkIron Core - shared configuration for all WorkIron crates.
//!
//! - **config**: State directory layout and `.env.local` loading
//! - **settings**: Provider and polling settings resolved from the environment

pub mod config;
pub mod settings;

pub use config::{config_dir, ensure_all_dirs, env_file, load_env_files, state_dir, store_dir};
pub use settings::{ConfigError, Settings, DEFAULT_BASE_URL, DEFAULT_MODEL};
