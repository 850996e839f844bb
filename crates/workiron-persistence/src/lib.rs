//! Persistence layer for WorkIron.
//!
//! Provides the durable key/value capability the session is built on, with
//! crash-safe file writes (temp file, then rename) and a backup-slot
//! discipline for state that must survive corruption.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use workiron_persistence::{FileStore, SessionStateStore};
//!
//! let state = SessionStateStore::new(Arc::new(FileStore::new("/home/user/.workiron/store")));
//! state.save_flag("showAllResponses", true).unwrap();
//! assert!(state.load_flag("showAllResponses", false));
//! ```

pub mod atomic;
pub mod error;
pub mod session_state;
pub mod store;

pub use error::{PersistenceError, Result};
pub use session_state::{LoadSource, Recovered, SessionStateStore, BACKUP_SUFFIX};
pub use store::{FileStore, KeyValueStore, MemoryStore};
