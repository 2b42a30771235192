//! FODMAP Core — shared types, identity hashing, configuration, errors.

pub mod config;
pub mod error;
pub mod hash;
pub mod types;

pub use config::{AppConfig, DataPaths};
pub use error::{Error, Result};
pub use hash::product_identity_hash;
pub use types::*;

/// Current Unix time in milliseconds.
pub fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as i64
}
