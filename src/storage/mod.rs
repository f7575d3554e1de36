//! Storage Layer
//!
//! Key-value settings storage and the result history kept inside it.

pub mod database;
pub mod results;
pub mod settings;

pub use database::SqliteSettings;
pub use results::{ResultStore, StoreError};
pub use settings::{KeyValueStore, MemorySettings};

use anyhow::Result;
use std::path::PathBuf;

/// Settings key holding the serialized result history
pub const DEFAULT_HISTORY_KEY: &str = "adhesion_results";

fn project_dirs() -> Result<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "adhesiosense", "AdhesioSense")
        .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))
}

/// Get the application data directory
pub fn get_data_dir() -> Result<PathBuf> {
    let data_dir = project_dirs()?.data_dir().to_path_buf();
    std::fs::create_dir_all(&data_dir)?;

    Ok(data_dir)
}

/// Get the configuration directory
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = project_dirs()?.config_dir().to_path_buf();
    std::fs::create_dir_all(&config_dir)?;

    Ok(config_dir)
}
