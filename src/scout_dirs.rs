//! Application directory paths for docscout.
//!
//! Uses the [`dirs`] crate for platform-appropriate resolution.
//!
//! # Environment Overrides
//!
//! - `DOCSCOUT_DATA_DIR` overrides [`data_dir`]
//! - `DOCSCOUT_CONFIG_DIR` overrides [`config_dir`]

use std::path::PathBuf;

/// Application data root (discovery database).
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("DOCSCOUT_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join("docscout"))
        .unwrap_or_else(|| PathBuf::from("/tmp/docscout-data"))
}

/// Application config directory.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("DOCSCOUT_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("docscout"))
        .unwrap_or_else(|| PathBuf::from("/tmp/docscout-config"))
}

/// Main config file path (`config_dir()/config.toml`).
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Discovery database path (`data_dir()/discovery.db`).
#[must_use]
pub fn discovery_db_file() -> PathBuf {
    data_dir().join("discovery.db")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_namespaced() {
        assert!(config_file().ends_with("config.toml"));
        assert!(discovery_db_file().ends_with("discovery.db"));
    }
}
