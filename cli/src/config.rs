use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::PathBuf;

/// Overrides the database location.
pub const DB_ENV: &str = "HEFT_DB";
/// Default log filter when `RUST_LOG` is unset.
pub const LOG_ENV: &str = "HEFT_LOG";

const DEFAULT_LOG_FILTER: &str = "warn";

pub struct Config {
    pub db_path: PathBuf,
    pub log_filter: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::from_overrides(
            std::env::var_os(DB_ENV).map(PathBuf::from),
            std::env::var(LOG_ENV).ok(),
        )
    }

    fn from_overrides(db_path: Option<PathBuf>, log_filter: Option<String>) -> Result<Self> {
        let db_path = match db_path {
            Some(path) => path,
            None => default_db_path()?,
        };
        if let Some(dir) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create data directory: {}", dir.display()))?;
        }

        let log_filter = log_filter
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        Ok(Config {
            db_path,
            log_filter,
        })
    }
}

fn default_db_path() -> Result<PathBuf> {
    let proj_dirs =
        ProjectDirs::from("", "", "heft").context("Could not determine home directory")?;
    Ok(proj_dirs.data_dir().join("heft.db"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_override_creates_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("heft.db");

        let config = Config::from_overrides(Some(path.clone()), None).unwrap();
        assert_eq!(config.db_path, path);
        assert!(dir.path().join("nested").is_dir());
    }

    #[test]
    fn test_log_filter_default_and_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("heft.db");

        let config = Config::from_overrides(Some(path.clone()), None).unwrap();
        assert_eq!(config.log_filter, "warn");

        let config = Config::from_overrides(Some(path.clone()), Some("  ".to_string())).unwrap();
        assert_eq!(config.log_filter, "warn");

        let config = Config::from_overrides(Some(path), Some("heft_core=debug".to_string())).unwrap();
        assert_eq!(config.log_filter, "heft_core=debug");
    }
}
