//! Application paths management.

use directories::{BaseDirs, ProjectDirs};
use std::path::{Path, PathBuf};

/// Manages all application paths following platform conventions.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
    pub config_file: PathBuf,
    pub database_file: PathBuf,
    pub blob_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl AppPaths {
    /// Create paths using platform-specific directories.
    pub fn new() -> Option<Self> {
        let proj_dirs = ProjectDirs::from("com", "docent", "docent")?;

        Some(Self::from_dirs(
            proj_dirs.config_dir().to_path_buf(),
            proj_dirs.data_dir().to_path_buf(),
        ))
    }

    /// Keep the platform config location but store data under `data_dir`.
    pub fn with_data_dir(self, data_dir: impl AsRef<Path>) -> Self {
        Self::from_dirs(self.config_dir, data_dir.as_ref().to_path_buf())
    }

    fn from_dirs(config_dir: PathBuf, data_dir: PathBuf) -> Self {
        Self {
            config_file: config_dir.join("config.toml"),
            database_file: data_dir.join("docent.db"),
            blob_dir: data_dir.join("blobs"),
            log_dir: data_dir.join("logs"),
            config_dir,
            data_dir,
        }
    }

    /// Create all necessary directories.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.config_dir)?;
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(&self.blob_dir)?;
        std::fs::create_dir_all(&self.log_dir)?;
        Ok(())
    }

    /// Check if docent has been initialized.
    pub fn is_initialized(&self) -> bool {
        self.config_file.exists() && self.database_file.exists()
    }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    let rest = match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest.trim_start_matches('/'),
        _ => return PathBuf::from(path),
    };

    match BaseDirs::new() {
        Some(dirs) if rest.is_empty() => dirs.home_dir().to_path_buf(),
        Some(dirs) => dirs.home_dir().join(rest),
        None => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_paths_creation() {
        let paths = AppPaths::new();
        assert!(paths.is_some());

        let paths = paths.unwrap();
        assert!(paths.config_file.to_string_lossy().contains("config.toml"));
        assert!(paths.database_file.to_string_lossy().contains("docent.db"));
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("/var/docent"), PathBuf::from("/var/docent"));
        assert_eq!(expand_home("~user/x"), PathBuf::from("~user/x"));

        if let Some(dirs) = BaseDirs::new() {
            assert_eq!(expand_home("~/docent"), dirs.home_dir().join("docent"));
            assert_eq!(expand_home("~"), dirs.home_dir().to_path_buf());
        }
    }

    #[test]
    fn test_data_dir_override() {
        let dir = tempfile::tempdir().unwrap();
        let paths = AppPaths::from_dirs(dir.path().join("config"), dir.path().join("default"))
            .with_data_dir(dir.path().join("data"));

        assert_eq!(paths.config_file, dir.path().join("config").join("config.toml"));
        assert_eq!(paths.database_file, dir.path().join("data").join("docent.db"));
        assert_eq!(paths.blob_dir, dir.path().join("data").join("blobs"));

        paths.ensure_dirs().unwrap();
        assert!(paths.blob_dir.is_dir());
        assert!(!paths.is_initialized());
    }
}
