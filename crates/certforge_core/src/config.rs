use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Default upload size ceiling (16 MB).
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 16 * 1024 * 1024;

// ---------------------------------------------------------------------------
// ForgeConfig
// ---------------------------------------------------------------------------

/// Application configuration stored at `~/.certforge/config.json`.
///
/// Working directories default to folders under the system temp dir so a
/// fresh install works without any setup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ForgeConfig {
    // Working directories
    pub upload_dir: PathBuf,
    pub preview_dir: PathBuf,
    pub output_dir: PathBuf,

    // Limits
    pub max_upload_bytes: u64,

    // Rendering
    /// Run mapped values of date-like placeholders through the date normalizer.
    pub normalize_mapped_dates: bool,

    // General
    pub log_level: String,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        let tmp = std::env::temp_dir();
        Self {
            upload_dir: tmp.join("certificate_uploads"),
            preview_dir: tmp.join("certificate_previews"),
            output_dir: tmp.join("generated_certificates"),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            normalize_mapped_dates: false,
            log_level: "info".into(),
        }
    }
}

impl ForgeConfig {
    /// Returns the base config directory: `~/.certforge/`
    pub fn base_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".certforge"))
    }

    /// Returns the config file path: `~/.certforge/config.json`
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::base_dir()?.join("config.json"))
    }

    /// Returns the logs directory: `~/.certforge/logs/`
    pub fn logs_dir() -> Result<PathBuf> {
        Ok(Self::base_dir()?.join("logs"))
    }

    /// Ensures the working directories named by this config exist.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.upload_dir, &self.preview_dir, &self.output_dir] {
            if !dir.exists() {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
            }
        }
        Ok(())
    }

    /// Relative paths missing from the working directory are looked up in
    /// `upload_dir`. Anything else is returned unchanged.
    pub fn resolve_upload(&self, path: &Path) -> PathBuf {
        if path.is_absolute() || path.exists() {
            return path.to_path_buf();
        }
        let staged = self.upload_dir.join(path);
        if staged.exists() {
            staged
        } else {
            path.to_path_buf()
        }
    }

    /// Loads config from disk, or creates default if missing.
    pub fn load() -> Result<Self> {
        let base = Self::base_dir()?;
        std::fs::create_dir_all(&base)
            .with_context(|| format!("Failed to create directory: {}", base.display()))?;
        Self::load_from_path(&Self::config_path()?)
    }

    /// Load config from a specific file path.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            let config: Self = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config: {}", path.display()))?;
            info!("Loaded config from {}", path.display());
            Ok(config)
        } else {
            let config = Self::default();
            config.save_to_path(path)?;
            info!("Created default config at {}", path.display());
            Ok(config)
        }
    }

    /// Save config to a specific file path.
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_dirs_live_under_temp() {
        let config = ForgeConfig::default();
        let tmp = std::env::temp_dir();
        assert_eq!(config.upload_dir, tmp.join("certificate_uploads"));
        assert_eq!(config.preview_dir, tmp.join("certificate_previews"));
        assert_eq!(config.output_dir, tmp.join("generated_certificates"));
        assert_eq!(config.max_upload_bytes, 16 * 1024 * 1024);
        assert!(!config.normalize_mapped_dates);
    }

    #[test]
    fn test_load_creates_default_when_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("config.json");

        let config = ForgeConfig::load_from_path(&path).unwrap();
        assert_eq!(config, ForgeConfig::default());
        assert!(path.exists());
    }

    #[test]
    fn test_save_and_reload() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");

        let config = ForgeConfig {
            output_dir: tmp.path().join("out"),
            normalize_mapped_dates: true,
            log_level: "debug".into(),
            ..ForgeConfig::default()
        };
        config.save_to_path(&path).unwrap();

        let loaded = ForgeConfig::load_from_path(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, r#"{ "log_level": "warn" }"#).unwrap();

        let loaded = ForgeConfig::load_from_path(&path).unwrap();
        assert_eq!(loaded.log_level, "warn");
        assert_eq!(loaded.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
    }

    #[test]
    fn test_malformed_config_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = ForgeConfig::load_from_path(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
    }

    #[test]
    fn test_ensure_dirs_creates_working_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let config = ForgeConfig {
            upload_dir: tmp.path().join("up"),
            preview_dir: tmp.path().join("preview"),
            output_dir: tmp.path().join("out"),
            ..ForgeConfig::default()
        };
        config.ensure_dirs().unwrap();
        assert!(config.upload_dir.is_dir());
        assert!(config.preview_dir.is_dir());
        assert!(config.output_dir.is_dir());
    }

    #[test]
    fn test_resolve_upload_falls_back_to_upload_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let config = ForgeConfig {
            upload_dir: tmp.path().to_path_buf(),
            ..ForgeConfig::default()
        };
        std::fs::write(tmp.path().join("certforge_staged_roster.xlsx"), b"x").unwrap();

        let staged = Path::new("certforge_staged_roster.xlsx");
        assert_eq!(config.resolve_upload(staged), tmp.path().join(staged));

        let missing = Path::new("certforge_no_such_file.xlsx");
        assert_eq!(config.resolve_upload(missing), missing);

        let absolute = tmp.path().join("elsewhere.xlsx");
        assert_eq!(config.resolve_upload(&absolute), absolute);
    }
}
