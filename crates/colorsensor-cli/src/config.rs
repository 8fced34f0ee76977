//! Configuration file management.
//!
//! The config file holds the device directory (the set of sensor names to
//! monitor) together with defaults for the watch command.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

/// Configuration file structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Registered sensor names
    #[serde(default)]
    pub sensors: BTreeSet<String>,

    /// Delay between starting consecutive sensors, in milliseconds
    #[serde(default)]
    pub stagger_ms: Option<u64>,

    /// Connect deadline in seconds
    #[serde(default)]
    pub timeout: Option<u64>,

    /// Disable colored output
    #[serde(default)]
    pub no_color: bool,
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("colorsensor")
            .join("config.toml")
    }

    /// Load config from `path`. A missing file yields the default config; an
    /// unreadable or malformed one is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    /// Save config to `path`
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }
}

/// The persisted set of sensor names.
///
/// Names are kept sorted and unique. Every change is written back to the
/// config file immediately.
///
/// A config file that exists but cannot be read or parsed opens as an empty,
/// read-only directory: listing works, while `add` and `remove` fail instead
/// of overwriting the file.
#[derive(Debug)]
pub struct Directory {
    path: PathBuf,
    config: Config,
    load_error: Option<String>,
}

impl Directory {
    /// Open the directory stored at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match Config::load(&path) {
            Ok(config) => Self {
                path,
                config,
                load_error: None,
            },
            Err(e) => {
                let message = format!("{:#}", e);
                eprintln!("Warning: {}", message);
                Self {
                    path,
                    config: Config::default(),
                    load_error: Some(message),
                }
            }
        }
    }

    /// Whether changes can be saved back to the config file.
    pub fn is_writable(&self) -> bool {
        self.load_error.is_none()
    }

    /// Location of the backing config file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Registered sensor names, sorted.
    pub fn list(&self) -> &BTreeSet<String> {
        &self.config.sensors
    }

    /// Register `name`. Returns whether the directory changed.
    pub fn add(&mut self, name: &str) -> Result<bool> {
        let name = validate_name(name)?;
        self.ensure_writable()?;
        if !self.config.sensors.insert(name.to_string()) {
            return Ok(false);
        }
        self.config.save(&self.path)?;
        Ok(true)
    }

    /// Unregister `name`. Returns whether the directory changed.
    pub fn remove(&mut self, name: &str) -> Result<bool> {
        self.ensure_writable()?;
        if !self.config.sensors.remove(name) {
            return Ok(false);
        }
        self.config.save(&self.path)?;
        Ok(true)
    }

    fn ensure_writable(&self) -> Result<()> {
        if let Some(error) = &self.load_error {
            bail!(
                "Refusing to modify {}: {}. Fix or remove the file first.",
                self.path.display(),
                error
            );
        }
        Ok(())
    }
}

/// Check that a sensor name can be matched against an advertisement.
///
/// Names are matched exactly, so surrounding whitespace is kept as-is; only
/// blank names are rejected.
pub fn validate_name(name: &str) -> Result<&str> {
    if name.trim().is_empty() {
        bail!("Sensor name must not be empty");
    }
    Ok(name)
}

/// Resolve the start stagger: explicit value overrides config, default zero.
pub fn resolve_stagger(stagger_ms: Option<u64>, config: &Config) -> Duration {
    Duration::from_millis(stagger_ms.or(config.stagger_ms).unwrap_or(0))
}

/// Resolve the connect deadline: explicit value overrides config. Zero means none.
pub fn resolve_timeout(timeout: Option<u64>, config: &Config) -> Option<Duration> {
    timeout
        .or(config.timeout)
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_directory() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        (dir, path)
    }

    #[test]
    fn test_default_path_ends_with_config_toml() {
        let path = Config::default_path();
        assert!(path.ends_with("colorsensor/config.toml"));
    }

    #[test]
    fn test_load_reports_malformed_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "sensors = 42").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse config"));
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let (_dir, path) = temp_directory();
        assert_eq!(Config::load(&path).unwrap(), Config::default());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let (_dir, path) = temp_directory();
        let config = Config {
            sensors: ["S2", "S1"].into_iter().map(String::from).collect(),
            stagger_ms: Some(250),
            timeout: Some(30),
            no_color: true,
        };
        config.save(&path).unwrap();

        assert_eq!(Config::load(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "sensors = [\"S1\"]\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.sensors.len(), 1);
        assert_eq!(config.stagger_ms, None);
        assert!(!config.no_color);
    }

    #[test]
    fn test_directory_add_and_remove_persist() {
        let (_dir, path) = temp_directory();
        let mut directory = Directory::open(&path);
        assert!(directory.list().is_empty());

        assert!(directory.add("S2").unwrap());
        assert!(directory.add("S1").unwrap());
        assert!(!directory.add("S1").unwrap());

        let reopened = Directory::open(&path);
        let names: Vec<_> = reopened.list().iter().map(String::as_str).collect();
        assert_eq!(names, ["S1", "S2"]);

        let mut directory = reopened;
        assert!(directory.remove("S1").unwrap());
        assert!(!directory.remove("S1").unwrap());
        assert!(!directory.remove("S3").unwrap());

        let names: Vec<_> = Directory::open(&path).list().iter().cloned().collect();
        assert_eq!(names, ["S2"]);
    }

    #[test]
    fn test_directory_rejects_blank_names() {
        let (_dir, path) = temp_directory();
        let mut directory = Directory::open(&path);

        assert!(directory.add("").is_err());
        assert!(directory.add("   ").is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_directory_unchanged_does_not_write() {
        let (_dir, path) = temp_directory();
        let mut directory = Directory::open(&path);

        assert!(!directory.remove("S1").unwrap());
        assert!(!path.exists());
    }

    #[test]
    fn test_malformed_file_is_never_overwritten() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        let original = "sensors = [\"Kitchen\", \"Desk\"]\nstagger_ms = \"oops\"\n";
        fs::write(&path, original).unwrap();

        let mut directory = Directory::open(&path);
        assert!(!directory.is_writable());
        assert!(directory.list().is_empty());

        let err = directory.add("Garage").unwrap_err();
        assert!(err.to_string().contains("Refusing to modify"));
        assert!(directory.remove("Kitchen").is_err());
        assert!(directory.list().is_empty());

        assert_eq!(fs::read_to_string(&path).unwrap(), original);
    }

    #[test]
    fn test_missing_file_is_writable() {
        let (_dir, path) = temp_directory();
        assert!(Directory::open(&path).is_writable());
    }

    #[test]
    fn test_names_are_case_sensitive() {
        let (_dir, path) = temp_directory();
        let mut directory = Directory::open(&path);

        assert!(directory.add("S1").unwrap());
        assert!(directory.add("s1").unwrap());
        assert_eq!(directory.list().len(), 2);
    }

    #[test]
    fn test_resolve_stagger() {
        let config = Config {
            stagger_ms: Some(100),
            ..Default::default()
        };
        assert_eq!(resolve_stagger(Some(5), &config), Duration::from_millis(5));
        assert_eq!(resolve_stagger(None, &config), Duration::from_millis(100));
        assert_eq!(resolve_stagger(None, &Config::default()), Duration::ZERO);
    }

    #[test]
    fn test_resolve_timeout() {
        let config = Config {
            timeout: Some(60),
            ..Default::default()
        };
        assert_eq!(
            resolve_timeout(Some(10), &config),
            Some(Duration::from_secs(10))
        );
        assert_eq!(resolve_timeout(None, &config), Some(Duration::from_secs(60)));
        assert_eq!(resolve_timeout(Some(0), &config), None);
        assert_eq!(resolve_timeout(None, &Config::default()), None);
    }
}
