//! Configuration module for SyncWatch.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{MatchPolicy, NoiseFilter};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for SyncWatch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub monitor: MonitorConfig,
    pub search: SearchConfig,
    pub logging: LoggingConfig,
}

/// Change and progress monitoring settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Minimum milliseconds between two progress samples for the same file
    /// in a cloud directory monitor.
    pub progress_interval_ms: u64,
    /// Progress jump (fraction of 1.0) that bypasses the time gate.
    pub significant_delta: f64,
    /// How progress subscribers are matched to search results.
    pub match_policy: MatchPolicy,
    /// File names that are never reported.
    pub noise_files: NoiseFilter,
    /// Log per-item read failures at `warn` instead of `debug`.
    pub verbose: bool,
}

/// Settings for the extended-attribute polling search.
///
/// The default attribute names are the ones published by LNXDrive
/// Files-on-Demand mounts. Point them at another namespace to watch a
/// different FUSE client using the same state vocabulary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Milliseconds between two scans of the searched subtree.
    pub poll_interval_ms: u64,
    /// Extended attribute carrying the hydration state.
    pub state_xattr: String,
    /// Extended attribute carrying the download percentage.
    pub progress_xattr: String,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/syncwatch/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("syncwatch")
            .join("config.yaml")
    }
}

impl MonitorConfig {
    /// `progress_interval_ms` as a [`Duration`].
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

impl SearchConfig {
    /// `poll_interval_ms` as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            progress_interval_ms: 500,
            significant_delta: 0.05,
            match_policy: MatchPolicy::FullPath,
            noise_files: NoiseFilter::default(),
            verbose: false,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            state_xattr: "user.lnxdrive.state".to_string(),
            progress_xattr: "user.lnxdrive.progress".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"search.poll_interval_ms"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- monitor ---
        let delta = self.monitor.significant_delta;
        if !(delta > 0.0 && delta <= 1.0) {
            errors.push(ValidationError {
                field: "monitor.significant_delta".into(),
                message: format!("must be in (0, 1], got {delta}"),
            });
        }
        if self
            .monitor
            .noise_files
            .names()
            .iter()
            .any(|n| n.is_empty() || n.contains('/'))
        {
            errors.push(ValidationError {
                field: "monitor.noise_files".into(),
                message: "entries must be non-empty file names without '/'".into(),
            });
        }

        // --- search ---
        if self.search.poll_interval_ms == 0 {
            errors.push(ValidationError {
                field: "search.poll_interval_ms".into(),
                message: "must be greater than 0".into(),
            });
        }
        for (field, name) in [
            ("search.state_xattr", &self.search.state_xattr),
            ("search.progress_xattr", &self.search.progress_xattr),
        ] {
            if !name.starts_with("user.") {
                errors.push(ValidationError {
                    field: field.into(),
                    message: format!("must be in the user namespace, got '{name}'"),
                });
            }
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; expected one of: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for programmatic construction of a [`Config`].
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- monitor ---

    pub fn monitor_progress_interval_ms(mut self, ms: u64) -> Self {
        self.config.monitor.progress_interval_ms = ms;
        self
    }

    pub fn monitor_significant_delta(mut self, delta: f64) -> Self {
        self.config.monitor.significant_delta = delta;
        self
    }

    pub fn monitor_match_policy(mut self, policy: MatchPolicy) -> Self {
        self.config.monitor.match_policy = policy;
        self
    }

    pub fn monitor_noise_files(mut self, noise: NoiseFilter) -> Self {
        self.config.monitor.noise_files = noise;
        self
    }

    pub fn monitor_verbose(mut self, verbose: bool) -> Self {
        self.config.monitor.verbose = verbose;
        self
    }

    // --- search ---

    pub fn search_poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.search.poll_interval_ms = ms;
        self
    }

    pub fn search_state_xattr(mut self, name: impl Into<String>) -> Self {
        self.config.search.state_xattr = name.into();
        self
    }

    pub fn search_progress_xattr(mut self, name: impl Into<String>) -> Self {
        self.config.search.progress_xattr = name.into();
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    // -- Defaults --

    #[test]
    fn default_config_has_sensible_values() {
        let cfg = Config::default();
        assert_eq!(cfg.monitor.progress_interval_ms, 500);
        assert_eq!(cfg.monitor.progress_interval(), Duration::from_millis(500));
        assert!((cfg.monitor.significant_delta - 0.05).abs() < f64::EPSILON);
        assert_eq!(cfg.monitor.match_policy, MatchPolicy::FullPath);
        assert!(cfg
            .monitor
            .noise_files
            .is_noise(Path::new("/x/.DS_Store")));
        assert!(!cfg.monitor.verbose);
        assert_eq!(cfg.search.poll_interval_ms, 1000);
        assert_eq!(cfg.search.state_xattr, "user.lnxdrive.state");
        assert_eq!(cfg.search.progress_xattr, "user.lnxdrive.progress");
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn default_config_passes_validation() {
        let errors = Config::default().validate();
        assert!(errors.is_empty(), "unexpected validation errors: {errors:?}");
    }

    // -- Loading --

    #[test]
    fn load_from_yaml_file() {
        let yaml = r#"
monitor:
  progress_interval_ms: 250
  significant_delta: 0.1
  match_policy: file_name
  noise_files: [".DS_Store", "~lock"]
  verbose: true
search:
  poll_interval_ms: 300
logging:
  level: debug
"#;
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        tmp.write_all(yaml.as_bytes()).unwrap();
        tmp.flush().unwrap();

        let cfg = Config::load(tmp.path()).expect("load config");
        assert_eq!(cfg.monitor.progress_interval_ms, 250);
        assert!((cfg.monitor.significant_delta - 0.1).abs() < f64::EPSILON);
        assert_eq!(cfg.monitor.match_policy, MatchPolicy::FileName);
        assert!(cfg.monitor.noise_files.is_noise(Path::new("/x/~lock")));
        assert!(cfg.monitor.verbose);
        assert_eq!(cfg.search.poll_interval_ms, 300);
        // Omitted fields keep their defaults
        assert_eq!(cfg.search.state_xattr, "user.lnxdrive.state");
        assert_eq!(cfg.logging.level, "debug");
    }

    #[test]
    fn load_partial_yaml_fills_defaults() {
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        tmp.write_all(b"logging:\n  level: warn\n").unwrap();
        tmp.flush().unwrap();

        let cfg = Config::load(tmp.path()).expect("load config");
        assert_eq!(cfg.logging.level, "warn");
        assert_eq!(cfg.monitor.progress_interval_ms, 500);
    }

    #[test]
    fn load_or_default_returns_default_on_missing_file() {
        let cfg = Config::load_or_default(Path::new("/nonexistent/config.yaml"));
        assert_eq!(cfg.search.poll_interval_ms, 1000);
    }

    #[test]
    fn load_returns_error_on_invalid_yaml() {
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        tmp.write_all(b"not: [valid: yaml: {{{").unwrap();
        tmp.flush().unwrap();

        let result = Config::load(tmp.path());
        assert!(result.is_err());
    }

    // -- Validation --

    #[test]
    fn validate_catches_bad_significant_delta() {
        for delta in [0.0, -0.1, 1.5, f64::NAN] {
            let mut cfg = Config::default();
            cfg.monitor.significant_delta = delta;
            let errors = cfg.validate();
            assert!(
                errors.iter().any(|e| e.field == "monitor.significant_delta"),
                "delta {delta} should be rejected"
            );
        }
    }

    #[test]
    fn validate_catches_bad_noise_entries() {
        let mut cfg = Config::default();
        cfg.monitor.noise_files = NoiseFilter::new(["", "a/b"]);
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "monitor.noise_files"));
    }

    #[test]
    fn validate_catches_zero_poll_interval() {
        let mut cfg = Config::default();
        cfg.search.poll_interval_ms = 0;
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "search.poll_interval_ms"));
    }

    #[test]
    fn validate_catches_non_user_xattr() {
        let mut cfg = Config::default();
        cfg.search.state_xattr = "trusted.state".into();
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "search.state_xattr"));
    }

    #[test]
    fn validate_catches_invalid_log_level() {
        let mut cfg = Config::default();
        cfg.logging.level = "verbose".into();
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "logging.level"));
    }

    #[test]
    fn validate_accepts_all_valid_log_levels() {
        for level in VALID_LOG_LEVELS {
            let mut cfg = Config::default();
            cfg.logging.level = (*level).into();
            assert!(cfg.validate().is_empty(), "level {level} should be valid");
        }
    }

    // -- Builder --

    #[test]
    fn builder_starts_from_defaults() {
        let cfg = ConfigBuilder::new().build();
        assert_eq!(cfg.monitor.progress_interval_ms, 500);
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn builder_overrides_fields() {
        let cfg = ConfigBuilder::new()
            .monitor_progress_interval_ms(100)
            .monitor_significant_delta(0.2)
            .monitor_match_policy(MatchPolicy::FileName)
            .monitor_noise_files(NoiseFilter::new(["junk"]))
            .monitor_verbose(true)
            .search_poll_interval_ms(50)
            .search_state_xattr("user.test.state")
            .search_progress_xattr("user.test.progress")
            .logging_level("trace")
            .build();

        assert_eq!(cfg.monitor.progress_interval_ms, 100);
        assert!((cfg.monitor.significant_delta - 0.2).abs() < f64::EPSILON);
        assert_eq!(cfg.monitor.match_policy, MatchPolicy::FileName);
        assert_eq!(cfg.monitor.noise_files.names(), ["junk".to_string()]);
        assert!(cfg.monitor.verbose);
        assert_eq!(cfg.search.poll_interval(), Duration::from_millis(50));
        assert_eq!(cfg.search.state_xattr, "user.test.state");
        assert_eq!(cfg.search.progress_xattr, "user.test.progress");
        assert_eq!(cfg.logging.level, "trace");
    }

    #[test]
    fn builder_build_validated_succeeds_for_valid_config() {
        let result = ConfigBuilder::new().monitor_verbose(true).build_validated();
        assert!(result.is_ok());
    }

    #[test]
    fn builder_build_validated_fails_for_invalid_config() {
        let result = ConfigBuilder::new()
            .search_poll_interval_ms(0)
            .logging_level("nope")
            .build_validated();
        assert!(result.is_err());
        let errors = result.unwrap_err();
        assert!(errors.len() >= 2);
    }

    // -- default_path --

    #[test]
    fn default_path_ends_with_config_yaml() {
        let p = Config::default_path();
        assert!(p.ends_with("syncwatch/config.yaml"));
    }

    // -- ValidationError Display --

    #[test]
    fn validation_error_display() {
        let err = ValidationError {
            field: "search.poll_interval_ms".into(),
            message: "must be greater than 0".into(),
        };
        assert_eq!(
            err.to_string(),
            "search.poll_interval_ms: must be greater than 0"
        );
    }
}
