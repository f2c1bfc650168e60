// crates/image-gate-config/src/config.rs
// ============================================================================
// Module: Image Gate Configuration
// Description: Configuration loading and validation for image-gate.toml.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: image-gate-core, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! The path comes from an explicit argument, then `IMAGE_GATE_CONFIG`, then
//! `./image-gate.toml`. Only the implicit default location may be absent, in
//! which case built-in defaults apply. Every loaded config is validated
//! before it is returned.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use image_gate_core::EvaluationOptions;
use image_gate_core::GateName;
use image_gate_core::GateSource;
use image_gate_core::WhitelistCompat;
use image_gate_core::runtime::GateExecutables;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "image-gate.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "IMAGE_GATE_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Minimum per-gate timeout in milliseconds.
pub const MIN_GATE_TIMEOUT_MS: u64 = 1_000;
/// Maximum per-gate timeout in milliseconds.
pub const MAX_GATE_TIMEOUT_MS: u64 = 3_600_000;
/// Default per-gate timeout in milliseconds.
pub(crate) const DEFAULT_GATE_TIMEOUT_MS: u64 = 300_000;
/// Default maximum gate output size in bytes.
pub(crate) const DEFAULT_MAX_OUTPUT_BYTES: usize = 16 * 1024 * 1024;
/// Maximum allowed gate output size in bytes.
pub(crate) const MAX_MAX_OUTPUT_BYTES: usize = 256 * 1024 * 1024;
/// Default maximum bundle size in bytes.
pub const DEFAULT_MAX_BUNDLE_BYTES: usize = 4 * 1024 * 1024;
/// Maximum allowed bundle size in bytes.
pub(crate) const MAX_MAX_BUNDLE_BYTES: usize = 64 * 1024 * 1024;
/// Maximum number of explicit gate executables.
pub(crate) const MAX_GATE_EXECUTABLES: usize = 256;

/// Subdirectory of the data dir holding image ledgers.
const LEDGER_SUBDIR: &str = "whitelists";
/// Subdirectory of the data dir holding raw gate output.
const GATE_OUTPUT_SUBDIR: &str = "gate_output";
/// Subdirectory of the data dir holding analyzer image metadata.
const IMAGES_SUBDIR: &str = "images";

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// Image gate runtime configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImageGateConfig {
    /// Filesystem locations.
    #[serde(default)]
    pub paths: PathsConfig,
    /// Gate execution settings.
    #[serde(default)]
    pub gates: GatesConfig,
    /// Whitelist compatibility switches.
    #[serde(default)]
    pub compat: CompatConfig,
    /// Evaluation log sink.
    #[serde(default)]
    pub log: LogConfig,
    /// Input size limits.
    #[serde(default)]
    pub limits: LimitsConfig,
}

impl ImageGateConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (resolved, explicit) = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = match fs::read(&resolved) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound && !explicit => {
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(err) => {
                return Err(ConfigError::Io(format!("{}: {err}", resolved.display())));
            }
        };
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml_str(content)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.paths.validate()?;
        self.gates.validate()?;
        self.log.validate()?;
        self.limits.validate()
    }

    /// Returns the per-gate timeout.
    #[must_use]
    pub const fn gate_timeout(&self) -> Duration {
        Duration::from_millis(self.gates.timeout_ms)
    }

    /// Returns the whitelist compatibility switches.
    #[must_use]
    pub const fn whitelist_compat(&self) -> WhitelistCompat {
        WhitelistCompat {
            cve_prefix_whitelist: self.compat.cve_prefix_whitelist,
            legacy_ledger_records: self.compat.legacy_ledger_records,
        }
    }

    /// Builds evaluation options for the given gate output source.
    #[must_use]
    pub fn evaluation_options(&self, gate_source: GateSource) -> EvaluationOptions {
        let mut options =
            EvaluationOptions::new(&self.paths.data_dir, &self.paths.workspace_dir);
        options.gate_timeout = self.gate_timeout();
        options.compat = self.whitelist_compat();
        options.gate_source = gate_source;
        options
    }

    /// Builds the gate executable resolver.
    #[must_use]
    pub fn gate_executables(&self) -> GateExecutables {
        self.gates.executables.iter().fold(
            GateExecutables::new(&self.paths.gates_dir),
            |executables, entry| executables.with_executable(GateName::new(&entry.name), &entry.path),
        )
    }
}

/// Filesystem locations.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PathsConfig {
    /// Shared analyzer data store handed to gates.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Parent directory of per-run gate workspaces.
    #[serde(default = "default_workspace_dir")]
    pub workspace_dir: PathBuf,
    /// Directory searched for gate executables.
    #[serde(default = "default_gates_dir")]
    pub gates_dir: PathBuf,
    /// Optional global whitelist file.
    #[serde(default)]
    pub global_whitelist: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            workspace_dir: default_workspace_dir(),
            gates_dir: default_gates_dir(),
            global_whitelist: None,
        }
    }
}

impl PathsConfig {
    /// Returns the directory holding image ledgers.
    #[must_use]
    pub fn ledger_dir(&self) -> PathBuf {
        self.data_dir.join(LEDGER_SUBDIR)
    }

    /// Returns the directory holding raw gate output.
    #[must_use]
    pub fn gate_output_dir(&self) -> PathBuf {
        self.data_dir.join(GATE_OUTPUT_SUBDIR)
    }

    /// Returns the directory holding analyzer image metadata.
    #[must_use]
    pub fn images_dir(&self) -> PathBuf {
        self.data_dir.join(IMAGES_SUBDIR)
    }

    /// Validates path lengths.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_field_path("paths.data_dir", &self.data_dir)?;
        validate_field_path("paths.workspace_dir", &self.workspace_dir)?;
        validate_field_path("paths.gates_dir", &self.gates_dir)?;
        if let Some(path) = &self.global_whitelist {
            validate_field_path("paths.global_whitelist", path)?;
        }
        Ok(())
    }
}

/// Gate execution settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatesConfig {
    /// Per-gate timeout in milliseconds.
    #[serde(default = "default_gate_timeout_ms")]
    pub timeout_ms: u64,
    /// Maximum accepted gate output size in bytes.
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
    /// Explicit gate executables.
    #[serde(default)]
    pub executables: Vec<GateExecutableConfig>,
}

impl Default for GatesConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_gate_timeout_ms(),
            max_output_bytes: default_max_output_bytes(),
            executables: Vec::new(),
        }
    }
}

impl GatesConfig {
    /// Validates gate settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_GATE_TIMEOUT_MS ..= MAX_GATE_TIMEOUT_MS).contains(&self.timeout_ms) {
            return Err(ConfigError::Invalid(format!(
                "gates.timeout_ms must be between {MIN_GATE_TIMEOUT_MS} and {MAX_GATE_TIMEOUT_MS}"
            )));
        }
        if self.max_output_bytes == 0 || self.max_output_bytes > MAX_MAX_OUTPUT_BYTES {
            return Err(ConfigError::Invalid(format!(
                "gates.max_output_bytes must be between 1 and {MAX_MAX_OUTPUT_BYTES}"
            )));
        }
        if self.executables.len() > MAX_GATE_EXECUTABLES {
            return Err(ConfigError::Invalid("too many gates.executables entries".to_string()));
        }
        let mut seen = BTreeSet::new();
        for entry in &self.executables {
            let name = GateName::new(&entry.name);
            if name.as_str().is_empty() {
                return Err(ConfigError::Invalid(
                    "gates.executables name must be non-empty".to_string(),
                ));
            }
            if !seen.insert(name.clone()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate gates.executables entry for {name}"
                )));
            }
            validate_field_path("gates.executables.path", &entry.path)?;
        }
        Ok(())
    }
}

/// Explicit executable for one gate.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GateExecutableConfig {
    /// Gate name (case-insensitive).
    pub name: String,
    /// Executable path.
    pub path: PathBuf,
}

/// Whitelist compatibility switches.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompatConfig {
    /// Treat bare advisory ids for the CVE gate as prefixes.
    #[serde(default = "default_compat_enabled")]
    pub cve_prefix_whitelist: bool,
    /// Match full-record image ledger entries.
    #[serde(default = "default_compat_enabled")]
    pub legacy_ledger_records: bool,
}

impl Default for CompatConfig {
    fn default() -> Self {
        Self {
            cve_prefix_whitelist: default_compat_enabled(),
            legacy_ledger_records: default_compat_enabled(),
        }
    }
}

/// Evaluation log sink configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// Sink kind.
    #[serde(default)]
    pub sink: LogSinkKind,
    /// Log file path for the file sink.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl LogConfig {
    /// Validates sink settings.
    fn validate(&self) -> Result<(), ConfigError> {
        match (self.sink, &self.path) {
            (LogSinkKind::File, None) => {
                Err(ConfigError::Invalid("log.sink = \"file\" requires log.path".to_string()))
            }
            (LogSinkKind::File, Some(path)) => validate_field_path("log.path", path),
            (_, Some(_)) => {
                Err(ConfigError::Invalid("log.path is only valid with log.sink = \"file\"".to_string()))
            }
            (_, None) => Ok(()),
        }
    }
}

/// Evaluation log sink kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogSinkKind {
    /// JSON lines on stderr.
    #[default]
    Stderr,
    /// JSON lines appended to a file.
    File,
    /// Discard events.
    None,
}

/// Input size limits.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimitsConfig {
    /// Maximum bundle file size in bytes.
    #[serde(default = "default_max_bundle_bytes")]
    pub max_bundle_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_bundle_bytes: default_max_bundle_bytes(),
        }
    }
}

impl LimitsConfig {
    /// Validates limits.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_bundle_bytes == 0 || self.max_bundle_bytes > MAX_MAX_BUNDLE_BYTES {
            return Err(ConfigError::Invalid(format!(
                "limits.max_bundle_bytes must be between 1 and {MAX_MAX_BUNDLE_BYTES}"
            )));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path and whether it was explicitly requested.
fn resolve_path(path: Option<&Path>) -> Result<(PathBuf, bool), ConfigError> {
    if let Some(path) = path {
        return Ok((path.to_path_buf(), true));
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok((PathBuf::from(env_path), true));
    }
    Ok((PathBuf::from(DEFAULT_CONFIG_NAME), false))
}

/// Validates the resolved path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a configured path field against length constraints.
fn validate_field_path(field: &str, path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.trim().is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in path.components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

/// Default shared data store.
fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/image-gate")
}

/// Default workspace parent directory.
fn default_workspace_dir() -> PathBuf {
    PathBuf::from("/var/tmp/image-gate")
}

/// Default gate executable directory.
fn default_gates_dir() -> PathBuf {
    PathBuf::from("/usr/libexec/image-gate/gates")
}

/// Default per-gate timeout.
pub(crate) const fn default_gate_timeout_ms() -> u64 {
    DEFAULT_GATE_TIMEOUT_MS
}

/// Default gate output limit.
pub(crate) const fn default_max_output_bytes() -> usize {
    DEFAULT_MAX_OUTPUT_BYTES
}

/// Default bundle size limit.
pub(crate) const fn default_max_bundle_bytes() -> usize {
    DEFAULT_MAX_BUNDLE_BYTES
}

/// Compatibility switches default to enabled.
const fn default_compat_enabled() -> bool {
    true
}
