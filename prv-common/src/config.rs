//! Configuration loading and directory resolution
//!
//! Both binaries read the same optional TOML file. Resolution priority for the
//! file itself:
//! 1. Command-line argument (`--config`), must exist
//! 2. Environment variable `PRV_BIDS_CONFIG`, must exist
//! 3. Platform config directory (`~/.config/prv-bids/config.toml` on Linux)
//! 4. Compiled defaults (a missing optional file is not an error)
//!
//! Directories follow the same order: CLI flag, environment variable, TOML,
//! compiled default.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "PRV_BIDS_CONFIG";
/// Environment variable overriding the flat input directory
pub const INPUT_ENV_VAR: &str = "PRV_BIDS_INPUT";
/// Environment variable overriding the output tree root
pub const OUTPUT_ENV_VAR: &str = "PRV_BIDS_OUTPUT";
/// Environment variable overriding the allow-list CSV path
pub const ALLOW_LIST_ENV_VAR: &str = "PRV_BIDS_ALLOW_LIST";

const DEFAULT_INPUT_DIR: &str = "input";
const DEFAULT_OUTPUT_DIR: &str = "output";
const DEFAULT_ALLOW_LIST: &str = "patient_identifiers.csv";

/// Top-level TOML configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Flat directory of source recordings
    #[serde(default)]
    pub input_dir: Option<PathBuf>,

    /// Root of the reorganized tree (also where sidecars are written)
    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    /// CSV with a `patient_identifier` column
    #[serde(default)]
    pub allow_list: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub sessions: SessionsConfig,

    #[serde(default)]
    pub sidecar: SidecarConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` wins when set
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for the per-binary log file
    #[serde(default = "default_log_directory")]
    pub directory: PathBuf,

    /// Write a log file in addition to the console
    #[serde(default = "default_true")]
    pub file_logging: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: default_log_directory(),
            file_logging: true,
        }
    }
}

/// How the earliest session of a patient is labeled in the session table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselinePolicy {
    /// Earliest session is baseline only if its age lies in the baseline window
    AgeWindow,
    /// Earliest session is always baseline
    FirstSession,
}

/// Session table settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionsConfig {
    #[serde(default = "default_baseline_policy")]
    pub baseline_policy: BaselinePolicy,

    /// Lower bound (inclusive) of the baseline window, in months
    #[serde(default = "default_baseline_min_months")]
    pub baseline_min_months: f64,

    /// Upper bound (inclusive) of the baseline window, in months
    #[serde(default = "default_baseline_max_months")]
    pub baseline_max_months: f64,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            baseline_policy: default_baseline_policy(),
            baseline_min_months: default_baseline_min_months(),
            baseline_max_months: default_baseline_max_months(),
        }
    }
}

impl SessionsConfig {
    /// True if `age_months` falls inside the baseline window
    pub fn in_baseline_window(&self, age_months: u32) -> bool {
        let age = f64::from(age_months);
        age >= self.baseline_min_months && age <= self.baseline_max_months
    }
}

/// Which signal file represents a session when several are present
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalFilePolicy {
    /// Lexicographically first file name; the others are logged and ignored
    FirstSorted,
    /// The session is rejected and counted as a failure
    Reject,
}

/// Sidecar generation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SidecarConfig {
    /// BIDS task label used in sidecar file names (`_task-{label}_`)
    #[serde(default = "default_task_label")]
    pub task_label: String,

    /// Indentation width of written JSON sidecars
    #[serde(default = "default_json_indent")]
    pub json_indent: usize,

    #[serde(default = "default_signal_file_policy")]
    pub signal_file_policy: SignalFilePolicy,

    /// Value of the `units` column in channel tables
    #[serde(default = "default_channel_units")]
    pub channel_units: String,

    /// Also write `dataset_description.json` once per dataset
    #[serde(default)]
    pub dataset_description: bool,
}

impl Default for SidecarConfig {
    fn default() -> Self {
        Self {
            task_label: default_task_label(),
            json_indent: default_json_indent(),
            signal_file_policy: default_signal_file_policy(),
            channel_units: default_channel_units(),
            dataset_description: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_directory() -> PathBuf {
    PathBuf::from("logs")
}

fn default_true() -> bool {
    true
}

fn default_baseline_policy() -> BaselinePolicy {
    BaselinePolicy::AgeWindow
}

fn default_baseline_min_months() -> f64 {
    1.5
}

fn default_baseline_max_months() -> f64 {
    6.0
}

fn default_task_label() -> String {
    "rest".to_string()
}

fn default_json_indent() -> usize {
    2
}

fn default_signal_file_policy() -> SignalFilePolicy {
    SignalFilePolicy::FirstSorted
}

fn default_channel_units() -> String {
    "uV".to_string()
}

impl TomlConfig {
    /// Parse and validate TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            Error::Toml(err) => {
                Error::Config(format!("Failed to parse config file {}: {}", path.display(), err))
            }
            other => other,
        })
    }

    /// Reject settings that cannot produce a meaningful run
    pub fn validate(&self) -> Result<()> {
        let sessions = &self.sessions;
        if !(sessions.baseline_min_months >= 0.0) {
            return Err(Error::Config(format!(
                "sessions.baseline_min_months must be >= 0, got {}",
                sessions.baseline_min_months
            )));
        }
        if !(sessions.baseline_max_months >= sessions.baseline_min_months) {
            return Err(Error::Config(format!(
                "sessions.baseline_max_months ({}) is below baseline_min_months ({})",
                sessions.baseline_max_months, sessions.baseline_min_months
            )));
        }

        let label = &self.sidecar.task_label;
        if label.is_empty() || !label.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(Error::Config(format!(
                "sidecar.task_label must be non-empty alphanumeric, got '{}'",
                label
            )));
        }

        Ok(())
    }

    /// Flat input directory: CLI → `PRV_BIDS_INPUT` → TOML → `input`
    pub fn resolve_input_dir(&self, cli_arg: Option<&Path>) -> PathBuf {
        resolve_path(cli_arg, INPUT_ENV_VAR, self.input_dir.as_deref(), DEFAULT_INPUT_DIR)
    }

    /// Output tree root: CLI → `PRV_BIDS_OUTPUT` → TOML → `output`
    pub fn resolve_output_dir(&self, cli_arg: Option<&Path>) -> PathBuf {
        resolve_path(cli_arg, OUTPUT_ENV_VAR, self.output_dir.as_deref(), DEFAULT_OUTPUT_DIR)
    }

    /// Allow-list CSV: CLI → `PRV_BIDS_ALLOW_LIST` → TOML → `patient_identifiers.csv`
    pub fn resolve_allow_list(&self, cli_arg: Option<&Path>) -> PathBuf {
        resolve_path(cli_arg, ALLOW_LIST_ENV_VAR, self.allow_list.as_deref(), DEFAULT_ALLOW_LIST)
    }
}

fn resolve_path(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    toml_value: Option<&Path>,
    default: &str,
) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Some(path) = toml_value {
        return path.to_path_buf();
    }

    // Priority 4: Compiled default
    PathBuf::from(default)
}

/// Where the active configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    CommandLine(PathBuf),
    Environment(PathBuf),
    UserConfigDir(PathBuf),
    /// No file found; compiled defaults in effect
    Defaults,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::CommandLine(path) => write!(f, "{} (--config)", path.display()),
            ConfigSource::Environment(path) => {
                write!(f, "{} ({})", path.display(), CONFIG_ENV_VAR)
            }
            ConfigSource::UserConfigDir(path) => write!(f, "{}", path.display()),
            ConfigSource::Defaults => f.write_str("compiled defaults"),
        }
    }
}

/// Configuration plus its provenance
///
/// Provenance is returned rather than logged because the logging directory is
/// itself part of the configuration.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: TomlConfig,
    pub source: ConfigSource,
}

/// Locates and loads the TOML configuration
pub struct ConfigLoader {
    cli_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new(cli_path: Option<PathBuf>) -> Self {
        Self { cli_path }
    }

    /// Load the configuration following the documented priority
    ///
    /// An explicitly named file (CLI or environment) that cannot be read is a
    /// configuration error; an absent platform default file is not.
    pub fn load(&self) -> Result<LoadedConfig> {
        if let Some(path) = &self.cli_path {
            let config = TomlConfig::from_file(path)?;
            return Ok(LoadedConfig {
                config,
                source: ConfigSource::CommandLine(path.clone()),
            });
        }

        if let Ok(value) = std::env::var(CONFIG_ENV_VAR) {
            if !value.trim().is_empty() {
                let path = PathBuf::from(value);
                let config = TomlConfig::from_file(&path)?;
                return Ok(LoadedConfig {
                    config,
                    source: ConfigSource::Environment(path),
                });
            }
        }

        if let Some(path) = default_config_path() {
            if path.exists() {
                let config = TomlConfig::from_file(&path)?;
                return Ok(LoadedConfig {
                    config,
                    source: ConfigSource::UserConfigDir(path),
                });
            }
        }

        Ok(LoadedConfig {
            config: TomlConfig::default(),
            source: ConfigSource::Defaults,
        })
    }
}

/// Platform config file location, e.g. `~/.config/prv-bids/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("prv-bids").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TomlConfig::default();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.directory, PathBuf::from("logs"));
        assert!(config.logging.file_logging);
        assert_eq!(config.sessions.baseline_policy, BaselinePolicy::AgeWindow);
        assert_eq!(config.sidecar.task_label, "rest");
        assert_eq!(config.sidecar.json_indent, 2);
        assert_eq!(config.sidecar.signal_file_policy, SignalFilePolicy::FirstSorted);
        assert!(!config.sidecar.dataset_description);
    }

    #[test]
    fn test_empty_toml_matches_defaults() {
        let parsed = TomlConfig::from_toml_str("").unwrap();
        assert_eq!(parsed, TomlConfig::default());
    }

    #[test]
    fn test_baseline_window_bounds_inclusive() {
        let sessions = SessionsConfig::default();
        assert!(!sessions.in_baseline_window(1));
        assert!(sessions.in_baseline_window(2));
        assert!(sessions.in_baseline_window(6));
        assert!(!sessions.in_baseline_window(7));
    }

    #[test]
    fn test_inverted_baseline_window_rejected() {
        let result = TomlConfig::from_toml_str(
            "[sessions]\nbaseline_min_months = 6.0\nbaseline_max_months = 2.0\n",
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_bad_task_label_rejected() {
        let result = TomlConfig::from_toml_str("[sidecar]\ntask_label = \"rest_state\"\n");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_cli_path_wins() {
        let config = TomlConfig {
            output_dir: Some(PathBuf::from("/from/toml")),
            ..Default::default()
        };
        let resolved = config.resolve_output_dir(Some(Path::new("/from/cli")));
        assert_eq!(resolved, PathBuf::from("/from/cli"));
    }
}
