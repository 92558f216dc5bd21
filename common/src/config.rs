use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default config file looked up when no path is given on the command line.
pub const DEFAULT_CONFIG_FILE: &str = "timelapse.toml";

/// Longest zero-pad width accepted; `u64::MAX` has 20 decimal digits.
pub const MAX_PAD_LENGTH: usize = 20;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatchConfig {
    #[serde(default = "default_watch_dir")]
    pub dir: PathBuf,
    /// Regex matched against root-relative paths using `/` separators.
    #[serde(default = "default_ignore")]
    pub ignore: String,
    #[serde(default = "default_stability_threshold_ms")]
    pub stability_threshold_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
    #[serde(default)]
    pub overwrite: bool,
    #[serde(default = "default_pad_length")]
    pub pad_length: usize,
    #[serde(default = "default_extension")]
    pub extension: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Announce exports at info level and send status messages back to clients.
    #[serde(default = "default_verbose")]
    pub verbose: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            dir: default_watch_dir(),
            ignore: default_ignore(),
            stability_threshold_ms: default_stability_threshold_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            overwrite: false,
            pad_length: default_pad_length(),
            extension: default_extension(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            verbose: default_verbose(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        Self::from_toml(&content)
    }

    /// Load an explicitly named file, or fall back to [`DEFAULT_CONFIG_FILE`]
    /// and then to built-in defaults when that file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::load(p),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::load(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let ext = &self.output.extension;
        if ext.is_empty() || ext.contains(&['.', '/', '\\'][..]) {
            return Err(ConfigError::Invalid(format!(
                "output.extension must be a bare extension like \"png\", got {ext:?}"
            )));
        }
        if self.output.pad_length > MAX_PAD_LENGTH {
            return Err(ConfigError::Invalid(format!(
                "output.pad_length must be at most {MAX_PAD_LENGTH}, got {}",
                self.output.pad_length
            )));
        }
        if self.watch.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "watch.poll_interval_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// Default value functions
fn default_watch_dir() -> PathBuf {
    "./src".into()
}
fn default_ignore() -> String {
    r"(^|/)\.".into()
}
fn default_stability_threshold_ms() -> u64 {
    1500
}
fn default_poll_interval_ms() -> u64 {
    100
}
fn default_output_dir() -> PathBuf {
    "./timelapse".into()
}
fn default_pad_length() -> usize {
    5
}
fn default_extension() -> String {
    "png".into()
}
fn default_bind() -> String {
    "127.0.0.1:5177".into()
}
fn default_log_level() -> String {
    "info".into()
}
fn default_verbose() -> bool {
    true
}
