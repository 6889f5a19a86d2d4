//! Core configuration structures and loading logic

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

/// Built-in video root used when neither the config file nor `VIDEOS_PATH` sets one
pub const DEFAULT_VIDEOS_PATH: &str = "D:/KARAOKEV3/musicas";

/// Built-in audio root used when neither the config file nor `SOUNDS_PATH` sets one
pub const DEFAULT_SOUNDS_PATH: &str = "D:/KARAOKEV3/audio";

/// Default listening port
pub const DEFAULT_PORT: u16 = 3001;

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// Interface to bind (default "0.0.0.0")
    #[serde(default = "default_host")]
    pub host: String,
    /// Listening port (default 3001)
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Media roots the server starts with
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MediaConfig {
    /// Directory holding karaoke videos
    #[serde(default = "default_videos_path")]
    pub videos_path: String,
    /// Directory holding sound effects
    #[serde(default = "default_sounds_path")]
    pub sounds_path: String,
}

fn default_videos_path() -> String {
    DEFAULT_VIDEOS_PATH.to_string()
}

fn default_sounds_path() -> String {
    DEFAULT_SOUNDS_PATH.to_string()
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            videos_path: default_videos_path(),
            sounds_path: default_sounds_path(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset (default "info")
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Returns the trimmed value when it is non-empty.
fn non_blank(val: &str) -> Option<String> {
    let trimmed = val.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Parses the file and handles missing optional fields with defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Overrides the following values if environment variables are set:
    /// - VIDEOS_PATH -> media.videos_path (non-blank only)
    /// - SOUNDS_PATH -> media.sounds_path (non-blank only)
    /// - SINGALONG_HOST -> server.host (non-blank only)
    /// - SINGALONG_PORT -> server.port
    /// - SINGALONG_LOG -> logging.level (non-blank only)
    pub fn apply_env_overrides(&mut self) {
        if let Some(path) = env::var("VIDEOS_PATH").ok().as_deref().and_then(non_blank) {
            self.media.videos_path = path;
        }

        if let Some(path) = env::var("SOUNDS_PATH").ok().as_deref().and_then(non_blank) {
            self.media.sounds_path = path;
        }

        if let Some(host) = env::var("SINGALONG_HOST").ok().as_deref().and_then(non_blank) {
            self.server.host = host;
        }

        if let Ok(val) = env::var("SINGALONG_PORT") {
            if let Ok(port) = val.trim().parse::<u16>() {
                self.server.port = port;
            }
        }

        if let Some(level) = env::var("SINGALONG_LOG").ok().as_deref().and_then(non_blank) {
            self.logging.level = level;
        }
    }

    /// Load configuration from file and apply environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Like [`Config::load`], but a missing file yields the defaults
    ///
    /// A file that exists but cannot be read or parsed is still an error.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            Self::load_from_file(path)?
        } else {
            Config::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Mutex;

    // Mutex to ensure env var tests don't interfere with each other
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Helper to clear all config-related env vars
    fn clear_env_vars() {
        env::remove_var("VIDEOS_PATH");
        env::remove_var("SOUNDS_PATH");
        env::remove_var("SINGALONG_HOST");
        env::remove_var("SINGALONG_PORT");
        env::remove_var("SINGALONG_LOG");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_config_parses_all_sections(
            host in "[a-z0-9.]{1,20}",
            port in 1u16..=u16::MAX,
            videos in "[a-zA-Z0-9/_-]{1,30}",
            sounds in "[a-zA-Z0-9/_-]{1,30}",
            level in prop_oneof![Just("trace"), Just("debug"), Just("info"), Just("warn")],
        ) {
            let toml_str = format!(
                r#"
[server]
host = "{}"
port = {}

[media]
videos_path = "{}"
sounds_path = "{}"

[logging]
level = "{}"
"#,
                host, port, videos, sounds, level
            );

            let config = Config::parse_toml(&toml_str).expect("Valid TOML should parse");

            prop_assert_eq!(config.server.host, host);
            prop_assert_eq!(config.server.port, port);
            prop_assert_eq!(config.media.videos_path, videos);
            prop_assert_eq!(config.media.sounds_path, sounds);
            prop_assert_eq!(config.logging.level, level);
        }

        #[test]
        fn prop_env_overrides_media_paths(
            videos in "[a-zA-Z0-9/_-]{1,30}",
            sounds in "[a-zA-Z0-9/_-]{1,30}",
        ) {
            let _guard = ENV_MUTEX.lock().unwrap();
            clear_env_vars();

            let mut config = Config::default();

            // Surrounding whitespace is trimmed away
            env::set_var("VIDEOS_PATH", format!("  {}  ", videos));
            env::set_var("SOUNDS_PATH", &sounds);
            config.apply_env_overrides();
            clear_env_vars();

            prop_assert_eq!(config.media.videos_path, videos);
            prop_assert_eq!(config.media.sounds_path, sounds);
        }

        #[test]
        fn prop_env_overrides_port(port in 1u16..=u16::MAX) {
            let _guard = ENV_MUTEX.lock().unwrap();
            clear_env_vars();

            let mut config = Config::default();
            env::set_var("SINGALONG_PORT", port.to_string());
            config.apply_env_overrides();
            clear_env_vars();

            prop_assert_eq!(config.server.port, port);
        }
    }

    #[test]
    fn test_blank_env_values_are_ignored() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env_vars();

        let mut config = Config::default();
        env::set_var("VIDEOS_PATH", "   ");
        env::set_var("SOUNDS_PATH", "");
        env::set_var("SINGALONG_PORT", "not-a-port");
        config.apply_env_overrides();
        clear_env_vars();

        assert_eq!(config.media.videos_path, DEFAULT_VIDEOS_PATH);
        assert_eq!(config.media.sounds_path, DEFAULT_SOUNDS_PATH);
        assert_eq!(config.server.port, DEFAULT_PORT);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse_toml("").expect("Empty TOML should parse");

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 3001);
        assert_eq!(config.media.videos_path, DEFAULT_VIDEOS_PATH);
        assert_eq!(config.media.sounds_path, DEFAULT_SOUNDS_PATH);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let toml_str = r#"
[media]
videos_path = "/srv/karaoke/videos"
"#;
        let config = Config::parse_toml(toml_str).expect("Partial TOML should parse");

        assert_eq!(config.media.videos_path, "/srv/karaoke/videos");
        assert_eq!(config.media.sounds_path, DEFAULT_SOUNDS_PATH); // default
        assert_eq!(config.server.port, DEFAULT_PORT); // default
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env_vars();

        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_default(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_or_default_rejects_invalid_file() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env_vars();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[server\nport = ").unwrap();

        let err = Config::load_or_default(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
