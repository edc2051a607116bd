//! Pipeline settings and the process-wide cached copy.
//!
//! Settings come from a small TOML document, either flat or under a
//! `[pipeline]` table:
//!
//! ```toml
//! [pipeline]
//! buffer_size = 128
//! disable_monitor = false
//! deadline_ms = 5000
//! ```

use serde::Deserialize;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Queue capacity used when none (or a non-positive one) is configured
pub const DEFAULT_BUFFER_SIZE: usize = 64;

/// Largest queue capacity accepted; bigger values are clamped to it
pub const MAX_BUFFER_SIZE: usize = 1 << 20;

/// Environment variable naming a TOML settings file
pub const CONFIG_PATH_ENV: &str = "FRAMECHAIN_CONFIG";
/// Environment override for `buffer_size`
pub const BUFFER_SIZE_ENV: &str = "FRAMECHAIN_BUFFER_SIZE";
/// Environment override for `disable_monitor`
pub const DISABLE_MONITOR_ENV: &str = "FRAMECHAIN_DISABLE_MONITOR";

/// Configuration for pipeline execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Capacity of every queue between stages
    pub buffer_size: usize,
    /// Skip all monitor callbacks and timing
    pub disable_monitor: bool,
    /// Give up on stages still running after this long
    pub deadline: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            disable_monitor: false,
            deadline: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    buffer_size: i64,
    disable_monitor: bool,
    deadline_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawDocument {
    pipeline: Option<RawConfig>,
    #[serde(flatten)]
    top_level: RawConfig,
}

fn buffer_size_from(size: i64) -> usize {
    if size <= 0 {
        DEFAULT_BUFFER_SIZE
    } else {
        usize::try_from(size).map_or(MAX_BUFFER_SIZE, |size| size.min(MAX_BUFFER_SIZE))
    }
}

impl RawConfig {
    fn normalize(self) -> PipelineConfig {
        PipelineConfig {
            buffer_size: buffer_size_from(self.buffer_size),
            disable_monitor: self.disable_monitor,
            deadline: self.deadline_ms.map(Duration::from_millis),
        }
    }
}

impl PipelineConfig {
    /// Parse settings from TOML text; missing keys take their defaults
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let doc: RawDocument = toml::from_str(text)?;
        Ok(doc.pipeline.unwrap_or(doc.top_level).normalize())
    }

    /// Read and parse a TOML settings file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Settings from the environment: the file named by `FRAMECHAIN_CONFIG`
    /// if set, then the individual variable overrides.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup(CONFIG_PATH_ENV) {
            Some(path) => Self::load_from(path)?,
            None => Self::default(),
        };

        if let Some(value) = lookup(BUFFER_SIZE_ENV) {
            let size: i64 = value
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("{}={} is not an integer", BUFFER_SIZE_ENV, value)))?;
            config.buffer_size = buffer_size_from(size);
        }

        if let Some(value) = lookup(DISABLE_MONITOR_ENV) {
            config.disable_monitor = parse_flag(&value).ok_or_else(|| {
                Error::Config(format!("{}={} is not a boolean", DISABLE_MONITOR_ENV, value))
            })?;
        }

        Ok(config)
    }

    /// Replace a zero buffer size with the default and clamp oversized ones
    pub fn normalize(mut self) -> Self {
        if self.buffer_size == 0 {
            self.buffer_size = DEFAULT_BUFFER_SIZE;
        }
        self.buffer_size = self.buffer_size.min(MAX_BUFFER_SIZE);
        self
    }

    /// Settings read through `lookup`, or the defaults when they cannot be
    /// loaded.
    pub(crate) fn resolve<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        match Self::from_lookup(lookup) {
            Ok(config) => {
                debug!(
                    buffer_size = config.buffer_size,
                    disable_monitor = config.disable_monitor,
                    "pipeline config loaded"
                );
                config
            }
            Err(e) => {
                warn!(error = %e, "pipeline config unavailable, using defaults");
                Self::default()
            }
        }
    }

    /// Whether monitor callbacks fire
    pub fn monitor_enabled(&self) -> bool {
        !self.disable_monitor
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

static GLOBAL: OnceLock<PipelineConfig> = OnceLock::new();

/// Process-wide settings, loaded from the environment on first use.
///
/// A load failure is logged and the defaults are cached instead; the
/// environment is never consulted again.
pub fn global() -> &'static PipelineConfig {
    GLOBAL.get_or_init(|| PipelineConfig::resolve(|key| std::env::var(key).ok()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_values() {
        let config = PipelineConfig::default();
        assert_eq!(config.buffer_size, 64);
        assert!(!config.disable_monitor);
        assert!(config.monitor_enabled());
        assert_eq!(config.deadline, None);
    }

    #[test]
    fn parses_pipeline_table() {
        let config = PipelineConfig::from_toml_str(
            "[pipeline]\nbuffer_size = 8\ndisable_monitor = true\ndeadline_ms = 250\n",
        )
        .unwrap();
        assert_eq!(config.buffer_size, 8);
        assert!(config.disable_monitor);
        assert_eq!(config.deadline, Some(Duration::from_millis(250)));
    }

    #[test]
    fn parses_flat_keys_and_fills_missing_ones() {
        let config = PipelineConfig::from_toml_str("disable_monitor = true\n").unwrap();
        assert_eq!(config.buffer_size, DEFAULT_BUFFER_SIZE);
        assert!(config.disable_monitor);
    }

    #[test]
    fn non_positive_buffer_size_falls_back_to_default() {
        for text in ["buffer_size = 0", "buffer_size = -5"] {
            let config = PipelineConfig::from_toml_str(text).unwrap();
            assert_eq!(config.buffer_size, DEFAULT_BUFFER_SIZE, "{}", text);
        }
        let config = PipelineConfig {
            buffer_size: 0,
            ..Default::default()
        }
        .normalize();
        assert_eq!(config.buffer_size, DEFAULT_BUFFER_SIZE);
    }

    #[test]
    fn malformed_toml_is_a_config_error() {
        let err = PipelineConfig::from_toml_str("buffer_size = \"many\"").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[pipeline]\nbuffer_size = 3").unwrap();

        let config = PipelineConfig::load_from(file.path()).unwrap();
        assert_eq!(config.buffer_size, 3);
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = PipelineConfig::load_from("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn oversized_buffer_size_is_clamped() {
        let config = PipelineConfig::from_toml_str("buffer_size = 9223372036854775807").unwrap();
        assert_eq!(config.buffer_size, MAX_BUFFER_SIZE);

        let config = PipelineConfig {
            buffer_size: usize::MAX,
            ..Default::default()
        }
        .normalize();
        assert_eq!(config.buffer_size, MAX_BUFFER_SIZE);
    }

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let pairs: Vec<(String, String)> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let config = PipelineConfig::from_lookup(vars(&[])).unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn environment_names_a_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[pipeline]\nbuffer_size = 12\ndeadline_ms = 40").unwrap();
        let path = file.path().to_string_lossy().into_owned();

        let config = PipelineConfig::from_lookup(vars(&[(CONFIG_PATH_ENV, &path)])).unwrap();
        assert_eq!(config.buffer_size, 12);
        assert_eq!(config.deadline, Some(Duration::from_millis(40)));
    }

    #[test]
    fn environment_overrides_the_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "buffer_size = 12").unwrap();
        let path = file.path().to_string_lossy().into_owned();

        let config = PipelineConfig::from_lookup(vars(&[
            (CONFIG_PATH_ENV, &path),
            (BUFFER_SIZE_ENV, " 5 "),
            (DISABLE_MONITOR_ENV, "yes"),
        ]))
        .unwrap();
        assert_eq!(config.buffer_size, 5);
        assert!(config.disable_monitor);
    }

    #[test]
    fn environment_buffer_size_is_normalized() {
        for value in ["0", "-3"] {
            let config = PipelineConfig::from_lookup(vars(&[(BUFFER_SIZE_ENV, value)])).unwrap();
            assert_eq!(config.buffer_size, DEFAULT_BUFFER_SIZE, "{}", value);
        }
        let config =
            PipelineConfig::from_lookup(vars(&[(BUFFER_SIZE_ENV, "99999999999")])).unwrap();
        assert_eq!(config.buffer_size, MAX_BUFFER_SIZE);
    }

    #[test]
    fn malformed_environment_values_are_config_errors() {
        let err = PipelineConfig::from_lookup(vars(&[(BUFFER_SIZE_ENV, "lots")])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = PipelineConfig::from_lookup(vars(&[(DISABLE_MONITOR_ENV, "perhaps")])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = PipelineConfig::from_lookup(vars(&[(CONFIG_PATH_ENV, "/definitely/not/here.toml")]))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn unloadable_settings_fall_back_to_defaults() {
        let config = PipelineConfig::resolve(vars(&[
            (BUFFER_SIZE_ENV, "8"),
            (DISABLE_MONITOR_ENV, "perhaps"),
        ]));
        assert_eq!(config, PipelineConfig::default());

        let config = PipelineConfig::resolve(vars(&[(DISABLE_MONITOR_ENV, "off")]));
        assert!(config.monitor_enabled());
    }

    #[test]
    fn flag_parsing_accepts_common_spellings() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag(" off "), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn global_is_initialized_once() {
        let first = global() as *const PipelineConfig;
        let second = global() as *const PipelineConfig;
        assert_eq!(first, second);
    }
}
