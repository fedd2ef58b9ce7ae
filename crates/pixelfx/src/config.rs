//! Optional `config.toml` in the config directory:
//!
//! ```toml
//! [engine]
//! workers = 0        # 1 = sequential, 0 = one band per CPU
//! timeout = "30s"    # humantime string or whole seconds
//! ```
//!
//! Command-line flags override anything set here.
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use engine::EvalOptions;
use serde::de::{self, Deserializer};
use serde::Deserialize;

use crate::cli::GlobalArgs;

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub engine: EngineConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub workers: Option<usize>,
    #[serde(deserialize_with = "deserialize_duration_opt")]
    pub timeout: Option<Duration>,
}

impl AppConfig {
    /// A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file; using defaults");
                return Ok(Self::default());
            }
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read {}", path.display()))
            }
        };
        Self::from_toml_str(&raw).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    pub fn eval_options(&self, args: &GlobalArgs) -> EvalOptions {
        let defaults = EvalOptions::default();
        EvalOptions {
            workers: args
                .workers
                .or(self.engine.workers)
                .unwrap_or(defaults.workers),
            timeout: args.timeout.or(self.engine.timeout).or(defaults.timeout),
        }
    }
}

fn deserialize_duration_opt<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Option<Duration>;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map(Some)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(Duration::from_secs(v)))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Some(Duration::from_secs(v as u64)))
        }
    }

    deserializer.deserialize_any(Visitor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn args(workers: Option<usize>, timeout: Option<Duration>) -> GlobalArgs {
        GlobalArgs {
            workers,
            timeout,
            verbose: false,
        }
    }

    #[test]
    fn parses_engine_section() {
        let config = AppConfig::from_toml_str("[engine]\nworkers = 4\ntimeout = \"1m 30s\"\n").unwrap();
        assert_eq!(config.engine.workers, Some(4));
        assert_eq!(config.engine.timeout, Some(Duration::from_secs(90)));

        let config = AppConfig::from_toml_str("[engine]\ntimeout = 5\n").unwrap();
        assert_eq!(config.engine.timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(AppConfig::from_toml_str("[engine]\ntimeout = \"soon\"\n").is_err());
        assert!(AppConfig::from_toml_str("[engine]\ntimeout = -3\n").is_err());
        assert!(AppConfig::from_toml_str("[engine]\nthreads = 2\n").is_err());
    }

    #[test]
    fn missing_file_is_default() {
        let temp = TempDir::new().unwrap();
        let config = AppConfig::load(&temp.path().join("config.toml")).unwrap();
        assert!(config.engine.workers.is_none());
        assert!(config.engine.timeout.is_none());
    }

    #[test]
    fn flags_override_file() {
        let config = AppConfig::from_toml_str("[engine]\nworkers = 4\ntimeout = \"10s\"\n").unwrap();

        let options = config.eval_options(&args(None, None));
        assert_eq!(options.workers, 4);
        assert_eq!(options.timeout, Some(Duration::from_secs(10)));

        let options = config.eval_options(&args(Some(1), Some(Duration::from_millis(5))));
        assert_eq!(options.workers, 1);
        assert_eq!(options.timeout, Some(Duration::from_millis(5)));

        let options = AppConfig::default().eval_options(&args(None, None));
        assert_eq!(options.workers, 1);
        assert!(options.timeout.is_none());
    }
}
