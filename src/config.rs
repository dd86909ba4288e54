//! Configuration types, built from environment variables.

use std::path::PathBuf;

use chrono::{FixedOffset, Offset, Utc};
use secrecy::SecretString;

use crate::channels::telegram::DEFAULT_API_BASE;
use crate::error::ConfigError;

/// Channel read when `SORTER_CHANNEL` is unset.
pub const DEFAULT_CHANNEL: &str = "@BdevHub";

/// Message limit when `SORTER_LIMIT` is unset.
pub const DEFAULT_LIMIT: usize = 1000;

/// Where messages come from.
#[derive(Debug)]
pub enum SourceConfig {
    /// Live channel posts through the Bot API.
    Telegram {
        bot_token: SecretString,
        channel: String,
        api_base: String,
    },
    /// A Telegram Desktop export file.
    Export {
        path: PathBuf,
        /// Offset for export dates that lack a unix timestamp.
        utc_offset: FixedOffset,
    },
}

/// Sorter configuration.
#[derive(Debug)]
pub struct SorterConfig {
    pub source: SourceConfig,
    /// Maximum messages fetched per run.
    pub limit: usize,
    /// Root directory holding `scripts/` and `news/`.
    pub output_dir: PathBuf,
}

impl SorterConfig {
    /// Build config from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let source = if let Some(path) = get("SORTER_EXPORT_PATH") {
            let utc_offset = match get("SORTER_EXPORT_UTC_OFFSET") {
                None => Utc.fix(),
                Some(raw) => raw.parse::<FixedOffset>().map_err(|e| ConfigError::InvalidValue {
                    key: "SORTER_EXPORT_UTC_OFFSET".into(),
                    message: format!("{raw:?}: {e} (expected e.g. +03:00)"),
                })?,
            };
            SourceConfig::Export {
                path: PathBuf::from(path),
                utc_offset,
            }
        } else {
            let bot_token = get("TELEGRAM_BOT_TOKEN").ok_or_else(|| ConfigError::MissingEnvVar {
                key: "TELEGRAM_BOT_TOKEN".into(),
                hint: "First-time setup: create a bot with @BotFather, add it to the channel, \
                       then export TELEGRAM_BOT_TOKEN=<token> (or set SORTER_EXPORT_PATH to \
                       read a Telegram Desktop export instead)."
                    .into(),
            })?;
            SourceConfig::Telegram {
                bot_token: SecretString::from(bot_token),
                channel: get("SORTER_CHANNEL").unwrap_or_else(|| DEFAULT_CHANNEL.to_string()),
                api_base: get("SORTER_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            }
        };

        let limit = match get("SORTER_LIMIT") {
            None => DEFAULT_LIMIT,
            Some(raw) => match raw.parse::<usize>() {
                Ok(0) => {
                    return Err(ConfigError::InvalidValue {
                        key: "SORTER_LIMIT".into(),
                        message: "must be at least 1".into(),
                    });
                }
                Ok(n) => n,
                Err(e) => {
                    return Err(ConfigError::InvalidValue {
                        key: "SORTER_LIMIT".into(),
                        message: format!("{raw:?}: {e}"),
                    });
                }
            },
        };

        let output_dir = get("SORTER_OUTPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            source,
            limit,
            output_dir,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<SorterConfig, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        SorterConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_with_token() {
        let config = from_pairs(&[("TELEGRAM_BOT_TOKEN", "123:ABC")]).unwrap();
        assert_eq!(config.limit, 1000);
        assert_eq!(config.output_dir, PathBuf::from("."));
        match config.source {
            SourceConfig::Telegram {
                bot_token,
                channel,
                api_base,
            } => {
                assert_eq!(bot_token.expose_secret(), "123:ABC");
                assert_eq!(channel, "@BdevHub");
                assert_eq!(api_base, "https://api.telegram.org");
            }
            other => panic!("Expected Telegram source, got {:?}", other),
        }
    }

    #[test]
    fn missing_token_explains_setup() {
        let err = from_pairs(&[]).unwrap_err();
        match err {
            ConfigError::MissingEnvVar { key, hint } => {
                assert_eq!(key, "TELEGRAM_BOT_TOKEN");
                assert!(hint.contains("First-time setup"));
            }
            other => panic!("Expected MissingEnvVar, got {:?}", other),
        }
    }

    #[test]
    fn blank_token_counts_as_missing() {
        let err = from_pairs(&[("TELEGRAM_BOT_TOKEN", "   ")]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar { .. }));
    }

    #[test]
    fn export_path_needs_no_token() {
        let config = from_pairs(&[
            ("SORTER_EXPORT_PATH", "/data/result.json"),
            ("SORTER_LIMIT", "50"),
            ("SORTER_OUTPUT_DIR", "/srv/site"),
        ])
        .unwrap();
        assert!(matches!(
            config.source,
            SourceConfig::Export { ref path, utc_offset }
                if path == &PathBuf::from("/data/result.json") && utc_offset.local_minus_utc() == 0
        ));
        assert_eq!(config.limit, 50);
        assert_eq!(config.output_dir, PathBuf::from("/srv/site"));
    }

    #[test]
    fn export_utc_offset_is_parsed() {
        let config = from_pairs(&[
            ("SORTER_EXPORT_PATH", "result.json"),
            ("SORTER_EXPORT_UTC_OFFSET", "+03:00"),
        ])
        .unwrap();
        match config.source {
            SourceConfig::Export { utc_offset, .. } => {
                assert_eq!(utc_offset.local_minus_utc(), 3 * 3600);
            }
            other => panic!("Expected Export source, got {:?}", other),
        }

        let err = from_pairs(&[
            ("SORTER_EXPORT_PATH", "result.json"),
            ("SORTER_EXPORT_UTC_OFFSET", "Moscow"),
        ])
        .unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "SORTER_EXPORT_UTC_OFFSET")
        );
    }

    #[test]
    fn invalid_limits_are_rejected() {
        for bad in ["zero", "-3", "0"] {
            let err = from_pairs(&[("TELEGRAM_BOT_TOKEN", "t"), ("SORTER_LIMIT", bad)]).unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "SORTER_LIMIT"),
                "{bad}: {err:?}"
            );
        }
    }
}
