//! Cache configuration: what to connect to and which namespaces to bind.
//!
//! [`CacheConfig`] can be deserialized from any serde format (a section of
//! an application config file, typically) or read from environment variables
//! with [`CacheConfig::from_env`]:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `RTTP_CACHE_REDIS_URL` | `redis_url` |
//! | `RTTP_CACHE_POOL_SIZE` | `pool_size` |
//! | `RTTP_CACHE_TIMEOUT_SECS` | `timeout_secs` |
//! | `RTTP_CACHE_DEFAULT_NAMESPACE` | `default_namespace` |
//! | `RTTP_CACHE_DEFAULT_TTL_SECS` | `default_ttl_secs` |
//! | `RTTP_CACHE_NAMESPACES` | `namespaces`, as `name[=ttl_secs],...` |
//! | `RTTP_CACHE_FALLBACK_TO_MEMORY` | `fallback_to_memory` |
//! | `RTTP_CACHE_ALLOW_FLUSH` | `allow_flush_all` |

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::DEFAULT_NAMESPACE;
use crate::connection::RedisSettings;

/// Environment variable names read by [`CacheConfig::from_env`].
pub mod vars {
    pub const REDIS_URL: &str = "RTTP_CACHE_REDIS_URL";
    pub const POOL_SIZE: &str = "RTTP_CACHE_POOL_SIZE";
    pub const TIMEOUT_SECS: &str = "RTTP_CACHE_TIMEOUT_SECS";
    pub const DEFAULT_NAMESPACE: &str = "RTTP_CACHE_DEFAULT_NAMESPACE";
    pub const DEFAULT_TTL_SECS: &str = "RTTP_CACHE_DEFAULT_TTL_SECS";
    pub const NAMESPACES: &str = "RTTP_CACHE_NAMESPACES";
    pub const FALLBACK_TO_MEMORY: &str = "RTTP_CACHE_FALLBACK_TO_MEMORY";
    pub const ALLOW_FLUSH: &str = "RTTP_CACHE_ALLOW_FLUSH";
}

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {message}")]
    InvalidValue { var: String, message: String },

    #[error("malformed cache config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// One configured namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceConfig {
    pub name: String,
    /// Overrides [`CacheConfig::default_ttl_secs`] for this namespace.
    #[serde(default)]
    pub ttl_secs: Option<u64>,
}

/// Settings for building a [`CacheRegistry`](crate::cache::CacheRegistry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Redis to connect to. `None` keeps every namespace in memory.
    pub redis_url: Option<String>,
    pub pool_size: usize,
    /// Pool wait/create/recycle timeout.
    pub timeout_secs: u64,
    pub default_namespace: String,
    /// TTL for namespaces that do not set one. `None` means no expiry.
    pub default_ttl_secs: Option<u64>,
    pub namespaces: Vec<NamespaceConfig>,
    /// Use the in-memory store if Redis does not answer at startup.
    pub fallback_to_memory: bool,
    /// Permit [`CacheRegistry::flush_all`](crate::cache::CacheRegistry::flush_all).
    pub allow_flush_all: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            pool_size: 16,
            timeout_secs: 5,
            default_namespace: DEFAULT_NAMESPACE.to_owned(),
            default_ttl_secs: None,
            namespaces: Vec::new(),
            fallback_to_memory: true,
            allow_flush_all: false,
        }
    }
}

impl CacheConfig {
    /// Parses a JSON document; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads the `RTTP_CACHE_*` variables from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(url) = get(vars::REDIS_URL) {
            config.redis_url = Some(url);
        }
        if let Some(raw) = get(vars::POOL_SIZE) {
            config.pool_size = parse(vars::POOL_SIZE, &raw)?;
        }
        if let Some(raw) = get(vars::TIMEOUT_SECS) {
            config.timeout_secs = parse(vars::TIMEOUT_SECS, &raw)?;
        }
        if let Some(name) = get(vars::DEFAULT_NAMESPACE) {
            config.default_namespace = name;
        }
        if let Some(raw) = get(vars::DEFAULT_TTL_SECS) {
            config.default_ttl_secs = Some(parse(vars::DEFAULT_TTL_SECS, &raw)?);
        }
        if let Some(raw) = get(vars::NAMESPACES) {
            config.namespaces = parse_namespaces(&raw)?;
        }
        if let Some(raw) = get(vars::FALLBACK_TO_MEMORY) {
            config.fallback_to_memory = parse_bool(vars::FALLBACK_TO_MEMORY, &raw)?;
        }
        if let Some(raw) = get(vars::ALLOW_FLUSH) {
            config.allow_flush_all = parse_bool(vars::ALLOW_FLUSH, &raw)?;
        }

        Ok(config)
    }

    /// Redis connection settings, if a URL is configured.
    pub fn redis_settings(&self) -> Option<RedisSettings> {
        self.redis_url.as_ref().map(|url| RedisSettings {
            url: url.clone(),
            pool_size: self.pool_size,
            timeout: Duration::from_secs(self.timeout_secs),
        })
    }
}

fn parse<T>(var: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        var: var.to_owned(),
        message: format!("`{raw}`: {e}"),
    })
}

fn parse_bool(var: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            var: var.to_owned(),
            message: format!("`{raw}` is not a boolean"),
        }),
    }
}

// `default,sessions=600,results`
fn parse_namespaces(raw: &str) -> Result<Vec<NamespaceConfig>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| match item.split_once('=') {
            Some((name, ttl)) => Ok(NamespaceConfig {
                name: name.trim().to_owned(),
                ttl_secs: Some(parse(vars::NAMESPACES, ttl)?),
            }),
            None => Ok(NamespaceConfig {
                name: item.to_owned(),
                ttl_secs: None,
            }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.default_namespace, "default");
        assert!(config.redis_url.is_none());
        assert!(config.redis_settings().is_none());
        assert!(config.fallback_to_memory);
        assert!(!config.allow_flush_all);
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let config = CacheConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, CacheConfig::default());
    }

    #[test]
    fn reads_every_variable() {
        let config = CacheConfig::from_lookup(lookup(&[
            (vars::REDIS_URL, "redis://cache:6379/2"),
            (vars::POOL_SIZE, "4"),
            (vars::TIMEOUT_SECS, " 2 "),
            (vars::DEFAULT_NAMESPACE, "main"),
            (vars::DEFAULT_TTL_SECS, "300"),
            (vars::NAMESPACES, "redis-test, redis-results=60,"),
            (vars::FALLBACK_TO_MEMORY, "no"),
            (vars::ALLOW_FLUSH, "TRUE"),
        ]))
        .unwrap();

        assert_eq!(config.redis_url.as_deref(), Some("redis://cache:6379/2"));
        assert_eq!(config.pool_size, 4);
        assert_eq!(config.timeout_secs, 2);
        assert_eq!(config.default_namespace, "main");
        assert_eq!(config.default_ttl_secs, Some(300));
        assert_eq!(
            config.namespaces,
            vec![
                NamespaceConfig {
                    name: "redis-test".into(),
                    ttl_secs: None
                },
                NamespaceConfig {
                    name: "redis-results".into(),
                    ttl_secs: Some(60)
                },
            ]
        );
        assert!(!config.fallback_to_memory);
        assert!(config.allow_flush_all);

        let settings = config.redis_settings().unwrap();
        assert_eq!(settings.pool_size, 4);
        assert_eq!(settings.timeout, Duration::from_secs(2));
    }

    #[test]
    fn invalid_values_name_the_variable() {
        let err = CacheConfig::from_lookup(lookup(&[(vars::POOL_SIZE, "many")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref var, .. } if var == vars::POOL_SIZE));

        let err =
            CacheConfig::from_lookup(lookup(&[(vars::ALLOW_FLUSH, "maybe")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref var, .. } if var == vars::ALLOW_FLUSH));

        let err = CacheConfig::from_lookup(lookup(&[(vars::NAMESPACES, "a=soon")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn json_fills_missing_fields_with_defaults() {
        let config = CacheConfig::from_json(
            r#"{"redis_url":"redis://localhost","namespaces":[{"name":"results","ttl_secs":30}]}"#,
        )
        .unwrap();
        assert_eq!(config.redis_url.as_deref(), Some("redis://localhost"));
        assert_eq!(config.pool_size, 16);
        assert_eq!(config.namespaces[0].ttl_secs, Some(30));

        assert!(matches!(
            CacheConfig::from_json("{\"pool_size\":\"big\"}"),
            Err(ConfigError::Parse(_))
        ));
    }
}
