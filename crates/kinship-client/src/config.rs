//! Client configuration loaded from environment variables.
//!
//! All settings have defaults so the client starts with zero configuration.

use std::path::PathBuf;
use std::time::Duration;

use kinship_shared::constants::{
    DEFAULT_API_URL, DEFAULT_EVENT_CAPACITY, DEFAULT_MUTATION_RETRIES,
    DEFAULT_RELATIONSHIP_TTL_SECS,
};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the social-graph API.
    /// Env: `KINSHIP_API_URL`
    pub api_url: String,

    /// How long a resolved relationship is served from cache.
    /// Env: `KINSHIP_RELATIONSHIP_TTL_SECS`
    /// Default: 45 seconds.
    pub relationship_ttl: Duration,

    /// Extra attempts for a failed follow/unfollow before rolling back.
    /// Env: `KINSHIP_MUTATION_RETRIES`
    pub mutation_retries: u32,

    /// Buffered events per subscriber before it is considered lagged.
    /// Env: `KINSHIP_EVENT_CAPACITY`
    pub event_capacity: usize,

    /// Directory holding `kinship.db`. `None` uses the platform data dir.
    /// Env: `KINSHIP_DATA_DIR`
    pub data_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            relationship_ttl: Duration::from_secs(DEFAULT_RELATIONSHIP_TTL_SECS),
            mutation_retries: DEFAULT_MUTATION_RETRIES,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            data_dir: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("KINSHIP_API_URL") {
            let url = url.trim().trim_end_matches('/').to_string();
            if url.is_empty() {
                tracing::warn!("Empty KINSHIP_API_URL, using default");
            } else {
                config.api_url = url;
            }
        }

        if let Some(val) = lookup("KINSHIP_RELATIONSHIP_TTL_SECS") {
            match val.trim().parse::<u64>() {
                Ok(secs) => config.relationship_ttl = Duration::from_secs(secs),
                Err(e) => tracing::warn!(
                    value = %val,
                    error = %e,
                    "Invalid KINSHIP_RELATIONSHIP_TTL_SECS, using default"
                ),
            }
        }

        if let Some(val) = lookup("KINSHIP_MUTATION_RETRIES") {
            match val.trim().parse::<u32>() {
                Ok(n) => config.mutation_retries = n,
                Err(e) => tracing::warn!(
                    value = %val,
                    error = %e,
                    "Invalid KINSHIP_MUTATION_RETRIES, using default"
                ),
            }
        }

        if let Some(val) = lookup("KINSHIP_EVENT_CAPACITY") {
            match val.trim().parse::<usize>() {
                Ok(n) if n > 0 => config.event_capacity = n,
                _ => tracing::warn!(value = %val, "Invalid KINSHIP_EVENT_CAPACITY, using default"),
            }
        }

        if let Some(dir) = lookup("KINSHIP_DATA_DIR") {
            if !dir.trim().is_empty() {
                config.data_dir = Some(PathBuf::from(dir.trim()));
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.relationship_ttl, Duration::from_secs(45));
        assert_eq!(config.mutation_retries, 1);
        assert!(config.data_dir.is_none());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            ("KINSHIP_API_URL", "https://api.example.org/"),
            ("KINSHIP_RELATIONSHIP_TTL_SECS", "30"),
            ("KINSHIP_MUTATION_RETRIES", "0"),
            ("KINSHIP_DATA_DIR", "/tmp/kinship"),
        ]));
        assert_eq!(config.api_url, "https://api.example.org");
        assert_eq!(config.relationship_ttl, Duration::from_secs(30));
        assert_eq!(config.mutation_retries, 0);
        assert_eq!(config.data_dir, Some(PathBuf::from("/tmp/kinship")));
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            ("KINSHIP_RELATIONSHIP_TTL_SECS", "soon"),
            ("KINSHIP_EVENT_CAPACITY", "0"),
            ("KINSHIP_API_URL", "  "),
        ]));
        assert_eq!(config.relationship_ttl, Duration::from_secs(45));
        assert_eq!(config.event_capacity, 64);
        assert_eq!(config.api_url, "http://localhost:8080");
    }
}
