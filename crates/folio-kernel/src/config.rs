//! folio configuration (`folio.toml`).
//!
//! ```toml
//! [lookup]
//! api_key_env = "MY_SEARCH_KEY"   # or api_key = "..."
//! engine_id = "0123456789abcdef"  # or engine_id_env = "..."
//!
//! [ingest]
//! policy = "manual"               # auto-resolve | manual | suppress
//!
//! [store]
//! rollback_on_failure = true
//! queue_capacity_warn = 64
//! ```
//!
//! Every section and key is optional; a missing file yields the defaults.

use std::path::{Path, PathBuf};

use folio_client::StoreConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::materializer::ResolutionPolicy;

/// Standard environment variable for the image search API key.
pub const STANDARD_API_KEY_ENV: &str = "GOOGLE_API_KEY";
/// Standard environment variable for the search engine id.
pub const STANDARD_ENGINE_ID_ENV: &str = "GOOGLE_CSE_ID";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FolioConfig {
    pub lookup: LookupConfig,
    pub ingest: IngestConfig,
    pub store: StoreConfig,
}

impl FolioConfig {
    /// `<config dir>/folio/folio.toml`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("folio").join("folio.toml"))
    }

    /// Load from `path`. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        Self::parse(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load from `path` when given, otherwise from [`default_path`](Self::default_path).
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path.map(Path::to_path_buf).or_else(Self::default_path) {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

/// Image search credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Environment variable holding the API key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine_id: Option<String>,
    /// Environment variable holding the engine id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine_id_env: Option<String>,
}

/// Resolved lookup credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct LookupCredentials {
    pub api_key: String,
    pub engine_id: String,
}

impl std::fmt::Debug for LookupCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LookupCredentials")
            .field("api_key", &"<redacted>")
            .field("engine_id", &self.engine_id)
            .finish()
    }
}

impl LookupConfig {
    /// Resolve credentials through `env`.
    ///
    /// Each value comes from the inline setting, else the named variable,
    /// else the standard variable. Both values are required; empty strings
    /// count as missing.
    pub fn resolve_with(&self, env: impl Fn(&str) -> Option<String>) -> Option<LookupCredentials> {
        let api_key = resolve_value(&self.api_key, &self.api_key_env, STANDARD_API_KEY_ENV, &env);
        let engine_id = resolve_value(
            &self.engine_id,
            &self.engine_id_env,
            STANDARD_ENGINE_ID_ENV,
            &env,
        );
        match (api_key, engine_id) {
            (Some(api_key), Some(engine_id)) => Some(LookupCredentials { api_key, engine_id }),
            (api_key, engine_id) => {
                debug!(
                    api_key_set = api_key.is_some(),
                    engine_id_set = engine_id.is_some(),
                    "lookup credentials incomplete"
                );
                None
            }
        }
    }
}

fn resolve_value(
    inline: &Option<String>,
    env_name: &Option<String>,
    standard: &str,
    env: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    if let Some(value) = inline {
        return Some(value.clone()).filter(|v| !v.is_empty());
    }
    if let Some(name) = env_name {
        return env(name).filter(|v| !v.is_empty());
    }
    env(standard).filter(|v| !v.is_empty())
}

/// Ingestion defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub policy: ResolutionPolicy,
    /// Title used when generation output carries none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_title: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_empty_config_is_default() {
        let config = FolioConfig::parse("").unwrap();
        assert_eq!(config, FolioConfig::default());
        assert_eq!(config.ingest.policy, ResolutionPolicy::AutoResolve);
        assert!(config.store.rollback_on_failure);
    }

    #[test]
    fn test_parse_sections() {
        let config = FolioConfig::parse(
            r#"
            [lookup]
            api_key_env = "SEARCH_KEY"
            engine_id = "cx-1"

            [ingest]
            policy = "manual"

            [store]
            rollback_on_failure = false
            "#,
        )
        .unwrap();
        assert_eq!(config.ingest.policy, ResolutionPolicy::Manual);
        assert!(!config.store.rollback_on_failure);
        assert_eq!(config.store.queue_capacity_warn, 64);
        assert_eq!(config.lookup.api_key_env.as_deref(), Some("SEARCH_KEY"));
    }

    #[test]
    fn test_policy_aliases() {
        let config = FolioConfig::parse("[ingest]\npolicy = \"none\"").unwrap();
        assert_eq!(config.ingest.policy, ResolutionPolicy::Suppress);
        let config = FolioConfig::parse("[ingest]\npolicy = \"google\"").unwrap();
        assert_eq!(config.ingest.policy, ResolutionPolicy::AutoResolve);
    }

    #[test]
    fn test_credentials_resolution_order() {
        let env = env_of(&[
            ("GOOGLE_API_KEY", "standard-key"),
            ("GOOGLE_CSE_ID", "standard-cx"),
            ("MY_KEY", "named-key"),
        ]);

        let standard = LookupConfig::default().resolve_with(&env).unwrap();
        assert_eq!(standard.api_key, "standard-key");
        assert_eq!(standard.engine_id, "standard-cx");

        let named = LookupConfig {
            api_key_env: Some("MY_KEY".into()),
            ..Default::default()
        }
        .resolve_with(&env)
        .unwrap();
        assert_eq!(named.api_key, "named-key");

        let inline = LookupConfig {
            api_key: Some("inline".into()),
            api_key_env: Some("MY_KEY".into()),
            ..Default::default()
        }
        .resolve_with(&env)
        .unwrap();
        assert_eq!(inline.api_key, "inline");
    }

    #[test]
    fn test_missing_credentials_resolve_to_none() {
        let only_key = env_of(&[("GOOGLE_API_KEY", "k")]);
        assert!(LookupConfig::default().resolve_with(&only_key).is_none());

        let empty = env_of(&[("GOOGLE_API_KEY", ""), ("GOOGLE_CSE_ID", "cx")]);
        assert!(LookupConfig::default().resolve_with(&empty).is_none());

        // A named variable that is unset does not fall back to the standard one.
        let standard = env_of(&[("GOOGLE_API_KEY", "k"), ("GOOGLE_CSE_ID", "cx")]);
        let config = LookupConfig {
            api_key_env: Some("UNSET".into()),
            ..Default::default()
        };
        assert!(config.resolve_with(&standard).is_none());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = FolioConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, FolioConfig::default());
    }

    #[test]
    fn test_load_reports_parse_errors_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("folio.toml");
        std::fs::write(&path, "[store\n").unwrap();
        let err = FolioConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("folio.toml"));
    }
}
