//! Connection configuration.
//!
//! Settings can be written by hand, read from a YAML file, and overridden
//! from `TFS_*` environment variables:
//!
//! ```yaml
//! server: http://tfs.example.com:8080/tfs
//! collection: DefaultCollection
//! username: builder
//! password: hunter2
//! probe_item_id: 1
//! ```

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_COLLECTION: &str = "DefaultCollection";
pub const DEFAULT_API_VERSION: &str = "5.0";

/// Errors raised while loading settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid value for {name}: {value}")]
    InvalidEnv { name: &'static str, value: String },
}

/// Where the service lives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Server address, e.g. `http://tfs:8080/tfs` or `https://dev.azure.com/org`.
    pub server: String,

    /// Collection, optionally followed by `/Project`.
    #[serde(default = "default_collection")]
    pub collection: String,

    #[serde(default = "default_api_version")]
    pub api_version: String,
}

fn default_collection() -> String {
    DEFAULT_COLLECTION.to_string()
}

fn default_api_version() -> String {
    DEFAULT_API_VERSION.to_string()
}

impl ServiceConfig {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            collection: default_collection(),
            api_version: default_api_version(),
        }
    }

    #[must_use]
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }
}

/// User name and password (or personal access token) for Basic auth.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Everything `connect` needs, in one loadable document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionSettings {
    #[serde(flatten)]
    pub service: ServiceConfig,

    #[serde(flatten)]
    pub credentials: Credentials,

    /// Known work item fetched to verify the connection.
    pub probe_item_id: i64,
}

impl ConnectionSettings {
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Apply `TFS_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply `TFS_*` overrides from an arbitrary lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("TFS_SERVER") {
            self.service.server = v;
        }
        if let Some(v) = lookup("TFS_COLLECTION") {
            self.service.collection = v;
        }
        if let Some(v) = lookup("TFS_API_VERSION") {
            self.service.api_version = v;
        }
        if let Some(v) = lookup("TFS_USERNAME") {
            self.credentials.username = v;
        }
        if let Some(v) = lookup("TFS_PASSWORD") {
            self.credentials.password = v;
        }
        if let Some(v) = lookup("TFS_PROBE_ITEM_ID") {
            self.probe_item_id = v.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                name: "TFS_PROBE_ITEM_ID",
                value: v.clone(),
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn yaml_defaults_collection_and_version() {
        let settings = ConnectionSettings::from_yaml_str(
            "server: http://tfs:8080/tfs\nusername: a\npassword: b\nprobe_item_id: 1\n",
        )
        .unwrap();
        assert_eq!(settings.service.collection, "DefaultCollection");
        assert_eq!(settings.service.api_version, "5.0");
        assert_eq!(settings.credentials.username, "a");
        assert_eq!(settings.probe_item_id, 1);
    }

    #[test]
    fn yaml_without_probe_is_rejected() {
        let err = ConnectionSettings::from_yaml_str("server: http://tfs\nusername: a\npassword: b\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Yaml(_)));
    }

    #[test]
    fn overrides_replace_values() {
        let mut settings = ConnectionSettings::from_yaml_str(
            "server: http://tfs\ncollection: Main\nusername: a\npassword: b\nprobe_item_id: 1\n",
        )
        .unwrap();
        let env: HashMap<&str, &str> =
            HashMap::from([("TFS_SERVER", "http://other"), ("TFS_PROBE_ITEM_ID", "17")]);
        settings
            .apply_overrides(|name| env.get(name).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(settings.service.server, "http://other");
        assert_eq!(settings.service.collection, "Main");
        assert_eq!(settings.probe_item_id, 17);
    }

    #[test]
    fn bad_probe_override_is_reported() {
        let mut settings = ConnectionSettings {
            service: ServiceConfig::new("http://tfs"),
            credentials: Credentials::default(),
            probe_item_id: 1,
        };
        let err = settings
            .apply_overrides(|name| (name == "TFS_PROBE_ITEM_ID").then(|| "one".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { name: "TFS_PROBE_ITEM_ID", .. }));
    }

    #[test]
    fn debug_hides_password() {
        let creds = Credentials::new("alice", "secret");
        let shown = format!("{creds:?}");
        assert!(shown.contains("alice"));
        assert!(!shown.contains("secret"));
    }
}
