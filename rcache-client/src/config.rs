//! # Client Configuration
//!
//! Purpose: Collect the options the client recognizes in one plain struct
//! that can be built in code or deserialized from any serde format.
//!
//! Validation happens in `CacheClient::new`, not here, so a config value is
//! just data until a client is built from it.

use serde::Deserialize;
use serde_json::Value;

use crate::descriptor::split_server_list;
use crate::error::{CacheError, CacheResult};
use crate::timeout::{Timeout, DEFAULT_TIMEOUT_SECS};

/// Server list as a delimited string or an explicit list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ServerList {
    /// `,` / `;` separated descriptors.
    Delimited(String),
    /// One descriptor per entry.
    List(Vec<String>),
}

impl ServerList {
    /// Returns the individual descriptors.
    pub fn to_vec(&self) -> CacheResult<Vec<String>> {
        match self {
            ServerList::Delimited(list) => split_server_list(list),
            ServerList::List(list) => {
                let servers: Vec<String> = list.iter().map(|server| server.trim().to_string()).collect();
                if servers.iter().any(String::is_empty) {
                    return Err(CacheError::config("empty entry in server list"));
                }
                Ok(servers)
            }
        }
    }
}

impl From<&str> for ServerList {
    fn from(list: &str) -> Self {
        ServerList::Delimited(list.to_string())
    }
}

impl From<Vec<String>> for ServerList {
    fn from(list: Vec<String>) -> Self {
        ServerList::List(list)
    }
}

/// Configuration for the cache client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server descriptors; the first is the primary.
    pub servers: ServerList,
    /// Explicit username, overriding URL credentials.
    pub username: Option<String>,
    /// Explicit password, overriding URL credentials.
    pub password: Option<String>,
    /// Driver name for every shard; defaults to each descriptor's scheme.
    pub driver: Option<String>,
    /// Serializer protocol: `null`, an integer, or an integer string.
    pub serializer_protocol: Option<Value>,
    /// Default expiry in seconds; `None` never expires.
    pub default_timeout: Option<i64>,
}

impl ClientConfig {
    /// Creates a configuration for the given servers with defaults elsewhere.
    pub fn new(servers: impl Into<ServerList>) -> Self {
        ClientConfig {
            servers: servers.into(),
            ..ClientConfig::default()
        }
    }

    /// Sets explicit credentials.
    pub fn with_auth(mut self, username: Option<&str>, password: Option<&str>) -> Self {
        self.username = username.map(str::to_string);
        self.password = password.map(str::to_string);
        self
    }

    /// Sets the driver used for every shard.
    pub fn with_driver(mut self, driver: &str) -> Self {
        self.driver = Some(driver.to_string());
        self
    }

    /// Sets the serializer protocol.
    pub fn with_serializer_protocol(mut self, protocol: u8) -> Self {
        self.serializer_protocol = Some(Value::from(protocol));
        self
    }

    /// Sets the default timeout.
    pub fn with_default_timeout(mut self, timeout: Option<i64>) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Default timeout as a `Timeout`.
    pub fn default_timeout(&self) -> Timeout {
        Timeout::from(self.default_timeout)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            servers: ServerList::Delimited("redis://127.0.0.1:6379".to_string()),
            username: None,
            password: None,
            driver: None,
            serializer_protocol: None,
            default_timeout: Some(DEFAULT_TIMEOUT_SECS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_with_defaults() {
        let config: ClientConfig = serde_json::from_str(r#"{"servers": "redis://a;redis://b"}"#).unwrap();
        assert_eq!(config.servers.to_vec().unwrap(), vec!["redis://a", "redis://b"]);
        assert_eq!(config.default_timeout(), Timeout::Seconds(DEFAULT_TIMEOUT_SECS));
        assert!(config.serializer_protocol.is_none());
    }

    #[test]
    fn null_timeout_means_never() {
        let config: ClientConfig = serde_json::from_str(
            r#"{"servers": ["redis://a", "redis://b"], "default_timeout": null, "serializer_protocol": "1"}"#,
        )
        .unwrap();
        assert_eq!(config.servers.to_vec().unwrap().len(), 2);
        assert_eq!(config.default_timeout(), Timeout::Never);
        assert_eq!(config.serializer_protocol, Some(Value::from("1")));
    }

    #[test]
    fn builder_sets_fields() {
        let config = ClientConfig::new("memory://x")
            .with_auth(Some("u"), Some("p"))
            .with_driver("memory")
            .with_serializer_protocol(1)
            .with_default_timeout(Some(5));
        assert_eq!(config.username.as_deref(), Some("u"));
        assert_eq!(config.password.as_deref(), Some("p"));
        assert_eq!(config.driver.as_deref(), Some("memory"));
        assert_eq!(config.serializer_protocol, Some(Value::from(1u8)));
        assert_eq!(config.default_timeout(), Timeout::Seconds(5));
    }

    #[test]
    fn rejects_blank_list_entries() {
        let list = ServerList::from(vec!["redis://a".to_string(), " ".to_string()]);
        assert!(list.to_vec().unwrap_err().is_config());
    }
}
