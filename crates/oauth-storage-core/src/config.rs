//! Backend configuration.
//!
//! Both backends take a mapping of logical entity name to physical name
//! (collection name or key prefix). Recognized option keys override the
//! defaults, anything else in the mapping is ignored.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{StorageError, StorageResult};

/// The entity families a backend stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    Client,
    AccessToken,
    RefreshToken,
    AuthorizationCode,
    User,
    SigningKey,
    ClientKey,
    Jti,
    Scope,
}

impl Entity {
    pub const ALL: [Entity; 9] = [
        Entity::Client,
        Entity::AccessToken,
        Entity::RefreshToken,
        Entity::AuthorizationCode,
        Entity::User,
        Entity::SigningKey,
        Entity::ClientKey,
        Entity::Jti,
        Entity::Scope,
    ];
}

/// Collection names for the document backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentConfig {
    #[serde(default = "default_client_table")]
    pub client_table: String,
    #[serde(default = "default_access_token_table")]
    pub access_token_table: String,
    #[serde(default = "default_refresh_token_table")]
    pub refresh_token_table: String,
    #[serde(default = "default_code_table")]
    pub code_table: String,
    #[serde(default = "default_user_table")]
    pub user_table: String,
    #[serde(default = "default_key_table")]
    pub key_table: String,
    #[serde(default = "default_jwt_table")]
    pub jwt_table: String,
    #[serde(default = "default_jti_table")]
    pub jti_table: String,
    #[serde(default = "default_scope_table")]
    pub scope_table: String,
}

fn default_client_table() -> String { "oauth_apps".into() }
fn default_access_token_table() -> String { "oauth_access_tokens".into() }
fn default_refresh_token_table() -> String { "oauth_refresh_tokens".into() }
fn default_code_table() -> String { "oauth_authorization_codes".into() }
fn default_user_table() -> String { "oauth_users".into() }
fn default_key_table() -> String { "oauth_keys".into() }
fn default_jwt_table() -> String { "oauth_jwt".into() }
fn default_jti_table() -> String { "oauth_jti".into() }
fn default_scope_table() -> String { "oauth_scopes".into() }

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            client_table: default_client_table(),
            access_token_table: default_access_token_table(),
            refresh_token_table: default_refresh_token_table(),
            code_table: default_code_table(),
            user_table: default_user_table(),
            key_table: default_key_table(),
            jwt_table: default_jwt_table(),
            jti_table: default_jti_table(),
            scope_table: default_scope_table(),
        }
    }
}

impl DocumentConfig {
    /// Build from an arbitrary mapping such as a parsed config file section.
    pub fn from_value(value: serde_json::Value) -> StorageResult<Self> {
        from_mapping(value, "document storage configuration")
    }

    pub fn from_map(map: &HashMap<String, String>) -> StorageResult<Self> {
        Self::from_value(serde_json::to_value(map)?)
    }

    /// Collection name for an entity.
    pub fn table(&self, entity: Entity) -> &str {
        match entity {
            Entity::Client => &self.client_table,
            Entity::AccessToken => &self.access_token_table,
            Entity::RefreshToken => &self.refresh_token_table,
            Entity::AuthorizationCode => &self.code_table,
            Entity::User => &self.user_table,
            Entity::SigningKey => &self.key_table,
            Entity::ClientKey => &self.jwt_table,
            Entity::Jti => &self.jti_table,
            Entity::Scope => &self.scope_table,
        }
    }
}

/// Key prefixes for the key-value backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValueConfig {
    #[serde(default = "default_client_key")]
    pub client_key: String,
    #[serde(default = "default_access_token_key")]
    pub access_token_key: String,
    #[serde(default = "default_refresh_token_key")]
    pub refresh_token_key: String,
    #[serde(default = "default_code_key")]
    pub code_key: String,
    #[serde(default = "default_user_key")]
    pub user_key: String,
    #[serde(default = "default_key_key")]
    pub key_key: String,
    #[serde(default = "default_jwt_key")]
    pub jwt_key: String,
    #[serde(default = "default_jti_key")]
    pub jti_key: String,
    #[serde(default = "default_scope_key")]
    pub scope_key: String,
}

fn default_client_key() -> String { "oauth_apps:".into() }
fn default_access_token_key() -> String { "oauth_access_tokens:".into() }
fn default_refresh_token_key() -> String { "oauth_refresh_tokens:".into() }
fn default_code_key() -> String { "oauth_authorization_codes:".into() }
fn default_user_key() -> String { "oauth_users:".into() }
fn default_key_key() -> String { "oauth_keys:".into() }
fn default_jwt_key() -> String { "oauth_jwt:".into() }
fn default_jti_key() -> String { "oauth_jti:".into() }
fn default_scope_key() -> String { "oauth_scopes:".into() }

impl Default for KeyValueConfig {
    fn default() -> Self {
        Self {
            client_key: default_client_key(),
            access_token_key: default_access_token_key(),
            refresh_token_key: default_refresh_token_key(),
            code_key: default_code_key(),
            user_key: default_user_key(),
            key_key: default_key_key(),
            jwt_key: default_jwt_key(),
            jti_key: default_jti_key(),
            scope_key: default_scope_key(),
        }
    }
}

impl KeyValueConfig {
    pub fn from_value(value: serde_json::Value) -> StorageResult<Self> {
        from_mapping(value, "key-value storage configuration")
    }

    pub fn from_map(map: &HashMap<String, String>) -> StorageResult<Self> {
        Self::from_value(serde_json::to_value(map)?)
    }

    /// Key prefix for an entity.
    pub fn prefix(&self, entity: Entity) -> &str {
        match entity {
            Entity::Client => &self.client_key,
            Entity::AccessToken => &self.access_token_key,
            Entity::RefreshToken => &self.refresh_token_key,
            Entity::AuthorizationCode => &self.code_key,
            Entity::User => &self.user_key,
            Entity::SigningKey => &self.key_key,
            Entity::ClientKey => &self.jwt_key,
            Entity::Jti => &self.jti_key,
            Entity::Scope => &self.scope_key,
        }
    }

    /// Full key for an entity record: prefix followed by the natural key.
    pub fn key(&self, entity: Entity, natural_key: &str) -> String {
        format!("{}{}", self.prefix(entity), natural_key)
    }
}

/// Minimal connection descriptor for building a backend without a live client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionOptions {
    pub host: String,
    pub port: u16,
    /// Database name (document store) or numeric database index (key-value store).
    pub database: String,
}

impl ConnectionOptions {
    pub fn new(host: impl Into<String>, port: u16, database: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            database: database.into(),
        }
    }

    /// Parse a descriptor from a mapping with `host`, `port` and `database`.
    /// Missing fields take the given defaults.
    pub fn from_value(value: serde_json::Value, defaults: &ConnectionOptions) -> StorageResult<Self> {
        let serde_json::Value::Object(map) = value else {
            return Err(reject(
                "connection descriptor must be a mapping with host, port and database",
            ));
        };
        let mut merged = serde_json::to_value(defaults)?;
        if let Some(target) = merged.as_object_mut() {
            for (k, v) in map {
                target.insert(k, v);
            }
        }
        let options: Self = serde_json::from_value(merged).map_err(|e| {
            reject(format!("invalid connection descriptor: {e}"))
        })?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> StorageResult<()> {
        if self.host.trim().is_empty() {
            return Err(reject("connection host must not be empty"));
        }
        if self.port == 0 {
            return Err(reject("connection port must not be zero"));
        }
        if self.database.trim().is_empty() {
            return Err(reject(
                "connection database must not be empty",
            ));
        }
        Ok(())
    }
}

/// `InvalidArgument` for a rejected option, logged at warn.
fn reject(message: impl Into<String>) -> StorageError {
    let message = message.into();
    tracing::warn!(%message, "rejected storage configuration");
    StorageError::invalid_argument(message)
}

fn from_mapping<T: DeserializeOwned>(value: serde_json::Value, what: &str) -> StorageResult<T> {
    if !value.is_object() {
        return Err(reject(format!(
            "{what} must be a mapping of option name to value"
        )));
    }
    serde_json::from_value(value)
        .map_err(|e| reject(format!("invalid {what}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_defaults() {
        let config = DocumentConfig::default();
        assert_eq!(config.table(Entity::Client), "oauth_apps");
        assert_eq!(config.table(Entity::AuthorizationCode), "oauth_authorization_codes");
        assert_eq!(config.table(Entity::Scope), "oauth_scopes");
    }

    #[test]
    fn test_document_override_and_unknown_keys() {
        let config = DocumentConfig::from_value(serde_json::json!({
            "client_table": "apps",
            "not_an_option": "ignored",
        }))
        .unwrap();
        assert_eq!(config.client_table, "apps");
        assert_eq!(config.user_table, "oauth_users");
    }

    #[test]
    fn test_key_value_defaults_and_keys() {
        let config = KeyValueConfig::default();
        assert_eq!(config.key(Entity::AccessToken, "abc"), "oauth_access_tokens:abc");
        assert_eq!(config.prefix(Entity::Client), "oauth_apps:");
    }

    #[test]
    fn test_key_value_from_map() {
        let mut map = HashMap::new();
        map.insert("client_key".to_string(), "apps/".to_string());
        map.insert("bogus".to_string(), "x".to_string());
        let config = KeyValueConfig::from_map(&map).unwrap();
        assert_eq!(config.key(Entity::Client, "c1"), "apps/c1");
        assert_eq!(config.jwt_key, "oauth_jwt:");
    }

    #[test]
    fn test_config_rejects_non_mapping() {
        let err = DocumentConfig::from_value(serde_json::json!("oauth_apps")).unwrap_err();
        assert!(matches!(err, StorageError::InvalidArgument(_)));
        let err = KeyValueConfig::from_value(serde_json::json!([1, 2])).unwrap_err();
        assert!(matches!(err, StorageError::InvalidArgument(_)));
    }

    #[test]
    fn test_connection_descriptor_parsing() {
        let defaults = ConnectionOptions::new("localhost", 27017, "oauth2");
        let options = ConnectionOptions::from_value(
            serde_json::json!({"host": "db.internal", "database": "auth"}),
            &defaults,
        )
        .unwrap();
        assert_eq!(options, ConnectionOptions::new("db.internal", 27017, "auth"));
    }

    #[test]
    fn test_connection_descriptor_rejects_wrong_type() {
        let defaults = ConnectionOptions::new("localhost", 6379, "0");
        let err = ConnectionOptions::from_value(serde_json::json!("redis://x"), &defaults)
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidArgument(_)));

        let err = ConnectionOptions::from_value(serde_json::json!({"port": "high"}), &defaults)
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidArgument(_)));

        let err = ConnectionOptions::from_value(serde_json::json!({"host": ""}), &defaults)
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidArgument(_)));
    }

    #[derive(Clone, Default)]
    struct Captured(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_rejections_are_logged() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            assert!(DocumentConfig::from_value(serde_json::json!("nope")).is_err());
            assert!(ConnectionOptions::new("", 27017, "oauth2").validate().is_err());
        });

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("WARN"));
        assert!(output.contains("must be a mapping"));
        assert!(output.contains("host must not be empty"));
    }
}
