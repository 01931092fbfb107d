// Stored entity shapes.
//
// Field names are the on-disk names: the document backend stores these as
// document fields and the key-value backend serializes them as JSON objects.
// Optional fields serialize as explicit nulls so both backends round-trip them.
// Timestamps are absolute Unix-epoch seconds.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Algorithm reported for signing keys that do not name one.
pub const DEFAULT_ENCRYPTION_ALGORITHM: &str = "RS256";

/// A registered OAuth client application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub app_id: String,
    /// Empty or missing means the client is public.
    #[serde(default)]
    pub app_secret: Option<String>,
    #[serde(default)]
    pub redirect_uri: Option<String>,
    /// Space-separated allow-list. Missing means unrestricted.
    #[serde(default)]
    pub grant_types: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    /// Owning user.
    #[serde(default)]
    pub user_id: Option<String>,
}

impl Client {
    pub fn new(app_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            app_secret: None,
            redirect_uri: None,
            grant_types: None,
            scope: None,
            user_id: None,
        }
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.app_secret = Some(secret.into());
        self
    }

    pub fn with_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(uri.into());
        self
    }

    pub fn with_grant_types(mut self, grant_types: impl Into<String>) -> Self {
        self.grant_types = Some(grant_types.into());
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn is_public(&self) -> bool {
        self.app_secret.as_deref().map_or(true, str::is_empty)
    }

    /// Plain comparison when both secrets are present. A client stored
    /// with an empty secret matches an empty secret.
    pub fn secret_matches(&self, secret: Option<&str>) -> bool {
        match (self.app_secret.as_deref(), secret) {
            (Some(stored), Some(given)) => stored == given,
            _ => false,
        }
    }

    /// A missing or blank grant type list leaves the client unrestricted.
    pub fn allows_grant_type(&self, grant_type: &str) -> bool {
        match self.grant_types.as_deref() {
            Some(list) if !list.trim().is_empty() => {
                list.split_whitespace().any(|g| g == grant_type)
            }
            _ => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    pub app_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub expires: i64,
    #[serde(default)]
    pub scope: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshToken {
    pub refresh_token: String,
    pub app_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub expires: i64,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Single-use authorization code. `id_token` is set for OpenID Connect codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationCode {
    pub authorization_code: String,
    pub app_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub redirect_uri: Option<String>,
    pub expires: i64,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
}

/// Resource owner credentials. The password is stored as given; hashing is
/// the caller's job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

/// A user record as surfaced to grant logic, with `user_id` equal to the username.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDetails {
    pub user_id: String,
    #[serde(flatten)]
    pub user: User,
}

impl From<User> for UserDetails {
    fn from(user: User) -> Self {
        Self {
            user_id: user.username.clone(),
            user,
        }
    }
}

/// Signing key material. `app_id == None` is the global default record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningKey {
    #[serde(default)]
    pub app_id: Option<String>,
    pub public_key: String,
    pub private_key: String,
    #[serde(default)]
    pub encryption_algorithm: Option<String>,
}

impl SigningKey {
    pub fn algorithm(&self) -> &str {
        self.encryption_algorithm
            .as_deref()
            .unwrap_or(DEFAULT_ENCRYPTION_ALGORITHM)
    }
}

/// JWT-bearer key registered for a client and subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientKey {
    #[serde(default)]
    pub app_id: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    pub key: String,
}

/// Result of a JWT-bearer key lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientKeyLookup {
    /// No key is registered for the client.
    NotFound,
    /// The client has a key, but not for the requested subject.
    SubjectMismatch,
    Key(String),
}

impl ClientKeyLookup {
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Key(key) => Some(key),
            _ => None,
        }
    }
}

/// A recorded JWT assertion identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jti {
    pub app_id: String,
    pub subject: String,
    pub audience: String,
    pub expires: i64,
    pub jti: String,
}

/// Which scope namespace a scope string belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeType {
    /// Granted when a request names no scope.
    Default,
    /// Used to validate requested scope.
    Supported,
}

impl ScopeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Supported => "supported",
        }
    }
}

impl fmt::Display for ScopeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScopeType {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(Self::Default),
            "supported" => Ok(Self::Supported),
            other => {
                tracing::warn!(scope_type = other, "rejected unknown scope type");
                Err(StorageError::invalid_argument(format!(
                    "scope type must be one of \"default\", \"supported\" (got \"{other}\")"
                )))
            }
        }
    }
}

/// True when every space-separated scope in `requested` is in `supported`.
pub fn scope_is_subset(requested: &str, supported: &str) -> bool {
    let supported: Vec<&str> = supported.split_whitespace().collect();
    requested
        .split_whitespace()
        .all(|scope| supported.contains(&scope))
}

/// Current Unix time in seconds.
pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_client_detection() {
        assert!(Client::new("a").is_public());
        assert!(Client::new("a").with_secret("").is_public());
        assert!(!Client::new("a").with_secret("x").is_public());
    }

    #[test]
    fn test_secret_matching() {
        let client = Client::new("a").with_secret("s3cret");
        assert!(client.secret_matches(Some("s3cret")));
        assert!(!client.secret_matches(Some("wrong")));
        assert!(!client.secret_matches(None));

        let public = Client::new("p").with_secret("");
        assert!(public.secret_matches(Some("")));
        assert!(!public.secret_matches(Some("x")));
        assert!(!Client::new("n").secret_matches(Some("")));
    }

    #[test]
    fn test_grant_type_restriction() {
        let open = Client::new("a");
        assert!(open.allows_grant_type("anything"));

        let implicit = Client::new("b").with_grant_types("implicit");
        assert!(implicit.allows_grant_type("implicit"));
        assert!(!implicit.allows_grant_type("authorization_code"));

        let several = Client::new("c").with_grant_types("client_credentials refresh_token");
        assert!(several.allows_grant_type("refresh_token"));
        assert!(!several.allows_grant_type("refresh"));

        assert!(Client::new("d").with_grant_types("").allows_grant_type("implicit"));
        assert!(Client::new("e").with_grant_types("  ").allows_grant_type("implicit"));
    }

    #[test]
    fn test_user_details_injects_user_id() {
        let details = UserDetails::from(User {
            username: "alice".into(),
            password: "pw".into(),
            first_name: Some("Alice".into()),
            last_name: None,
        });
        assert_eq!(details.user_id, "alice");

        let json = serde_json::to_value(&details).unwrap();
        assert_eq!(json["user_id"], "alice");
        assert_eq!(json["username"], "alice");
        assert_eq!(json["first_name"], "Alice");
    }

    #[test]
    fn test_signing_key_default_algorithm() {
        let key = SigningKey {
            app_id: None,
            public_key: "pub".into(),
            private_key: "priv".into(),
            encryption_algorithm: None,
        };
        assert_eq!(key.algorithm(), DEFAULT_ENCRYPTION_ALGORITHM);
    }

    #[test]
    fn test_scope_type_parsing() {
        assert_eq!("default".parse::<ScopeType>().unwrap(), ScopeType::Default);
        assert_eq!("supported".parse::<ScopeType>().unwrap(), ScopeType::Supported);
        let err = "admin".parse::<ScopeType>().unwrap_err();
        assert!(matches!(err, StorageError::InvalidArgument(_)));
    }

    #[test]
    fn test_scope_subset() {
        assert!(scope_is_subset("read", "read write"));
        assert!(scope_is_subset("write read", "read write"));
        assert!(!scope_is_subset("read admin", "read write"));
        assert!(!scope_is_subset("read", ""));
        assert!(scope_is_subset("", "read"));
    }

    #[test]
    fn test_optional_fields_round_trip_as_null() {
        let token = AccessToken {
            access_token: "t".into(),
            app_id: "a".into(),
            user_id: None,
            expires: 1_700_000_000,
            scope: None,
        };
        let json = serde_json::to_value(&token).unwrap();
        assert!(json["user_id"].is_null());
        let back: AccessToken = serde_json::from_value(json).unwrap();
        assert_eq!(back, token);
    }
}
