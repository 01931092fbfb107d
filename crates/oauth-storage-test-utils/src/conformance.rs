// Storage conformance checks.
//
// Each check panics on a violated property and propagates storage errors, so
// a backend that fails transiently is reported as an error rather than as a
// wrong answer.

use oauth_storage_core::db::capabilities::{
    AccessTokenStorage, AuthorizationCodeStorage, ClientCredentialsStorage, ClientStorage,
    JtiStorage, JwtBearerStorage, PublicKeyStorage, RefreshTokenStorage, ScopeStorage,
    UserCredentialsStorage,
};
use oauth_storage_core::db::models::{
    now, AccessToken, AuthorizationCode, Client, ClientKeyLookup, Jti, RefreshToken, ScopeType,
    User, DEFAULT_ENCRYPTION_ALGORITHM,
};
use oauth_storage_core::error::{StorageError, StorageResult};

/// Every capability at once. Blanket-implemented.
pub trait FullStorage:
    ClientCredentialsStorage
    + ClientStorage
    + AccessTokenStorage
    + RefreshTokenStorage
    + AuthorizationCodeStorage
    + UserCredentialsStorage
    + PublicKeyStorage
    + JwtBearerStorage
    + ScopeStorage
    + JtiStorage
{
}

impl<T> FullStorage for T where
    T: ClientCredentialsStorage
        + ClientStorage
        + AccessTokenStorage
        + RefreshTokenStorage
        + AuthorizationCodeStorage
        + UserCredentialsStorage
        + PublicKeyStorage
        + JwtBearerStorage
        + ScopeStorage
        + JtiStorage
{
}

/// A key that no other check will collide with.
pub fn unique(prefix: &str) -> String {
    format!("{prefix}-{}", uuid::Uuid::new_v4())
}

/// An expiry an hour from now.
pub fn in_one_hour() -> i64 {
    now() + 3600
}

pub fn access_token(token: &str, app_id: &str) -> AccessToken {
    AccessToken {
        access_token: token.to_string(),
        app_id: app_id.to_string(),
        user_id: Some("user".into()),
        expires: in_one_hour(),
        scope: Some("read".into()),
    }
}

pub fn refresh_token(token: &str, app_id: &str) -> RefreshToken {
    RefreshToken {
        refresh_token: token.to_string(),
        app_id: app_id.to_string(),
        user_id: Some("user".into()),
        expires: in_one_hour(),
        scope: None,
    }
}

pub fn authorization_code(code: &str, app_id: &str) -> AuthorizationCode {
    AuthorizationCode {
        authorization_code: code.to_string(),
        app_id: app_id.to_string(),
        user_id: Some("user".into()),
        redirect_uri: Some("https://client.example.com/cb".into()),
        expires: in_one_hour(),
        scope: Some("openid".into()),
        id_token: None,
    }
}

/// Lookups of keys that were never written come back empty, not as errors.
pub async fn missing_records_are_not_errors<S: FullStorage>(storage: &S) -> StorageResult<()> {
    let missing = unique("missing");

    assert!(storage.get_client_details(&missing).await?.is_none());
    assert!(!storage.check_client_credentials(&missing, Some("secret")).await?);
    assert!(!storage.is_public_client(&missing).await?);
    assert!(storage.get_client_scope(&missing).await?.is_none());
    assert!(storage.get_access_token(&missing).await?.is_none());
    assert!(storage.get_refresh_token(&missing).await?.is_none());
    assert!(storage.get_authorization_code(&missing).await?.is_none());
    assert!(!storage.check_user_credentials(&missing, "pw").await?);
    assert!(storage.get_user_details(&missing).await?.is_none());
    assert_eq!(
        storage.get_client_key(&missing, "subject").await?,
        ClientKeyLookup::NotFound
    );
    assert!(!storage.unset_access_token(&missing).await?);
    assert!(!storage.unset_refresh_token(&missing).await?);
    assert!(!storage.expire_authorization_code(&missing).await?);
    Ok(())
}

/// Setting the same client twice leaves one record with the last values.
pub async fn client_upsert_is_idempotent<S: ClientStorage>(storage: &S) -> StorageResult<()> {
    let app_id = unique("client");

    storage
        .set_client_details(
            &Client::new(&app_id)
                .with_secret("first")
                .with_redirect_uri("https://a.example.com")
                .with_scope("read"),
        )
        .await?;
    let second = Client::new(&app_id)
        .with_secret("somesecret")
        .with_redirect_uri("http://test.com")
        .with_grant_types("client_credentials")
        .with_scope("clientscope1")
        .with_user_id("brent@example.com");
    storage.set_client_details(&second).await?;

    let stored = storage.get_client_details(&app_id).await?;
    assert_eq!(stored.as_ref(), Some(&second));
    assert_eq!(
        storage.get_client_scope(&app_id).await?.as_deref(),
        Some("clientscope1")
    );
    Ok(())
}

pub async fn public_client_detection<S>(storage: &S) -> StorageResult<()>
where
    S: ClientStorage + ClientCredentialsStorage,
{
    let public_id = unique("public-client");
    let confidential_id = unique("confidential-client");

    storage
        .set_client_details(&Client::new(&public_id).with_secret(""))
        .await?;
    storage
        .set_client_details(&Client::new(&confidential_id).with_secret("some-secret"))
        .await?;

    assert!(storage.is_public_client(&public_id).await?);
    assert!(!storage.is_public_client(&confidential_id).await?);

    assert!(storage
        .check_client_credentials(&confidential_id, Some("some-secret"))
        .await?);
    assert!(!storage
        .check_client_credentials(&confidential_id, Some("wrong"))
        .await?);
    // The stored empty secret is compared like any other.
    assert!(storage
        .check_client_credentials(&public_id, Some(""))
        .await?);
    assert!(!storage
        .check_client_credentials(&public_id, Some("anything"))
        .await?);
    Ok(())
}

pub async fn grant_type_restriction<S: ClientStorage>(storage: &S) -> StorageResult<()> {
    let open = unique("open-client");
    let implicit = unique("implicit-client");
    let blank = unique("blank-grants-client");

    storage.set_client_details(&Client::new(&open)).await?;
    storage
        .set_client_details(&Client::new(&blank).with_grant_types(""))
        .await?;
    storage
        .set_client_details(&Client::new(&implicit).with_grant_types("implicit"))
        .await?;

    assert!(storage.check_restricted_grant_type(&open, "anything").await?);
    assert!(storage.check_restricted_grant_type(&blank, "implicit").await?);
    assert!(storage.check_restricted_grant_type(&implicit, "implicit").await?);
    assert!(!storage
        .check_restricted_grant_type(&implicit, "authorization_code")
        .await?);
    Ok(())
}

/// Re-issuing an access token overwrites the record in place.
pub async fn access_token_reissue_overwrites<S: AccessTokenStorage>(
    storage: &S,
) -> StorageResult<()> {
    let token = unique("access");
    storage.set_access_token(&access_token(&token, "client-a")).await?;

    let mut reissued = access_token(&token, "client-b");
    reissued.scope = Some("read write".into());
    storage.set_access_token(&reissued).await?;

    assert_eq!(storage.get_access_token(&token).await?, Some(reissued));
    Ok(())
}

pub async fn token_revocation<S>(storage: &S) -> StorageResult<()>
where
    S: AccessTokenStorage + RefreshTokenStorage + AuthorizationCodeStorage,
{
    let access = unique("access");
    let stored = access_token(&access, "client");
    storage.set_access_token(&stored).await?;
    assert_eq!(storage.get_access_token(&access).await?, Some(stored));
    assert!(storage.unset_access_token(&access).await?);
    assert!(storage.get_access_token(&access).await?.is_none());
    assert!(!storage.unset_access_token(&access).await?);

    let refresh = unique("refresh");
    let stored = refresh_token(&refresh, "client");
    storage.set_refresh_token(&stored).await?;
    assert_eq!(storage.get_refresh_token(&refresh).await?, Some(stored));
    assert!(storage.unset_refresh_token(&refresh).await?);
    assert!(storage.get_refresh_token(&refresh).await?.is_none());
    assert!(!storage.unset_refresh_token(&refresh).await?);

    let code = unique("code");
    let mut stored = authorization_code(&code, "client");
    stored.id_token = Some("header.payload.signature".into());
    storage.set_authorization_code(&stored).await?;
    assert_eq!(storage.get_authorization_code(&code).await?, Some(stored));
    assert!(storage.expire_authorization_code(&code).await?);
    assert!(storage.get_authorization_code(&code).await?.is_none());
    assert!(!storage.expire_authorization_code(&code).await?);
    Ok(())
}

pub async fn user_credentials<S: UserCredentialsStorage>(storage: &S) -> StorageResult<()> {
    let username = unique("user");
    storage
        .set_user(&User {
            username: username.clone(),
            password: "old".into(),
            first_name: None,
            last_name: None,
        })
        .await?;
    storage
        .set_user(&User {
            username: username.clone(),
            password: "password".into(),
            first_name: Some("Brent".into()),
            last_name: Some("Shaffer".into()),
        })
        .await?;

    assert!(storage.check_user_credentials(&username, "password").await?);
    assert!(!storage.check_user_credentials(&username, "old").await?);

    let details = storage
        .get_user_details(&username)
        .await?
        .expect("user was just stored");
    assert_eq!(details.user_id, username);
    assert_eq!(details.user.first_name.as_deref(), Some("Brent"));
    Ok(())
}

/// Expects no global signing key to exist yet.
pub async fn signing_key_fallback<S: PublicKeyStorage>(storage: &S) -> StorageResult<()> {
    let with_own = unique("keyed-client");
    let without_own = unique("plain-client");

    assert_eq!(
        storage.get_encryption_algorithm(Some(&without_own)).await?,
        DEFAULT_ENCRYPTION_ALGORITHM
    );
    assert!(storage.get_public_key(Some(&without_own)).await?.is_none());
    assert!(storage.get_private_key(None).await?.is_none());

    storage
        .set_keys(None, "global-public", "global-private", None)
        .await?;
    storage
        .set_keys(Some(&with_own), "own-public", "own-private", Some("ES256"))
        .await?;

    assert_eq!(
        storage.get_public_key(Some(&without_own)).await?.as_deref(),
        Some("global-public")
    );
    assert_eq!(
        storage.get_private_key(Some(&without_own)).await?.as_deref(),
        Some("global-private")
    );
    assert_eq!(
        storage.get_encryption_algorithm(Some(&without_own)).await?,
        DEFAULT_ENCRYPTION_ALGORITHM
    );
    assert_eq!(
        storage.get_public_key(Some(&with_own)).await?.as_deref(),
        Some("own-public")
    );
    assert_eq!(storage.get_encryption_algorithm(Some(&with_own)).await?, "ES256");
    assert_eq!(
        storage.get_public_key(None).await?.as_deref(),
        Some("global-public")
    );
    Ok(())
}

pub async fn client_key_lookup<S: JwtBearerStorage>(storage: &S) -> StorageResult<()> {
    let app_id = unique("jwt-client");
    storage
        .set_client_key(&app_id, "public-key-pem", Some("test_subject"))
        .await?;

    assert_eq!(
        storage.get_client_key(&app_id, "test_subject").await?,
        ClientKeyLookup::Key("public-key-pem".into())
    );
    assert_eq!(
        storage.get_client_key(&app_id, "someone_else").await?,
        ClientKeyLookup::SubjectMismatch
    );
    assert_eq!(
        storage.get_client_key("this-is-not-real", "nor-is-this").await?,
        ClientKeyLookup::NotFound
    );
    Ok(())
}

/// Expects no global scope entries to exist yet.
pub async fn scope_membership_and_defaults<S: ScopeStorage>(storage: &S) -> StorageResult<()> {
    let app_id = unique("scoped-client");

    assert!(!storage.scope_exists("read").await?);
    assert!(storage.get_default_scope(None).await?.is_none());

    storage
        .set_scope("read write", None, ScopeType::Supported)
        .await?;
    assert!(storage.scope_exists("read").await?);
    assert!(storage.scope_exists("write read").await?);
    assert!(!storage.scope_exists("read admin").await?);

    storage.set_scope("read", None, ScopeType::Default).await?;
    assert_eq!(
        storage.get_default_scope(Some(&app_id)).await?.as_deref(),
        Some("read")
    );

    storage
        .set_scope("read write", Some(&app_id), ScopeType::Default)
        .await?;
    assert_eq!(
        storage.get_default_scope(Some(&app_id)).await?.as_deref(),
        Some("read write")
    );
    assert_eq!(storage.get_default_scope(None).await?.as_deref(), Some("read"));

    let blank = unique("blank-scope-client");
    storage.set_scope("", Some(&blank), ScopeType::Default).await?;
    assert_eq!(
        storage.get_default_scope(Some(&blank)).await?.as_deref(),
        Some("read")
    );

    let rejected = "admin".parse::<ScopeType>();
    assert!(matches!(rejected, Err(StorageError::InvalidArgument(_))));
    Ok(())
}

/// Replay protection must fail loudly rather than silently succeed.
pub async fn jti_is_unimplemented<S: JtiStorage>(storage: &S) -> StorageResult<()> {
    let record = Jti {
        app_id: "client".into(),
        subject: "subject".into(),
        audience: "https://issuer.example.com".into(),
        expires: in_one_hour(),
        jti: unique("jti"),
    };

    let get = storage
        .get_jti(
            &record.app_id,
            &record.subject,
            &record.audience,
            record.expires,
            &record.jti,
        )
        .await;
    assert!(matches!(get, Err(StorageError::Unimplemented { .. })));

    let set = storage.set_jti(&record).await;
    assert!(matches!(set, Err(StorageError::Unimplemented { .. })));
    Ok(())
}
