pub mod adapter;
pub mod capabilities;
pub mod models;

pub use adapter::{Adapter, AdapterResult, Operator, WhereClause};
pub use capabilities::{
    AccessTokenStorage, AuthorizationCodeStorage, ClientCredentialsStorage, ClientStorage,
    JtiStorage, JwtBearerStorage, PublicKeyStorage, RefreshTokenStorage, ScopeStorage,
    UserCredentialsStorage,
};
pub use models::{
    AccessToken, AuthorizationCode, Client, ClientKey, ClientKeyLookup, Jti, RefreshToken,
    ScopeType, SigningKey, User, UserDetails, DEFAULT_ENCRYPTION_ALGORITHM,
};
