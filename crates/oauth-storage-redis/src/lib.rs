// oauth-storage-redis: key-value backend for OAuth2 server storage.
//
// Every entity is one JSON string under a namespaced key. Tokens and codes
// carry a native TTL derived from their `expires` timestamp. Each
// `RedisStorage` owns a small cache of the values it has written, so a
// write followed by a read inside one request costs a single round trip.
//
// The remote store sits behind the `KeyValueConnection` trait: `RedisConnection`
// talks to a live server through the `redis` crate, `InMemoryConnection` backs
// tests and local development.

pub mod connection;
pub mod storage;

pub use connection::{InMemoryConnection, KeyValueConnection, RedisConnection};
pub use storage::{default_connection, RedisStorage};
