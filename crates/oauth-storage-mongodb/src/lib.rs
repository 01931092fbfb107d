// oauth-storage-mongodb: document-store backend for OAuth2 server storage.
//
// `DocumentStorage` maps each entity family to a named collection and
// implements every storage capability with natural-key lookups and a
// lookup-then-branch upsert. `MongoAdapter` is the MongoDB driver underneath;
// any other `Adapter` (e.g. the in-memory one) can stand in for it.

pub mod adapter;
pub mod query;
pub mod storage;

pub use adapter::MongoAdapter;
pub use storage::{default_connection, DocumentStorage, MongoStorage};
