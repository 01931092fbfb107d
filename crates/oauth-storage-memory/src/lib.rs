// oauth-storage-memory: in-memory document adapter.
//
// Implements the core `Adapter` seam over process-local collections so the
// document backend can run without a database in tests and local development.

pub mod adapter;

pub use adapter::MemoryAdapter;
