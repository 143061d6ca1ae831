/// Remote match stores (memory, CouchDB, MongoDB).
pub mod match_store;
/// Persisted entities shared by every backend.
pub mod models;
/// Local snapshot of the live match and its schema migrations.
pub mod snapshot;
/// Backend independent storage errors.
pub mod storage;
