#[cfg(feature = "couch-store")]
pub mod couchdb;
pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::{
    models::{MatchHeaderEntity, MatchRecordEntity, ShotEntity, TallyEntity},
    storage::StorageResult,
};

pub use self::memory::MemoryMatchStore;

/// Abstraction over the remote persistence layer for saved matches.
///
/// A match is a header plus detail rows; detail writes replace every row of
/// the match so the remote copy always mirrors the in-memory state.
pub trait MatchStore: Send + Sync {
    /// Insert or overwrite the header of a match.
    ///
    /// The stored view counter is only ever changed by
    /// [`increment_views`](MatchStore::increment_views): an overwrite keeps it
    /// and a new header starts at zero, whatever `header.view_count` says.
    fn upsert_header(&self, header: MatchHeaderEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Replace every shot row of `match_id` with `shots`.
    fn replace_shots(
        &self,
        match_id: Uuid,
        shots: Vec<ShotEntity>,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Replace every counter row of `match_id` with `tallies`.
    fn replace_tallies(
        &self,
        match_id: Uuid,
        tallies: Vec<TallyEntity>,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Fetch a header by id.
    fn find_header(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<MatchHeaderEntity>>>;
    /// Fetch the shot rows of a match.
    fn find_shots(&self, match_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<ShotEntity>>>;
    /// Fetch the counter rows of a match.
    fn find_tallies(&self, match_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<TallyEntity>>>;
    /// Bump the view counter, returning the new value.
    fn increment_views(&self, id: Uuid) -> BoxFuture<'static, StorageResult<u64>>;
    /// List every saved header.
    fn list_headers(&self) -> BoxFuture<'static, StorageResult<Vec<MatchHeaderEntity>>>;
    /// Cheap connectivity probe used by the storage supervisor.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Re-establish the backend connection after a failed health check.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}

/// Full-replace save: header first, then the detail rows of the active mode.
///
/// Rows of the inactive mode are cleared so a match never carries both sets.
pub async fn save_record(store: &dyn MatchStore, record: MatchRecordEntity) -> StorageResult<()> {
    let MatchRecordEntity {
        header,
        shots,
        tallies,
    } = record;
    let id = header.id;

    store.upsert_header(header).await?;
    store.replace_shots(id, shots).await?;
    store.replace_tallies(id, tallies).await?;
    Ok(())
}

/// Fetch a header together with its detail rows.
pub async fn fetch_record(
    store: &dyn MatchStore,
    id: Uuid,
) -> StorageResult<Option<MatchRecordEntity>> {
    let Some(header) = store.find_header(id).await? else {
        return Ok(None);
    };
    let shots = store.find_shots(id).await?;
    let tallies = store.find_tallies(id).await?;

    Ok(Some(MatchRecordEntity {
        header,
        shots,
        tallies,
    }))
}
