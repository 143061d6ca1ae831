use std::sync::Arc;

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Collection, Database, IndexModel,
    bson::doc,
    options::{IndexOptions, ReturnDocument},
};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{MongoMatchDocument, MongoShotDocument, MongoTallyDocument, by_match, doc_id},
};
use crate::dao::{
    match_store::MatchStore,
    models::{MatchHeaderEntity, ShotEntity, TallyEntity},
    storage::StorageResult,
};

const MATCH_COLLECTION_NAME: &str = "matches";
const SHOT_COLLECTION_NAME: &str = "match_shots";
const TALLY_COLLECTION_NAME: &str = "match_tallies";
const UPSERT_ATTEMPTS: usize = 3;

/// [`MatchStore`] backed by three MongoDB collections.
#[derive(Clone)]
pub struct MongoMatchStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (_client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        self.state.write().await.database = database;
        Ok(())
    }
}

impl MongoMatchStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (_client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let matches = self.matches().await;
        let recent = IndexModel::builder()
            .keys(doc! {"updated_at": -1})
            .options(
                IndexOptions::builder()
                    .name(Some("match_updated_idx".to_owned()))
                    .build(),
            )
            .build();
        matches
            .create_index(recent)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: MATCH_COLLECTION_NAME,
                index: "updated_at",
                source,
            })?;

        let shots = self.shots().await;
        let ordered = IndexModel::builder()
            .keys(doc! {"match_id": 1, "sequence": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("shot_match_seq_idx".to_owned()))
                    .build(),
            )
            .build();
        shots
            .create_index(ordered)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: SHOT_COLLECTION_NAME,
                index: "match_id,sequence",
                source,
            })?;

        let tallies = self.tallies().await;
        let by_owner = IndexModel::builder()
            .keys(doc! {"match_id": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("tally_match_idx".to_owned()))
                    .build(),
            )
            .build();
        tallies
            .create_index(by_owner)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: TALLY_COLLECTION_NAME,
                index: "match_id",
                source,
            })?;

        Ok(())
    }

    async fn database(&self) -> Database {
        let guard = self.inner.state.read().await;
        guard.database.clone()
    }

    async fn matches(&self) -> Collection<MongoMatchDocument> {
        self.database().await.collection(MATCH_COLLECTION_NAME)
    }

    async fn shots(&self) -> Collection<MongoShotDocument> {
        self.database().await.collection(SHOT_COLLECTION_NAME)
    }

    async fn tallies(&self) -> Collection<MongoTallyDocument> {
        self.database().await.collection(TALLY_COLLECTION_NAME)
    }

    /// Replace the header without touching the stored view counter.
    ///
    /// The replacement only matches while the counter still holds the value
    /// read beforehand; a concurrent view bump makes it retry.
    async fn upsert_header(&self, header: MatchHeaderEntity) -> MongoResult<()> {
        let id = header.id;
        let matches = self.matches().await;
        let save_error = |source| MongoDaoError::SaveMatch {
            id,
            part: "header",
            source,
        };

        for _ in 0..UPSERT_ATTEMPTS {
            let stored_views = matches
                .find_one(doc_id(id))
                .await
                .map_err(save_error)?
                .map(|stored| stored.view_count());
            let filter = match stored_views {
                Some(views) => {
                    let mut filter = doc_id(id);
                    filter.insert("view_count", views);
                    filter
                }
                None => doc_id(id),
            };
            let document = MongoMatchDocument::replacing(header.clone(), stored_views);

            let result = matches
                .replace_one(filter, &document)
                .upsert(stored_views.is_none())
                .await
                .map_err(save_error)?;
            if result.matched_count > 0 || result.upserted_id.is_some() {
                return Ok(());
            }
        }

        Err(MongoDaoError::HeaderContention {
            id,
            attempts: UPSERT_ATTEMPTS,
        })
    }

    async fn replace_shots(&self, id: Uuid, rows: Vec<ShotEntity>) -> MongoResult<()> {
        let collection = self.shots().await;
        let save_error = |source| MongoDaoError::SaveMatch {
            id,
            part: "shots",
            source,
        };

        collection
            .delete_many(by_match(id))
            .await
            .map_err(save_error)?;
        if rows.is_empty() {
            return Ok(());
        }

        let documents: Vec<MongoShotDocument> = rows.into_iter().map(Into::into).collect();
        collection
            .insert_many(documents)
            .await
            .map_err(save_error)?;
        Ok(())
    }

    async fn replace_tallies(&self, id: Uuid, rows: Vec<TallyEntity>) -> MongoResult<()> {
        let collection = self.tallies().await;
        let save_error = |source| MongoDaoError::SaveMatch {
            id,
            part: "tallies",
            source,
        };

        collection
            .delete_many(by_match(id))
            .await
            .map_err(save_error)?;
        if rows.is_empty() {
            return Ok(());
        }

        let documents: Vec<MongoTallyDocument> = rows.into_iter().map(Into::into).collect();
        collection
            .insert_many(documents)
            .await
            .map_err(save_error)?;
        Ok(())
    }

    async fn find_header(&self, id: Uuid) -> MongoResult<Option<MatchHeaderEntity>> {
        let document = self
            .matches()
            .await
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::LoadMatch {
                id,
                part: "header",
                source,
            })?;

        document.map(TryInto::try_into).transpose()
    }

    async fn find_shots(&self, id: Uuid) -> MongoResult<Vec<ShotEntity>> {
        let load_error = |source| MongoDaoError::LoadMatch {
            id,
            part: "shots",
            source,
        };
        let documents: Vec<MongoShotDocument> = self
            .shots()
            .await
            .find(by_match(id))
            .sort(doc! {"sequence": 1})
            .await
            .map_err(load_error)?
            .try_collect()
            .await
            .map_err(load_error)?;

        documents.into_iter().map(TryInto::try_into).collect()
    }

    async fn find_tallies(&self, id: Uuid) -> MongoResult<Vec<TallyEntity>> {
        let load_error = |source| MongoDaoError::LoadMatch {
            id,
            part: "tallies",
            source,
        };
        let documents: Vec<MongoTallyDocument> = self
            .tallies()
            .await
            .find(by_match(id))
            .await
            .map_err(load_error)?
            .try_collect()
            .await
            .map_err(load_error)?;

        documents.into_iter().map(TryInto::try_into).collect()
    }

    async fn increment_views(&self, id: Uuid) -> MongoResult<u64> {
        let updated = self
            .matches()
            .await
            .find_one_and_update(doc_id(id), doc! {"$inc": {"view_count": 1_i64}})
            .return_document(ReturnDocument::After)
            .await
            .map_err(|source| MongoDaoError::SaveMatch {
                id,
                part: "view count",
                source,
            })?
            .ok_or(MongoDaoError::MissingMatch { id })?;

        let header = MatchHeaderEntity::try_from(updated)?;
        Ok(header.view_count)
    }

    async fn list_headers(&self) -> MongoResult<Vec<MatchHeaderEntity>> {
        let documents: Vec<MongoMatchDocument> = self
            .matches()
            .await
            .find(doc! {})
            .sort(doc! {"updated_at": -1})
            .await
            .map_err(|source| MongoDaoError::ListMatches { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::ListMatches { source })?;

        documents.into_iter().map(TryInto::try_into).collect()
    }
}

impl MatchStore for MongoMatchStore {
    fn upsert_header(&self, header: MatchHeaderEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.upsert_header(header).await.map_err(Into::into) })
    }

    fn replace_shots(
        &self,
        match_id: Uuid,
        shots: Vec<ShotEntity>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.replace_shots(match_id, shots).await.map_err(Into::into) })
    }

    fn replace_tallies(
        &self,
        match_id: Uuid,
        tallies: Vec<TallyEntity>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .replace_tallies(match_id, tallies)
                .await
                .map_err(Into::into)
        })
    }

    fn find_header(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<MatchHeaderEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_header(id).await.map_err(Into::into) })
    }

    fn find_shots(&self, match_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<ShotEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_shots(match_id).await.map_err(Into::into) })
    }

    fn find_tallies(&self, match_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<TallyEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_tallies(match_id).await.map_err(Into::into) })
    }

    fn increment_views(&self, id: Uuid) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move { store.increment_views(id).await.map_err(Into::into) })
    }

    fn list_headers(&self) -> BoxFuture<'static, StorageResult<Vec<MatchHeaderEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_headers().await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
