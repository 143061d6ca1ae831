//! In-process store used when no database is configured and in tests.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use futures::future::BoxFuture;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::MatchStore;
use crate::dao::{
    models::{MatchHeaderEntity, ShotEntity, TallyEntity},
    storage::{StorageError, StorageResult},
};

/// Failure reported while the memory store is switched offline.
#[derive(Debug, Error)]
#[error("memory store is offline")]
pub struct MemoryStoreOffline;

#[derive(Default)]
struct Tables {
    headers: HashMap<Uuid, MatchHeaderEntity>,
    shots: HashMap<Uuid, Vec<ShotEntity>>,
    tallies: HashMap<Uuid, Vec<TallyEntity>>,
}

/// Volatile [`MatchStore`] keeping everything in a hash map.
#[derive(Clone, Default)]
pub struct MemoryMatchStore {
    tables: Arc<RwLock<Tables>>,
    offline: Arc<AtomicBool>,
    header_writes: Arc<AtomicUsize>,
}

impl MemoryMatchStore {
    /// Create an empty, online store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail (or succeed again).
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of header writes served so far; one per completed save.
    pub fn header_writes(&self) -> usize {
        self.header_writes.load(Ordering::SeqCst)
    }

    fn check_online(&self) -> StorageResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(StorageError::unavailable(
                MemoryStoreOffline.to_string(),
                MemoryStoreOffline,
            ))
        } else {
            Ok(())
        }
    }
}

impl MatchStore for MemoryMatchStore {
    fn upsert_header(&self, mut header: MatchHeaderEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.check_online()?;
            let mut tables = store.tables.write().await;
            header.view_count = tables
                .headers
                .get(&header.id)
                .map_or(0, |stored| stored.view_count);
            tables.headers.insert(header.id, header);
            store.header_writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn replace_shots(
        &self,
        match_id: Uuid,
        shots: Vec<ShotEntity>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.check_online()?;
            store.tables.write().await.shots.insert(match_id, shots);
            Ok(())
        })
    }

    fn replace_tallies(
        &self,
        match_id: Uuid,
        tallies: Vec<TallyEntity>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.check_online()?;
            store.tables.write().await.tallies.insert(match_id, tallies);
            Ok(())
        })
    }

    fn find_header(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<MatchHeaderEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store.check_online()?;
            Ok(store.tables.read().await.headers.get(&id).cloned())
        })
    }

    fn find_shots(&self, match_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<ShotEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store.check_online()?;
            let tables = store.tables.read().await;
            Ok(tables.shots.get(&match_id).cloned().unwrap_or_default())
        })
    }

    fn find_tallies(&self, match_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<TallyEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store.check_online()?;
            let tables = store.tables.read().await;
            Ok(tables.tallies.get(&match_id).cloned().unwrap_or_default())
        })
    }

    fn increment_views(&self, id: Uuid) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move {
            store.check_online()?;
            let mut tables = store.tables.write().await;
            let header = tables
                .headers
                .get_mut(&id)
                .ok_or_else(|| StorageError::corrupt(format!("no header for match `{id}`")))?;
            header.view_count += 1;
            Ok(header.view_count)
        })
    }

    fn list_headers(&self) -> BoxFuture<'static, StorageResult<Vec<MatchHeaderEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store.check_online()?;
            let tables = store.tables.read().await;
            let mut headers: Vec<_> = tables.headers.values().cloned().collect();
            headers.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
            Ok(headers)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.check_online() })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.check_online() })
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;
    use crate::state::match_state::{
        Actor, Configuration, ModeKind, Period, StatKind,
    };

    fn header(id: Uuid) -> MatchHeaderEntity {
        let now = SystemTime::now();
        MatchHeaderEntity {
            id,
            name: "Cup".into(),
            mode: ModeKind::TallySheet,
            roster: Vec::new(),
            config: Configuration::default(),
            current_period: Period::FirstHalf,
            view_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn replace_overwrites_previous_rows() {
        let store = MemoryMatchStore::new();
        let id = Uuid::new_v4();
        let row = |value| TallyEntity {
            match_id: id,
            actor: Actor::Team,
            period: Period::FirstHalf,
            stat: StatKind::Turnovers,
            value,
        };

        store.replace_tallies(id, vec![row(1), row(2)]).await.unwrap();
        store.replace_tallies(id, vec![row(3)]).await.unwrap();

        assert_eq!(store.find_tallies(id).await.unwrap(), vec![row(3)]);
    }

    #[tokio::test]
    async fn views_are_counted_per_match() {
        let store = MemoryMatchStore::new();
        let id = Uuid::new_v4();
        store.upsert_header(header(id)).await.unwrap();

        assert_eq!(store.increment_views(id).await.unwrap(), 1);
        assert_eq!(store.increment_views(id).await.unwrap(), 2);
        assert!(store.increment_views(Uuid::new_v4()).await.is_err());
    }

    #[tokio::test]
    async fn header_upserts_keep_the_stored_view_count() {
        let store = MemoryMatchStore::new();
        let id = Uuid::new_v4();
        let mut first = header(id);
        first.view_count = 9;
        store.upsert_header(first).await.unwrap();
        assert_eq!(store.find_header(id).await.unwrap().unwrap().view_count, 0);

        store.increment_views(id).await.unwrap();
        store.increment_views(id).await.unwrap();
        store.upsert_header(header(id)).await.unwrap();

        assert_eq!(store.find_header(id).await.unwrap().unwrap().view_count, 2);
    }

    #[tokio::test]
    async fn offline_store_rejects_every_call() {
        let store = MemoryMatchStore::new();
        store.set_offline(true);
        assert!(matches!(
            store.health_check().await,
            Err(StorageError::Unavailable { .. })
        ));
        assert!(store.upsert_header(header(Uuid::new_v4())).await.is_err());
        assert_eq!(store.header_writes(), 0);

        store.set_offline(false);
        assert!(store.health_check().await.is_ok());
    }
}
