use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{
        match_store::{MatchStore, MemoryMatchStore},
        storage::StorageError,
    },
    services::sse_events,
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Connect to the backend selected by the environment.
///
/// `COUCH_BASE_URL` selects CouchDB, `MONGO_URI` selects MongoDB; without
/// either the matches live in memory for the lifetime of the process.
pub async fn connect_configured_store() -> Result<Arc<dyn MatchStore>, StorageError> {
    #[cfg(feature = "couch-store")]
    {
        use crate::dao::match_store::couchdb::{CouchConfig, CouchMatchStore};

        if CouchConfig::requested() {
            let config = CouchConfig::from_env()?;
            let store = CouchMatchStore::connect(config).await?;
            return Ok(Arc::new(store));
        }
    }

    #[cfg(feature = "mongo-store")]
    {
        use crate::dao::match_store::mongodb::{MongoConfig, MongoMatchStore};

        if MongoConfig::requested() {
            let config = MongoConfig::from_env().await?;
            let store = MongoMatchStore::connect(config).await?;
            return Ok(Arc::new(store));
        }
    }

    info!("no storage backend configured; keeping saved matches in memory");
    Ok(Arc::new(MemoryMatchStore::new()))
}

/// Reconnect to the storage backend and keep the shared state in degraded mode when it is unavailable.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn MatchStore>, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;

    loop {
        match connect().await {
            Ok(store) => {
                state.install_match_store(store.clone()).await;
                info!("storage connection established; leaving degraded mode");
                delay = INITIAL_DELAY;

                loop {
                    match store.health_check().await {
                        Ok(()) => {
                            if state.is_degraded().await {
                                info!("storage healthy again; leaving degraded mode");
                                state.update_degraded(false);
                            }
                            sleep(HEALTH_POLL_INTERVAL).await;
                        }
                        Err(_) => {
                            let mut attempt = 0;
                            let mut reconnect_delay = INITIAL_DELAY;
                            let mut reconnected = false;

                            while attempt < MAX_RECONNECT_ATTEMPTS {
                                match store.try_reconnect().await {
                                    Ok(()) => {
                                        info!(
                                            "storage reconnection succeeded after health check failure"
                                        );
                                        reconnected = true;
                                        break;
                                    }
                                    Err(reconnect_err) => {
                                        if attempt == 0 {
                                            warn!(
                                                attempt, error = %reconnect_err,
                                                "storage reconnect first attempt failed; entering in degraded mode"
                                            );
                                            state.update_degraded(true);
                                        } else {
                                            warn!(attempt, error = %reconnect_err, "storage reconnect attempt failed");
                                        };
                                        attempt += 1;
                                        sleep(reconnect_delay).await;
                                        reconnect_delay = (reconnect_delay * 2).min(MAX_DELAY);
                                    }
                                }
                            }

                            if reconnected {
                                state.update_degraded(false);
                                sleep(HEALTH_POLL_INTERVAL).await;
                                continue;
                            } else {
                                warn!(
                                    "exhausted storage reconnect attempts; staying in degraded mode"
                                );
                                state.clear_match_store().await;
                                break;
                            }
                        }
                    }
                }

                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
            Err(err) => {
                warn!(error = %err, "storage connection attempt failed");
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
        }
    }
}

/// Forward degraded mode changes to SSE subscribers as `system.status`.
///
/// The watcher is registered before the returned future first runs.
pub fn publish_status_changes(state: SharedState) -> impl Future<Output = ()> + Send {
    let mut watcher = state.degraded_watcher();
    async move {
        while watcher.changed().await.is_ok() {
            let degraded = *watcher.borrow_and_update();
            sse_events::broadcast_system_status(&state, degraded);
        }
    }
}
