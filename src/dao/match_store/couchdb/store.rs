use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, Method, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::from_value;
use uuid::Uuid;

use crate::dao::{
    match_store::MatchStore,
    models::{MatchHeaderEntity, ShotEntity, TallyEntity},
    storage::StorageResult,
};

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchResult},
    models::{
        AllDocsResponse, CouchMatchDocument, CouchRowsDocument, END_SUFFIX, MATCH_PREFIX,
        RevisionOnly, match_doc_id, shots_doc_id, tallies_doc_id,
    },
};

const UPSERT_ATTEMPTS: usize = 3;

/// [`MatchStore`] backed by a CouchDB database over its HTTP API.
#[derive(Clone)]
pub struct CouchMatchStore {
    client: Client,
    base_url: Arc<str>,
    database: Arc<str>,
    auth: Option<(Arc<str>, Arc<str>)>,
}

impl CouchMatchStore {
    /// Establish a connection to CouchDB and ensure the database exists.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| CouchDaoError::ClientBuilder { source })?;

        let base_url = Arc::<str>::from(config.base_url.trim_end_matches('/'));
        let database = Arc::<str>::from(config.database);
        let auth = config
            .username
            .zip(config.password)
            .map(|(u, p)| (Arc::<str>::from(u), Arc::<str>::from(p)));

        let store = Self {
            client,
            base_url,
            database,
            auth,
        };

        store.ensure_database().await?;
        Ok(store)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.auth {
            Some((ref user, ref pass)) => builder.basic_auth(user.as_ref(), Some(pass.as_ref())),
            None => builder,
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}/{}", self.base_url, self.database, path);
        self.authorize(self.client.request(method, url))
    }

    fn database_url(&self) -> String {
        format!("{}/{}", self.base_url, self.database)
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let database = self.database.to_string();
        let url = self.database_url();

        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|source| CouchDaoError::DatabaseQuery {
                database: database.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => {
                let create = self
                    .authorize(self.client.put(&url))
                    .send()
                    .await
                    .map_err(|source| CouchDaoError::DatabaseCreate {
                        database: database.clone(),
                        source,
                    })?;
                if create.status().is_success() {
                    Ok(())
                } else {
                    Err(CouchDaoError::DatabaseStatus {
                        database,
                        status: create.status(),
                    })
                }
            }
            other => Err(CouchDaoError::DatabaseStatus {
                database,
                status: other,
            }),
        }
    }

    async fn get_document<T>(&self, doc_id: &str) -> CouchResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let response = self
            .request(Method::GET, doc_id)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                response.json::<T>().await.map(Some).map_err(|source| {
                    CouchDaoError::DecodeResponse {
                        path: doc_id.to_string(),
                        source,
                    }
                })
            }
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    async fn current_rev(&self, doc_id: &str) -> CouchResult<Option<String>> {
        Ok(self
            .get_document::<RevisionOnly>(doc_id)
            .await?
            .map(|doc| doc.rev))
    }

    async fn put_document<T>(&self, doc_id: &str, document: &T) -> CouchResult<()>
    where
        T: ?Sized + Serialize,
    {
        let response = self
            .request(Method::PUT, doc_id)
            .json(document)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: response.status(),
            })
        }
    }

    async fn list_documents<T>(&self, prefix: &str) -> CouchResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        const ALL_DOCS: &str = "_all_docs";
        let query = [
            ("include_docs", "true".to_string()),
            ("startkey", format!("\"{}\"", prefix)),
            ("endkey", format!("\"{}{}\"", prefix, END_SUFFIX)),
        ];

        let response = self
            .request(Method::GET, ALL_DOCS)
            .query(&query)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: ALL_DOCS.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(CouchDaoError::RequestStatus {
                path: ALL_DOCS.to_string(),
                status: response.status(),
            });
        }

        let payload = response.json::<AllDocsResponse>().await.map_err(|source| {
            CouchDaoError::DecodeResponse {
                path: ALL_DOCS.to_string(),
                source,
            }
        })?;

        payload
            .rows
            .into_iter()
            .filter_map(|row| row.doc)
            .map(|doc| {
                from_value(doc).map_err(|source| CouchDaoError::DeserializeValue {
                    path: ALL_DOCS.to_string(),
                    source,
                })
            })
            .collect()
    }

    async fn replace_rows<T>(&self, doc_id: String, rows: Vec<T>) -> CouchResult<()>
    where
        T: Serialize,
    {
        let rev = self.current_rev(&doc_id).await?;
        let document = CouchRowsDocument {
            id: doc_id.clone(),
            rev,
            rows,
        };
        self.put_document(&doc_id, &document).await
    }

    async fn find_rows<T>(&self, doc_id: String) -> CouchResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        Ok(self
            .get_document::<CouchRowsDocument<T>>(&doc_id)
            .await?
            .map(|doc| doc.rows)
            .unwrap_or_default())
    }

    async fn upsert_header(&self, header: MatchHeaderEntity) -> CouchResult<()> {
        let doc_id = match_doc_id(header.id);
        let mut attempt = 1;
        loop {
            let stored = self.get_document::<CouchMatchDocument>(&doc_id).await?;
            let doc = CouchMatchDocument::replacing(header.clone(), stored);
            match self.put_document(&doc_id, &doc).await {
                // A concurrent view bump moved the revision; re-read and retry.
                Err(CouchDaoError::RequestStatus {
                    status: StatusCode::CONFLICT,
                    ..
                }) if attempt < UPSERT_ATTEMPTS => attempt += 1,
                result => return result,
            }
        }
    }

    async fn increment_views(&self, id: Uuid) -> CouchResult<u64> {
        let doc_id = match_doc_id(id);
        let mut doc = self
            .get_document::<CouchMatchDocument>(&doc_id)
            .await?
            .ok_or_else(|| CouchDaoError::MissingDocument {
                doc_id: doc_id.clone(),
            })?;
        doc.header.view_count += 1;
        self.put_document(&doc_id, &doc).await?;
        Ok(doc.header.view_count)
    }
}

impl MatchStore for CouchMatchStore {
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
        Box::pin(async move {
            store
                .replace_rows(shots_doc_id(match_id), shots)
                .await
                .map_err(Into::into)
        })
    }

    fn replace_tallies(
        &self,
        match_id: Uuid,
        tallies: Vec<TallyEntity>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .replace_rows(tallies_doc_id(match_id), tallies)
                .await
                .map_err(Into::into)
        })
    }

    fn find_header(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<MatchHeaderEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let maybe_doc = store
                .get_document::<CouchMatchDocument>(&match_doc_id(id))
                .await?;
            Ok(maybe_doc.map(|doc| doc.header))
        })
    }

    fn find_shots(&self, match_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<ShotEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let doc_id = shots_doc_id(match_id);
            let rows = store.find_rows::<ShotEntity>(doc_id).await?;
            Ok(rows)
        })
    }

    fn find_tallies(&self, match_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<TallyEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let doc_id = tallies_doc_id(match_id);
            let rows = store.find_rows::<TallyEntity>(doc_id).await?;
            Ok(rows)
        })
    }

    fn increment_views(&self, id: Uuid) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move { store.increment_views(id).await.map_err(Into::into) })
    }

    fn list_headers(&self) -> BoxFuture<'static, StorageResult<Vec<MatchHeaderEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let docs = store
                .list_documents::<CouchMatchDocument>(MATCH_PREFIX)
                .await?;
            let mut headers: Vec<_> = docs.into_iter().map(|doc| doc.header).collect();
            headers.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
            Ok(headers)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let url = store.database_url();
            let response = store
                .authorize(store.client.get(&url))
                .send()
                .await
                .map_err(|source| CouchDaoError::RequestSend {
                    path: url.clone(),
                    source,
                })?;

            if response.status().is_success() {
                Ok(())
            } else {
                Err(CouchDaoError::RequestStatus {
                    path: url,
                    status: response.status(),
                }
                .into())
            }
        })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_database().await.map_err(Into::into) })
    }
}
