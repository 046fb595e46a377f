// Pinecone client: control plane for index lifecycle, data plane for records


use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use super::{
    CollectionSpec, CollectionStats, Metric, RecordMetadata, ScoredRecord, StoreConfigError,
    StoreQueryError, StoreWriteError, VectorRecord, VectorStore, validate_records,
};
use crate::config::{ApiKey, ConfigError, StoreConfig};
use crate::http::{HttpClient, HttpError};

const API_VERSION: &str = "2024-07";
const DEFAULT_BATCH_SIZE: usize = 100;
const DEFAULT_READY_POLL_ATTEMPTS: u32 = 30;
const DEFAULT_READY_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Parse a data-plane host. Pinecone reports bare host names, so a missing
/// scheme means https.
#[inline]
pub fn host_url(host: &str) -> Result<Url, url::ParseError> {
    let host = host.trim();
    if host.contains("://") {
        Url::parse(host)
    } else {
        Url::parse(&format!("https://{host}"))
    }
}

#[derive(Debug, Deserialize)]
struct IndexDescription {
    name: String,
    dimension: usize,
    metric: Metric,
    host: String,
    #[serde(default)]
    status: IndexStatus,
}

#[derive(Debug, Default, Deserialize)]
struct IndexStatus {
    #[serde(default)]
    ready: bool,
    #[serde(default)]
    state: String,
}

#[derive(Debug, Serialize)]
struct CreateIndexRequest<'a> {
    name: &'a str,
    dimension: usize,
    metric: Metric,
    spec: IndexSpec<'a>,
}

#[derive(Debug, Serialize)]
struct IndexSpec<'a> {
    serverless: Serverless<'a>,
}

#[derive(Debug, Serialize)]
struct Serverless<'a> {
    cloud: &'a str,
    region: &'a str,
}

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    vectors: Vec<WireVector<'a>>,
    namespace: &'a str,
}

#[derive(Debug, Serialize)]
struct WireVector<'a> {
    id: &'a str,
    values: &'a [f32],
    metadata: &'a RecordMetadata,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    #[serde(default)]
    upserted_count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    namespace: &'a str,
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    include_values: bool,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<WireMatch>,
}

#[derive(Debug, Deserialize)]
struct WireMatch {
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatsResponse {
    #[serde(default)]
    namespaces: BTreeMap<String, NamespaceSummary>,
    #[serde(default)]
    dimension: usize,
    #[serde(default)]
    total_vector_count: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NamespaceSummary {
    #[serde(default)]
    vector_count: usize,
}

/// What the data plane needs to know about a ready index
#[derive(Debug, Clone)]
struct IndexInfo {
    host: Url,
    dimension: usize,
}

/// Hosted vector store backed by a Pinecone serverless index.
///
/// Index descriptions are cached after the first lookup, so the control plane
/// is only consulted once per index and process.
#[derive(Debug)]
pub struct PineconeStore {
    http: HttpClient,
    api_key: ApiKey,
    control_url: Url,
    cloud: String,
    region: String,
    index_host: Option<Url>,
    batch_size: usize,
    ready_poll_attempts: u32,
    ready_poll_interval: Duration,
    indexes: RwLock<HashMap<String, IndexInfo>>,
}

impl PineconeStore {
    #[inline]
    pub fn new(control_url: Url, api_key: ApiKey) -> Self {
        Self {
            http: HttpClient::default(),
            api_key,
            control_url,
            cloud: "aws".to_string(),
            region: "us-east-1".to_string(),
            index_host: None,
            batch_size: DEFAULT_BATCH_SIZE,
            ready_poll_attempts: DEFAULT_READY_POLL_ATTEMPTS,
            ready_poll_interval: DEFAULT_READY_POLL_INTERVAL,
            indexes: RwLock::new(HashMap::new()),
        }
    }

    /// Build from the `[store]` section
    #[inline]
    pub fn from_config(config: &StoreConfig, api_key: ApiKey) -> Result<Self, ConfigError> {
        let mut store = Self::new(config.endpoint_url()?, api_key)
            .with_http(
                HttpClient::new(config.timeout()).with_retry_attempts(config.retry_attempts),
            )
            .with_serverless(&config.cloud, &config.region)
            .with_batch_size(config.upsert_batch_size)
            .with_ready_polling(config.ready_poll_attempts, config.ready_poll_interval());

        if let Some(host) = &config.index_host {
            let url = host_url(host).map_err(|_| ConfigError::InvalidUrl(host.clone()))?;
            store = store.with_index_host(url);
        }
        Ok(store)
    }

    #[inline]
    pub fn with_http(mut self, http: HttpClient) -> Self {
        self.http = http;
        self
    }

    #[inline]
    pub fn with_serverless(mut self, cloud: &str, region: &str) -> Self {
        self.cloud = cloud.to_string();
        self.region = region.to_string();
        self
    }

    /// Use a fixed data-plane host instead of the one the control plane reports
    #[inline]
    pub fn with_index_host(mut self, host: Url) -> Self {
        self.index_host = Some(host);
        self
    }

    #[inline]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    #[inline]
    pub fn with_ready_polling(mut self, attempts: u32, interval: Duration) -> Self {
        self.ready_poll_attempts = attempts.max(1);
        self.ready_poll_interval = interval;
        self
    }

    fn headers(&self) -> [(&str, &str); 2] {
        [
            ("Api-Key", self.api_key.expose()),
            ("X-Pinecone-API-Version", API_VERSION),
        ]
    }

    /// Describe an index; `None` when it does not exist
    fn describe(&self, name: &str) -> Result<Option<IndexDescription>, HttpError> {
        let url = join(&self.control_url, &format!("indexes/{name}"))?;
        match self.http.get_json::<IndexDescription>(&url, &self.headers()) {
            Ok(description) => Ok(Some(description)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn create(&self, spec: &CollectionSpec) -> Result<(), HttpError> {
        let url = join(&self.control_url, "indexes")?;
        let request = CreateIndexRequest {
            name: &spec.name,
            dimension: spec.dimension,
            metric: spec.metric,
            spec: IndexSpec {
                serverless: Serverless {
                    cloud: &self.cloud,
                    region: &self.region,
                },
            },
        };
        self.http
            .post_json::<_, serde_json::Value>(&url, &self.headers(), &request)
            .map(|_| ())
    }

    fn check_shape(
        spec: &CollectionSpec,
        description: &IndexDescription,
    ) -> Result<(), StoreConfigError> {
        if description.dimension != spec.dimension {
            return Err(StoreConfigError::DimensionMismatch {
                name: spec.name.clone(),
                existing: description.dimension,
                requested: spec.dimension,
            });
        }
        if description.metric != spec.metric {
            return Err(StoreConfigError::MetricMismatch {
                name: spec.name.clone(),
                existing: description.metric,
                requested: spec.metric,
            });
        }
        Ok(())
    }

    fn remember(&self, description: &IndexDescription) -> Result<IndexInfo, HttpError> {
        let host = match &self.index_host {
            Some(host) => host.clone(),
            None => host_url(&description.host)
                .map_err(|e| HttpError::Decode(format!("invalid index host: {e}")))?,
        };
        let info = IndexInfo {
            host,
            dimension: description.dimension,
        };
        self.indexes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(description.name.clone(), info.clone());
        Ok(info)
    }

    fn wait_until_ready(&self, spec: &CollectionSpec) -> Result<(), StoreConfigError> {
        for attempt in 1..=self.ready_poll_attempts {
            match self.describe(&spec.name)? {
                Some(description) if description.status.ready => {
                    Self::check_shape(spec, &description)?;
                    self.remember(&description)?;
                    info!("Index '{}' is ready", spec.name);
                    return Ok(());
                }
                Some(description) => debug!(
                    "Index '{}' not ready yet (state: {}), poll {}/{}",
                    spec.name, description.status.state, attempt, self.ready_poll_attempts
                ),
                None => debug!(
                    "Index '{}' not visible yet, poll {}/{}",
                    spec.name, attempt, self.ready_poll_attempts
                ),
            }

            if attempt < self.ready_poll_attempts {
                std::thread::sleep(self.ready_poll_interval);
            }
        }

        warn!(
            "Index '{}' did not become ready after {} polls",
            spec.name, self.ready_poll_attempts
        );
        Err(StoreConfigError::NotReady(spec.name.clone()))
    }

    /// Data-plane host and dimension of an index; `None` when it does not exist
    fn index_info(&self, name: &str) -> Result<Option<IndexInfo>, HttpError> {
        let cached = self
            .indexes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned();
        if cached.is_some() {
            return Ok(cached);
        }

        match self.describe(name)? {
            Some(description) => self.remember(&description).map(Some),
            None => Ok(None),
        }
    }
}

impl VectorStore for PineconeStore {
    fn ensure_collection(&self, spec: &CollectionSpec) -> Result<(), StoreConfigError> {
        if spec.dimension == 0 {
            return Err(StoreConfigError::Invalid(
                "dimension must be greater than zero".to_string(),
            ));
        }

        if let Some(description) = self.describe(&spec.name)? {
            Self::check_shape(spec, &description)?;
            if description.status.ready {
                debug!("Index '{}' already exists", spec.name);
                self.remember(&description)?;
                return Ok(());
            }
            return self.wait_until_ready(spec);
        }

        info!(
            "Creating index '{}' ({} dims, {}) in {}/{}",
            spec.name, spec.dimension, spec.metric, self.cloud, self.region
        );
        match self.create(spec) {
            Ok(()) => {}
            Err(HttpError::Status { status: 409, .. }) => {
                debug!("Index '{}' was created concurrently", spec.name);
                if let Some(description) = self.describe(&spec.name)? {
                    Self::check_shape(spec, &description)?;
                }
            }
            Err(e) => return Err(e.into()),
        }

        self.wait_until_ready(spec)
    }

    fn upsert(
        &self,
        collection: &str,
        namespace: &str,
        records: &[VectorRecord],
    ) -> Result<usize, StoreWriteError> {
        let info = self
            .index_info(collection)?
            .ok_or_else(|| StoreWriteError::CollectionNotFound(collection.to_string()))?;

        validate_records(records, info.dimension)?;

        let url = join(&info.host, "vectors/upsert")?;
        let mut written = 0;
        for (batch_index, batch) in records.chunks(self.batch_size).enumerate() {
            let request = UpsertRequest {
                vectors: batch
                    .iter()
                    .map(|record| WireVector {
                        id: &record.id,
                        values: &record.vector,
                        metadata: &record.metadata,
                    })
                    .collect(),
                namespace,
            };

            let response: UpsertResponse = self
                .http
                .post_json(&url, &self.headers(), &request)
                .inspect_err(|e| {
                    warn!(
                        "Upsert batch {} failed after {} records were written: {}",
                        batch_index + 1,
                        written,
                        e
                    );
                })?;
            written += response.upserted_count;
            debug!(
                "Upserted batch {} ({} records) into {}/{}",
                batch_index + 1,
                batch.len(),
                collection,
                namespace
            );
        }

        Ok(written)
    }

    fn query(
        &self,
        collection: &str,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredRecord>, StoreQueryError> {
        if top_k == 0 {
            return Err(StoreQueryError::InvalidTopK);
        }

        let info = self
            .index_info(collection)?
            .ok_or_else(|| StoreQueryError::CollectionNotFound(collection.to_string()))?;

        if vector.len() != info.dimension {
            return Err(StoreQueryError::DimensionMismatch {
                expected: info.dimension,
                actual: vector.len(),
            });
        }

        let url = join(&info.host, "query")?;
        let request = QueryRequest {
            namespace,
            vector,
            top_k,
            include_metadata: true,
            include_values: false,
        };
        let response: QueryResponse = self.http.post_json(&url, &self.headers(), &request)?;

        let mut matches: Vec<ScoredRecord> = response
            .matches
            .into_iter()
            .map(|m| ScoredRecord {
                id: m.id,
                score: m.score,
                metadata: m
                    .metadata
                    .and_then(|value| serde_json::from_value::<RecordMetadata>(value).ok()),
            })
            .collect();
        matches.truncate(top_k);

        debug!("Query returned {} matches", matches.len());
        Ok(matches)
    }

    fn stats(&self, collection: &str) -> Result<CollectionStats, StoreQueryError> {
        let info = self
            .index_info(collection)?
            .ok_or_else(|| StoreQueryError::CollectionNotFound(collection.to_string()))?;

        let url = join(&info.host, "describe_index_stats")?;
        let response: StatsResponse =
            self.http
                .post_json(&url, &self.headers(), &serde_json::json!({}))?;

        let namespaces: BTreeMap<String, usize> = response
            .namespaces
            .into_iter()
            .map(|(name, summary)| (name, summary.vector_count))
            .collect();
        let total_records = if response.total_vector_count > 0 {
            response.total_vector_count
        } else {
            namespaces.values().sum()
        };

        Ok(CollectionStats {
            dimension: if response.dimension > 0 {
                response.dimension
            } else {
                info.dimension
            },
            total_records,
            namespaces,
        })
    }
}

fn join(base: &Url, path: &str) -> Result<Url, HttpError> {
    let joined = format!("{}/{}", base.as_str().trim_end_matches('/'), path);
    Url::parse(&joined).map_err(|e| HttpError::Encode(format!("invalid URL {joined}: {e}")))
}
