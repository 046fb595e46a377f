#[cfg(test)]
mod tests;

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};
use tracing::{debug, info};

use super::{
    CollectionSpec, CollectionStats, ScoredRecord, StoreConfigError, StoreQueryError,
    StoreWriteError, VectorRecord, VectorStore, validate_records,
};

/// In-process vector store with the same contract as the hosted one.
/// Search is a brute-force scan of the namespace.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, MemoryCollection>>,
}

#[derive(Debug)]
struct MemoryCollection {
    spec: CollectionSpec,
    namespaces: HashMap<String, BTreeMap<String, VectorRecord>>,
}

impl MemoryStore {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Collection shape, if it exists
    #[inline]
    pub fn describe(&self, collection: &str) -> Option<CollectionSpec> {
        self.collections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(collection)
            .map(|c| c.spec.clone())
    }
}

impl VectorStore for MemoryStore {
    fn ensure_collection(&self, spec: &CollectionSpec) -> Result<(), StoreConfigError> {
        if spec.dimension == 0 {
            return Err(StoreConfigError::Invalid(
                "dimension must be greater than zero".to_string(),
            ));
        }

        let mut collections = self
            .collections
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = collections.get(&spec.name) {
            if existing.spec.dimension != spec.dimension {
                return Err(StoreConfigError::DimensionMismatch {
                    name: spec.name.clone(),
                    existing: existing.spec.dimension,
                    requested: spec.dimension,
                });
            }
            if existing.spec.metric != spec.metric {
                return Err(StoreConfigError::MetricMismatch {
                    name: spec.name.clone(),
                    existing: existing.spec.metric,
                    requested: spec.metric,
                });
            }
            debug!("Collection '{}' already exists", spec.name);
            return Ok(());
        }

        info!(
            "Creating in-memory collection '{}' ({} dims, {})",
            spec.name, spec.dimension, spec.metric
        );
        collections.insert(
            spec.name.clone(),
            MemoryCollection {
                spec: spec.clone(),
                namespaces: HashMap::new(),
            },
        );
        Ok(())
    }

    fn upsert(
        &self,
        collection: &str,
        namespace: &str,
        records: &[VectorRecord],
    ) -> Result<usize, StoreWriteError> {
        let mut collections = self
            .collections
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        let target = collections
            .get_mut(collection)
            .ok_or_else(|| StoreWriteError::CollectionNotFound(collection.to_string()))?;

        validate_records(records, target.spec.dimension)?;

        let entries = target.namespaces.entry(namespace.to_string()).or_default();
        for record in records {
            entries.insert(record.id.clone(), record.clone());
        }

        debug!(
            "Upserted {} records into {}/{}",
            records.len(),
            collection,
            namespace
        );
        Ok(records.len())
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

        let collections = self
            .collections
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        let target = collections
            .get(collection)
            .ok_or_else(|| StoreQueryError::CollectionNotFound(collection.to_string()))?;

        if vector.len() != target.spec.dimension {
            return Err(StoreQueryError::DimensionMismatch {
                expected: target.spec.dimension,
                actual: vector.len(),
            });
        }

        let metric = target.spec.metric;
        let Some(entries) = target.namespaces.get(namespace) else {
            return Ok(Vec::new());
        };

        let mut matches: Vec<ScoredRecord> = entries
            .values()
            .map(|record| ScoredRecord {
                id: record.id.clone(),
                score: metric.score(vector, &record.vector),
                metadata: Some(record.metadata.clone()),
            })
            .collect();

        matches.sort_by(|a, b| metric.rank(a.score, b.score).then_with(|| a.id.cmp(&b.id)));
        matches.truncate(top_k);

        Ok(matches)
    }

    fn stats(&self, collection: &str) -> Result<CollectionStats, StoreQueryError> {
        let collections = self
            .collections
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        let target = collections
            .get(collection)
            .ok_or_else(|| StoreQueryError::CollectionNotFound(collection.to_string()))?;

        let namespaces: BTreeMap<String, usize> = target
            .namespaces
            .iter()
            .map(|(name, entries)| (name.clone(), entries.len()))
            .collect();

        Ok(CollectionStats {
            dimension: target.spec.dimension,
            total_records: namespaces.values().sum(),
            namespaces,
        })
    }
}
