use super::*;
use crate::store::{Metric, RecordMetadata};

fn record(id: &str, vector: Vec<f32>, text: &str) -> VectorRecord {
    VectorRecord {
        id: id.to_string(),
        vector,
        metadata: RecordMetadata::from_text(text),
    }
}

fn store_with(metric: Metric) -> MemoryStore {
    let store = MemoryStore::new();
    store
        .ensure_collection(&CollectionSpec::new("docs", 3, metric))
        .expect("collection should be created");
    store
}

#[test]
fn ensure_collection_is_idempotent() {
    let store = MemoryStore::new();
    let spec = CollectionSpec::new("docs", 3, Metric::Cosine);

    store.ensure_collection(&spec).expect("first call should create");
    store
        .upsert("docs", "ns1", &[record("a", vec![1.0, 0.0, 0.0], "alpha")])
        .expect("upsert should succeed");
    store.ensure_collection(&spec).expect("second call should be a no-op");

    assert_eq!(store.describe("docs"), Some(spec));
    let stats = store.stats("docs").expect("stats should succeed");
    assert_eq!(stats.total_records, 1);
}

#[test]
fn dimension_mismatch_is_rejected_without_mutation() {
    let store = store_with(Metric::Cosine);
    store
        .upsert("docs", "ns1", &[record("a", vec![1.0, 0.0, 0.0], "alpha")])
        .expect("upsert should succeed");

    let result = store.ensure_collection(&CollectionSpec::new("docs", 768, Metric::Cosine));
    assert!(matches!(
        result,
        Err(StoreConfigError::DimensionMismatch {
            existing: 3,
            requested: 768,
            ..
        })
    ));

    assert_eq!(
        store.describe("docs"),
        Some(CollectionSpec::new("docs", 3, Metric::Cosine))
    );
    assert_eq!(store.stats("docs").expect("stats should succeed").total_records, 1);
}

#[test]
fn metric_mismatch_is_rejected() {
    let store = store_with(Metric::Cosine);
    let result = store.ensure_collection(&CollectionSpec::new("docs", 3, Metric::Euclidean));
    assert!(matches!(result, Err(StoreConfigError::MetricMismatch { .. })));
}

#[test]
fn upsert_then_query_finds_record_first() {
    let store = store_with(Metric::Cosine);
    let records = vec![
        record("paris", vec![0.9, 0.1, 0.0], "Paris is the capital of France"),
        record("berlin", vec![0.0, 1.0, 0.0], "Berlin is the capital of Germany"),
        record("madrid", vec![0.0, 0.2, 0.9], "Madrid is the capital of Spain"),
    ];
    store.upsert("docs", "ns1", &records).expect("upsert should succeed");

    let matches = store
        .query("docs", "ns1", &[0.9, 0.1, 0.0], 3)
        .expect("query should succeed");

    assert_eq!(matches[0].id, "paris");
    assert!((matches[0].score - 1.0).abs() < 1e-5);
    assert_eq!(
        matches[0].metadata.as_ref().map(|m| m.text.as_str()),
        Some("Paris is the capital of France")
    );
    for pair in matches.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

#[test]
fn top_k_larger_than_collection_returns_all_records() {
    let store = store_with(Metric::DotProduct);
    store
        .upsert(
            "docs",
            "ns1",
            &[
                record("a", vec![1.0, 0.0, 0.0], "alpha"),
                record("b", vec![0.0, 1.0, 0.0], "beta"),
            ],
        )
        .expect("upsert should succeed");

    let matches = store
        .query("docs", "ns1", &[1.0, 1.0, 0.0], 5)
        .expect("query should succeed");
    assert_eq!(matches.len(), 2);
}

#[test]
fn upsert_rejects_whole_batch_on_bad_dimension() {
    let store = store_with(Metric::Cosine);
    let result = store.upsert(
        "docs",
        "ns1",
        &[
            record("good", vec![1.0, 0.0, 0.0], "fine"),
            record("bad", vec![1.0, 0.0], "too short"),
        ],
    );

    match result {
        Err(StoreWriteError::DimensionMismatch {
            id,
            expected,
            actual,
        }) => {
            assert_eq!(id, "bad");
            assert_eq!(expected, 3);
            assert_eq!(actual, 2);
        }
        other => panic!("expected dimension mismatch, got {:?}", other),
    }
    assert_eq!(store.stats("docs").expect("stats should succeed").total_records, 0);
}

#[test]
fn upsert_replaces_by_id() {
    let store = store_with(Metric::Cosine);
    store
        .upsert("docs", "ns1", &[record("a", vec![1.0, 0.0, 0.0], "old")])
        .expect("upsert should succeed");
    store
        .upsert("docs", "ns1", &[record("a", vec![1.0, 0.0, 0.0], "new")])
        .expect("upsert should succeed");

    let matches = store
        .query("docs", "ns1", &[1.0, 0.0, 0.0], 5)
        .expect("query should succeed");
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].metadata.as_ref().map(|m| m.text.as_str()), Some("new"));
}

#[test]
fn namespaces_are_isolated() {
    let store = store_with(Metric::Cosine);
    store
        .upsert("docs", "one", &[record("a", vec![1.0, 0.0, 0.0], "alpha")])
        .expect("upsert should succeed");

    let matches = store
        .query("docs", "two", &[1.0, 0.0, 0.0], 5)
        .expect("query should succeed");
    assert!(matches.is_empty());

    let stats = store.stats("docs").expect("stats should succeed");
    assert_eq!(stats.namespaces.get("one"), Some(&1));
    assert_eq!(stats.namespaces.get("two"), None);
}

#[test]
fn euclidean_ranks_nearest_first() {
    let store = store_with(Metric::Euclidean);
    store
        .upsert(
            "docs",
            "ns1",
            &[
                record("far", vec![10.0, 10.0, 10.0], "far"),
                record("near", vec![1.0, 1.0, 1.0], "near"),
            ],
        )
        .expect("upsert should succeed");

    let matches = store
        .query("docs", "ns1", &[1.0, 1.0, 1.0], 2)
        .expect("query should succeed");
    assert_eq!(matches[0].id, "near");
    assert!(matches[0].score.abs() < f32::EPSILON);
}

#[test]
fn invalid_queries_are_rejected() {
    let store = store_with(Metric::Cosine);

    assert!(matches!(
        store.query("docs", "ns1", &[1.0, 0.0, 0.0], 0),
        Err(StoreQueryError::InvalidTopK)
    ));
    assert!(matches!(
        store.query("docs", "ns1", &[1.0, 0.0], 1),
        Err(StoreQueryError::DimensionMismatch {
            expected: 3,
            actual: 2
        })
    ));
    assert!(matches!(
        store.query("missing", "ns1", &[1.0, 0.0, 0.0], 1),
        Err(StoreQueryError::CollectionNotFound(_))
    ));
}

#[test]
fn upsert_into_missing_collection_fails() {
    let store = MemoryStore::new();
    let result = store.upsert("missing", "ns1", &[record("a", vec![1.0], "alpha")]);
    assert!(matches!(result, Err(StoreWriteError::CollectionNotFound(_))));
}

#[test]
fn nan_scores_do_not_break_ordering() {
    let store = store_with(Metric::DotProduct);
    let mut records: Vec<VectorRecord> = (0..40)
        .map(|i| record(&format!("nan-{i}"), vec![f32::NAN, 0.0, 0.0], "broken"))
        .collect();
    records.push(record("best", vec![1.0, 0.0, 0.0], "best"));
    records.push(record("second", vec![0.5, 0.0, 0.0], "second"));
    store
        .upsert("docs", "ns1", &records)
        .expect("upsert should succeed");

    let matches = store
        .query("docs", "ns1", &[1.0, 0.0, 0.0], 3)
        .expect("query should succeed");

    let ids: Vec<&str> = matches.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids[0], "best");
    assert_eq!(ids[1], "second");
    assert!(ids[2].starts_with("nan-"));
}
