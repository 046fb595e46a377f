use super::*;

#[test]
fn dot_product_scores_alignment() {
    let score = Metric::DotProduct.score(&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]);
    assert!((score - 32.0).abs() < f32::EPSILON);
}

#[test]
fn cosine_ignores_magnitude() {
    let a = Metric::Cosine.score(&[1.0, 0.0], &[10.0, 0.0]);
    let b = Metric::Cosine.score(&[1.0, 0.0], &[0.0, 3.0]);
    assert!((a - 1.0).abs() < 1e-6);
    assert!(b.abs() < 1e-6);
}

#[test]
fn cosine_of_zero_vector_is_zero() {
    let score = Metric::Cosine.score(&[0.0, 0.0], &[1.0, 1.0]);
    assert!(score.abs() < f32::EPSILON);
}

#[test]
fn euclidean_prefers_smaller_distance() {
    let near = Metric::Euclidean.score(&[0.0, 0.0], &[1.0, 0.0]);
    let far = Metric::Euclidean.score(&[0.0, 0.0], &[3.0, 4.0]);
    assert!((near - 1.0).abs() < f32::EPSILON);
    assert!((far - 25.0).abs() < f32::EPSILON);
    assert_eq!(Metric::Euclidean.rank(near, far), Ordering::Less);
    assert_eq!(Metric::DotProduct.rank(near, far), Ordering::Greater);
}

#[test]
fn nan_scores_rank_last() {
    assert_eq!(Metric::DotProduct.rank(f32::NAN, -5.0), Ordering::Greater);
    assert_eq!(Metric::Cosine.rank(0.1, f32::NAN), Ordering::Less);
    assert_eq!(Metric::Euclidean.rank(f32::NAN, 1e9), Ordering::Greater);
    assert_eq!(Metric::DotProduct.rank(f32::NAN, f32::NAN), Ordering::Equal);
}

#[test]
fn metric_names_match_wire_format() {
    assert_eq!(Metric::DotProduct.to_string(), "dotproduct");
    let parsed: Metric = serde_json::from_str("\"cosine\"").expect("should parse metric");
    assert_eq!(parsed, Metric::Cosine);
}

#[test]
fn validate_records_reports_first_offender() {
    let records = vec![
        VectorRecord {
            id: "chunk-0".to_string(),
            vector: vec![0.0; 4],
            metadata: RecordMetadata::from_text("ok"),
        },
        VectorRecord {
            id: "chunk-1".to_string(),
            vector: vec![0.0; 3],
            metadata: RecordMetadata::from_text("short"),
        },
    ];

    assert!(validate_records(&records[..1], 4).is_ok());
    match validate_records(&records, 4) {
        Err(StoreWriteError::DimensionMismatch { id, actual, .. }) => {
            assert_eq!(id, "chunk-1");
            assert_eq!(actual, 3);
        }
        other => panic!("expected dimension mismatch, got {:?}", other),
    }
}

#[test]
fn metadata_skips_absent_fields() {
    let json = serde_json::to_value(RecordMetadata::from_text("hello")).expect("should serialize");
    assert_eq!(json, serde_json::json!({ "text": "hello" }));
}

#[test]
fn timeout_detection() {
    assert!(StoreQueryError::Upstream(HttpError::Timeout).is_timeout());
    assert!(!StoreQueryError::InvalidTopK.is_timeout());
}
