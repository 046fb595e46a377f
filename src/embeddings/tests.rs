use super::*;
use crate::config::ApiKey;

#[test]
fn blank_text_is_rejected() {
    assert!(matches!(require_text(""), Err(EmbeddingError::EmptyInput)));
    assert!(matches!(require_text(" \t\n"), Err(EmbeddingError::EmptyInput)));
    assert_eq!(require_text("Paris").expect("text should pass"), "Paris");
}

#[test]
fn dimension_check() {
    assert!(check_dimension(vec![0.1, 0.2], 2).is_ok());
    assert!(matches!(
        check_dimension(vec![0.1, 0.2], 3),
        Err(EmbeddingError::DimensionMismatch {
            expected: 3,
            actual: 2
        })
    ));
    assert!(matches!(
        check_dimension(Vec::new(), 3),
        Err(EmbeddingError::MalformedResponse(_))
    ));
}

#[test]
fn remote_provider_needs_its_key() {
    let config = EmbeddingConfig {
        provider: EmbeddingProvider::Cohere,
        ..EmbeddingConfig::default()
    };

    let result = build_embedder(&config, &Secrets::default());
    assert!(matches!(result, Err(EmbeddingError::MissingApiKey("COHERE_API_KEY"))));
}

#[test]
fn remote_provider_is_selected_by_config() {
    let config = EmbeddingConfig {
        provider: EmbeddingProvider::Segmind,
        ..EmbeddingConfig::default()
    };
    let secrets = Secrets {
        segmind: Some(ApiKey::new("segmind-key")),
        ..Secrets::default()
    };

    let embedder = build_embedder(&config, &secrets).expect("embedder should build");
    assert_eq!(embedder.dimension(), 4096);
    assert_eq!(embedder.describe(), "segmind");
}

#[cfg(not(feature = "local-embeddings"))]
#[test]
fn local_provider_without_backend_is_unavailable() {
    let result = build_embedder(&EmbeddingConfig::default(), &Secrets::default());
    assert!(matches!(result, Err(EmbeddingError::ProviderUnavailable(_))));
}

#[test]
fn timeouts_are_recognized() {
    assert!(EmbeddingError::Upstream(HttpError::Timeout).is_timeout());
    assert!(!EmbeddingError::EmptyInput.is_timeout());
}
