// HTTP embedding adapter integration tests (feature-gated).
#![allow(missing_docs)]

#[cfg(feature = "openai")]
mod openai {
    use code_index_adapters::embedding::openai::{OpenAiEmbedding, OpenAiEmbeddingConfig};
    use code_index_ports::{EmbeddingLimits, EmbeddingPort};
    use code_index_shared::{ErrorCode, RequestContext, Result, SecretString};
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer, dimension: Option<u32>) -> OpenAiEmbeddingConfig {
        OpenAiEmbeddingConfig {
            api_key: SecretString::new("example"), // pragma: allowlist secret
            model: Some("text-embedding-3-small".into()),
            base_url: Some(server.uri().into()),
            timeout_ms: 5_000,
            dimension,
            limits: EmbeddingLimits::default(),
        }
    }

    #[tokio::test]
    async fn batch_is_sent_with_bearer_auth_and_reordered() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(header("authorization", "Bearer example"))
            .and(body_json(json!({
                "model": "text-embedding-3-small",
                "input": ["alpha", "beta"],
                "dimensions": 2
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    { "embedding": [0.3, 0.4], "index": 1 },
                    { "embedding": [0.1, 0.2], "index": 0 }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = OpenAiEmbedding::new(&config(&server, Some(2)))?;
        let ctx = RequestContext::new_request();
        let vectors = adapter
            .embed_batch(&ctx, vec!["alpha".to_owned(), "beta".to_owned()].into())
            .await?;
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0].as_slice(), &[0.1, 0.2]);
        assert_eq!(vectors[1].as_slice(), &[0.3, 0.4]);
        Ok(())
    }

    #[tokio::test]
    async fn rate_limit_is_not_retriable() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(
                ResponseTemplate::new(429)
                    .set_body_json(json!({ "error": { "message": "slow down" } })),
            )
            .mount(&server)
            .await;

        let adapter = OpenAiEmbedding::new(&config(&server, None))?;
        let ctx = RequestContext::new_request();
        let Err(error) = adapter.embed_batch(&ctx, vec!["a".to_owned()].into()).await else {
            panic!("429 must fail");
        };
        assert_eq!(error.code, ErrorCode::rate_limited());
        assert!(!error.is_retriable());
        assert_eq!(error.metadata_value("status"), Some("429"));
        Ok(())
    }

    #[tokio::test]
    async fn auth_failure_is_fatal() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let adapter = OpenAiEmbedding::new(&config(&server, None))?;
        let ctx = RequestContext::new_request();
        let Err(error) = adapter.embed_batch(&ctx, vec!["a".to_owned()].into()).await else {
            panic!("401 must fail");
        };
        assert_eq!(error.code, ErrorCode::permission_denied());
        assert!(!error.is_retriable());
        Ok(())
    }

    #[tokio::test]
    async fn detect_dimension_probes_once_without_override() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{ "embedding": [0.0, 0.0, 1.0], "index": 0 }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = OpenAiEmbedding::new(&config(&server, None))?;
        let ctx = RequestContext::new_request();
        assert_eq!(adapter.detect_dimension(&ctx).await?, 3);
        Ok(())
    }
}

#[cfg(feature = "ollama")]
mod ollama {
    use code_index_adapters::embedding::ollama::{OllamaEmbedding, OllamaEmbeddingConfig};
    use code_index_ports::{EmbeddingLimits, EmbeddingPort};
    use code_index_shared::{ErrorCode, RequestContext, Result};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> OllamaEmbeddingConfig {
        OllamaEmbeddingConfig {
            model: Some("nomic-embed-text".into()),
            base_url: Some(server.uri().into()),
            timeout_ms: 5_000,
            dimension: None,
            truncate: false,
            limits: EmbeddingLimits::default(),
        }
    }

    #[tokio::test]
    async fn embed_endpoint_returns_vectors_in_order() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .and(body_partial_json(json!({
                "model": "nomic-embed-text",
                "input": ["fn a() {}", "fn b() {}"]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "embeddings": [[1.0, 0.0], [0.0, 1.0]]
            })))
            .mount(&server)
            .await;

        let adapter = OllamaEmbedding::new(&config(&server))?;
        let ctx = RequestContext::new_request();
        let vectors = adapter
            .embed_batch(&ctx, vec!["fn a() {}".to_owned(), "fn b() {}".to_owned()].into())
            .await?;
        assert_eq!(vectors[0].as_slice(), &[1.0, 0.0]);
        assert_eq!(vectors[1].as_slice(), &[0.0, 1.0]);
        Ok(())
    }

    #[tokio::test]
    async fn missing_vectors_are_a_transient_failure() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "embeddings": [[1.0, 0.0]] })),
            )
            .mount(&server)
            .await;

        let adapter = OllamaEmbedding::new(&config(&server))?;
        let ctx = RequestContext::new_request();
        let Err(error) = adapter
            .embed_batch(&ctx, vec!["a".to_owned(), "b".to_owned()].into())
            .await
        else {
            panic!("count mismatch must fail");
        };
        assert_eq!(error.code, ErrorCode::new("embedding", "vector_count_mismatch"));
        assert!(error.is_retriable());
        Ok(())
    }

    #[tokio::test]
    async fn server_errors_are_retriable() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .respond_with(
                ResponseTemplate::new(503).set_body_json(json!({ "error": "model loading" })),
            )
            .mount(&server)
            .await;

        let adapter = OllamaEmbedding::new(&config(&server))?;
        let ctx = RequestContext::new_request();
        let Err(error) = adapter.embed_batch(&ctx, vec!["a".to_owned()].into()).await else {
            panic!("503 must fail");
        };
        assert_eq!(error.code, ErrorCode::new("core", "dependency_unavailable"));
        assert!(error.is_retriable());
        Ok(())
    }
}

#[cfg(feature = "gemini")]
mod gemini {
    use code_index_adapters::embedding::gemini::{GeminiEmbedding, GeminiEmbeddingConfig};
    use code_index_ports::{EmbeddingLimits, EmbeddingPort};
    use code_index_shared::{RequestContext, Result, SecretString};
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn batch_embed_contents_uses_api_key_header() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-embedding-001:batchEmbedContents"))
            .and(header("x-goog-api-key", "example"))
            .and(body_json(json!({
                "requests": [
                    {
                        "model": "models/gemini-embedding-001",
                        "content": { "parts": [{ "text": "a" }] },
                        "output_dimensionality": 2
                    },
                    {
                        "model": "models/gemini-embedding-001",
                        "content": { "parts": [{ "text": "b" }] },
                        "output_dimensionality": 2
                    }
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "embeddings": [{ "values": [0.1, 0.2] }, { "values": [0.3, 0.4] }]
            })))
            .mount(&server)
            .await;

        let adapter = GeminiEmbedding::new(&GeminiEmbeddingConfig {
            api_key: SecretString::new("example"), // pragma: allowlist secret
            model: Some("gemini-embedding-001".into()),
            base_url: Some(server.uri().into()),
            timeout_ms: 5_000,
            dimension: Some(2),
            limits: EmbeddingLimits::default(),
        })?;
        let ctx = RequestContext::new_request();
        let vectors = adapter
            .embed_batch(&ctx, vec!["a".to_owned(), "b".to_owned()].into())
            .await?;
        assert_eq!(vectors[0].as_slice(), &[0.1, 0.2]);
        assert_eq!(vectors[1].as_slice(), &[0.3, 0.4]);
        Ok(())
    }
}
