//! One-shot query generation.

use axum::{Json, extract::State};
use serde::Deserialize;
use tracing::info;

use querypilot_agent::{GenerateRequest, GeneratedQuery, generate_query};

use crate::error::{Result, ServerError};
use crate::state::AppState;

/// Request body for query generation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateQueryRequest {
    #[serde(default)]
    pub data_source_id: Option<String>,
    /// What the query should answer, in plain language.
    #[serde(default)]
    pub requirement: Option<String>,
}

/// POST /api/v1/query/generate
pub async fn generate_handler(
    State(state): State<AppState>,
    Json(request): Json<GenerateQueryRequest>,
) -> Result<Json<GeneratedQuery>> {
    state.require_enabled()?;
    let api_key = state.require_api_key()?;

    let data_source_id = request
        .data_source_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ServerError::missing_field("data_source_id"))?;
    let requirement = request
        .requirement
        .filter(|r| !r.trim().is_empty())
        .ok_or_else(|| ServerError::missing_field("requirement"))?;

    let source = state.data_sources.require(data_source_id.trim())?;
    let schema = state.data_sources.require_schema(data_source_id.trim())?;

    let backend = state
        .backend(api_key)
        .map_err(|e| ServerError::Generation(e.into()))?;

    let generated = generate_query(
        &backend,
        &state.settings.model,
        GenerateRequest {
            schema: &schema,
            requirement: &requirement,
            data_source_type: source.kind(),
            ontology: source.ontology.as_deref(),
        },
    )
    .await
    .map_err(ServerError::Generation)?;

    info!(
        data_source = %source.id,
        requirement_length = requirement.len(),
        "Generated query"
    );

    Ok(Json(generated))
}

#[cfg(test)]
mod tests {
    use crate::routes::testing::{body_json, post_json, test_state};
    use axum::http::StatusCode;
    use querypilot_llm::{LlmError, MockBackend, MockResponse};
    use serde_json::json;

    const READY: &str = "[assistant]\nenabled = true\napi_key = \"k\"\n";

    #[tokio::test]
    async fn test_generate_strips_fence() {
        let (state, mock) = test_state(
            READY,
            vec![MockBackend::text_turn("```sql\nSELECT COUNT(*) FROM orders\n```").into()],
        );

        let response = post_json(
            state,
            "/api/v1/query/generate",
            json!({"data_source_id": "shop", "requirement": "how many orders?"}),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({
                "query": "SELECT COUNT(*) FROM orders",
                "model": "mock-model",
                "usage": {"input_tokens": 10, "output_tokens": 20}
            })
        );

        let request = &mock.requests()[0];
        assert_eq!(request.max_tokens, 2048);
        assert!(!request.stream);
    }

    #[tokio::test]
    async fn test_generate_requires_requirement() {
        let (state, _) = test_state(READY, vec![]);

        let response = post_json(
            state,
            "/api/v1/query/generate",
            json!({"data_source_id": "shop"}),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["message"], "requirement is required.");
    }

    #[tokio::test]
    async fn test_generate_failure_is_500() {
        let (state, _) = test_state(
            READY,
            vec![MockResponse::Fail(LlmError::Backend("overloaded".into()))],
        );

        let response = post_json(
            state,
            "/api/v1/query/generate",
            json!({"data_source_id": "shop", "requirement": "x"}),
        )
        .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let message = body_json(response).await["message"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(message.starts_with("Failed to generate query: "));
        assert!(message.contains("overloaded"));
    }
}
