use super::types::{ErrorResponse, GenerateRequest, GenerateResponse};
use crate::{
    Error, Result,
    pipeline::{ChatTurn, GenerationParams, TextGenerationPipeline},
};
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<dyn TextGenerationPipeline>,
}

impl AppState {
    pub fn new(pipeline: Arc<dyn TextGenerationPipeline>) -> Self {
        Self { pipeline }
    }
}

/// Every failure inside the handler, answered as `500 {"error": ...}`.
///
/// The variants only steer logging; both produce the same response.
#[derive(Debug)]
pub enum RequestFailure {
    InvalidInput(Error),
    InferenceFailure(Error),
}

impl RequestFailure {
    pub fn error(&self) -> &Error {
        match self {
            Self::InvalidInput(e) | Self::InferenceFailure(e) => e,
        }
    }
}

impl From<Error> for RequestFailure {
    fn from(error: Error) -> Self {
        if error.is_client_input() {
            Self::InvalidInput(error)
        } else {
            Self::InferenceFailure(error)
        }
    }
}

impl IntoResponse for RequestFailure {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.error().to_string(),
        };
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

/// `POST /generate`. The body is read raw so malformed JSON takes the same
/// failure path as a model error.
pub async fn generate(
    State(state): State<AppState>,
    body: Bytes,
) -> std::result::Result<Json<GenerateResponse>, RequestFailure> {
    let request_id = Uuid::new_v4();

    match process(&state, &body, request_id).await {
        Ok(generated_text) => {
            info!(
                %request_id,
                generated_chars = generated_text.chars().count(),
                "Generation succeeded"
            );
            Ok(Json(GenerateResponse { generated_text }))
        }
        Err(e) => {
            let failure = RequestFailure::from(e);
            match &failure {
                RequestFailure::InvalidInput(e) => {
                    warn!(%request_id, "Rejected generation request: {}", e)
                }
                RequestFailure::InferenceFailure(e) => {
                    error!(%request_id, "Generation failed: {}", e)
                }
            }
            Err(failure)
        }
    }
}

async fn process(state: &AppState, body: &[u8], request_id: Uuid) -> Result<String> {
    let request: GenerateRequest =
        serde_json::from_slice(body).map_err(|e| Error::invalid_request(e.to_string()))?;

    info!(
        %request_id,
        prompt_chars = request.prompt.chars().count(),
        max_length = request.max_length,
        "Received generation request"
    );

    let turns = vec![ChatTurn::user(request.prompt)];
    let params = GenerationParams::new(request.max_length);
    let pipeline = Arc::clone(&state.pipeline);

    let candidates = tokio::task::spawn_blocking(move || pipeline.generate(&turns, &params))
        .await
        .map_err(|e| Error::internal(format!("Generation task failed: {}", e)))??;

    let first = candidates
        .into_iter()
        .next()
        .ok_or_else(|| Error::inference("Model returned no candidates"))?;

    Ok(first.generated_text.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{GeneratedCandidate, MockTextGenerationPipeline};
    use pretty_assertions::assert_eq;

    fn state_with(mock: MockTextGenerationPipeline) -> AppState {
        AppState::new(Arc::new(mock))
    }

    async fn call(state: AppState, body: &str) -> (StatusCode, serde_json::Value) {
        let response = generate(State(state), Bytes::from(body.to_string()))
            .await
            .into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_default_token_budget_is_256() {
        let mut mock = MockTextGenerationPipeline::new();
        mock.expect_generate()
            .withf(|turns, params| {
                turns.to_vec() == vec![ChatTurn::user("Hello")]
                    && params.max_new_tokens == 256
                    && !params.return_full_text
            })
            .times(1)
            .returning(|_, _| Ok(vec![GeneratedCandidate::new("Hi there")]));

        let (status, body) = call(state_with(mock), r#"{"prompt": "Hello"}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["generated_text"], "Hi there");
    }

    #[tokio::test]
    async fn test_explicit_token_budget_is_forwarded() {
        let mut mock = MockTextGenerationPipeline::new();
        mock.expect_generate()
            .withf(|_, params| params.max_new_tokens == 10)
            .times(1)
            .returning(|_, _| Ok(vec![GeneratedCandidate::new("ok")]));

        let (status, _) = call(state_with(mock), r#"{"prompt": "Hello", "max_length": 10}"#).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_output_is_trimmed_and_first_candidate_wins() {
        let mut mock = MockTextGenerationPipeline::new();
        mock.expect_generate().returning(|_, _| {
            Ok(vec![
                GeneratedCandidate::new("\n  first answer \t\n"),
                GeneratedCandidate::new("second answer"),
            ])
        });

        let (status, body) = call(state_with(mock), r#"{"prompt": "q"}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["generated_text"], "first answer");
    }

    #[tokio::test]
    async fn test_malformed_json_never_reaches_the_model() {
        let mut mock = MockTextGenerationPipeline::new();
        mock.expect_generate().never();

        let (status, body) = call(state_with(mock), "not json").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().starts_with("Invalid request"));
    }

    #[tokio::test]
    async fn test_model_error_becomes_500() {
        let mut mock = MockTextGenerationPipeline::new();
        mock.expect_generate()
            .returning(|_, _| Err(Error::inference("CUDA out of memory")));

        let (status, body) = call(state_with(mock), r#"{"prompt": "q"}"#).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Inference error: CUDA out of memory");
    }

    #[tokio::test]
    async fn test_no_candidates_becomes_500() {
        let mut mock = MockTextGenerationPipeline::new();
        mock.expect_generate().returning(|_, _| Ok(Vec::new()));

        let (status, body) = call(state_with(mock), "{}").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body["error"].as_str().unwrap().is_empty());
    }

    #[test]
    fn test_failure_classification() {
        assert!(matches!(
            RequestFailure::from(Error::invalid_request("x")),
            RequestFailure::InvalidInput(_)
        ));
        assert!(matches!(
            RequestFailure::from(Error::internal("x")),
            RequestFailure::InferenceFailure(_)
        ));
    }
}
