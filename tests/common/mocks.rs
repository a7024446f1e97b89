use llm_inference::{
    Error, Result,
    pipeline::{ChatTurn, GeneratedCandidate, GenerationParams, TextGenerationPipeline},
};
use std::sync::{Arc, Mutex};

/// A generation call as the pipeline saw it.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub turns: Vec<ChatTurn>,
    pub params: GenerationParams,
}

/// Stub pipeline that records calls and replays a fixed outcome.
#[derive(Debug, Clone)]
pub struct StubPipeline {
    pub calls: Arc<Mutex<Vec<RecordedCall>>>,
    pub candidates: Vec<GeneratedCandidate>,
    pub error: Option<String>,
}

impl StubPipeline {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            candidates: vec![GeneratedCandidate::new("stub output")],
            error: None,
        }
    }

    pub fn with_output(mut self, text: &str) -> Self {
        self.candidates = vec![GeneratedCandidate::new(text)];
        self
    }

    pub fn with_candidates(mut self, candidates: Vec<GeneratedCandidate>) -> Self {
        self.candidates = candidates;
        self
    }

    pub fn with_error(mut self, error: &str) -> Self {
        self.error = Some(error.to_string());
        self
    }

    pub fn get_calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for StubPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl TextGenerationPipeline for StubPipeline {
    fn generate(
        &self,
        turns: &[ChatTurn],
        params: &GenerationParams,
    ) -> Result<Vec<GeneratedCandidate>> {
        self.calls.lock().unwrap().push(RecordedCall {
            turns: turns.to_vec(),
            params: *params,
        });

        if let Some(ref error) = self.error {
            return Err(Error::inference(error.clone()));
        }

        Ok(self.candidates.clone())
    }
}

/// Pipeline whose generation panics, as a crashed inference backend would.
pub struct PanickingPipeline;

impl TextGenerationPipeline for PanickingPipeline {
    fn generate(
        &self,
        _turns: &[ChatTurn],
        _params: &GenerationParams,
    ) -> Result<Vec<GeneratedCandidate>> {
        panic!("inference backend crashed");
    }
}
