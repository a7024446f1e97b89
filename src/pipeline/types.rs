use serde::{Deserialize, Serialize};

/// One conversational turn handed to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationParams {
    /// Upper bound on newly generated tokens, prompt excluded.
    pub max_new_tokens: usize,
    /// Prefix the rendered prompt to the returned text.
    pub return_full_text: bool,
}

impl GenerationParams {
    pub fn new(max_new_tokens: usize) -> Self {
        Self {
            max_new_tokens,
            return_full_text: false,
        }
    }

    pub fn with_full_text(mut self, return_full_text: bool) -> Self {
        self.return_full_text = return_full_text;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedCandidate {
    pub generated_text: String,
}

impl GeneratedCandidate {
    pub fn new(generated_text: impl Into<String>) -> Self {
        Self {
            generated_text: generated_text.into(),
        }
    }
}
