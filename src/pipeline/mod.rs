mod candle;
mod chat_template;
pub mod loader;
mod types;

pub use candle::CandlePipeline;
pub use chat_template::{ChatTemplate, DEFAULT_CHAT_TEMPLATE};
pub use loader::load;
pub use types::*;

use crate::Result;

/// A loaded text-generation model: conversation turns in, candidate texts out.
///
/// `generate` blocks for the whole generation and must be called off the async
/// runtime. Implementations serialize access to any mutable model state.
#[cfg_attr(test, mockall::automock)]
pub trait TextGenerationPipeline: Send + Sync {
    fn generate(
        &self,
        turns: &[ChatTurn],
        params: &GenerationParams,
    ) -> Result<Vec<GeneratedCandidate>>;
}
