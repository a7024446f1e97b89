use super::{ChatTemplate, ChatTurn, GeneratedCandidate, GenerationParams, TextGenerationPipeline};
use crate::{Error, Result, config::SamplingConfig};
use candle_core::{DType, Device, Tensor};
use candle_transformers::{
    generation::LogitsProcessor,
    models::{gemma, gemma2},
};
use std::sync::{Mutex, PoisonError};
use tokenizers::Tokenizer;
use tracing::debug;

/// Decoder weights for the supported architectures.
pub(crate) enum Backbone {
    Gemma(gemma::Model),
    Gemma2(gemma2::Model),
}

impl Backbone {
    fn forward(&mut self, input_ids: &Tensor, seqlen_offset: usize) -> candle_core::Result<Tensor> {
        match self {
            Self::Gemma(model) => model.forward(input_ids, seqlen_offset),
            Self::Gemma2(model) => model.forward(input_ids, seqlen_offset),
        }
    }

    fn clear_kv_cache(&mut self) {
        match self {
            Self::Gemma(model) => model.clear_kv_cache(),
            Self::Gemma2(model) => model.clear_kv_cache(),
        }
    }
}

/// Text-generation pipeline over a candle model held in process memory.
///
/// The model carries its KV cache, so generations run one at a time behind
/// a mutex. Requests that arrive concurrently queue on the lock.
pub struct CandlePipeline {
    model: Mutex<Backbone>,
    tokenizer: Tokenizer,
    chat_template: ChatTemplate,
    device: Device,
    stop_tokens: Vec<u32>,
    sampling: SamplingConfig,
}

impl CandlePipeline {
    pub(crate) fn new(
        model: Backbone,
        tokenizer: Tokenizer,
        chat_template: ChatTemplate,
        device: Device,
        stop_tokens: Vec<u32>,
        sampling: SamplingConfig,
    ) -> Self {
        Self {
            model: Mutex::new(model),
            tokenizer,
            chat_template,
            device,
            stop_tokens,
            sampling,
        }
    }

    fn encode(&self, prompt: &str) -> Result<Vec<u32>> {
        // The chat template already emits BOS.
        let encoding = self
            .tokenizer
            .encode(prompt, false)
            .map_err(|e| Error::tokenizer(e.to_string()))?;
        Ok(encoding.get_ids().to_vec())
    }

    fn decode(&self, tokens: &[u32]) -> Result<String> {
        self.tokenizer
            .decode(tokens, true)
            .map_err(|e| Error::tokenizer(e.to_string()))
    }

    /// Runs prefill plus incremental decoding and returns only the new tokens.
    fn run(&self, prompt_tokens: &[u32], max_new_tokens: usize) -> Result<Vec<u32>> {
        // The KV cache is reset before every run, so a poisoned lock leaves nothing stale.
        let mut model = self.model.lock().unwrap_or_else(PoisonError::into_inner);
        model.clear_kv_cache();

        let mut logits_processor = LogitsProcessor::new(
            self.sampling.seed,
            self.sampling.temperature,
            self.sampling.top_p,
        );

        let mut tokens = prompt_tokens.to_vec();
        // `max_new_tokens` comes from the request, so it must not size an allocation.
        let mut generated = Vec::new();

        for step in 0..max_new_tokens {
            let context_size = if step > 0 { 1 } else { tokens.len() };
            let start_pos = tokens.len().saturating_sub(context_size);
            let input = Tensor::new(&tokens[start_pos..], &self.device)?.unsqueeze(0)?;

            let logits = model.forward(&input, start_pos)?;
            let logits = logits.squeeze(0)?.squeeze(0)?.to_dtype(DType::F32)?;
            let logits = if self.sampling.repeat_penalty == 1.0 {
                logits
            } else {
                let start_at = tokens.len().saturating_sub(self.sampling.repeat_last_n);
                candle_transformers::utils::apply_repeat_penalty(
                    &logits,
                    self.sampling.repeat_penalty,
                    &tokens[start_at..],
                )?
            };

            let next_token = logits_processor.sample(&logits)?;
            if self.stop_tokens.contains(&next_token) {
                debug!("Stop token {} after {} new tokens", next_token, step);
                break;
            }

            tokens.push(next_token);
            generated.push(next_token);
        }

        model.clear_kv_cache();
        Ok(generated)
    }
}

impl TextGenerationPipeline for CandlePipeline {
    fn generate(
        &self,
        turns: &[ChatTurn],
        params: &GenerationParams,
    ) -> Result<Vec<GeneratedCandidate>> {
        let prompt = self.chat_template.render(turns)?;
        let prompt_tokens = self.encode(&prompt)?;
        if prompt_tokens.is_empty() {
            return Err(Error::inference("Prompt encoded to zero tokens"));
        }

        debug!(
            "Generating up to {} tokens from a {}-token prompt",
            params.max_new_tokens,
            prompt_tokens.len()
        );

        let generated = if params.max_new_tokens == 0 {
            Vec::new()
        } else {
            self.run(&prompt_tokens, params.max_new_tokens)?
        };

        let text = self.decode(&generated)?;
        let generated_text = if params.return_full_text {
            format!("{}{}", prompt, text)
        } else {
            text
        };

        Ok(vec![GeneratedCandidate { generated_text }])
    }
}
