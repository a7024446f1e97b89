//! Model Loader: resolves model files, builds the candle model, tokenizer and
//! chat template, and hands back a ready [`CandlePipeline`].
//!
//! Loading happens once, before the listener binds. Any error here is fatal.

use super::{CandlePipeline, ChatTemplate, candle::Backbone};
use crate::{
    Error, Result,
    config::{DeviceSpec, ModelConfig, Precision},
};
use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use candle_transformers::models::{gemma, gemma2};
use hf_hub::{
    Repo, RepoType,
    api::sync::{ApiBuilder, ApiRepo},
};
use serde_json::Value;
use std::{
    collections::BTreeSet,
    env,
    path::{Path, PathBuf},
    time::Instant,
};
use tokenizers::Tokenizer;
use tracing::{debug, info};

const HF_TOKEN_ENV_VAR: &str = "HF_TOKEN";

const CONFIG_FILE: &str = "config.json";
const TOKENIZER_FILE: &str = "tokenizer.json";
const TOKENIZER_CONFIG_FILE: &str = "tokenizer_config.json";
const SINGLE_WEIGHTS_FILE: &str = "model.safetensors";
const WEIGHTS_INDEX_FILE: &str = "model.safetensors.index.json";

/// Vocabulary entries that end a Gemma turn.
const STOP_TOKEN_NAMES: [&str; 2] = ["<eos>", "<end_of_turn>"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Architecture {
    Gemma,
    Gemma2,
}

impl Architecture {
    pub fn from_model_config(config: &Value) -> Result<Self> {
        let model_type = config
            .get("model_type")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::model("config.json has no model_type"))?;

        match model_type {
            "gemma" => Ok(Self::Gemma),
            "gemma2" => Ok(Self::Gemma2),
            other => Err(Error::model(format!(
                "Unsupported model type '{}'. Supported: gemma, gemma2",
                other
            ))),
        }
    }
}

/// Paths of everything the pipeline needs, either local or in the hub cache.
#[derive(Debug, Clone)]
pub struct ModelFiles {
    pub config: PathBuf,
    pub tokenizer: PathBuf,
    pub tokenizer_config: Option<PathBuf>,
    pub weights: Vec<PathBuf>,
}

pub fn load(config: &ModelConfig) -> Result<CandlePipeline> {
    let started = Instant::now();
    info!(
        "Loading model '{}' ({:?} on {})",
        config.id, config.dtype, config.device
    );

    let files = resolve_files(config)?;
    debug!("Resolved model files: {:?}", files);

    let model_config: Value = serde_json::from_str(&std::fs::read_to_string(&files.config)?)?;
    let architecture = Architecture::from_model_config(&model_config)?;

    let device = select_device(config.device)?;
    let dtype = to_dtype(config.dtype);

    // SAFETY: the weight files are memory-mapped read-only and must not be
    // modified while the process runs.
    let vb = unsafe { VarBuilder::from_mmaped_safetensors(&files.weights, dtype, &device)? };

    let model = match architecture {
        Architecture::Gemma => {
            let cfg: gemma::Config = serde_json::from_value(model_config.clone())?;
            Backbone::Gemma(gemma::Model::new(config.use_flash_attn, &cfg, vb)?)
        }
        Architecture::Gemma2 => {
            let cfg: gemma2::Config = serde_json::from_value(model_config.clone())?;
            Backbone::Gemma2(gemma2::Model::new(config.use_flash_attn, &cfg, vb)?)
        }
    };

    let tokenizer =
        Tokenizer::from_file(&files.tokenizer).map_err(|e| Error::tokenizer(e.to_string()))?;

    let tokenizer_config = match &files.tokenizer_config {
        Some(path) => Some(serde_json::from_str::<Value>(&std::fs::read_to_string(path)?)?),
        None => None,
    };
    let chat_template = ChatTemplate::from_tokenizer_config(
        tokenizer_config.as_ref(),
        config.chat_template.as_deref(),
    )?;

    let stop_tokens = stop_tokens(&model_config, &tokenizer);
    if stop_tokens.is_empty() {
        return Err(Error::model("No end-of-sequence token found for the model"));
    }

    info!(
        "Model '{}' ({:?}) loaded in {:.1}s, stop tokens {:?}",
        config.id,
        architecture,
        started.elapsed().as_secs_f32(),
        stop_tokens
    );

    Ok(CandlePipeline::new(
        model,
        tokenizer,
        chat_template,
        device,
        stop_tokens,
        config.sampling.clone(),
    ))
}

/// Uses `config.id` as a local directory when one exists, else fetches it from the hub.
pub fn resolve_files(config: &ModelConfig) -> Result<ModelFiles> {
    let local = Path::new(&config.id);
    if local.is_dir() {
        resolve_local(local)
    } else {
        resolve_hub(config)
    }
}

fn resolve_local(dir: &Path) -> Result<ModelFiles> {
    let required = |name: &str| -> Result<PathBuf> {
        let path = dir.join(name);
        if path.is_file() {
            Ok(path)
        } else {
            Err(Error::model(format!("{} is missing {}", dir.display(), name)))
        }
    };

    let config = required(CONFIG_FILE)?;
    let tokenizer = required(TOKENIZER_FILE)?;
    let tokenizer_config = Some(dir.join(TOKENIZER_CONFIG_FILE)).filter(|p| p.is_file());

    let index = dir.join(WEIGHTS_INDEX_FILE);
    let weights = if index.is_file() {
        let index: Value = serde_json::from_str(&std::fs::read_to_string(&index)?)?;
        safetensors_shards(&index)?
            .into_iter()
            .map(|shard| required(&shard))
            .collect::<Result<Vec<_>>>()?
    } else {
        vec![required(SINGLE_WEIGHTS_FILE)?]
    };

    Ok(ModelFiles {
        config,
        tokenizer,
        tokenizer_config,
        weights,
    })
}

fn resolve_hub(config: &ModelConfig) -> Result<ModelFiles> {
    let api = ApiBuilder::new()
        .with_progress(true)
        .with_token(env::var(HF_TOKEN_ENV_VAR).ok())
        .build()?;
    let repo = api.repo(Repo::with_revision(
        config.id.clone(),
        RepoType::Model,
        config.revision.clone(),
    ));

    let model_config = repo.get(CONFIG_FILE).map_err(|e| {
        Error::model(format!(
            "Failed to fetch '{}' from the Hugging Face Hub: {}. Is this a valid model id?",
            config.id, e
        ))
    })?;
    let tokenizer = repo.get(TOKENIZER_FILE)?;
    let tokenizer_config = repo.get(TOKENIZER_CONFIG_FILE).ok();
    let weights = hub_weights(&repo)?;

    Ok(ModelFiles {
        config: model_config,
        tokenizer,
        tokenizer_config,
        weights,
    })
}

fn hub_weights(repo: &ApiRepo) -> Result<Vec<PathBuf>> {
    match repo.get(WEIGHTS_INDEX_FILE) {
        Ok(index_path) => {
            let index: Value = serde_json::from_str(&std::fs::read_to_string(index_path)?)?;
            safetensors_shards(&index)?
                .iter()
                .map(|shard| repo.get(shard).map_err(Error::from))
                .collect()
        }
        Err(_) => Ok(vec![repo.get(SINGLE_WEIGHTS_FILE)?]),
    }
}

/// Distinct shard file names listed in a `model.safetensors.index.json`.
pub fn safetensors_shards(index: &Value) -> Result<Vec<String>> {
    let weight_map = index
        .get("weight_map")
        .and_then(Value::as_object)
        .ok_or_else(|| Error::model("Weights index has no weight_map"))?;

    let shards: BTreeSet<String> = weight_map
        .values()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect();

    if shards.is_empty() {
        return Err(Error::model("Weights index lists no shards"));
    }
    Ok(shards.into_iter().collect())
}

/// `eos_token_id` from config.json, which holds either one id or a list.
pub fn eos_token_ids(model_config: &Value) -> Vec<u32> {
    match model_config.get("eos_token_id") {
        Some(Value::Number(id)) => id.as_u64().map(|id| id as u32).into_iter().collect(),
        Some(Value::Array(ids)) => ids
            .iter()
            .filter_map(Value::as_u64)
            .map(|id| id as u32)
            .collect(),
        _ => Vec::new(),
    }
}

fn stop_tokens(model_config: &Value, tokenizer: &Tokenizer) -> Vec<u32> {
    let mut tokens = eos_token_ids(model_config);
    tokens.extend(
        STOP_TOKEN_NAMES
            .iter()
            .filter_map(|name| tokenizer.token_to_id(name)),
    );
    tokens.sort_unstable();
    tokens.dedup();
    tokens
}

pub fn select_device(spec: DeviceSpec) -> Result<Device> {
    let device = match spec {
        DeviceSpec::Cpu => Device::Cpu,
        DeviceSpec::Cuda(ordinal) => Device::new_cuda(ordinal)?,
        DeviceSpec::Metal(ordinal) => Device::new_metal(ordinal)?,
    };
    Ok(device)
}

pub fn to_dtype(precision: Precision) -> DType {
    match precision {
        Precision::BFloat16 => DType::BF16,
        Precision::Float16 => DType::F16,
        Precision::Float32 => DType::F32,
    }
}
