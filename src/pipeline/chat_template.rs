//! Chat template rendering with Jinja templates, as shipped in Hugging Face
//! `tokenizer_config.json` files.

use super::ChatTurn;
use crate::{Error, Result};
use minijinja::{Environment, ErrorKind, context};
use serde_json::Value;

/// Gemma turn format, used when the model ships no template of its own.
pub const DEFAULT_CHAT_TEMPLATE: &str = r#"{{ bos_token }}{% for message in messages %}{% if message['role'] == 'assistant' %}{% set role = 'model' %}{% else %}{% set role = message['role'] %}{% endif %}{{ '<start_of_turn>' + role + '\n' + message['content'] | trim + '<end_of_turn>\n' }}{% endfor %}{% if add_generation_prompt %}{{ '<start_of_turn>model\n' }}{% endif %}"#;

const TEMPLATE_NAME: &str = "chat";

/// A chat template compiled once into its own environment.
#[derive(Debug, Clone)]
pub struct ChatTemplate {
    env: Environment<'static>,
    bos_token: String,
    eos_token: String,
}

impl ChatTemplate {
    /// Compiles `source` up front so a broken template fails at load time.
    pub fn new(
        source: impl Into<String>,
        bos_token: Option<String>,
        eos_token: Option<String>,
    ) -> Result<Self> {
        let mut env = Environment::new();
        env.add_function("raise_exception", raise_exception);
        env.add_template_owned(TEMPLATE_NAME, source.into())
            .map_err(|e| Error::template(format!("Failed to add template: {}", e)))?;

        Ok(Self {
            env,
            bos_token: bos_token.unwrap_or_default(),
            eos_token: eos_token.unwrap_or_default(),
        })
    }

    /// Builds a template from a parsed `tokenizer_config.json`.
    ///
    /// `override_source` wins over the config's own `chat_template`; without
    /// either, [`DEFAULT_CHAT_TEMPLATE`] is used.
    pub fn from_tokenizer_config(
        tokenizer_config: Option<&Value>,
        override_source: Option<&str>,
    ) -> Result<Self> {
        let source = override_source
            .map(str::to_string)
            .or_else(|| tokenizer_config.and_then(template_from_config))
            .unwrap_or_else(|| DEFAULT_CHAT_TEMPLATE.to_string());

        let bos_token = tokenizer_config.and_then(|c| special_token(c, "bos_token"));
        let eos_token = tokenizer_config.and_then(|c| special_token(c, "eos_token"));

        Self::new(source, bos_token, eos_token)
    }

    /// Renders `turns` into a prompt that ends with the model's generation cue.
    pub fn render(&self, turns: &[ChatTurn]) -> Result<String> {
        let template = self
            .env
            .get_template(TEMPLATE_NAME)
            .map_err(|e| Error::template(format!("Failed to get template: {}", e)))?;

        template
            .render(context! {
                messages => turns,
                add_generation_prompt => true,
                bos_token => self.bos_token.as_str(),
                eos_token => self.eos_token.as_str(),
            })
            .map_err(|e| Error::template(format!("Failed to render template: {}", e)))
    }
}

fn raise_exception(message: String) -> std::result::Result<String, minijinja::Error> {
    Err(minijinja::Error::new(ErrorKind::InvalidOperation, message))
}

/// `chat_template` is either a string or a list of `{name, template}` entries.
fn template_from_config(config: &Value) -> Option<String> {
    match config.get("chat_template")? {
        Value::String(template) => Some(template.clone()),
        Value::Array(entries) => entries
            .iter()
            .find(|entry| entry.get("name").and_then(Value::as_str) == Some("default"))
            .and_then(|entry| entry.get("template"))
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

/// Special tokens appear either as plain strings or as `{"content": ...}` objects.
fn special_token(config: &Value, key: &str) -> Option<String> {
    match config.get(key)? {
        Value::String(token) => Some(token.clone()),
        Value::Object(token) => token
            .get("content")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}
