use crate::{
    Error, Result,
    server::types::{ErrorResponse, GenerateRequest, GenerateResponse},
};
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5000";

/// Client for a running `/generate` endpoint.
#[derive(Debug, Clone)]
pub struct GenerateClient {
    http: reqwest::Client,
    endpoint: String,
}

impl GenerateClient {
    pub fn new(base_url: impl AsRef<str>) -> Self {
        Self::with_http_client(reqwest::Client::new(), base_url)
    }

    pub fn with_http_client(http: reqwest::Client, base_url: impl AsRef<str>) -> Self {
        Self {
            http,
            endpoint: format!("{}/generate", base_url.as_ref().trim_end_matches('/')),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Sends `prompt` and returns the server's generated text.
    ///
    /// Non-2xx answers become [`Error::Remote`], carrying the server's `error`
    /// message when the body has one.
    pub async fn generate_text(&self, prompt: &str, max_length: usize) -> Result<String> {
        let request = GenerateRequest {
            prompt: prompt.to_string(),
            max_length,
        };

        debug!("Posting generation request to {}", self.endpoint);

        let response = self.http.post(&self.endpoint).json(&request).send().await?;
        let status = response.status();

        if status.is_success() {
            let body: GenerateResponse = response.json().await?;
            return Ok(body.generated_text);
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorResponse>(&text)
            .map(|body| body.error)
            .unwrap_or(text);

        Err(Error::Remote {
            status: status.as_u16(),
            message,
        })
    }
}

impl Default for GenerateClient {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_endpoint() {
        assert_eq!(
            GenerateClient::default().endpoint(),
            "http://127.0.0.1:5000/generate"
        );
    }

    #[test]
    fn test_trailing_slash_is_ignored() {
        let client = GenerateClient::new("http://localhost:8080/");
        assert_eq!(client.endpoint(), "http://localhost:8080/generate");
    }
}
