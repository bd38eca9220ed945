//! Ollama completion backend.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use super::{CompletionBackend, CompletionError, CompletionRequest};

/// Default address of a local Ollama server.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Default model used for argument synthesis.
pub const DEFAULT_MODEL: &str = "mistral";

/// Completion backend speaking the Ollama `/api/generate` protocol.
///
/// Requests are non-streaming: the server buffers the whole completion and
/// returns it in the `response` field. The request timeout is enforced at
/// the HTTP client level; the synthesis layer adds its own outer deadline
/// on top.
pub struct OllamaBackend {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaBackend {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        let base_url = base_url.into();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }

    /// The model this backend generates with.
    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url)
    }
}

/// Build the JSON body for an `/api/generate` call.
///
/// Decoding parameters ride in `options`; `num_predict` is Ollama's name
/// for the output token cap.
fn request_body(model: &str, request: &CompletionRequest) -> serde_json::Value {
    serde_json::json!({
        "model": model,
        "prompt": request.prompt,
        "stream": false,
        "options": {
            "temperature": request.temperature,
            "top_k": request.top_k,
            "num_predict": request.max_tokens,
            "stop": request.stop,
        },
    })
}

impl CompletionBackend for OllamaBackend {
    fn name(&self) -> &str {
        "Ollama"
    }

    fn complete<'a>(
        &'a self,
        request: &'a CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<String, CompletionError>> + Send + 'a>> {
        Box::pin(async move {
            let body = request_body(&self.model, request);
            let resp = self.client.post(self.endpoint()).json(&body).send().await?;

            let status = resp.status();
            if !status.is_success() {
                return Err(CompletionError::Status(status.as_u16()));
            }

            let data: serde_json::Value = resp.json().await?;
            match data["response"].as_str() {
                Some(text) => Ok(text.to_string()),
                None => Err(CompletionError::InvalidResponse(
                    "missing 'response' field".into(),
                )),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_carries_decoding_options() {
        let request = CompletionRequest {
            prompt: "List the arguments.".into(),
            temperature: 0.0,
            top_k: 1,
            max_tokens: 512,
            stop: vec!["END".into()],
        };
        let body = request_body("mistral", &request);

        assert_eq!(body["model"], "mistral");
        assert_eq!(body["prompt"], "List the arguments.");
        assert_eq!(body["stream"], false);
        assert_eq!(body["options"]["temperature"], 0.0);
        assert_eq!(body["options"]["top_k"], 1);
        assert_eq!(body["options"]["num_predict"], 512);
        assert_eq!(body["options"]["stop"][0], "END");
    }

    #[test]
    fn deterministic_request_uses_greedy_decoding() {
        let request = CompletionRequest::deterministic("p".into(), 256);
        let body = request_body(DEFAULT_MODEL, &request);
        assert_eq!(body["options"]["temperature"], 0.0);
        assert_eq!(body["options"]["top_k"], 1);
        assert!(body["options"]["stop"].as_array().unwrap().is_empty());
    }

    #[test]
    fn endpoint_tolerates_trailing_slash() {
        let backend = OllamaBackend::new(
            "http://localhost:11434/",
            DEFAULT_MODEL,
            Duration::from_secs(5),
        );
        assert_eq!(backend.endpoint(), "http://localhost:11434/api/generate");
    }
}
