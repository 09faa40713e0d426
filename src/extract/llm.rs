use crate::cache::ExtractionCache;
use crate::config::LlmConfig;
use crate::error::{Result, TriplegraphError};
use crate::triple::Triple;
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

const SYSTEM_PROMPT: &str = "You are a knowledge extraction expert. Extract subject-predicate-object triples and return them as valid JSON.";

/// Request structure for the chat completions API
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// Response structure from the chat completions API
#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

/// A failed completion attempt. `status` is `None` for transport failures.
struct RequestFailure {
    status: Option<StatusCode>,
    message: String,
}

impl RequestFailure {
    fn is_retryable(&self) -> bool {
        matches!(self.status, Some(s) if s == StatusCode::TOO_MANY_REQUESTS || s.is_server_error())
    }
}

/// OpenAI-compatible chat completions client used for triple extraction
///
/// Groq is the default endpoint; any service exposing `/chat/completions`
/// (OpenAI, Ollama, LM Studio) works by changing `llm.base_url`.
pub struct LlmClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    max_retries: usize,
    retry_delay: Duration,
    cache: Option<Arc<ExtractionCache>>,
}

impl LlmClient {
    /// Create a new client from the `[llm]` config section
    pub fn new(api_key: String, config: &LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TriplegraphError::Llm(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
            retry_delay: Duration::from_secs(1),
            cache: None,
        })
    }

    /// Attach an extraction cache
    pub fn with_cache(mut self, cache: Option<Arc<ExtractionCache>>) -> Self {
        self.cache = cache;
        self
    }

    /// Override the initial backoff delay (doubles on every retry)
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Extract triples from `text` with one prompt-and-parse round trip
    ///
    /// Checks the cache first. A response that isn't valid JSON yields an
    /// empty list and is not cached; transport and API failures are errors.
    ///
    /// # Arguments
    /// * `text` - Source text to analyze
    ///
    /// # Returns
    /// The extracted triples, possibly empty
    pub async fn extract_triples(&self, text: &str) -> Result<Vec<Triple>> {
        let key = ExtractionCache::key(&self.model, text);
        if let Some(cache) = &self.cache {
            if let Some(cached) = cache.get(&key) {
                log::debug!("Extraction cache hit ({} triples)", cached.len());
                return Ok(cached);
            }
        }

        let prompt = build_prompt(text);
        let content = self.complete_with_retry(&prompt).await?;
        let Some(triples) = decode_triples(&content) else {
            return Ok(Vec::new());
        };
        log::info!("LLM extracted {} triples using {}", triples.len(), self.model);

        if let Some(cache) = &self.cache {
            cache.put(key, triples.clone());
        }

        Ok(triples)
    }

    /// Send the prompt, retrying rate limits and server errors with exponential backoff
    async fn complete_with_retry(&self, prompt: &str) -> Result<String> {
        let start = std::time::Instant::now();
        let mut attempt = 0;
        let mut delay = self.retry_delay;

        loop {
            match self.complete(prompt).await {
                Ok(content) => {
                    log::debug!(
                        "Chat completion took {:?} (attempt {})",
                        start.elapsed(),
                        attempt + 1
                    );
                    return Ok(content);
                }
                Err(failure) if failure.is_retryable() && attempt < self.max_retries => {
                    log::warn!(
                        "Retry {}/{} after error: {}",
                        attempt + 1,
                        self.max_retries,
                        failure.message
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(failure) => return Err(TriplegraphError::Llm(failure.message)),
            }
        }
    }

    /// Make a single chat completion request and return the message content
    async fn complete(&self, prompt: &str) -> std::result::Result<String, RequestFailure> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| RequestFailure {
                status: None,
                message: format!("Network error: {}", e),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(RequestFailure {
                status: Some(status),
                message: format!("API error {}: {}", status, body),
            });
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| RequestFailure {
            status: Some(status),
            message: format!("Failed to parse response: {}", e),
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| RequestFailure {
                status: Some(status),
                message: "Response contained no message content".to_string(),
            })
    }
}

/// Build the user prompt for a piece of text
pub fn build_prompt(text: &str) -> String {
    format!(
        r#"Extract knowledge triples from the following text.
Return your response as a JSON array of objects, where each object has exactly three fields:
"subject", "predicate", and "object".

Example format:
[
  {{"subject": "Paris", "predicate": "is capital of", "object": "France"}},
  {{"subject": "Einstein", "predicate": "developed", "object": "theory of relativity"}}
]

Text to analyze:
{}

Return only the JSON array, no additional text or explanation."#,
        text
    )
}

fn fence_regexes() -> &'static (Regex, Regex) {
    static RE: OnceLock<(Regex, Regex)> = OnceLock::new();
    RE.get_or_init(|| {
        (
            Regex::new(r"^```(?:json)?\s*").unwrap(),
            Regex::new(r"\s*```$").unwrap(),
        )
    })
}

/// Remove markdown code fences the model may wrap its JSON in
fn strip_code_fences(content: &str) -> String {
    let (open, close) = fence_regexes();
    let trimmed = content.trim();
    let without_open = open.replace(trimmed, "");
    close.replace(&without_open, "").trim().to_string()
}

/// Render a JSON value as triple text; `null` counts as missing
fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Parse the model's reply into triples
///
/// Accepts a bare array, a single object, or either wrapped in a ```json fence.
/// Entries missing any of the three keys are dropped.
///
/// # Returns
/// The triples found, or an empty list when the reply is unreadable
pub fn parse_triples_response(content: &str) -> Vec<Triple> {
    decode_triples(content).unwrap_or_default()
}

/// Like [`parse_triples_response`], but `None` when the reply is not a JSON
/// array or object, so callers can tell "unreadable" from "no triples"
fn decode_triples(content: &str) -> Option<Vec<Triple>> {
    let cleaned = strip_code_fences(content);

    let parsed: Value = match serde_json::from_str(&cleaned) {
        Ok(v) => v,
        Err(e) => {
            log::warn!("JSON parsing error: {}", e);
            log::warn!("Response was: {}", content);
            return None;
        }
    };

    let items = match parsed {
        Value::Array(items) => items,
        obj @ Value::Object(_) => vec![obj],
        other => {
            log::warn!("Expected a JSON array of triples, got: {}", other);
            return None;
        }
    };

    let triples = items
        .iter()
        .filter_map(|item| {
            let obj = item.as_object()?;
            let subject = value_to_string(obj.get("subject")?)?;
            let predicate = value_to_string(obj.get("predicate")?)?;
            let object = value_to_string(obj.get("object")?)?;
            Some(Triple::new(subject, predicate, object))
        })
        .filter(Triple::is_complete)
        .collect();
    Some(triples)
}
