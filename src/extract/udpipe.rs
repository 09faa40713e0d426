use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use super::conllu::{parse_conllu, Sentence};
use super::dependency::DependencyParser;
use crate::config::ParserConfig;
use crate::error::{Result, TriplegraphError};

/// Response from the UDPipe REST `/process` endpoint
#[derive(Deserialize)]
struct ProcessResponse {
    result: String,
    #[serde(default)]
    model: Option<String>,
}

/// Client for a UDPipe REST service
///
/// Works against a local `udpipe_server` or the public LINDAT deployment;
/// tokenization, tagging and parsing all happen server-side.
pub struct UdpipeParser {
    client: Client,
    base_url: String,
    model: Option<String>,
}

impl UdpipeParser {
    pub fn new(config: &ParserConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TriplegraphError::Parser(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl DependencyParser for UdpipeParser {
    async fn parse(&self, text: &str) -> Result<Vec<Sentence>> {
        let mut form: Vec<(&str, &str)> = vec![
            ("tokenizer", ""),
            ("tagger", ""),
            ("parser", ""),
            ("data", text),
        ];
        if let Some(model) = &self.model {
            form.push(("model", model.as_str()));
        }

        let response = self
            .client
            .post(format!("{}/process", self.base_url))
            .form(&form)
            .send()
            .await
            .map_err(|e| TriplegraphError::Parser(format!("Network error: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(TriplegraphError::Parser(format!(
                "UDPipe error {}: {}",
                status, body
            )));
        }

        let parsed: ProcessResponse = response
            .json()
            .await
            .map_err(|e| TriplegraphError::Parser(format!("Failed to parse response: {}", e)))?;

        if let Some(model) = &parsed.model {
            log::debug!("UDPipe parsed with model {}", model);
        }

        parse_conllu(&parsed.result)
    }

    fn name(&self) -> &str {
        "udpipe"
    }
}
