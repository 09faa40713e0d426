//! Triple extraction: an LLM round trip or dependency-label rules.

pub mod conllu;
pub mod dependency;
pub mod llm;
pub mod udpipe;

pub use conllu::{parse_conllu, Sentence, Token};
pub use dependency::{extract_from_sentences, ConlluInput, DependencyParser};
pub use llm::{parse_triples_response, LlmClient};
pub use udpipe::UdpipeParser;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::cache::ExtractionCache;
use crate::config::{Config, ParserBackend};
use crate::error::{Result, TriplegraphError};
use crate::triple::Triple;

/// Which extraction path to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMode {
    /// Hosted LLM (needs network and an API key)
    #[default]
    #[serde(alias = "online")]
    Llm,
    /// Dependency-parse rules
    #[serde(alias = "spacy", alias = "offline", alias = "dep")]
    Dependency,
}

impl FromStr for ExtractionMode {
    type Err = TriplegraphError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "llm" | "online" => Ok(Self::Llm),
            "dependency" | "dep" | "spacy" | "offline" => Ok(Self::Dependency),
            other => Err(TriplegraphError::InvalidInput(format!(
                "Invalid mode: {}. Use 'llm' or 'dependency'",
                other
            ))),
        }
    }
}

impl fmt::Display for ExtractionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Llm => write!(f, "llm"),
            Self::Dependency => write!(f, "dependency"),
        }
    }
}

/// Front door for both extraction paths
#[derive(Default)]
pub struct KnowledgeExtractor {
    llm: Option<LlmClient>,
    parser: Option<Box<dyn DependencyParser>>,
}

impl KnowledgeExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_llm(mut self, llm: LlmClient) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_parser(mut self, parser: Box<dyn DependencyParser>) -> Self {
        self.parser = Some(parser);
        self
    }

    /// Build from configuration
    ///
    /// The LLM client is only created when its API key is present; LLM
    /// extraction without one fails at call time instead of at startup so
    /// dependency-only setups need no key.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut extractor = Self::new();

        match config.llm_api_key() {
            Ok(api_key) => {
                let cache = (config.llm.cache_capacity > 0)
                    .then(|| Arc::new(ExtractionCache::new(config.llm.cache_capacity)));
                extractor = extractor.with_llm(LlmClient::new(api_key, &config.llm)?.with_cache(cache));
            }
            Err(e) => log::debug!("LLM extraction unavailable: {}", e),
        }

        let parser: Box<dyn DependencyParser> = match config.parser.backend {
            ParserBackend::Udpipe => Box::new(UdpipeParser::new(&config.parser)?),
            ParserBackend::Conllu => Box::new(ConlluInput),
        };
        Ok(extractor.with_parser(parser))
    }

    pub fn has_llm(&self) -> bool {
        self.llm.is_some()
    }

    /// Extract triples from `text` using `mode`
    ///
    /// Blank text yields no triples without touching any backend.
    pub async fn extract(&self, text: &str, mode: ExtractionMode) -> Result<Vec<Triple>> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        match mode {
            ExtractionMode::Llm => {
                let llm = self.llm.as_ref().ok_or_else(|| {
                    TriplegraphError::Config("API key is required for LLM extraction".to_string())
                })?;
                llm.extract_triples(text).await
            }
            ExtractionMode::Dependency => {
                let parser = self.parser.as_ref().ok_or_else(|| {
                    TriplegraphError::Config("No dependency parser configured".to_string())
                })?;
                let sentences = parser.parse(text).await?;
                let triples = extract_from_sentences(&sentences);
                log::info!(
                    "Dependency rules ({}) extracted {} triples from {} sentences",
                    parser.name(),
                    triples.len(),
                    sentences.len()
                );
                Ok(triples)
            }
        }
    }
}
