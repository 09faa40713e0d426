use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::extract::ExtractionMode;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub triplegraph: TriplegraphConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub parser: ParserConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub neo4j: Neo4jConfig,
    #[serde(default)]
    pub http_server: HttpServerConfig,
}

/// General settings
#[derive(Debug, Clone, Deserialize)]
pub struct TriplegraphConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Extraction mode used when a request does not name one.
    #[serde(default)]
    pub default_mode: ExtractionMode,
    /// Graph name used when persisting without an explicit name.
    #[serde(default = "default_graph_name")]
    pub default_graph_name: String,
}

impl Default for TriplegraphConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            default_mode: ExtractionMode::default(),
            default_graph_name: default_graph_name(),
        }
    }
}

/// OpenAI-compatible chat completion settings (Groq by default)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub api_key_env: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub max_retries: usize,
    /// Number of extraction results kept in memory; 0 disables the cache.
    pub cache_capacity: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".to_string(),
            model: "llama-3.3-70b-versatile".to_string(),
            api_key_env: "GROQ_API_KEY".to_string(),
            temperature: 0.3,
            max_tokens: 2000,
            timeout_secs: 60,
            max_retries: 3,
            cache_capacity: 128,
        }
    }
}

/// Where dependency parses come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParserBackend {
    /// UDPipe REST service (`udpipe_server` locally or the LINDAT endpoint)
    Udpipe,
    /// Input text is already CoNLL-U
    Conllu,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    pub backend: ParserBackend,
    pub base_url: String,
    /// UDPipe model name; the service default is used when unset.
    pub model: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            backend: ParserBackend::Udpipe,
            base_url: "http://localhost:8001".to_string(),
            model: None,
            timeout_secs: 30,
        }
    }
}

/// Which store persists extracted triples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Sqlite,
    Neo4j,
    None,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub db_path: PathBuf,
    pub migrations_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Sqlite,
            db_path: PathBuf::from("triplegraph.db"),
            migrations_dir: PathBuf::from("migrations"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Neo4jConfig {
    pub uri: String,
    pub user: String,
    pub password_env: String,
}

impl Default for Neo4jConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".to_string(),
            user: "neo4j".to_string(),
            password_env: "NEO4J_PASSWORD".to_string(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpServerConfig {
    #[serde(default = "default_http_port")]
    pub port: u16,
    #[serde(default = "default_http_api_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    #[serde(default)]
    pub authless: bool,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            port: default_http_port(),
            api_key_env: default_http_api_key_env(),
            allowed_origins: Vec::new(),
            authless: false,
        }
    }
}

fn default_http_port() -> u16 {
    8080
}

fn default_http_api_key_env() -> String {
    "TRIPLEGRAPH_API_KEY".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_graph_name() -> String {
    "default".to_string()
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in TRIPLEGRAPH_CONFIG environment variable (must exist)
    /// 2. ./config.toml in current directory (defaults are used when absent)
    pub fn load() -> Result<Self> {
        let _ = dotenv::dotenv();

        let config = match std::env::var("TRIPLEGRAPH_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => {
                let path = PathBuf::from("config.toml");
                if path.exists() {
                    Self::from_file(&path)?
                } else {
                    log::debug!("No config.toml found, using defaults");
                    Config::default()
                }
            }
        };

        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml_str(&config_str)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Parse configuration from TOML text without validating it
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.llm.model.trim().is_empty() {
            anyhow::bail!("llm.model must not be empty");
        }

        if !(0.0..=2.0).contains(&self.llm.temperature) {
            anyhow::bail!("llm.temperature must be between 0.0 and 2.0");
        }

        if self.llm.max_tokens == 0 {
            anyhow::bail!("llm.max_tokens must be greater than 0");
        }

        if self.llm.timeout_secs == 0 || self.parser.timeout_secs == 0 {
            anyhow::bail!("timeout_secs must be greater than 0");
        }

        if self.triplegraph.default_graph_name.trim().is_empty() {
            anyhow::bail!("triplegraph.default_graph_name must not be empty");
        }

        Ok(())
    }

    /// Read the LLM API key from the configured environment variable
    pub fn llm_api_key(&self) -> Result<String> {
        std::env::var(&self.llm.api_key_env).with_context(|| {
            format!(
                "Environment variable {} not set. Set it in your .env file or as an environment variable with your API key.",
                self.llm.api_key_env
            )
        })
    }

    /// Read the Neo4j password from the configured environment variable
    pub fn neo4j_password(&self) -> Result<String> {
        std::env::var(&self.neo4j.password_env).with_context(|| {
            format!(
                "Environment variable {} not set. It must hold the Neo4j password.",
                self.neo4j.password_env
            )
        })
    }

    /// Get database path
    pub fn db_path(&self) -> &Path {
        &self.store.db_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Serialize config tests that mutate process-wide cwd and env so they don't race.
    static CONFIG_TEST_LOCK: Mutex<()> = Mutex::new(());

    const TEST_CONFIG: &str = r#"
[triplegraph]
log_level = "debug"
default_mode = "dependency"
default_graph_name = "physics"

[llm]
model = "llama-3.1-8b-instant"
temperature = 0.1
max_tokens = 512

[parser]
backend = "conllu"

[store]
backend = "none"

[http_server]
port = 9090
authless = true
"#;

    /// Restores cwd when dropped (e.g. on panic).
    struct CwdGuard(std::path::PathBuf);
    impl Drop for CwdGuard {
        fn drop(&mut self) {
            let _ = std::env::set_current_dir(&self.0);
        }
    }

    fn with_config_env(config_path: Option<&Path>, f: impl FnOnce()) {
        let original = std::env::var("TRIPLEGRAPH_CONFIG").ok();
        match config_path {
            Some(p) => std::env::set_var("TRIPLEGRAPH_CONFIG", p),
            None => std::env::remove_var("TRIPLEGRAPH_CONFIG"),
        }
        f();
        std::env::remove_var("TRIPLEGRAPH_CONFIG");
        if let Some(val) = original {
            std::env::set_var("TRIPLEGRAPH_CONFIG", val);
        }
    }

    #[test]
    fn test_config_load_success() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, TEST_CONFIG).unwrap();
        let _cwd = CwdGuard(std::env::current_dir().unwrap());
        std::env::set_current_dir(temp_dir.path()).unwrap();

        with_config_env(Some(&config_path), || {
            let config = Config::load();
            assert!(config.is_ok(), "Config::load() failed: {:?}", config.err());
            let config = config.unwrap();
            assert_eq!(config.triplegraph.log_level, "debug");
            assert_eq!(config.triplegraph.default_mode, ExtractionMode::Dependency);
            assert_eq!(config.triplegraph.default_graph_name, "physics");
            assert_eq!(config.llm.model, "llama-3.1-8b-instant");
            assert_eq!(config.llm.max_tokens, 512);
            // untouched keys keep their defaults
            assert_eq!(config.llm.api_key_env, "GROQ_API_KEY");
            assert_eq!(config.parser.backend, ParserBackend::Conllu);
            assert_eq!(config.store.backend, StoreBackend::None);
            assert_eq!(config.http_server.port, 9090);
            assert!(config.http_server.authless);
        });
    }

    #[test]
    fn test_config_defaults_without_file() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let _cwd = CwdGuard(std::env::current_dir().unwrap());
        std::env::set_current_dir(temp_dir.path()).unwrap();

        with_config_env(None, || {
            let config = Config::load().unwrap();
            assert_eq!(config.llm.base_url, "https://api.groq.com/openai/v1");
            assert_eq!(config.llm.model, "llama-3.3-70b-versatile");
            assert!((config.llm.temperature - 0.3).abs() < f32::EPSILON);
            assert_eq!(config.llm.max_tokens, 2000);
            assert_eq!(config.store.backend, StoreBackend::Sqlite);
            assert_eq!(config.triplegraph.default_mode, ExtractionMode::Llm);
            assert_eq!(config.neo4j.uri, "bolt://localhost:7687");
        });
    }

    #[test]
    fn test_config_invalid_path() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        with_config_env(Some(Path::new("nonexistent.toml")), || {
            let config = Config::load();
            assert!(config.is_err());
            assert!(config.unwrap_err().to_string().contains("nonexistent.toml"));
        });
    }

    #[test]
    fn test_validate_rejects_bad_temperature() {
        let mut config = Config::default();
        config.llm.temperature = 3.5;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("temperature"));
    }

    #[test]
    fn test_validate_rejects_zero_max_tokens() {
        let config = Config::from_toml_str("[llm]\nmax_tokens = 0\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_backend_is_parse_error() {
        assert!(Config::from_toml_str("[store]\nbackend = \"postgres\"\n").is_err());
    }

    #[test]
    fn test_missing_api_key_names_variable() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let mut config = Config::default();
        config.llm.api_key_env = "TRIPLEGRAPH_TEST_MISSING_KEY".to_string();
        std::env::remove_var("TRIPLEGRAPH_TEST_MISSING_KEY");
        let err = config.llm_api_key().unwrap_err();
        assert!(err.to_string().contains("TRIPLEGRAPH_TEST_MISSING_KEY"));
    }
}
