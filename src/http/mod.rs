//! JSON API over the pipeline and the graph store.

mod handlers;
mod server;

pub use server::ApiServer;

use serde::Deserialize;

/// Body of `POST /extract`
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractRequest {
    pub text: String,
    /// `llm` or `dependency` (aliases accepted); server default when absent
    #[serde(default)]
    pub mode: Option<String>,
    /// Persist under this graph name when set
    #[serde(default)]
    pub graph_name: Option<String>,
    /// Persist under the configured default graph name when `graph_name` is absent
    #[serde(default)]
    pub persist: bool,
}

/// `?graph=` filter accepted by the read endpoints
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GraphFilter {
    #[serde(default)]
    pub graph: Option<String>,
}

/// Query of `GET /path`
#[derive(Debug, Clone, Deserialize)]
pub struct PathQuery {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub graph: Option<String>,
}
