//! Text in, knowledge graph out: extraction, graph analysis and optional
//! persistence in one call.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::Config;
use crate::error::{Result, TriplegraphError};
use crate::extract::{ExtractionMode, KnowledgeExtractor};
use crate::graph::{CentralNode, GraphExport, GraphStats, KnowledgeGraph};
use crate::store::{open_store, GraphStore};
use crate::triple::Triple;

/// How many central nodes a report lists
pub const TOP_CENTRAL_NODES: usize = 5;

/// Everything produced by one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionReport {
    pub mode: ExtractionMode,
    pub triples: Vec<Triple>,
    pub stats: GraphStats,
    pub central_nodes: Vec<CentralNode>,
    pub graph: GraphExport,
    /// Graph name the triples were persisted under, if they were
    pub stored_in: Option<String>,
    pub generated_at: DateTime<Utc>,
}

pub struct Pipeline {
    extractor: KnowledgeExtractor,
    store: Option<Arc<dyn GraphStore>>,
}

impl Pipeline {
    pub fn new(extractor: KnowledgeExtractor) -> Self {
        Self { extractor, store: None }
    }

    pub fn with_store(mut self, store: Arc<dyn GraphStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Extractor and store as configured
    pub async fn from_config(config: &Config) -> Result<Self> {
        let mut pipeline = Self::new(KnowledgeExtractor::from_config(config)?);
        if let Some(store) = open_store(config).await? {
            pipeline = pipeline.with_store(store);
        }
        Ok(pipeline)
    }

    pub fn store(&self) -> Option<&Arc<dyn GraphStore>> {
        self.store.as_ref()
    }

    /// Extract triples, build and analyse the graph, persist when a store
    /// and a graph name are both present
    ///
    /// # Arguments
    ///
    /// * `text` - Source text (or CoNLL-U for the offline parser)
    /// * `mode` - Extraction path to use
    /// * `graph_name` - Graph to persist under; None skips persistence
    ///
    /// # Returns
    ///
    /// The report; an empty triple list still yields a (blank) report
    pub async fn run(
        &self,
        text: &str,
        mode: ExtractionMode,
        graph_name: Option<&str>,
    ) -> Result<ExtractionReport> {
        let triples = self.extractor.extract(text, mode).await?;
        log::info!("Extracted {} triples ({} mode)", triples.len(), mode);

        let kg = KnowledgeGraph::build(&triples);
        let mut stored_in = None;

        if triples.is_empty() {
            log::warn!("No triples extracted; nothing to persist");
        } else if let (Some(store), Some(graph)) = (&self.store, graph_name) {
            store.store_triples(&triples, graph).await?;
            stored_in = Some(graph.to_string());
        }

        Ok(ExtractionReport {
            mode,
            stats: kg.stats(),
            central_nodes: kg.central_nodes(TOP_CENTRAL_NODES),
            graph: kg.export(),
            triples,
            stored_in,
            generated_at: Utc::now(),
        })
    }
}

/// Triples as pretty-printed JSON, ready to save as a file
pub fn export_triples_json(triples: &[Triple]) -> Result<String> {
    serde_json::to_string_pretty(triples)
        .map_err(|e| TriplegraphError::Parse(format!("Failed to serialize triples: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::ConlluInput;
    use crate::store::SqliteStore;
    use std::path::Path;
    use tempfile::TempDir;

    const TWO_SENTENCES: &str = "1\tEinstein\tEinstein\tPROPN\t_\t_\t2\tnsubj\t_\t_
2\twon\twin\tVERB\t_\t_\t0\troot\t_\t_
3\tprizes\tprize\tNOUN\t_\t_\t2\tobj\t_\t_

1\tprizes\tprize\tNOUN\t_\t_\t2\tnsubj\t_\t_
2\thonor\thonor\tVERB\t_\t_\t0\troot\t_\t_
3\tscience\tscience\tNOUN\t_\t_\t2\tobj\t_\t_
";

    fn offline_pipeline() -> Pipeline {
        Pipeline::new(KnowledgeExtractor::new().with_parser(Box::new(ConlluInput)))
    }

    async fn sqlite_store(dir: &TempDir) -> Arc<dyn GraphStore> {
        let migrations = Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations");
        Arc::new(
            SqliteStore::open(&dir.path().join("graph.db"), &migrations)
                .await
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_run_builds_report() {
        let report = offline_pipeline()
            .run(TWO_SENTENCES, ExtractionMode::Dependency, None)
            .await
            .unwrap();

        assert_eq!(
            report.triples,
            vec![
                Triple::new("Einstein", "win", "prizes"),
                Triple::new("prizes", "honor", "science"),
            ]
        );
        assert_eq!(report.stats.num_nodes, 3);
        assert_eq!(report.stats.num_edges, 2);
        assert_eq!(report.central_nodes[0].name, "prizes");
        assert_eq!(report.graph.edges.len(), 2);
        assert!(report.stored_in.is_none());
    }

    #[tokio::test]
    async fn test_run_persists_with_graph_name() {
        let dir = TempDir::new().unwrap();
        let store = sqlite_store(&dir).await;
        let pipeline = offline_pipeline().with_store(Arc::clone(&store));

        let report = pipeline
            .run(TWO_SENTENCES, ExtractionMode::Dependency, Some("science"))
            .await
            .unwrap();
        assert_eq!(report.stored_in.as_deref(), Some("science"));
        assert_eq!(store.get_all_triples(Some("science")).await.unwrap(), report.triples);

        // no graph name, no write
        pipeline.run(TWO_SENTENCES, ExtractionMode::Dependency, None).await.unwrap();
        assert_eq!(store.get_graph_stats(None).await.unwrap().num_relationships, 2);
    }

    #[tokio::test]
    async fn test_run_with_no_triples() {
        let dir = TempDir::new().unwrap();
        let store = sqlite_store(&dir).await;
        let pipeline = offline_pipeline().with_store(Arc::clone(&store));

        let report = pipeline.run("   ", ExtractionMode::Dependency, Some("empty")).await.unwrap();
        assert!(report.triples.is_empty());
        assert_eq!(report.graph, GraphExport::default());
        assert!(report.stored_in.is_none());
        assert!(store.get_all_entities(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_llm_without_key() {
        let err = offline_pipeline()
            .run("Einstein won prizes.", ExtractionMode::Llm, None)
            .await
            .unwrap_err();
        assert!(matches!(err, TriplegraphError::Config(_)));
    }

    #[test]
    fn test_export_triples_json() {
        let json = export_triples_json(&[Triple::new("Einstein", "won", "Nobel Prize")]).unwrap();
        assert!(json.contains("\n"));
        let parsed: Vec<Triple> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, vec![Triple::new("Einstein", "won", "Nobel Prize")]);
        assert_eq!(export_triples_json(&[]).unwrap(), "[]");
    }
}
