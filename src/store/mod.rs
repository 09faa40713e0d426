//! Persistent graph storage.
//!
//! Entities are unique by name and carry the `graph_name` of the last graph
//! that stored them. Relations are typed by their predicate and tagged with
//! their own `graph_name`.

mod neo4j;
mod sqlite;

pub use neo4j::Neo4jStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::{Config, StoreBackend};
use crate::error::{Result, TriplegraphError};
use crate::graph::GraphPath;
use crate::triple::Triple;

/// A stored path: node names plus the relation types between them
pub type StoredPath = GraphPath;

/// Entity and relationship counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub num_entities: u64,
    pub num_relationships: u64,
}

#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Upsert subject/object entities and one relation per triple
    async fn store_triples(&self, triples: &[Triple], graph_name: &str) -> Result<()>;

    /// Outgoing and incoming relations of `name`, deduplicated
    async fn query_entity_relationships(
        &self,
        name: &str,
        graph_name: Option<&str>,
    ) -> Result<Vec<Triple>>;

    async fn get_all_entities(&self, graph_name: Option<&str>) -> Result<Vec<String>>;

    /// Relations whose subject entity carries `graph_name` (or all of them)
    async fn get_all_triples(&self, graph_name: Option<&str>) -> Result<Vec<Triple>>;

    /// Fewest-hop directed path. `start == end` gives a single-node path when
    /// the entity exists.
    async fn find_shortest_path(
        &self,
        start: &str,
        end: &str,
        graph_name: Option<&str>,
    ) -> Result<Option<StoredPath>>;

    async fn get_graph_stats(&self, graph_name: Option<&str>) -> Result<StoreStats>;

    /// Remove every entity carrying `graph_name` together with its relations
    async fn delete_graph(&self, graph_name: &str) -> Result<()>;

    async fn clear_database(&self) -> Result<()>;

    fn name(&self) -> &str;
}

/// Open the backend selected by `[store] backend`; `none` yields `Ok(None)`
pub async fn open_store(config: &Config) -> Result<Option<Arc<dyn GraphStore>>> {
    match config.store.backend {
        StoreBackend::None => {
            log::info!("Graph store disabled");
            Ok(None)
        }
        StoreBackend::Sqlite => {
            let store = SqliteStore::open(config.db_path(), &config.store.migrations_dir).await?;
            Ok(Some(Arc::new(store)))
        }
        StoreBackend::Neo4j => {
            let password = config
                .neo4j_password()
                .map_err(|e| TriplegraphError::Config(e.to_string()))?;
            let store = Neo4jStore::connect(&config.neo4j.uri, &config.neo4j.user, &password).await?;
            Ok(Some(Arc::new(store)))
        }
    }
}
