use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use uuid::Uuid;

use super::{GraphStore, StoreStats, StoredPath};
use crate::db::{migrate, Db};
use crate::error::{Result, TriplegraphError};
use crate::graph::KnowledgeGraph;
use crate::triple::Triple;

/// Embedded graph store on SQLite
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db: Db,
}

const ALL_TRIPLES: &str = "SELECT r.subject, r.predicate, r.object
     FROM relations r JOIN entities s ON s.name = r.subject
     WHERE (?1 IS NULL OR s.graph_name = ?1)
     ORDER BY r.rowid";

fn row_to_triple(row: &Row<'_>) -> rusqlite::Result<Triple> {
    Ok(Triple {
        subject: row.get(0)?,
        predicate: row.get(1)?,
        object: row.get(2)?,
    })
}

fn collect_triples(conn: &Connection, sql: &str, graph_name: Option<String>, name: Option<String>) -> Result<Vec<Triple>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = match name {
        Some(name) => stmt.query_map(params![name, graph_name], row_to_triple)?,
        None => stmt.query_map(params![graph_name], row_to_triple)?,
    };
    let mut out = Vec::new();
    for row in rows {
        out.push(row.map_err(TriplegraphError::Database)?);
    }
    Ok(out)
}

fn entity_exists(conn: &Connection, name: &str, graph_name: Option<&str>) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM entities WHERE name = ?1 AND (?2 IS NULL OR graph_name = ?2)",
            params![name, graph_name],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

impl SqliteStore {
    /// Open (creating if needed) the database and apply pending migrations
    ///
    /// # Arguments
    ///
    /// * `db_path` - SQLite database file
    /// * `migrations_dir` - Directory holding the `NNN_name.sql` migrations
    pub async fn open(db_path: &Path, migrations_dir: &Path) -> Result<Self> {
        let db = Db::new(db_path);
        let migrations_dir = migrations_dir.to_path_buf();
        db.with_connection(move |conn| migrate::run_migrations(conn, &migrations_dir))
            .await?;

        log::info!("Opened graph store at {}", db_path.display());
        Ok(Self { db })
    }
}

#[async_trait]
impl GraphStore for SqliteStore {
    async fn store_triples(&self, triples: &[Triple], graph_name: &str) -> Result<()> {
        if triples.is_empty() {
            log::warn!("No triples to store");
            return Ok(());
        }

        let triples = triples.to_vec();
        let graph = graph_name.to_string();
        let count = self
            .db
            .with_connection(move |conn| {
                let tx = conn.transaction()?;
                {
                    let mut upsert_entity = tx.prepare(
                        "INSERT INTO entities (name, graph_name) VALUES (?1, ?2)
                         ON CONFLICT(name) DO UPDATE SET graph_name = excluded.graph_name",
                    )?;
                    let mut insert_relation = tx.prepare(
                        "INSERT OR IGNORE INTO relations (relation_id, subject, predicate, object, graph_name)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                    )?;

                    for triple in &triples {
                        upsert_entity.execute(params![triple.subject, graph])?;
                        upsert_entity.execute(params![triple.object, graph])?;
                        insert_relation.execute(params![
                            Uuid::new_v4().to_string(),
                            triple.subject,
                            triple.predicate,
                            triple.object,
                            graph,
                        ])?;
                    }
                }
                tx.commit()?;
                Ok(triples.len())
            })
            .await?;

        log::info!("Stored {} triples in graph '{}'", count, graph_name);
        Ok(())
    }

    async fn query_entity_relationships(
        &self,
        name: &str,
        graph_name: Option<&str>,
    ) -> Result<Vec<Triple>> {
        let name = name.to_string();
        let graph = graph_name.map(str::to_string);
        self.db
            .with_connection(move |conn| {
                collect_triples(
                    conn,
                    "SELECT r.subject, r.predicate, r.object
                     FROM relations r JOIN entities e ON e.name = r.subject
                     WHERE r.subject = ?1 AND (?2 IS NULL OR e.graph_name = ?2)
                     UNION
                     SELECT r.subject, r.predicate, r.object
                     FROM relations r JOIN entities e ON e.name = r.object
                     WHERE r.object = ?1 AND (?2 IS NULL OR e.graph_name = ?2)
                     ORDER BY 1, 2, 3",
                    graph,
                    Some(name),
                )
            })
            .await
    }

    async fn get_all_entities(&self, graph_name: Option<&str>) -> Result<Vec<String>> {
        let graph = graph_name.map(str::to_string);
        self.db
            .with_connection(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT name FROM entities WHERE (?1 IS NULL OR graph_name = ?1) ORDER BY rowid",
                )?;
                let names = stmt
                    .query_map(params![graph], |row| row.get::<_, String>(0))?
                    .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
                Ok(names)
            })
            .await
    }

    async fn get_all_triples(&self, graph_name: Option<&str>) -> Result<Vec<Triple>> {
        let graph = graph_name.map(str::to_string);
        self.db
            .with_connection(move |conn| {
                collect_triples(conn, ALL_TRIPLES, graph, None)
            })
            .await
    }

    async fn find_shortest_path(
        &self,
        start: &str,
        end: &str,
        graph_name: Option<&str>,
    ) -> Result<Option<StoredPath>> {
        let start = start.to_string();
        let end = end.to_string();
        let graph = graph_name.map(str::to_string);
        self.db
            .with_connection(move |conn| {
                let graph = graph.as_deref();
                if !entity_exists(conn, &start, graph)? || !entity_exists(conn, &end, graph)? {
                    return Ok(None);
                }
                if start == end {
                    return Ok(Some(StoredPath {
                        nodes: vec![start],
                        relationships: Vec::new(),
                    }));
                }
                // path search runs on the in-memory graph of every stored relation
                let triples = collect_triples(conn, ALL_TRIPLES, None, None)?;
                Ok(KnowledgeGraph::build(&triples).shortest_path(&start, &end))
            })
            .await
    }

    async fn get_graph_stats(&self, graph_name: Option<&str>) -> Result<StoreStats> {
        let graph = graph_name.map(str::to_string);
        self.db
            .with_connection(move |conn| {
                let num_entities: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM entities WHERE (?1 IS NULL OR graph_name = ?1)",
                    params![graph],
                    |row| row.get(0),
                )?;
                let num_relationships: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM relations WHERE (?1 IS NULL OR graph_name = ?1)",
                    params![graph],
                    |row| row.get(0),
                )?;
                Ok(StoreStats {
                    num_entities: num_entities as u64,
                    num_relationships: num_relationships as u64,
                })
            })
            .await
    }

    async fn delete_graph(&self, graph_name: &str) -> Result<()> {
        let graph = graph_name.to_string();
        let removed = self
            .db
            .with_connection(move |conn| {
                // relations go with their entities via ON DELETE CASCADE
                Ok(conn.execute("DELETE FROM entities WHERE graph_name = ?1", params![graph])?)
            })
            .await?;

        log::info!("Deleted graph '{}' ({} entities)", graph_name, removed);
        Ok(())
    }

    async fn clear_database(&self) -> Result<()> {
        self.db
            .with_connection(|conn| {
                conn.execute_batch("DELETE FROM relations; DELETE FROM entities;")?;
                Ok(())
            })
            .await?;

        log::info!("Database cleared");
        Ok(())
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}
