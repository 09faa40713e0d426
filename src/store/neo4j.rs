use async_trait::async_trait;
use neo4rs::{query, Graph, Query, Row};

use super::{GraphStore, StoreStats, StoredPath};
use crate::error::{Result, TriplegraphError};
use crate::triple::Triple;

const CREATE_INDEX: &str = "CREATE INDEX entity_name IF NOT EXISTS FOR (e:Entity) ON (e.name)";

const MERGE_TRIPLE: &str = "
MERGE (s:Entity {name: $subject})
SET s.graph_name = $graph_name
MERGE (o:Entity {name: $object})
SET o.graph_name = $graph_name
MERGE (s)-[r:RELATION {type: $predicate, graph_name: $graph_name}]->(o)";

fn relationships_cypher(scoped: bool) -> &'static str {
    if scoped {
        "MATCH (e:Entity {name: $name, graph_name: $graph_name})-[r:RELATION]->(o:Entity)
         RETURN e.name AS subject, r.type AS predicate, o.name AS object
         UNION
         MATCH (s:Entity)-[r:RELATION]->(e:Entity {name: $name, graph_name: $graph_name})
         RETURN s.name AS subject, r.type AS predicate, e.name AS object"
    } else {
        "MATCH (e:Entity {name: $name})-[r:RELATION]->(o:Entity)
         RETURN e.name AS subject, r.type AS predicate, o.name AS object
         UNION
         MATCH (s:Entity)-[r:RELATION]->(e:Entity {name: $name})
         RETURN s.name AS subject, r.type AS predicate, e.name AS object"
    }
}

fn entities_cypher(scoped: bool) -> &'static str {
    if scoped {
        "MATCH (e:Entity {graph_name: $graph_name}) RETURN e.name AS name"
    } else {
        "MATCH (e:Entity) RETURN e.name AS name"
    }
}

fn triples_cypher(scoped: bool) -> &'static str {
    if scoped {
        "MATCH (s:Entity {graph_name: $graph_name})-[r:RELATION]->(o:Entity)
         RETURN s.name AS subject, r.type AS predicate, o.name AS object"
    } else {
        "MATCH (s:Entity)-[r:RELATION]->(o:Entity)
         RETURN s.name AS subject, r.type AS predicate, o.name AS object"
    }
}

fn shortest_path_cypher(scoped: bool) -> &'static str {
    if scoped {
        "MATCH path = shortestPath(
             (start:Entity {name: $start, graph_name: $graph_name})-[*]->
             (end:Entity {name: $end, graph_name: $graph_name})
         )
         RETURN [node IN nodes(path) | node.name] AS nodes,
                [rel IN relationships(path) | rel.type] AS relationships"
    } else {
        "MATCH path = shortestPath(
             (start:Entity {name: $start})-[*]->(end:Entity {name: $end})
         )
         RETURN [node IN nodes(path) | node.name] AS nodes,
                [rel IN relationships(path) | rel.type] AS relationships"
    }
}

fn entity_count_cypher(scoped: bool) -> &'static str {
    if scoped {
        "MATCH (e:Entity {name: $name, graph_name: $graph_name}) RETURN count(e) AS count"
    } else {
        "MATCH (e:Entity {name: $name}) RETURN count(e) AS count"
    }
}

fn stats_cypher(scoped: bool) -> (&'static str, &'static str) {
    if scoped {
        (
            "MATCH (e:Entity {graph_name: $graph_name}) RETURN count(e) AS count",
            "MATCH ()-[r:RELATION {graph_name: $graph_name}]->() RETURN count(r) AS count",
        )
    } else {
        (
            "MATCH (e:Entity) RETURN count(e) AS count",
            "MATCH ()-[r:RELATION]->() RETURN count(r) AS count",
        )
    }
}

/// Attach `$graph_name` when a graph filter is present
fn scoped(cypher: &str, graph_name: Option<&str>) -> Query {
    let q = query(cypher);
    match graph_name {
        Some(graph) => q.param("graph_name", graph),
        None => q,
    }
}

fn field<T: serde::de::DeserializeOwned>(row: &Row, key: &str) -> Result<T> {
    let value: T = row
        .get(key)
        .map_err(|e| TriplegraphError::Parse(format!("Column '{}': {}", key, e)))?;
    Ok(value)
}

fn row_to_triple(row: &Row) -> Result<Triple> {
    Ok(Triple {
        subject: field(row, "subject")?,
        predicate: field(row, "predicate")?,
        object: field(row, "object")?,
    })
}

/// Graph store backed by a Neo4j server over Bolt
pub struct Neo4jStore {
    graph: Graph,
}

impl Neo4jStore {
    /// Connect and make sure the `Entity(name)` index exists
    pub async fn connect(uri: &str, user: &str, password: &str) -> Result<Self> {
        let graph = Graph::new(uri, user, password).await?;
        graph.run(query(CREATE_INDEX)).await?;
        log::info!("Connected to Neo4j at {}", uri);
        Ok(Self { graph })
    }

    async fn fetch_triples(&self, q: Query) -> Result<Vec<Triple>> {
        let mut stream = self.graph.execute(q).await?;
        let mut out = Vec::new();
        while let Some(row) = stream.next().await? {
            out.push(row_to_triple(&row)?);
        }
        Ok(out)
    }

    async fn fetch_count(&self, q: Query) -> Result<u64> {
        let mut stream = self.graph.execute(q).await?;
        match stream.next().await? {
            Some(row) => Ok(field::<i64>(&row, "count")?.max(0) as u64),
            None => Ok(0),
        }
    }
}

#[async_trait]
impl GraphStore for Neo4jStore {
    async fn store_triples(&self, triples: &[Triple], graph_name: &str) -> Result<()> {
        if triples.is_empty() {
            log::warn!("No triples to store");
            return Ok(());
        }

        let mut txn = self.graph.start_txn().await?;
        for triple in triples {
            txn.run(
                query(MERGE_TRIPLE)
                    .param("subject", triple.subject.as_str())
                    .param("predicate", triple.predicate.as_str())
                    .param("object", triple.object.as_str())
                    .param("graph_name", graph_name),
            )
            .await?;
        }
        txn.commit().await?;

        log::info!("Stored {} triples in graph '{}'", triples.len(), graph_name);
        Ok(())
    }

    async fn query_entity_relationships(
        &self,
        name: &str,
        graph_name: Option<&str>,
    ) -> Result<Vec<Triple>> {
        let q = scoped(relationships_cypher(graph_name.is_some()), graph_name).param("name", name);
        self.fetch_triples(q).await
    }

    async fn get_all_entities(&self, graph_name: Option<&str>) -> Result<Vec<String>> {
        let q = scoped(entities_cypher(graph_name.is_some()), graph_name);
        let mut stream = self.graph.execute(q).await?;
        let mut names = Vec::new();
        while let Some(row) = stream.next().await? {
            names.push(field::<String>(&row, "name")?);
        }
        Ok(names)
    }

    async fn get_all_triples(&self, graph_name: Option<&str>) -> Result<Vec<Triple>> {
        let q = scoped(triples_cypher(graph_name.is_some()), graph_name);
        self.fetch_triples(q).await
    }

    async fn find_shortest_path(
        &self,
        start: &str,
        end: &str,
        graph_name: Option<&str>,
    ) -> Result<Option<StoredPath>> {
        // shortestPath rejects identical endpoints
        if start == end {
            let q = scoped(entity_count_cypher(graph_name.is_some()), graph_name).param("name", start);
            return Ok((self.fetch_count(q).await? > 0).then(|| StoredPath {
                nodes: vec![start.to_string()],
                relationships: Vec::new(),
            }));
        }

        let q = scoped(shortest_path_cypher(graph_name.is_some()), graph_name)
            .param("start", start)
            .param("end", end);
        let mut stream = self.graph.execute(q).await?;
        match stream.next().await? {
            Some(row) => Ok(Some(StoredPath {
                nodes: field(&row, "nodes")?,
                relationships: field(&row, "relationships")?,
            })),
            None => Ok(None),
        }
    }

    async fn get_graph_stats(&self, graph_name: Option<&str>) -> Result<StoreStats> {
        let (entities, relationships) = stats_cypher(graph_name.is_some());
        Ok(StoreStats {
            num_entities: self.fetch_count(scoped(entities, graph_name)).await?,
            num_relationships: self.fetch_count(scoped(relationships, graph_name)).await?,
        })
    }

    async fn delete_graph(&self, graph_name: &str) -> Result<()> {
        self.graph
            .run(query("MATCH (e:Entity {graph_name: $graph_name}) DETACH DELETE e").param("graph_name", graph_name))
            .await?;
        log::info!("Deleted graph '{}'", graph_name);
        Ok(())
    }

    async fn clear_database(&self) -> Result<()> {
        self.graph.run(query("MATCH (n) DETACH DELETE n")).await?;
        log::info!("Database cleared");
        Ok(())
    }

    fn name(&self) -> &str {
        "neo4j"
    }
}
