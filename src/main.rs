use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use triplegraph::config::StoreBackend;
use triplegraph::db::{migrate, Db};
use triplegraph::http::ApiServer;
use triplegraph::pipeline::{export_triples_json, ExtractionReport};
use triplegraph::store::{open_store, GraphStore};
use triplegraph::{Config, ExtractionMode, KnowledgeGraph, Pipeline};

#[derive(Parser)]
#[command(name = "triplegraph", version)]
#[command(about = "Extract knowledge triples from text and explore them as a graph", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract triples from text and analyse the resulting graph
    Extract {
        /// Text to process (reads --file or stdin when omitted)
        text: Option<String>,

        /// Read the text from a file
        #[arg(long, conflicts_with = "text")]
        file: Option<PathBuf>,

        /// Extraction mode: llm or dependency
        #[arg(short, long)]
        mode: Option<String>,

        /// Persist the triples under this graph name
        #[arg(short, long)]
        graph: Option<String>,

        /// Persist under triplegraph.default_graph_name when --graph is not given
        #[arg(long)]
        save: bool,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Also write the triples as JSON to this file
        #[arg(long)]
        save_json: Option<PathBuf>,
    },

    /// List stored entities
    Entities {
        #[arg(short, long)]
        graph: Option<String>,
    },

    /// Show relationships of a stored entity
    Relations {
        entity: String,

        #[arg(short, long)]
        graph: Option<String>,
    },

    /// List stored triples
    Triples {
        #[arg(short, long)]
        graph: Option<String>,
    },

    /// Find a path between two stored entities
    Path {
        from: String,
        to: String,

        #[arg(short, long)]
        graph: Option<String>,

        /// List every simple path instead of the shortest one
        #[arg(long)]
        all: bool,
    },

    /// Show store counts and graph metrics
    Stats {
        #[arg(short, long)]
        graph: Option<String>,
    },

    /// Delete one named graph from the store
    DeleteGraph { name: String },

    /// Delete everything in the store
    Clear {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },

    /// Run the HTTP API
    Serve {
        /// Override http_server.port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Check configuration and store schema (default)
    Verify,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-readable summary
    Text,
    /// Full report as JSON
    Json,
    /// Graphviz DOT
    Dot,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;

    // RUST_LOG wins over the configured level
    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", config.triplegraph.log_level.as_str()),
    )
    .init();

    match cli.command.unwrap_or(Commands::Verify) {
        Commands::Extract { text, file, mode, graph, save, format, save_json } => {
            let text = read_input(text, file)?;
            let graph = graph.or_else(|| save.then(|| config.triplegraph.default_graph_name.clone()));
            let mode = match mode {
                Some(m) => m.parse::<ExtractionMode>()?,
                None => config.triplegraph.default_mode,
            };
            let pipeline = Pipeline::from_config(&config).await?;
            let report = pipeline.run(&text, mode, graph.as_deref()).await?;

            if let Some(path) = save_json {
                std::fs::write(&path, export_triples_json(&report.triples)?)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                log::info!("Triples saved to {}", path.display());
            }
            print_report(&report, format)?;
        }
        Commands::Entities { graph } => {
            let store = require_store(&config).await?;
            let entities = store.get_all_entities(graph.as_deref()).await?;
            println!("Entities ({}):", entities.len());
            for entity in entities {
                println!("  {}", entity);
            }
        }
        Commands::Relations { entity, graph } => {
            let store = require_store(&config).await?;
            let relations = store.query_entity_relationships(&entity, graph.as_deref()).await?;
            if relations.is_empty() {
                println!("No relationships found for '{}'", entity);
            }
            for triple in relations {
                println!("{}", triple);
            }
        }
        Commands::Triples { graph } => {
            let store = require_store(&config).await?;
            let triples = store.get_all_triples(graph.as_deref()).await?;
            println!("Triples ({}):", triples.len());
            for triple in triples {
                println!("  {}", triple);
            }
        }
        Commands::Path { from, to, graph, all } => {
            let store = require_store(&config).await?;
            if all {
                let kg = KnowledgeGraph::build(&store.get_all_triples(graph.as_deref()).await?);
                let paths = kg.find_paths(&from, &to);
                if paths.is_empty() {
                    println!("No path from '{}' to '{}'", from, to);
                }
                for path in paths {
                    println!("{}", path.join(" -> "));
                }
            } else {
                match store.find_shortest_path(&from, &to, graph.as_deref()).await? {
                    Some(path) => {
                        let mut line = path.nodes.first().cloned().unwrap_or_default();
                        for (rel, node) in path.relationships.iter().zip(path.nodes.iter().skip(1)) {
                            line.push_str(&format!(" -[{}]-> {}", rel, node));
                        }
                        println!("{}", line);
                    }
                    None => println!("No path from '{}' to '{}'", from, to),
                }
            }
        }
        Commands::Stats { graph } => {
            let store = require_store(&config).await?;
            print_stats(store.as_ref(), graph.as_deref()).await?;
        }
        Commands::DeleteGraph { name } => {
            let store = require_store(&config).await?;
            store.delete_graph(&name).await?;
            println!("Deleted graph '{}'", name);
        }
        Commands::Clear { yes } => {
            if !yes {
                anyhow::bail!("Refusing to clear the store without --yes");
            }
            let store = require_store(&config).await?;
            store.clear_database().await?;
            println!("Store cleared");
        }
        Commands::Serve { port } => {
            log::info!("Starting triplegraph HTTP API v{}", env!("CARGO_PKG_VERSION"));
            let pipeline = Arc::new(Pipeline::from_config(&config).await?);
            let server = ApiServer::new(pipeline, &config)?;
            server.run(port.unwrap_or(config.http_server.port)).await?;
        }
        Commands::Verify => run_verification(&config).await?,
    }

    Ok(())
}

/// Text from the argument, a file, or stdin
fn read_input(text: Option<String>, file: Option<PathBuf>) -> Result<String> {
    if let Some(text) = text {
        return Ok(text);
    }
    if let Some(path) = file {
        return std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()));
    }
    let mut buf = String::new();
    std::io::stdin()
        .read_to_string(&mut buf)
        .context("Failed to read text from stdin")?;
    Ok(buf)
}

async fn require_store(config: &Config) -> Result<Arc<dyn GraphStore>> {
    open_store(config)
        .await?
        .context("No graph store configured (store.backend = \"none\")")
}

fn print_report(report: &ExtractionReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        OutputFormat::Dot => println!("{}", KnowledgeGraph::build(&report.triples).to_dot()),
        OutputFormat::Text => {
            if report.triples.is_empty() {
                println!("No triples extracted. Try different text or another mode.");
                return Ok(());
            }

            println!("Triples ({}, {} mode):", report.triples.len(), report.mode);
            for triple in &report.triples {
                println!("  {}", triple);
            }

            let stats = &report.stats;
            println!("\nGraph:");
            println!("  nodes: {}", stats.num_nodes);
            println!("  edges: {}", stats.num_edges);
            println!("  connected components: {}", stats.num_connected_components);
            println!("  average degree: {:.2}", stats.avg_degree);
            println!("  density: {:.4}", stats.density);

            println!("\nMost central entities:");
            for node in &report.central_nodes {
                println!("  {:<40} {:.3}", node.name, node.score);
            }

            if let Some(graph) = &report.stored_in {
                println!("\nStored in graph '{}'", graph);
            }
        }
    }
    Ok(())
}

async fn print_stats(store: &dyn GraphStore, graph: Option<&str>) -> Result<()> {
    let counts = store.get_graph_stats(graph).await?;
    let kg = KnowledgeGraph::build(&store.get_all_triples(graph).await?);
    let stats = kg.stats();

    println!("\n=== triplegraph: {} ===\n", graph.unwrap_or("all graphs"));
    println!("{:-<60}", "");
    println!("{:<32} {:>12}", "Stored entities", counts.num_entities);
    println!("{:<32} {:>12}", "Stored relationships", counts.num_relationships);
    println!("{:<32} {:>12}", "Connected components", stats.num_connected_components);
    println!("{:<32} {:>12.2}", "Average degree", stats.avg_degree);
    println!("{:<32} {:>12.4}", "Density", stats.density);
    println!("{:-<60}", "");

    let central = kg.central_nodes(triplegraph::pipeline::TOP_CENTRAL_NODES);
    if !central.is_empty() {
        println!("\nMost central entities:");
        for node in central {
            println!("  {:<40} {:.3}", node.name, node.score);
        }
    }
    println!();
    Ok(())
}

/// Load config, open the store and check the SQLite schema when that backend is used
async fn run_verification(config: &Config) -> Result<()> {
    log::info!("Starting triplegraph v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Configuration loaded successfully");
    log::info!("Default extraction mode: {}", config.triplegraph.default_mode);
    log::info!("LLM model: {}", config.llm.model);
    log::info!("Store backend: {:?}", config.store.backend);

    let Some(store) = open_store(config).await? else {
        log::info!("No store configured; extraction only");
        return Ok(());
    };

    if config.store.backend == StoreBackend::Sqlite {
        verify_sqlite_schema(&Db::new(config.db_path())).await?;
    }

    let stats = store.get_graph_stats(None).await?;
    log::info!(
        "✓ Store '{}' reachable: {} entities, {} relationships",
        store.name(),
        stats.num_entities,
        stats.num_relationships
    );
    Ok(())
}

/// Verify that all expected database objects exist
async fn verify_sqlite_schema(db: &Db) -> Result<()> {
    use triplegraph::TriplegraphError;

    db.with_connection(|conn| {
        let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")?;
        let tables: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

        for table in ["entities", "relations", "schema_migrations"] {
            if !tables.iter().any(|t| t == table) {
                return Err(TriplegraphError::Config(format!("Missing table: {}", table)));
            }
            log::debug!("✓ Table exists: {}", table);
        }

        let applied = migrate::get_applied_migrations(conn)?;
        log::debug!("✓ {} migrations applied", applied.len());

        let journal_mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
        if journal_mode.to_uppercase() != "WAL" {
            return Err(TriplegraphError::Config(format!("Journal mode is not WAL: {}", journal_mode)));
        }

        let foreign_keys: i32 = conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0))?;
        if foreign_keys != 1 {
            return Err(TriplegraphError::Config("Foreign keys not enabled".to_string()));
        }

        let integrity: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        if integrity != "ok" {
            return Err(TriplegraphError::Config(format!("Database integrity check failed: {}", integrity)));
        }
        log::info!("✓ Database integrity: OK");

        Ok(())
    })
    .await?;

    log::info!("✓ Database schema verification complete");
    Ok(())
}
