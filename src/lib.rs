pub mod config;
pub mod error;
pub mod db;
pub mod cache;
pub mod triple;
pub mod extract;
pub mod graph;
pub mod store;
pub mod pipeline;
pub mod http;

pub use config::Config;
pub use error::{Result, TriplegraphError};
pub use extract::{ExtractionMode, KnowledgeExtractor};
pub use graph::KnowledgeGraph;
pub use pipeline::{ExtractionReport, Pipeline};
pub use store::GraphStore;
pub use triple::Triple;
