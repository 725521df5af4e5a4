//! # threatsync graph
//!
//! Read-only property graph access for the migration engine: a Neo4j
//! client and source, an in-memory snapshot source, and graph schema
//! bootstrap.

pub mod client;
pub mod error;
pub mod memory;
pub mod neo4j;
pub mod schema;
pub mod source;

pub use client::{GraphClient, GraphCounts};
pub use error::{GraphError, GraphResult};
pub use memory::MemoryGraph;
pub use neo4j::Neo4jSource;
pub use source::GraphSource;
