//! Neo4j connection client.

use neo4rs::{ConfigBuilder, Graph, Query};
use serde::de::DeserializeOwned;
use threatsync_core::config::GraphConfig;

use crate::error::{GraphError, GraphResult};

/// Client for Neo4j read and bootstrap operations.
#[derive(Clone)]
pub struct GraphClient {
    graph: Graph,
    uri: String,
}

impl GraphClient {
    /// Create a new GraphClient from config.
    ///
    /// Note: neo4rs uses a lazy deadpool, so `Graph::connect` only creates the
    /// pool object. We run a cheap `RETURN 1` ping immediately so that an
    /// unreachable server surfaces here instead of on the first phase.
    pub async fn connect(config: &GraphConfig) -> GraphResult<Self> {
        let neo4j_config = ConfigBuilder::default()
            .uri(&config.uri)
            .user(&config.user)
            .password(&config.password)
            .db(config.database.as_str())
            .max_connections(config.max_connections)
            .fetch_size(config.fetch_size)
            .build()
            .map_err(|e| GraphError::Config(e.to_string()))?;

        let graph = Graph::connect(neo4j_config)
            .await
            .map_err(|e| GraphError::Connection(format!("{}: {}", config.uri, e)))?;

        // Ping to force an actual TCP+bolt handshake.
        graph
            .run(Query::new("RETURN 1".to_string()))
            .await
            .map_err(|e| GraphError::Connection(format!("{} is not responding: {}", config.uri, e)))?;

        Ok(Self {
            graph,
            uri: config.uri.clone(),
        })
    }

    /// Server URI this client talks to.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Execute a Cypher query that returns no results.
    pub async fn execute(&self, query: Query) -> GraphResult<()> {
        self.graph
            .run(query)
            .await
            .map_err(|e| GraphError::Query(e.to_string()))
    }

    /// Execute a Cypher query and return every row.
    ///
    /// A failure while streaming is an error, not a short result.
    pub async fn query(&self, query: Query) -> GraphResult<Vec<neo4rs::Row>> {
        let mut result = self
            .graph
            .execute(query)
            .await
            .map_err(|e| GraphError::Query(e.to_string()))?;

        let mut rows = Vec::new();
        while let Some(row) = result
            .next()
            .await
            .map_err(|e| GraphError::Query(e.to_string()))?
        {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Execute a Cypher query and return a single scalar value.
    pub async fn query_scalar<T: DeserializeOwned>(&self, query: Query, field: &str) -> GraphResult<Option<T>> {
        let rows = self.query(query).await?;
        if let Some(row) = rows.into_iter().next() {
            let val: T = row
                .get(field)
                .map_err(|e| GraphError::Query(format!("Failed to get field '{}': {:?}", field, e)))?;
            Ok(Some(val))
        } else {
            Ok(None)
        }
    }

    /// Get node and relationship counts for status display.
    pub async fn get_counts(&self) -> GraphResult<GraphCounts> {
        let node_query = Query::new("MATCH (n) RETURN count(n) as count".to_string());
        let rel_query = Query::new("MATCH ()-[r]->() RETURN count(r) as count".to_string());

        let node_count: i64 = self.query_scalar(node_query, "count").await?.unwrap_or(0);
        let rel_count: i64 = self.query_scalar(rel_query, "count").await?.unwrap_or(0);

        Ok(GraphCounts {
            nodes: node_count as usize,
            relationships: rel_count as usize,
        })
    }
}

/// Node and relationship counts.
#[derive(Debug, Clone)]
pub struct GraphCounts {
    pub nodes: usize,
    pub relationships: usize,
}
