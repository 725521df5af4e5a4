//! In-process graph source.
//!
//! Used for offline migrations from a JSON snapshot and as the fixture
//! store in tests. Snapshot layout:
//!
//! ```json
//! {
//!   "nodes": { "ThreatActor": [ { "stix_id": "...", "name": "..." } ] },
//!   "edges": { "actor_uses_malware": [ { "source_id": "...", "target_id": "..." } ] }
//! }
//! ```
//!
//! Node groups are keyed by label, table name or stats key; edge groups by
//! join table name.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use threatsync_core::entity::EntityKind;
use threatsync_core::property::PropertyMap;
use threatsync_core::relationship::RelationshipKind;

use crate::error::{GraphError, GraphResult};
use crate::source::GraphSource;

#[derive(Debug, Default, Deserialize)]
struct Snapshot {
    #[serde(default)]
    nodes: BTreeMap<String, Vec<PropertyMap>>,
    #[serde(default)]
    edges: BTreeMap<String, Vec<PropertyMap>>,
}

/// Nodes and edges held in memory, keyed by kind.
#[derive(Debug, Default)]
pub struct MemoryGraph {
    nodes: BTreeMap<EntityKind, Vec<PropertyMap>>,
    edges: BTreeMap<RelationshipKind, Vec<PropertyMap>>,
    offline: AtomicBool,
    name: Option<String>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a snapshot file.
    pub fn from_json_file(path: &Path) -> GraphResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| GraphError::Snapshot(format!("{}: {}", path.display(), e)))?;
        let mut graph = Self::from_json_str(&content)?;
        graph.name = Some(path.display().to_string());
        Ok(graph)
    }

    /// Parse a snapshot document.
    pub fn from_json_str(content: &str) -> GraphResult<Self> {
        let snapshot: Snapshot =
            serde_json::from_str(content).map_err(|e| GraphError::Snapshot(e.to_string()))?;

        let mut graph = Self::new();
        for (key, nodes) in snapshot.nodes {
            let kind = EntityKind::parse(&key)
                .ok_or_else(|| GraphError::Snapshot(format!("Unknown node group '{}'", key)))?;
            for node in nodes {
                graph.add_node(kind, node);
            }
        }
        for (key, edges) in snapshot.edges {
            let kind = RelationshipKind::ALL
                .into_iter()
                .find(|k| k.table() == key)
                .ok_or_else(|| GraphError::Snapshot(format!("Unknown edge group '{}'", key)))?;
            graph.edges.entry(kind).or_default().extend(edges);
        }
        Ok(graph)
    }

    /// Append a node as-is. Duplicate identifiers are kept.
    pub fn add_node(&mut self, kind: EntityKind, props: PropertyMap) -> &mut Self {
        self.nodes.entry(kind).or_default().push(props);
        self
    }

    /// Replace the node with the same `stix_id`, or append it.
    pub fn upsert_node(&mut self, kind: EntityKind, props: PropertyMap) -> &mut Self {
        let nodes = self.nodes.entry(kind).or_default();
        let id = props.get("stix_id").cloned();
        match nodes.iter_mut().find(|n| id.is_some() && n.get("stix_id") == id.as_ref()) {
            Some(existing) => *existing = props,
            None => nodes.push(props),
        }
        self
    }

    /// Add an edge between two natural identifiers with extra attributes.
    pub fn add_edge(&mut self, kind: RelationshipKind, source: &str, target: &str, attrs: PropertyMap) -> &mut Self {
        let mut props = attrs;
        props.insert("source_id".to_string(), Value::String(source.to_string()));
        props.insert("target_id".to_string(), Value::String(target.to_string()));
        self.edges.entry(kind).or_default().push(props);
        self
    }

    /// Simulate an unreachable server: every read fails.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn node_count(&self) -> usize {
        self.nodes.values().map(Vec::len).sum()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(Vec::len).sum()
    }

    fn ensure_online(&self) -> GraphResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(GraphError::Connection(format!("{} is offline", self.describe())));
        }
        Ok(())
    }
}

#[async_trait]
impl GraphSource for MemoryGraph {
    async fn fetch_entities(&self, kind: EntityKind) -> GraphResult<Vec<PropertyMap>> {
        self.ensure_online()?;
        Ok(self.nodes.get(&kind).cloned().unwrap_or_default())
    }

    async fn fetch_relationships(&self, kind: RelationshipKind) -> GraphResult<Vec<PropertyMap>> {
        self.ensure_online()?;
        Ok(self.edges.get(&kind).cloned().unwrap_or_default())
    }

    async fn count_entities(&self, kind: EntityKind) -> GraphResult<u64> {
        self.ensure_online()?;
        Ok(self.nodes.get(&kind).map_or(0, Vec::len) as u64)
    }

    fn describe(&self) -> String {
        match &self.name {
            Some(name) => format!("snapshot {}", name),
            None => "in-memory graph".to_string(),
        }
    }
}
