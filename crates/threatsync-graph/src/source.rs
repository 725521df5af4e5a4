//! Read-only access to the property graph.

use async_trait::async_trait;
use threatsync_core::entity::EntityKind;
use threatsync_core::property::PropertyMap;
use threatsync_core::relationship::RelationshipKind;

use crate::error::GraphResult;

/// A snapshot reader over typed nodes and edges.
///
/// Each call returns a complete, finite result and may be repeated; nothing
/// is ever written to the source. Edge maps carry `source_id` and
/// `target_id` (endpoint natural identifiers) plus the edge attributes.
#[async_trait]
pub trait GraphSource: Send + Sync {
    /// All nodes of one entity kind.
    async fn fetch_entities(&self, kind: EntityKind) -> GraphResult<Vec<PropertyMap>>;

    /// All edges of one relationship kind.
    async fn fetch_relationships(&self, kind: RelationshipKind) -> GraphResult<Vec<PropertyMap>>;

    /// Number of nodes of one entity kind.
    async fn count_entities(&self, kind: EntityKind) -> GraphResult<u64>;

    /// Human-readable name of the source, for logs.
    fn describe(&self) -> String;
}
