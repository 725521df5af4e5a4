//! Relationship migrator: one phase per relationship kind.
//!
//! Endpoints are resolved against the destination tables, never against an
//! in-memory map, so a phase can run on its own. An edge whose endpoint is
//! not in the destination is skipped; running a relationship phase before
//! its entity phases therefore writes nothing and raises nothing.

use async_trait::async_trait;
use threatsync_core::entity::TransformOptions;
use threatsync_core::error::TransformError;
use threatsync_core::property::PropertyMap;
use threatsync_core::relationship::{Relationship, RelationshipKind};
use threatsync_db::queries::entities::lookup_id;
use threatsync_db::queries::relationships::upsert_relationship;
use threatsync_db::DbPool;
use threatsync_graph::{GraphResult, GraphSource};
use tracing::{debug, warn};

use crate::error::{EtlError, EtlResult};
use crate::pipeline::{run_phase, PhaseOptions, PhaseReport, Pipeline, Progress, RowKey, RowOutcome};

#[derive(Debug, Clone, Copy)]
pub struct RelationshipPipeline {
    kind: RelationshipKind,
}

impl RelationshipPipeline {
    pub fn new(kind: RelationshipKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> RelationshipKind {
        self.kind
    }
}

#[async_trait]
impl Pipeline for RelationshipPipeline {
    type Record = Relationship;

    fn name(&self) -> &'static str {
        self.kind.table()
    }

    async fn extract(&self, source: &dyn GraphSource) -> GraphResult<Vec<PropertyMap>> {
        source.fetch_relationships(self.kind).await
    }

    fn transform(&self, props: &PropertyMap, _opts: &TransformOptions) -> Result<Relationship, TransformError> {
        Relationship::from_properties(self.kind, props)
    }

    fn load(&self, db: &DbPool, rel: &Relationship) -> EtlResult<RowOutcome> {
        let natural_id = rel.describe();

        let source_key = lookup_id(db, self.kind.source(), &rel.source_id)?;
        let target_key = lookup_id(db, self.kind.target(), &rel.target_id)?;
        let (source_key, target_key) = match (source_key, target_key) {
            (Some(s), Some(t)) => (s, t),
            (s, _) => {
                let (missing_kind, missing_id) = if s.is_none() {
                    (self.kind.source(), &rel.source_id)
                } else {
                    (self.kind.target(), &rel.target_id)
                };
                warn!(
                    table = self.kind.table(),
                    edge = %natural_id,
                    missing = %missing_id,
                    "Skipping edge with unresolved endpoint"
                );
                return Ok(RowOutcome::Skipped {
                    natural_id,
                    reason: format!("{} {} not found", missing_kind.label(), missing_id),
                });
            }
        };

        match upsert_relationship(db, rel, source_key, target_key) {
            Ok(()) => {
                debug!(table = self.kind.table(), source_key, target_key, "Upserted relationship");
                Ok(RowOutcome::Migrated {
                    natural_id,
                    key: RowKey::Pair(source_key, target_key),
                })
            }
            Err(e) if e.is_fatal() => Err(EtlError::from(e)),
            Err(e) => {
                warn!(table = self.kind.table(), edge = %natural_id, error = %e, "Relationship row rejected");
                Ok(RowOutcome::Failed {
                    natural_id,
                    reason: e.to_string(),
                })
            }
        }
    }

    fn describe_raw(&self, props: &PropertyMap) -> String {
        let end = |key: &str| props.get(key).and_then(|v| v.as_str()).unwrap_or("?").to_string();
        format!("{} -[{}]-> {}", end("source_id"), self.kind.rel_type(), end("target_id"))
    }
}

/// Run the relationship phase for one kind.
pub async fn migrate_relationships(
    kind: RelationshipKind,
    source: &dyn GraphSource,
    db: &DbPool,
    options: &PhaseOptions,
    progress: &dyn Progress,
) -> EtlResult<PhaseReport> {
    run_phase(&RelationshipPipeline::new(kind), source, db, options, progress).await
}
