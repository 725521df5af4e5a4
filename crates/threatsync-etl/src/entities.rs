//! Entity migrator: one phase per entity kind.

use async_trait::async_trait;
use threatsync_core::entity::{raw_stix_id, EntityKind, EntityRecord, TransformOptions};
use threatsync_core::error::TransformError;
use threatsync_core::property::PropertyMap;
use threatsync_db::queries::entities::upsert_entity;
use threatsync_db::DbPool;
use threatsync_graph::{GraphResult, GraphSource};
use tracing::{debug, warn};

use crate::error::{EtlError, EtlResult};
use crate::pipeline::{run_phase, PhaseOptions, PhaseReport, Pipeline, Progress, RowKey, RowOutcome};

/// Moves every node of one kind into its table, upserting by `stix_id`.
#[derive(Debug, Clone, Copy)]
pub struct EntityPipeline {
    kind: EntityKind,
}

impl EntityPipeline {
    pub fn new(kind: EntityKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }
}

#[async_trait]
impl Pipeline for EntityPipeline {
    type Record = EntityRecord;

    fn name(&self) -> &'static str {
        self.kind.as_str()
    }

    async fn extract(&self, source: &dyn GraphSource) -> GraphResult<Vec<PropertyMap>> {
        source.fetch_entities(self.kind).await
    }

    fn transform(&self, props: &PropertyMap, opts: &TransformOptions) -> Result<EntityRecord, TransformError> {
        EntityRecord::from_properties(self.kind, props, opts)
    }

    fn load(&self, db: &DbPool, record: &EntityRecord) -> EtlResult<RowOutcome> {
        let natural_id = record.stix_id().to_string();
        match upsert_entity(db, record) {
            Ok(id) => {
                debug!(table = self.kind.table(), stix_id = %natural_id, id, "Upserted entity");
                Ok(RowOutcome::Migrated {
                    natural_id,
                    key: RowKey::Entity(id),
                })
            }
            Err(e) if e.is_fatal() => Err(EtlError::from(e)),
            Err(e) => {
                warn!(table = self.kind.table(), stix_id = %natural_id, error = %e, "Entity row rejected");
                Ok(RowOutcome::Failed {
                    natural_id,
                    reason: e.to_string(),
                })
            }
        }
    }

    fn describe_raw(&self, props: &PropertyMap) -> String {
        raw_stix_id(props).unwrap_or_else(|| format!("<{} without stix_id>", self.kind.label()))
    }
}

/// Run the entity phase for one kind.
pub async fn migrate_entities(
    kind: EntityKind,
    source: &dyn GraphSource,
    db: &DbPool,
    options: &PhaseOptions,
    progress: &dyn Progress,
) -> EtlResult<PhaseReport> {
    run_phase(&EntityPipeline::new(kind), source, db, options, progress).await
}
