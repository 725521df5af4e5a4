//! Extract / transform / load template shared by every migration phase.
//!
//! A phase is anything implementing [`Pipeline`]; [`run_phase`] drives it.
//! Each row produces a [`RowOutcome`], so skip and failure rates are part of
//! the returned [`PhaseReport`] rather than hidden in logs.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;
use threatsync_core::entity::TransformOptions;
use threatsync_core::error::TransformError;
use threatsync_core::property::PropertyMap;
use threatsync_db::DbPool;
use threatsync_graph::{GraphResult, GraphSource};
use tracing::{debug, info, warn};

use crate::error::{EtlError, EtlResult};

/// Natural identifier to surrogate key, scoped to one run.
pub type IdMap = BTreeMap<String, i64>;

/// Destination key of a written row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RowKey {
    Entity(i64),
    Pair(i64, i64),
}

/// What happened to a single source row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RowOutcome {
    Migrated { natural_id: String, key: RowKey },
    Skipped { natural_id: String, reason: String },
    Failed { natural_id: String, reason: String },
}

impl RowOutcome {
    pub fn natural_id(&self) -> &str {
        match self {
            Self::Migrated { natural_id, .. }
            | Self::Skipped { natural_id, .. }
            | Self::Failed { natural_id, .. } => natural_id,
        }
    }

    pub fn is_migrated(&self) -> bool {
        matches!(self, Self::Migrated { .. })
    }
}

/// Outcomes of one phase.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PhaseReport {
    pub phase: String,
    pub outcomes: Vec<RowOutcome>,
}

impl PhaseReport {
    pub fn new(phase: impl Into<String>) -> Self {
        Self {
            phase: phase.into(),
            outcomes: Vec::new(),
        }
    }

    pub fn push(&mut self, outcome: RowOutcome) {
        self.outcomes.push(outcome);
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn migrated(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_migrated()).count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, RowOutcome::Skipped { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, RowOutcome::Failed { .. }))
            .count()
    }

    /// Surrogate keys produced by an entity phase. Empty for relationship phases.
    pub fn id_map(&self) -> IdMap {
        self.outcomes
            .iter()
            .filter_map(|o| match o {
                RowOutcome::Migrated {
                    natural_id,
                    key: RowKey::Entity(id),
                } => Some((natural_id.clone(), *id)),
                _ => None,
            })
            .collect()
    }
}

/// Per-phase settings.
#[derive(Debug, Clone, Copy)]
pub struct PhaseOptions {
    /// Rows per progress report. Must be non-zero.
    pub batch_size: usize,
    pub transform: TransformOptions,
}

impl Default for PhaseOptions {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            transform: TransformOptions::default(),
        }
    }
}

impl PhaseOptions {
    pub fn check(&self) -> EtlResult<()> {
        if self.batch_size == 0 {
            return Err(EtlError::Config("batch size must be greater than 0".to_string()));
        }
        Ok(())
    }
}

/// Observer for phase progress. All methods default to no-ops.
pub trait Progress: Send + Sync {
    fn phase_started(&self, _phase: &str, _total: usize) {}
    fn batch_done(&self, _phase: &str, _processed: usize) {}
    fn phase_finished(&self, _report: &PhaseReport) {}
}

/// Progress observer that ignores everything.
pub struct NoProgress;

impl Progress for NoProgress {}

/// The three steps of a migration phase.
#[async_trait]
pub trait Pipeline: Send + Sync {
    type Record: Send + Sync;

    /// Phase name, also the stats key.
    fn name(&self) -> &'static str;

    /// Read the full snapshot for this phase.
    async fn extract(&self, source: &dyn GraphSource) -> GraphResult<Vec<PropertyMap>>;

    /// Turn one property map into a typed record.
    fn transform(&self, props: &PropertyMap, opts: &TransformOptions) -> Result<Self::Record, TransformError>;

    /// Write one record. `Err` only for failures that must abort the run.
    fn load(&self, db: &DbPool, record: &Self::Record) -> EtlResult<RowOutcome>;

    /// Identifier used to report a row that could not be transformed.
    fn describe_raw(&self, props: &PropertyMap) -> String;
}

/// Run one phase: extract everything, then transform and load row by row.
///
/// Rows are handled independently; batches only bound how often progress
/// is reported.
pub async fn run_phase<P>(
    pipeline: &P,
    source: &dyn GraphSource,
    db: &DbPool,
    options: &PhaseOptions,
    progress: &dyn Progress,
) -> EtlResult<PhaseReport>
where
    P: Pipeline + ?Sized,
{
    options.check()?;
    let phase = pipeline.name();

    let rows = pipeline.extract(source).await?;
    debug!(phase, rows = rows.len(), "Extracted phase snapshot");
    progress.phase_started(phase, rows.len());

    let mut report = PhaseReport::new(phase);
    for batch in rows.chunks(options.batch_size) {
        for props in batch {
            let outcome = match pipeline.transform(props, &options.transform) {
                Ok(record) => pipeline.load(db, &record)?,
                Err(e) => {
                    let natural_id = pipeline.describe_raw(props);
                    warn!(phase, natural_id = %natural_id, error = %e, "Row failed to transform");
                    RowOutcome::Failed {
                        natural_id,
                        reason: e.to_string(),
                    }
                }
            };
            report.push(outcome);
        }
        progress.batch_done(phase, report.total());
    }

    info!(
        phase,
        migrated = report.migrated(),
        skipped = report.skipped(),
        failed = report.failed(),
        "Phase complete"
    );
    progress.phase_finished(&report);
    Ok(report)
}
