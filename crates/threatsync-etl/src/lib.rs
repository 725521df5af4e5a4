//! # threatsync etl
//!
//! Migration engine moving threat intelligence from a property graph into
//! the relational sink.
//!
//! Entity phases upsert nodes by natural identifier. Relationship phases
//! resolve both endpoints against the destination and skip edges whose
//! endpoints are missing. The orchestrator runs phases in a fixed order and
//! returns their merged reports; the validation engine checks the result.

pub mod entities;
pub mod error;
pub mod orchestrator;
pub mod pipeline;
pub mod relationships;
pub mod validation;

#[cfg(test)]
mod testing;

pub use entities::{migrate_entities, EntityPipeline};
pub use error::{EtlError, EtlResult};
pub use orchestrator::{MigrationOptions, MigrationScope, MigrationStats, Orchestrator};
pub use pipeline::{run_phase, IdMap, NoProgress, PhaseOptions, PhaseReport, Pipeline, Progress, RowKey, RowOutcome};
pub use relationships::{migrate_relationships, RelationshipPipeline};
pub use validation::{validate, ValidationReport};
