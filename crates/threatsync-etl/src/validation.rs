//! Post-migration consistency checks.
//!
//! Checks report, they never repair. A failing check is a `false` entry in
//! the report; only an unusable destination is an error.

use std::collections::BTreeMap;

use serde::Serialize;
use threatsync_core::entity::EntityKind;
use threatsync_core::relationship::RelationshipKind;
use threatsync_db::queries::entities::count_entities;
use threatsync_db::queries::integrity::{
    count_confidence_out_of_range, count_null_required, count_orphans, foreign_key_violations,
};
use threatsync_db::DbPool;
use threatsync_graph::GraphSource;
use tracing::{info, warn};

use crate::error::EtlResult;

pub const REQUIRED_FIELDS_VALID: &str = "required_fields_valid";
pub const FOREIGN_KEYS_VALID: &str = "foreign_keys_valid";
pub const REFERENCES_VALID: &str = "references_valid";
pub const CONFIDENCE_VALID: &str = "confidence_valid";
pub const DATA_INTEGRITY: &str = "data_integrity";

/// Name of the count parity check for an entity kind, e.g. `threat_actors_match`.
pub fn parity_check_name(kind: EntityKind) -> String {
    format!("{}_match", kind.as_str())
}

/// Check name to result, plus notes explaining failures.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub checks: BTreeMap<String, bool>,
    pub notes: Vec<String>,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        self.checks.values().all(|ok| *ok)
    }

    pub fn check(&self, name: &str) -> Option<bool> {
        self.checks.get(name).copied()
    }

    pub fn failures(&self) -> Vec<&str> {
        self.checks
            .iter()
            .filter(|(_, ok)| !**ok)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    fn record(&mut self, name: impl Into<String>, ok: bool) {
        self.checks.insert(name.into(), ok);
    }
}

/// Run every check.
///
/// Count parity runs for `parity_kinds` only, and only when a source is
/// given. A source error during parity marks that check failed.
pub async fn validate(
    db: &DbPool,
    source: Option<&dyn GraphSource>,
    parity_kinds: &[EntityKind],
) -> EtlResult<ValidationReport> {
    let mut report = ValidationReport::default();

    if let Some(source) = source {
        for kind in parity_kinds {
            let name = parity_check_name(*kind);
            let destination = count_entities(db, *kind)?;
            match source.count_entities(*kind).await {
                Ok(expected) => {
                    let ok = i64::try_from(expected).is_ok_and(|e| e == destination);
                    if !ok {
                        report.notes.push(format!(
                            "{}: source has {} nodes, destination has {} rows",
                            kind.as_str(),
                            expected,
                            destination
                        ));
                    }
                    report.record(name, ok);
                }
                Err(e) => {
                    warn!(check = %name, error = %e, "Count parity could not read source");
                    report.notes.push(format!("{}: error: {}", name, e));
                    report.record(name, false);
                }
            }
        }
    }

    let mut null_required = 0;
    for kind in EntityKind::ALL {
        let n = count_null_required(db, kind)?;
        if n > 0 {
            report.notes.push(format!("{}: {} rows with null required fields", kind.table(), n));
        }
        null_required += n;
    }
    let required_ok = null_required == 0;
    report.record(REQUIRED_FIELDS_VALID, required_ok);

    let violations = foreign_key_violations(db)?;
    for v in &violations {
        report.notes.push(format!(
            "{} row {} references missing {}",
            v.table,
            v.rowid.map_or_else(|| "?".to_string(), |id| id.to_string()),
            v.parent
        ));
    }
    let fk_ok = violations.is_empty();
    report.record(FOREIGN_KEYS_VALID, fk_ok);

    let mut orphans = 0;
    let mut out_of_range = 0;
    for kind in RelationshipKind::ALL {
        orphans += count_orphans(db, kind)?;
        out_of_range += count_confidence_out_of_range(db, kind)?;
    }
    report.record(REFERENCES_VALID, orphans == 0);
    report.record(CONFIDENCE_VALID, out_of_range == 0);
    report.record(DATA_INTEGRITY, required_ok && fk_ok);

    info!(passed = report.passed(), failures = ?report.failures(), "Validation complete");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::migrate_entities;
    use crate::pipeline::{NoProgress, PhaseOptions};
    use crate::testing::*;

    #[tokio::test]
    async fn test_clean_run_passes() {
        let (mut graph, db) = setup();
        graph.add_node(EntityKind::ThreatActor, actor("threat-actor--1", "APT1"));
        migrate_entities(EntityKind::ThreatActor, &graph, &db, &PhaseOptions::default(), &NoProgress)
            .await
            .unwrap();

        let report = validate(&db, Some(&graph), &[EntityKind::ThreatActor]).await.unwrap();
        assert!(report.passed(), "{:?}", report);
        assert_eq!(report.check("threat_actors_match"), Some(true));
        assert_eq!(report.check(DATA_INTEGRITY), Some(true));
        assert_eq!(report.checks.len(), 6);
    }

    #[tokio::test]
    async fn test_parity_mismatch_reported() {
        let (mut graph, db) = setup();
        graph.add_node(EntityKind::Malware, malware("malware--1", "x"));

        let report = validate(&db, Some(&graph), &[EntityKind::Malware]).await.unwrap();
        assert_eq!(report.check("malware_match"), Some(false));
        assert!(!report.passed());
        assert_eq!(report.check(DATA_INTEGRITY), Some(true));
    }

    #[tokio::test]
    async fn test_no_source_skips_parity() {
        let db = threatsync_db::init_memory_pool().unwrap();
        let report = validate(&db, None, &EntityKind::ALL).await.unwrap();
        assert!(report.checks.keys().all(|k| !k.ends_with("_match")));
        assert!(report.passed());
    }

    #[tokio::test]
    async fn test_offline_source_fails_check_without_error() {
        let (graph, db) = setup();
        graph.set_offline(true);
        let report = validate(&db, Some(&graph), &[EntityKind::ThreatActor]).await.unwrap();
        assert_eq!(report.check("threat_actors_match"), Some(false));
        assert!(report.notes.iter().any(|n| n.contains("error")));
    }

    #[tokio::test]
    async fn test_storage_level_damage_detected() {
        let db = threatsync_db::init_memory_pool().unwrap();
        db.with_conn(|conn| {
            conn.execute_batch(
                "PRAGMA foreign_keys = OFF;
                 PRAGMA ignore_check_constraints = ON;
                 INSERT INTO threat_actor (stix_id, name) VALUES (NULL, 'nameless');
                 INSERT INTO indicator_indicates_malware (indicator_id, malware_id, confidence)
                 VALUES (7, 8, 101);
                 PRAGMA ignore_check_constraints = OFF;
                 PRAGMA foreign_keys = ON;",
            )?;
            Ok(())
        })
        .unwrap();

        let report = validate(&db, None, &[]).await.unwrap();
        assert_eq!(report.check(REQUIRED_FIELDS_VALID), Some(false));
        assert_eq!(report.check(FOREIGN_KEYS_VALID), Some(false));
        assert_eq!(report.check(REFERENCES_VALID), Some(false));
        assert_eq!(report.check(CONFIDENCE_VALID), Some(false));
        assert_eq!(report.check(DATA_INTEGRITY), Some(false));
    }
}
