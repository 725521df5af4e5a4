//! Runs migration phases in order and aggregates their reports.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use threatsync_core::config::{CountParity, MigrationConfig};
use threatsync_core::entity::{EntityKind, TransformOptions};
use threatsync_core::relationship::RelationshipKind;
use threatsync_db::DbPool;
use threatsync_graph::GraphSource;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use crate::entities::migrate_entities;
use crate::error::{EtlError, EtlResult};
use crate::pipeline::{IdMap, NoProgress, PhaseOptions, PhaseReport, Progress};
use crate::relationships::migrate_relationships;
use crate::validation::{validate, ValidationReport};

/// Which part of the graph a run covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MigrationScope {
    ThreatActors,
    Malware,
    AttackPatterns,
    #[default]
    All,
}

impl MigrationScope {
    /// Entity phases, in run order.
    pub fn entity_kinds(&self) -> Vec<EntityKind> {
        match self {
            Self::ThreatActors => vec![EntityKind::ThreatActor],
            Self::Malware => vec![EntityKind::Malware],
            Self::AttackPatterns => vec![EntityKind::AttackPattern],
            Self::All => EntityKind::ALL.to_vec(),
        }
    }

    /// Relationship phases, in run order. Only a full run has any.
    pub fn relationship_kinds(&self) -> Vec<RelationshipKind> {
        match self {
            Self::All => RelationshipKind::MIGRATED.to_vec(),
            _ => Vec::new(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ThreatActors => "threat-actors",
            Self::Malware => "malware",
            Self::AttackPatterns => "attack-patterns",
            Self::All => "all",
        }
    }
}

impl fmt::Display for MigrationScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MigrationScope {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "threat-actors" => Ok(Self::ThreatActors),
            "malware" => Ok(Self::Malware),
            "attack-patterns" => Ok(Self::AttackPatterns),
            "all" => Ok(Self::All),
            other => Err(EtlError::Config(format!("unknown migration scope '{}'", other))),
        }
    }
}

/// Settings for one run.
#[derive(Debug, Clone, Copy, Default)]
pub struct MigrationOptions {
    pub scope: MigrationScope,
    pub phase: PhaseOptions,
    pub count_parity: CountParity,
}

impl MigrationOptions {
    pub fn from_config(config: &MigrationConfig, scope: MigrationScope) -> Self {
        Self {
            scope,
            phase: PhaseOptions {
                batch_size: config.batch_size,
                transform: TransformOptions {
                    strict_stix_ids: config.strict_stix_ids,
                },
            },
            count_parity: config.count_parity,
        }
    }

    /// Entity kinds whose counts are compared by validation.
    pub fn parity_kinds(&self) -> Vec<EntityKind> {
        match self.count_parity {
            CountParity::All => self.scope.entity_kinds(),
            CountParity::ThreatActors => vec![EntityKind::ThreatActor],
        }
    }
}

/// Merged reports of every phase of one run.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationStats {
    pub run_id: Uuid,
    pub scope: MigrationScope,
    pub phases: Vec<PhaseReport>,
}

impl MigrationStats {
    pub fn new(scope: MigrationScope) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            scope,
            phases: Vec::new(),
        }
    }

    pub fn merge(&mut self, report: PhaseReport) {
        self.phases.push(report);
    }

    /// Phase name to migrated count, e.g. `{"threat_actors": 2, "actor_uses_malware": 1}`.
    pub fn counts(&self) -> BTreeMap<String, usize> {
        self.phases
            .iter()
            .map(|p| (p.phase.clone(), p.migrated()))
            .collect()
    }

    pub fn phase(&self, name: &str) -> Option<&PhaseReport> {
        self.phases.iter().find(|p| p.phase == name)
    }

    pub fn migrated(&self) -> usize {
        self.phases.iter().map(PhaseReport::migrated).sum()
    }

    pub fn skipped(&self) -> usize {
        self.phases.iter().map(PhaseReport::skipped).sum()
    }

    pub fn failed(&self) -> usize {
        self.phases.iter().map(PhaseReport::failed).sum()
    }

    /// Surrogate keys assigned during this run for one entity kind.
    pub fn id_map(&self, kind: EntityKind) -> IdMap {
        self.phase(kind.as_str()).map(PhaseReport::id_map).unwrap_or_default()
    }
}

/// Drives a full or partial migration from a graph source into the sink.
pub struct Orchestrator<'a> {
    source: &'a dyn GraphSource,
    db: &'a DbPool,
    progress: &'a dyn Progress,
}

impl<'a> Orchestrator<'a> {
    pub fn new(source: &'a dyn GraphSource, db: &'a DbPool) -> Self {
        Self {
            source,
            db,
            progress: &NoProgress,
        }
    }

    pub fn with_progress(mut self, progress: &'a dyn Progress) -> Self {
        self.progress = progress;
        self
    }

    /// Run entity phases, then relationship phases. The first fatal error
    /// aborts every remaining phase.
    pub async fn run(&self, options: &MigrationOptions) -> EtlResult<MigrationStats> {
        options.phase.check()?;
        let mut stats = MigrationStats::new(options.scope);
        let span = tracing::info_span!("migration", run_id = %stats.run_id, scope = %options.scope);

        self.run_phases(options, &mut stats).instrument(span).await?;
        Ok(stats)
    }

    async fn run_phases(&self, options: &MigrationOptions, stats: &mut MigrationStats) -> EtlResult<()> {
        info!(source = %self.source.describe(), "Starting migration");

        for kind in options.scope.entity_kinds() {
            let report = migrate_entities(kind, self.source, self.db, &options.phase, self.progress).await?;
            stats.merge(report);
        }

        let relationships = options.scope.relationship_kinds();
        for kind in &relationships {
            let report = migrate_relationships(*kind, self.source, self.db, &options.phase, self.progress).await?;
            stats.merge(report);
        }

        if !relationships.is_empty() {
            for kind in RelationshipKind::ALL.into_iter().filter(|k| !k.is_migrated()) {
                warn!(table = kind.table(), "Relationship kind is not migrated; join table left as is");
            }
        }

        info!(
            migrated = stats.migrated(),
            skipped = stats.skipped(),
            failed = stats.failed(),
            "Migration complete"
        );
        Ok(())
    }

    /// Run the validation engine against this orchestrator's source and sink.
    pub async fn validate(&self, options: &MigrationOptions) -> EtlResult<ValidationReport> {
        validate(self.db, Some(self.source), &options.parity_kinds()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use serde_json::json;
    use threatsync_db::queries::entities::{count_entities, get_entity_row, list_stix_ids, table_counts};
    use threatsync_db::queries::relationships::{count_relationships, list_relationships};
    use threatsync_graph::MemoryGraph;

    fn full_graph() -> MemoryGraph {
        let mut graph = MemoryGraph::new();
        graph
            .add_node(EntityKind::ThreatActor, actor("threat-actor--1", "APT28"))
            .add_node(EntityKind::ThreatActor, actor("threat-actor--2", "APT29"))
            .add_node(EntityKind::Malware, malware("malware--1", "X-Agent"))
            .add_node(EntityKind::Malware, malware("malware--2", "Zebrocy"))
            .add_node(EntityKind::AttackPattern, attack_pattern("attack-pattern--1", "T1566"))
            .add_node(EntityKind::Vulnerability, vulnerability("vulnerability--1", "CVE-2017-11882"))
            .add_node(EntityKind::Indicator, indicator("indicator--1", "[file:hashes.MD5 = 'aa']"))
            .add_edge(RelationshipKind::ActorUsesMalware, "threat-actor--1", "malware--1", edge(85, "2023-01-01"))
            .add_edge(RelationshipKind::ActorUsesMalware, "threat-actor--2", "malware--2", edge(60, "2022-06-01"))
            .add_edge(
                RelationshipKind::ActorUsesAttackPattern,
                "threat-actor--1",
                "attack-pattern--1",
                edge(70, "2023-01-01"),
            )
            .add_edge(
                RelationshipKind::MalwareExploitsVulnerability,
                "malware--1",
                "vulnerability--1",
                edge(90, "2023-02-01"),
            )
            .add_edge(
                RelationshipKind::IndicatorIndicatesMalware,
                "indicator--1",
                "malware--1",
                edge(75, "2023-03-01"),
            );
        graph
    }

    #[tokio::test]
    async fn test_actor_uses_malware_end_to_end() {
        let (mut graph, db) = setup();
        graph
            .add_node(EntityKind::ThreatActor, actor("threat-actor--1", "APT1"))
            .add_node(EntityKind::ThreatActor, actor("threat-actor--2", "APT2"))
            .add_node(EntityKind::Malware, malware("malware--1", "PoisonIvy"))
            .add_edge(RelationshipKind::ActorUsesMalware, "threat-actor--1", "malware--1", edge(85, "2023-01-01"));

        let orchestrator = Orchestrator::new(&graph, &db);
        let options = MigrationOptions {
            count_parity: CountParity::ThreatActors,
            ..MigrationOptions::default()
        };
        let stats = orchestrator.run(&options).await.unwrap();

        assert_eq!(count_entities(&db, EntityKind::ThreatActor).unwrap(), 2);
        assert_eq!(count_entities(&db, EntityKind::Malware).unwrap(), 1);
        let rows = list_relationships(&db, RelationshipKind::ActorUsesMalware).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].confidence, Some(85));
        assert_eq!(rows[0].first_seen.as_deref(), Some("2023-01-01T00:00:00Z"));
        assert_eq!(stats.counts()["threat_actors"], 2);
        assert_eq!(stats.counts()["actor_uses_malware"], 1);

        let report = orchestrator.validate(&options).await.unwrap();
        assert_eq!(report.check("threat_actors_match"), Some(true));
    }

    #[tokio::test]
    async fn test_unassessed_actor_with_minute_timestamps_migrates() {
        let (mut graph, db) = setup();
        let mut unassessed = actor("threat-actor--1", "APT1");
        unassessed.insert("sophistication_level".into(), json!("unknown"));
        unassessed.insert("first_seen".into(), json!("2023-01-01T00:00Z"));
        graph
            .add_node(EntityKind::ThreatActor, unassessed)
            .add_node(EntityKind::Malware, malware("malware--1", "PoisonIvy"))
            .add_edge(
                RelationshipKind::ActorUsesMalware,
                "threat-actor--1",
                "malware--1",
                edge(85, "2023-01-01T10:30Z"),
            );

        let options = MigrationOptions::default();
        let orchestrator = Orchestrator::new(&graph, &db);
        let stats = orchestrator.run(&options).await.unwrap();

        assert_eq!(stats.failed(), 0);
        assert_eq!(stats.skipped(), 0);
        let row = get_entity_row(&db, EntityKind::ThreatActor, "threat-actor--1").unwrap().unwrap();
        assert_eq!(row["sophistication_level"], json!("unknown"));
        assert_eq!(row["first_seen"], json!("2023-01-01T00:00:00Z"));
        let rows = list_relationships(&db, RelationshipKind::ActorUsesMalware).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].first_seen.as_deref(), Some("2023-01-01T10:30:00Z"));

        let report = orchestrator.validate(&options).await.unwrap();
        assert_eq!(report.check("threat_actors_match"), Some(true));
    }

    #[tokio::test]
    async fn test_edge_to_filtered_actor_skipped() {
        let (mut graph, db) = setup();
        graph
            .add_node(EntityKind::ThreatActor, actor("threat-actor--1", "APT1"))
            .add_node(EntityKind::Malware, malware("malware--1", "PoisonIvy"))
            .add_edge(RelationshipKind::ActorUsesMalware, "threat-actor--1", "malware--1", edge(85, "2023-01-01"))
            .add_edge(RelationshipKind::ActorUsesMalware, "threat-actor--9", "malware--1", edge(40, "2023-01-01"));

        let stats = Orchestrator::new(&graph, &db)
            .run(&MigrationOptions::default())
            .await
            .unwrap();

        let phase = stats.phase("actor_uses_malware").unwrap();
        assert_eq!((phase.migrated(), phase.skipped()), (1, 1));
        assert_eq!(stats.skipped(), 1);
        assert_eq!(count_relationships(&db, RelationshipKind::ActorUsesMalware).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_source_change_updates_in_place() {
        let (mut graph, db) = setup();
        graph.upsert_node(EntityKind::ThreatActor, actor("threat-actor--1", "APT1"));
        let first = Orchestrator::new(&graph, &db)
            .run(&MigrationOptions::default())
            .await
            .unwrap();
        let id = first.id_map(EntityKind::ThreatActor)["threat-actor--1"];

        let mut changed = actor("threat-actor--1", "APT1");
        changed.insert("sophistication_level".to_string(), json!("expert"));
        graph.upsert_node(EntityKind::ThreatActor, changed);
        let second = Orchestrator::new(&graph, &db)
            .run(&MigrationOptions::default())
            .await
            .unwrap();

        assert_eq!(count_entities(&db, EntityKind::ThreatActor).unwrap(), 1);
        assert_eq!(second.id_map(EntityKind::ThreatActor)["threat-actor--1"], id);
        let row = get_entity_row(&db, EntityKind::ThreatActor, "threat-actor--1").unwrap().unwrap();
        assert_eq!(row["sophistication_level"], json!("expert"));
    }

    fn entity_rows(db: &DbPool) -> Vec<serde_json::Map<String, serde_json::Value>> {
        let mut rows = Vec::new();
        for kind in EntityKind::ALL {
            for id in list_stix_ids(db, kind).unwrap() {
                rows.push(get_entity_row(db, kind, &id).unwrap().unwrap());
            }
        }
        rows
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let graph = full_graph();
        let db = threatsync_db::init_memory_pool().unwrap();
        let orchestrator = Orchestrator::new(&graph, &db);

        orchestrator.run(&MigrationOptions::default()).await.unwrap();
        let counts_after_first = table_counts(&db).unwrap();
        let rows_after_first = entity_rows(&db);
        let joins_after_first: Vec<_> = RelationshipKind::MIGRATED
            .into_iter()
            .map(|k| list_relationships(&db, k).unwrap())
            .collect();

        orchestrator.run(&MigrationOptions::default()).await.unwrap();
        let joins_after_second: Vec<_> = RelationshipKind::MIGRATED
            .into_iter()
            .map(|k| list_relationships(&db, k).unwrap())
            .collect();

        assert_eq!(table_counts(&db).unwrap(), counts_after_first);
        assert_eq!(entity_rows(&db), rows_after_first);
        assert_eq!(joins_after_second, joins_after_first);
    }

    #[tokio::test]
    async fn test_full_run_identifier_sets_and_integrity() {
        let graph = full_graph();
        let db = threatsync_db::init_memory_pool().unwrap();
        let orchestrator = Orchestrator::new(&graph, &db);
        let options = MigrationOptions::default();
        let stats = orchestrator.run(&options).await.unwrap();

        for kind in EntityKind::ALL {
            let mut expected: Vec<String> = graph
                .fetch_entities(kind)
                .await
                .unwrap()
                .iter()
                .filter_map(|p| p["stix_id"].as_str().map(str::to_string))
                .collect();
            expected.sort();
            assert_eq!(list_stix_ids(&db, kind).unwrap(), expected, "{kind}");
        }

        let order: Vec<&str> = stats.phases.iter().map(|p| p.phase.as_str()).collect();
        assert_eq!(
            order,
            vec![
                "threat_actors",
                "malware",
                "attack_patterns",
                "vulnerabilities",
                "indicators",
                "actor_uses_malware",
                "indicator_indicates_malware",
                "malware_exploits_vulnerability",
            ]
        );

        let report = orchestrator.validate(&options).await.unwrap();
        assert!(report.passed(), "{:?}", report);
        assert_eq!(report.checks.len(), 10);
    }

    #[tokio::test]
    async fn test_attack_pattern_edges_left_unmigrated() {
        let graph = full_graph();
        let db = threatsync_db::init_memory_pool().unwrap();
        let stats = Orchestrator::new(&graph, &db)
            .run(&MigrationOptions::default())
            .await
            .unwrap();

        assert!(stats.phase("actor_uses_attack_pattern").is_none());
        assert_eq!(count_relationships(&db, RelationshipKind::ActorUsesAttackPattern).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_single_scope_runs_one_phase() {
        let graph = full_graph();
        let db = threatsync_db::init_memory_pool().unwrap();
        let options = MigrationOptions {
            scope: MigrationScope::Malware,
            ..MigrationOptions::default()
        };
        let orchestrator = Orchestrator::new(&graph, &db);
        let stats = orchestrator.run(&options).await.unwrap();

        assert_eq!(stats.phases.len(), 1);
        assert_eq!(stats.counts()["malware"], 2);
        assert_eq!(count_entities(&db, EntityKind::ThreatActor).unwrap(), 0);

        let report = orchestrator.validate(&options).await.unwrap();
        assert_eq!(report.check("malware_match"), Some(true));
        assert_eq!(report.check("threat_actors_match"), None);

        let legacy = MigrationOptions {
            count_parity: CountParity::ThreatActors,
            ..options
        };
        let report = orchestrator.validate(&legacy).await.unwrap();
        assert_eq!(report.check("threat_actors_match"), Some(false));
    }

    #[tokio::test]
    async fn test_connectivity_loss_aborts_run() {
        let graph = full_graph();
        graph.set_offline(true);
        let db = threatsync_db::init_memory_pool().unwrap();

        let err = Orchestrator::new(&graph, &db)
            .run(&MigrationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, EtlError::Connectivity(_)));
        assert_eq!(count_entities(&db, EntityKind::ThreatActor).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_zero_batch_size_rejected_before_reading() {
        let graph = full_graph();
        let db = threatsync_db::init_memory_pool().unwrap();
        let options = MigrationOptions {
            phase: PhaseOptions {
                batch_size: 0,
                ..PhaseOptions::default()
            },
            ..MigrationOptions::default()
        };
        let err = Orchestrator::new(&graph, &db).run(&options).await.unwrap_err();
        assert!(matches!(err, EtlError::Config(_)));
    }

    #[test]
    fn test_scope_parsing() {
        assert_eq!("threat-actors".parse::<MigrationScope>().unwrap(), MigrationScope::ThreatActors);
        assert_eq!("attack_patterns".parse::<MigrationScope>().unwrap(), MigrationScope::AttackPatterns);
        assert_eq!("ALL".parse::<MigrationScope>().unwrap(), MigrationScope::All);
        assert!("campaigns".parse::<MigrationScope>().is_err());
        assert!(MigrationScope::Malware.relationship_kinds().is_empty());
    }
}
