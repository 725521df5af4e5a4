//! Typed, directed relationships between entities.
//!
//! - (:ThreatActor)-[:USES]->(:Malware)
//! - (:ThreatActor)-[:USES]->(:AttackPattern)
//! - (:Malware)-[:EXPLOITS]->(:Vulnerability)
//! - (:Indicator)-[:INDICATES]->(:Malware)

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::entity::EntityKind;
use crate::error::TransformError;
use crate::property::{check_confidence, check_window, opt_i64, opt_timestamp, req_str, PropertyMap, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    ActorUsesMalware,
    ActorUsesAttackPattern,
    MalwareExploitsVulnerability,
    IndicatorIndicatesMalware,
}

impl RelationshipKind {
    pub const ALL: [RelationshipKind; 4] = [
        RelationshipKind::ActorUsesMalware,
        RelationshipKind::ActorUsesAttackPattern,
        RelationshipKind::MalwareExploitsVulnerability,
        RelationshipKind::IndicatorIndicatesMalware,
    ];

    /// Kinds populated by a full migration, in order: uses, indicates, exploits.
    ///
    /// `ActorUsesAttackPattern` has a destination table but is not migrated.
    pub const MIGRATED: [RelationshipKind; 3] = [
        RelationshipKind::ActorUsesMalware,
        RelationshipKind::IndicatorIndicatesMalware,
        RelationshipKind::MalwareExploitsVulnerability,
    ];

    /// Edge type in the property graph.
    pub fn rel_type(&self) -> &'static str {
        match self {
            Self::ActorUsesMalware | Self::ActorUsesAttackPattern => "USES",
            Self::MalwareExploitsVulnerability => "EXPLOITS",
            Self::IndicatorIndicatesMalware => "INDICATES",
        }
    }

    pub fn source(&self) -> EntityKind {
        match self {
            Self::ActorUsesMalware | Self::ActorUsesAttackPattern => EntityKind::ThreatActor,
            Self::MalwareExploitsVulnerability => EntityKind::Malware,
            Self::IndicatorIndicatesMalware => EntityKind::Indicator,
        }
    }

    pub fn target(&self) -> EntityKind {
        match self {
            Self::ActorUsesMalware | Self::IndicatorIndicatesMalware => EntityKind::Malware,
            Self::ActorUsesAttackPattern => EntityKind::AttackPattern,
            Self::MalwareExploitsVulnerability => EntityKind::Vulnerability,
        }
    }

    /// Join table name; also the stats key.
    pub fn table(&self) -> &'static str {
        match self {
            Self::ActorUsesMalware => "actor_uses_malware",
            Self::ActorUsesAttackPattern => "actor_uses_attack_pattern",
            Self::MalwareExploitsVulnerability => "malware_exploits_vulnerability",
            Self::IndicatorIndicatesMalware => "indicator_indicates_malware",
        }
    }

    /// Foreign-key column pointing at the source entity.
    pub fn source_column(&self) -> &'static str {
        match self {
            Self::ActorUsesMalware | Self::ActorUsesAttackPattern => "actor_id",
            Self::MalwareExploitsVulnerability => "malware_id",
            Self::IndicatorIndicatesMalware => "indicator_id",
        }
    }

    /// Foreign-key column pointing at the target entity.
    pub fn target_column(&self) -> &'static str {
        match self {
            Self::ActorUsesMalware | Self::IndicatorIndicatesMalware => "malware_id",
            Self::ActorUsesAttackPattern => "attack_pattern_id",
            Self::MalwareExploitsVulnerability => "vulnerability_id",
        }
    }

    pub fn is_migrated(&self) -> bool {
        Self::MIGRATED.contains(self)
    }
}

impl fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

/// An edge with both endpoints named by natural identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub kind: RelationshipKind,
    pub source_id: String,
    pub target_id: String,
    pub first_seen: Option<Timestamp>,
    pub last_seen: Option<Timestamp>,
    pub confidence: Option<i64>,
}

impl Relationship {
    /// Transform edge properties (`source_id`, `target_id`, `first_seen`,
    /// `last_seen`, `confidence`) into a relationship record.
    pub fn from_properties(kind: RelationshipKind, props: &PropertyMap) -> Result<Self, TransformError> {
        let first_seen = opt_timestamp(props, "first_seen")?;
        let last_seen = opt_timestamp(props, "last_seen")?;
        check_window(first_seen.as_ref(), last_seen.as_ref(), "first_seen", "last_seen")?;
        let confidence = opt_i64(props, "confidence")?;
        check_confidence(confidence)?;

        Ok(Self {
            kind,
            source_id: req_str(props, "source_id")?,
            target_id: req_str(props, "target_id")?,
            first_seen,
            last_seen,
            confidence,
        })
    }

    /// `source -> target` label for log lines.
    pub fn describe(&self) -> String {
        format!("{} -[{}]-> {}", self.source_id, self.kind.rel_type(), self.target_id)
    }
}
