//! Threat intelligence entities (STIX domain objects).

pub mod model;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TransformError;
use crate::property::PropertyMap;
use model::{AttackPattern, Indicator, Malware, ThreatActor, Vulnerability};

/// The five entity types moved between stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    ThreatActor,
    Malware,
    AttackPattern,
    Vulnerability,
    Indicator,
}

impl EntityKind {
    /// Migration order: actors, malware, attack patterns, vulnerabilities, indicators.
    pub const ALL: [EntityKind; 5] = [
        EntityKind::ThreatActor,
        EntityKind::Malware,
        EntityKind::AttackPattern,
        EntityKind::Vulnerability,
        EntityKind::Indicator,
    ];

    /// Node label in the property graph.
    pub fn label(&self) -> &'static str {
        match self {
            Self::ThreatActor => "ThreatActor",
            Self::Malware => "Malware",
            Self::AttackPattern => "AttackPattern",
            Self::Vulnerability => "Vulnerability",
            Self::Indicator => "Indicator",
        }
    }

    /// Destination table name.
    pub fn table(&self) -> &'static str {
        match self {
            Self::ThreatActor => "threat_actor",
            Self::Malware => "malware",
            Self::AttackPattern => "attack_pattern",
            Self::Vulnerability => "vulnerability",
            Self::Indicator => "indicator",
        }
    }

    /// Key used in stats and validation reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ThreatActor => "threat_actors",
            Self::Malware => "malware",
            Self::AttackPattern => "attack_patterns",
            Self::Vulnerability => "vulnerabilities",
            Self::Indicator => "indicators",
        }
    }

    /// Display-name column that must never be null in the destination.
    pub fn required_column(&self) -> &'static str {
        match self {
            Self::Indicator => "pattern",
            _ => "name",
        }
    }

    /// Graph properties read for this kind. Temporal ones are listed by
    /// [`EntityKind::temporal_properties`].
    pub fn properties(&self) -> &'static [&'static str] {
        match self {
            Self::ThreatActor => &[
                "stix_id", "name", "description", "sophistication_level",
                "first_seen", "last_seen", "created_at", "updated_at",
            ],
            Self::Malware => &[
                "stix_id", "name", "description", "malware_type", "is_family",
                "first_seen", "last_seen", "created_at", "updated_at",
            ],
            Self::AttackPattern => &[
                "stix_id", "name", "description", "mitre_id", "capec_id", "tactics",
                "created_at", "updated_at",
            ],
            Self::Vulnerability => &[
                "stix_id", "name", "description", "cve_id", "cvss_score", "cvss_vector",
                "published_date", "created_at", "updated_at",
            ],
            Self::Indicator => &[
                "stix_id", "name", "description", "type", "pattern", "pattern_type",
                "valid_from", "valid_until", "confidence", "created_at", "updated_at",
            ],
        }
    }

    /// Properties holding graph-native temporal values.
    pub fn temporal_properties(&self) -> &'static [&'static str] {
        match self {
            Self::ThreatActor | Self::Malware => &["first_seen", "last_seen", "created_at", "updated_at"],
            Self::AttackPattern => &["created_at", "updated_at"],
            Self::Vulnerability => &["published_date", "created_at", "updated_at"],
            Self::Indicator => &["valid_from", "valid_until", "created_at", "updated_at"],
        }
    }

    /// Parse a stats key, table name or label.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s || k.table() == s || k.label() == s)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Knobs that change how strictly graph records are accepted.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransformOptions {
    /// Reject natural identifiers that are not `<type>--<uuid>`.
    pub strict_stix_ids: bool,
}

/// A validated entity ready to be written to the destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntityRecord {
    ThreatActor(ThreatActor),
    Malware(Malware),
    AttackPattern(AttackPattern),
    Vulnerability(Vulnerability),
    Indicator(Indicator),
}

impl EntityRecord {
    /// Transform a graph node's properties into a record of the given kind.
    pub fn from_properties(
        kind: EntityKind,
        props: &PropertyMap,
        opts: &TransformOptions,
    ) -> Result<Self, TransformError> {
        Ok(match kind {
            EntityKind::ThreatActor => Self::ThreatActor(ThreatActor::from_properties(props, opts)?),
            EntityKind::Malware => Self::Malware(Malware::from_properties(props, opts)?),
            EntityKind::AttackPattern => Self::AttackPattern(AttackPattern::from_properties(props, opts)?),
            EntityKind::Vulnerability => Self::Vulnerability(Vulnerability::from_properties(props, opts)?),
            EntityKind::Indicator => Self::Indicator(Indicator::from_properties(props, opts)?),
        })
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Self::ThreatActor(_) => EntityKind::ThreatActor,
            Self::Malware(_) => EntityKind::Malware,
            Self::AttackPattern(_) => EntityKind::AttackPattern,
            Self::Vulnerability(_) => EntityKind::Vulnerability,
            Self::Indicator(_) => EntityKind::Indicator,
        }
    }

    pub fn header(&self) -> &model::EntityHeader {
        match self {
            Self::ThreatActor(r) => &r.header,
            Self::Malware(r) => &r.header,
            Self::AttackPattern(r) => &r.header,
            Self::Vulnerability(r) => &r.header,
            Self::Indicator(r) => &r.header,
        }
    }

    /// The natural identifier.
    pub fn stix_id(&self) -> &str {
        &self.header().stix_id
    }
}

/// Best-effort natural identifier of a raw node, for logging rows that
/// fail to transform.
pub fn raw_stix_id(props: &PropertyMap) -> Option<String> {
    props
        .get("stix_id")
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::format_timestamp;
    use model::Sophistication;
    use serde_json::json;

    fn props(value: serde_json::Value) -> PropertyMap {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_threat_actor_transform() {
        let p = props(json!({
            "stix_id": "threat-actor--1",
            "name": "APT Example",
            "sophistication_level": "Advanced",
            "first_seen": "2023-01-01T00:00:00Z",
            "last_seen": "2023-06-01",
        }));
        let record = EntityRecord::from_properties(EntityKind::ThreatActor, &p, &TransformOptions::default()).unwrap();
        let EntityRecord::ThreatActor(actor) = record else {
            panic!("wrong variant");
        };
        assert_eq!(actor.name, "APT Example");
        assert_eq!(actor.sophistication_level, Some(Sophistication::Advanced));
        assert_eq!(format_timestamp(actor.last_seen.as_ref().unwrap()), "2023-06-01T00:00:00Z");
        assert!(actor.header.description.is_none());
    }

    #[test]
    fn test_unknown_sophistication_fails_row() {
        let p = props(json!({"stix_id": "threat-actor--1", "name": "X", "sophistication_level": "godlike"}));
        let err = EntityRecord::from_properties(EntityKind::ThreatActor, &p, &TransformOptions::default()).unwrap_err();
        assert_eq!(err, TransformError::UnknownSophistication("godlike".to_string()));
    }

    #[test]
    fn test_unknown_sophistication_level_is_kept() {
        let p = props(json!({"stix_id": "threat-actor--1", "name": "X", "sophistication_level": "unknown"}));
        let record = EntityRecord::from_properties(EntityKind::ThreatActor, &p, &TransformOptions::default()).unwrap();
        let EntityRecord::ThreatActor(actor) = record else {
            panic!("wrong variant");
        };
        assert_eq!(actor.sophistication_level, Some(Sophistication::Unknown));
        assert_eq!(Sophistication::Unknown.as_str(), "unknown");
    }

    #[test]
    fn test_inverted_window_fails_row() {
        let p = props(json!({
            "stix_id": "malware--1",
            "name": "Emotet",
            "first_seen": "2024-01-01",
            "last_seen": "2023-01-01",
        }));
        let err = EntityRecord::from_properties(EntityKind::Malware, &p, &TransformOptions::default()).unwrap_err();
        assert!(matches!(err, TransformError::InvertedWindow { .. }));
    }

    #[test]
    fn test_attack_pattern_tactics_column() {
        let p = props(json!({
            "stix_id": "attack-pattern--1",
            "name": "Phishing",
            "mitre_id": "T1566",
            "tactics": ["initial-access", "", "execution"],
        }));
        let EntityRecord::AttackPattern(ap) =
            EntityRecord::from_properties(EntityKind::AttackPattern, &p, &TransformOptions::default()).unwrap()
        else {
            panic!("wrong variant");
        };
        assert_eq!(ap.tactics_column().as_deref(), Some("initial-access,execution"));
    }

    #[test]
    fn test_vulnerability_score_range() {
        let p = props(json!({"stix_id": "vulnerability--1", "name": "CVE-2021-44228", "cvss_score": 11.0}));
        assert!(matches!(
            EntityRecord::from_properties(EntityKind::Vulnerability, &p, &TransformOptions::default()),
            Err(TransformError::OutOfRange { field: "cvss_score", .. })
        ));
    }

    #[test]
    fn test_indicator_requires_pattern_not_name() {
        let opts = TransformOptions::default();
        let ok = props(json!({"stix_id": "indicator--1", "pattern": "[ipv4-addr:value = '10.0.0.1']", "confidence": 70}));
        assert!(EntityRecord::from_properties(EntityKind::Indicator, &ok, &opts).is_ok());

        let missing = props(json!({"stix_id": "indicator--2", "name": "no pattern"}));
        assert_eq!(
            EntityRecord::from_properties(EntityKind::Indicator, &missing, &opts).unwrap_err(),
            TransformError::MissingField("pattern")
        );

        let bad_conf = props(json!({"stix_id": "indicator--3", "pattern": "[x]", "confidence": 150}));
        assert!(EntityRecord::from_properties(EntityKind::Indicator, &bad_conf, &opts).is_err());
    }

    #[test]
    fn test_strict_stix_ids() {
        let strict = TransformOptions { strict_stix_ids: true };
        let loose = props(json!({"stix_id": "actor-1", "name": "X"}));
        assert_eq!(
            EntityRecord::from_properties(EntityKind::ThreatActor, &loose, &strict).unwrap_err(),
            TransformError::MalformedStixId("actor-1".to_string())
        );

        let proper = props(json!({
            "stix_id": "threat-actor--8e2e2d2b-17d4-4cbf-938f-98ee46b3cd3f",
            "name": "X"
        }));
        assert!(EntityRecord::from_properties(EntityKind::ThreatActor, &proper, &strict).is_ok());
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!(EntityKind::parse("threat_actor"), Some(EntityKind::ThreatActor));
        assert_eq!(EntityKind::parse("vulnerabilities"), Some(EntityKind::Vulnerability));
        assert_eq!(EntityKind::parse("Indicator"), Some(EntityKind::Indicator));
        assert_eq!(EntityKind::parse("campaign"), None);
    }
}
