//! Entity domain models.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TransformError;
use crate::property::{
    check_confidence, check_window, opt_bool, opt_f64, opt_i64, opt_str, opt_timestamp, req_str,
    str_list, PropertyMap, Timestamp,
};

use super::TransformOptions;

/// Attributes every entity carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityHeader {
    pub stix_id: String,
    pub description: Option<String>,
    pub created_at: Option<Timestamp>,
    pub updated_at: Option<Timestamp>,
}

impl EntityHeader {
    fn from_properties(props: &PropertyMap, opts: &TransformOptions) -> Result<Self, TransformError> {
        let stix_id = req_str(props, "stix_id")?;
        if opts.strict_stix_ids && !is_stix_id(&stix_id) {
            return Err(TransformError::MalformedStixId(stix_id));
        }

        Ok(Self {
            stix_id,
            description: opt_str(props, "description")?,
            created_at: opt_timestamp(props, "created_at")?,
            updated_at: opt_timestamp(props, "updated_at")?,
        })
    }
}

/// Check the `<type>--<uuid>` STIX identifier shape.
pub fn is_stix_id(candidate: &str) -> bool {
    use std::sync::OnceLock;
    static PATTERN: OnceLock<Option<regex::Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            regex::Regex::new(r"^[a-z][a-z0-9-]*--[0-9a-f]{8}(-[0-9a-f]{4}){3}-[0-9a-f]{12}$").ok()
        })
        .as_ref()
        .is_some_and(|re| re.is_match(candidate))
}

/// Threat actor sophistication (STIX 2.1 vocabulary plus `novice` and the
/// `unknown` default collectors write when they have no assessment).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sophistication {
    None,
    Novice,
    Minimal,
    Intermediate,
    Advanced,
    Expert,
    Innovator,
    Strategic,
    Unknown,
}

impl Sophistication {
    /// Convert to string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Novice => "novice",
            Self::Minimal => "minimal",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
            Self::Expert => "expert",
            Self::Innovator => "innovator",
            Self::Strategic => "strategic",
            Self::Unknown => "unknown",
        }
    }
}

impl FromStr for Sophistication {
    type Err = TransformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(Self::None),
            "novice" => Ok(Self::Novice),
            "minimal" => Ok(Self::Minimal),
            "intermediate" => Ok(Self::Intermediate),
            "advanced" => Ok(Self::Advanced),
            "expert" => Ok(Self::Expert),
            "innovator" => Ok(Self::Innovator),
            "strategic" => Ok(Self::Strategic),
            "unknown" => Ok(Self::Unknown),
            _ => Err(TransformError::UnknownSophistication(s.to_string())),
        }
    }
}

impl fmt::Display for Sophistication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatActor {
    pub header: EntityHeader,
    pub name: String,
    pub sophistication_level: Option<Sophistication>,
    pub first_seen: Option<Timestamp>,
    pub last_seen: Option<Timestamp>,
}

impl ThreatActor {
    pub fn from_properties(props: &PropertyMap, opts: &TransformOptions) -> Result<Self, TransformError> {
        let header = EntityHeader::from_properties(props, opts)?;
        let name = req_str(props, "name")?;
        let sophistication_level = opt_str(props, "sophistication_level")?
            .map(|s| s.parse::<Sophistication>())
            .transpose()?;
        let first_seen = opt_timestamp(props, "first_seen")?;
        let last_seen = opt_timestamp(props, "last_seen")?;
        check_window(first_seen.as_ref(), last_seen.as_ref(), "first_seen", "last_seen")?;

        Ok(Self {
            header,
            name,
            sophistication_level,
            first_seen,
            last_seen,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Malware {
    pub header: EntityHeader,
    pub name: String,
    pub malware_type: Option<String>,
    pub is_family: bool,
    pub first_seen: Option<Timestamp>,
    pub last_seen: Option<Timestamp>,
}

impl Malware {
    pub fn from_properties(props: &PropertyMap, opts: &TransformOptions) -> Result<Self, TransformError> {
        let header = EntityHeader::from_properties(props, opts)?;
        let name = req_str(props, "name")?;
        let first_seen = opt_timestamp(props, "first_seen")?;
        let last_seen = opt_timestamp(props, "last_seen")?;
        check_window(first_seen.as_ref(), last_seen.as_ref(), "first_seen", "last_seen")?;

        Ok(Self {
            header,
            name,
            malware_type: opt_str(props, "malware_type")?,
            is_family: opt_bool(props, "is_family")?.unwrap_or(false),
            first_seen,
            last_seen,
        })
    }
}

/// An ATT&CK / CAPEC technique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttackPattern {
    pub header: EntityHeader,
    pub name: String,
    pub mitre_id: Option<String>,
    pub capec_id: Option<String>,
    pub tactics: Vec<String>,
}

impl AttackPattern {
    pub fn from_properties(props: &PropertyMap, opts: &TransformOptions) -> Result<Self, TransformError> {
        Ok(Self {
            header: EntityHeader::from_properties(props, opts)?,
            name: req_str(props, "name")?,
            mitre_id: opt_str(props, "mitre_id")?,
            capec_id: opt_str(props, "capec_id")?,
            tactics: str_list(props, "tactics")?
                .into_iter()
                .filter(|t| !t.is_empty())
                .collect(),
        })
    }

    /// Tactics serialized for the relational column.
    pub fn tactics_column(&self) -> Option<String> {
        if self.tactics.is_empty() {
            None
        } else {
            Some(self.tactics.join(","))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vulnerability {
    pub header: EntityHeader,
    pub name: String,
    pub cve_id: Option<String>,
    pub cvss_score: Option<f64>,
    pub cvss_vector: Option<String>,
    pub published_date: Option<Timestamp>,
}

impl Vulnerability {
    pub fn from_properties(props: &PropertyMap, opts: &TransformOptions) -> Result<Self, TransformError> {
        let cvss_score = opt_f64(props, "cvss_score")?;
        if let Some(score) = cvss_score {
            if !(0.0..=10.0).contains(&score) {
                return Err(TransformError::OutOfRange {
                    field: "cvss_score",
                    value: score.to_string(),
                });
            }
        }

        Ok(Self {
            header: EntityHeader::from_properties(props, opts)?,
            name: req_str(props, "name")?,
            cve_id: opt_str(props, "cve_id")?,
            cvss_score,
            cvss_vector: opt_str(props, "cvss_vector")?,
            published_date: opt_timestamp(props, "published_date")?,
        })
    }
}

/// An observable detection pattern. Name is optional; the pattern is not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Indicator {
    pub header: EntityHeader,
    pub name: Option<String>,
    pub indicator_type: Option<String>,
    pub pattern: String,
    pub pattern_type: Option<String>,
    pub valid_from: Option<Timestamp>,
    pub valid_until: Option<Timestamp>,
    pub confidence: Option<i64>,
}

impl Indicator {
    pub fn from_properties(props: &PropertyMap, opts: &TransformOptions) -> Result<Self, TransformError> {
        let header = EntityHeader::from_properties(props, opts)?;
        let pattern = req_str(props, "pattern")?;
        let valid_from = opt_timestamp(props, "valid_from")?;
        let valid_until = opt_timestamp(props, "valid_until")?;
        check_window(valid_from.as_ref(), valid_until.as_ref(), "valid_from", "valid_until")?;
        let confidence = opt_i64(props, "confidence")?;
        check_confidence(confidence)?;

        Ok(Self {
            header,
            name: opt_str(props, "name")?,
            indicator_type: opt_str(props, "type")?,
            pattern,
            pattern_type: opt_str(props, "pattern_type")?,
            valid_from,
            valid_until,
            confidence,
        })
    }
}
