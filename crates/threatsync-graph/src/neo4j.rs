//! Neo4j implementation of [`GraphSource`].
//!
//! Properties are projected explicitly per kind. Graph-native temporal values
//! go through `toString()` so they reach the transform layer as ISO-8601
//! strings regardless of whether they were stored as `datetime`, `date` or
//! plain strings.

use async_trait::async_trait;
use neo4rs::{Query, Row};
use serde_json::{json, Value};
use threatsync_core::entity::EntityKind;
use threatsync_core::property::PropertyMap;
use threatsync_core::relationship::RelationshipKind;
use tracing::debug;

use crate::error::GraphResult;
use crate::source::GraphSource;
use crate::GraphClient;

/// How a projected column is read back from a bolt row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnType {
    Text,
    Temporal,
    Boolean,
    Integer,
    Float,
    TextList,
}

fn column_type(kind: Option<EntityKind>, property: &str) -> ColumnType {
    let temporal = match kind {
        Some(k) => k.temporal_properties().contains(&property),
        None => matches!(property, "first_seen" | "last_seen"),
    };
    if temporal {
        return ColumnType::Temporal;
    }
    match property {
        "is_family" => ColumnType::Boolean,
        "confidence" => ColumnType::Integer,
        "cvss_score" => ColumnType::Float,
        "tactics" => ColumnType::TextList,
        _ => ColumnType::Text,
    }
}

/// Placeholder for a value the driver could not decode as the expected type.
///
/// It is never a valid property, so the row fails its transform instead of
/// being silently altered.
fn unreadable(property: &str) -> Value {
    json!({ "unreadable": property })
}

fn projection(alias: &str, property: &str, ty: ColumnType) -> String {
    match ty {
        ColumnType::Temporal => format!("toString({alias}.{property}) AS `{property}`"),
        _ => format!("{alias}.{property} AS `{property}`"),
    }
}

/// `MATCH (n:Label) RETURN n.a AS a, ...` for an entity kind.
pub fn entity_query(kind: EntityKind) -> String {
    let columns: Vec<String> = kind
        .properties()
        .iter()
        .map(|p| projection("n", p, column_type(Some(kind), p)))
        .collect();
    format!("MATCH (n:{}) RETURN {}", kind.label(), columns.join(", "))
}

/// Edge query returning endpoint natural identifiers and edge attributes.
pub fn relationship_query(kind: RelationshipKind) -> String {
    format!(
        "MATCH (s:{src})-[r:{rel}]->(t:{dst}) \
         RETURN s.stix_id AS `source_id`, t.stix_id AS `target_id`, \
         toString(r.first_seen) AS `first_seen`, toString(r.last_seen) AS `last_seen`, \
         r.confidence AS `confidence`",
        src = kind.source().label(),
        rel = kind.rel_type(),
        dst = kind.target().label(),
    )
}

fn read_column(row: &Row, property: &str, ty: ColumnType) -> Value {
    let value = match ty {
        ColumnType::Text | ColumnType::Temporal => row.get::<Option<String>>(property).map(|v| json!(v)),
        ColumnType::Boolean => row.get::<Option<bool>>(property).map(|v| json!(v)),
        // Collectors sometimes store integers as floats (85.0); the transform
        // layer decides whether the float is integral.
        ColumnType::Integer => row
            .get::<Option<i64>>(property)
            .map(|v| json!(v))
            .or_else(|_| row.get::<Option<f64>>(property).map(|v| json!(v))),
        ColumnType::Float => row.get::<Option<f64>>(property).map(|v| json!(v)),
        ColumnType::TextList => row.get::<Option<Vec<String>>>(property).map(|v| json!(v)),
    };
    value.unwrap_or_else(|e| {
        debug!(property, error = ?e, "Unreadable graph property");
        unreadable(property)
    })
}

fn row_to_properties<'a, I>(row: &Row, columns: I) -> PropertyMap
where
    I: IntoIterator<Item = (&'a str, ColumnType)>,
{
    columns
        .into_iter()
        .map(|(name, ty)| (name.to_string(), read_column(row, name, ty)))
        .collect()
}

/// Graph source backed by a live Neo4j server.
pub struct Neo4jSource {
    client: GraphClient,
}

impl Neo4jSource {
    pub fn new(client: GraphClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &GraphClient {
        &self.client
    }
}

#[async_trait]
impl GraphSource for Neo4jSource {
    async fn fetch_entities(&self, kind: EntityKind) -> GraphResult<Vec<PropertyMap>> {
        let rows = self.client.query(Query::new(entity_query(kind))).await?;
        debug!(label = kind.label(), rows = rows.len(), "Fetched graph nodes");

        Ok(rows
            .iter()
            .map(|row| {
                row_to_properties(
                    row,
                    kind.properties().iter().map(|p| (*p, column_type(Some(kind), p))),
                )
            })
            .collect())
    }

    async fn fetch_relationships(&self, kind: RelationshipKind) -> GraphResult<Vec<PropertyMap>> {
        let rows = self.client.query(Query::new(relationship_query(kind))).await?;
        debug!(rel = kind.table(), rows = rows.len(), "Fetched graph edges");

        const EDGE_COLUMNS: [&str; 5] = ["source_id", "target_id", "first_seen", "last_seen", "confidence"];
        Ok(rows
            .iter()
            .map(|row| row_to_properties(row, EDGE_COLUMNS.iter().map(|c| (*c, column_type(None, c)))))
            .collect())
    }

    async fn count_entities(&self, kind: EntityKind) -> GraphResult<u64> {
        let query = Query::new(format!("MATCH (n:{}) RETURN count(n) AS count", kind.label()));
        let count: i64 = self.client.query_scalar(query, "count").await?.unwrap_or(0);
        Ok(count.max(0) as u64)
    }

    fn describe(&self) -> String {
        format!("neo4j at {}", self.client.uri())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neo4rs::{BoltFloat, BoltInteger, BoltList, BoltString, BoltType};
    use threatsync_core::error::TransformError;
    use threatsync_core::property::opt_i64;

    #[test]
    fn test_entity_query_projects_temporals_as_strings() {
        let q = entity_query(EntityKind::ThreatActor);
        assert!(q.starts_with("MATCH (n:ThreatActor) RETURN "));
        assert!(q.contains("toString(n.first_seen) AS `first_seen`"));
        assert!(q.contains("n.sophistication_level AS `sophistication_level`"));
        assert!(!q.contains("toString(n.name)"));
    }

    #[test]
    fn test_indicator_type_column_is_quoted() {
        let q = entity_query(EntityKind::Indicator);
        assert!(q.contains("n.type AS `type`"));
        assert!(q.contains("n.confidence AS `confidence`"));
    }

    #[test]
    fn test_relationship_query_shape() {
        let q = relationship_query(RelationshipKind::MalwareExploitsVulnerability);
        assert!(q.starts_with("MATCH (s:Malware)-[r:EXPLOITS]->(t:Vulnerability)"));
        assert!(q.contains("s.stix_id AS `source_id`"));
        assert!(q.contains("toString(r.last_seen) AS `last_seen`"));
    }

    fn single_column(name: &str, value: BoltType) -> Row {
        Row::new(
            BoltList::from(vec![BoltType::String(BoltString::new(name))]),
            BoltList::from(vec![value]),
        )
    }

    #[test]
    fn test_integer_column_accepts_integral_float() {
        let row = single_column("confidence", BoltType::Float(BoltFloat::new(85.0)));
        let props = row_to_properties(&row, [("confidence", ColumnType::Integer)]);
        assert_eq!(opt_i64(&props, "confidence"), Ok(Some(85)));

        let row = single_column("confidence", BoltType::Integer(BoltInteger::new(70)));
        let props = row_to_properties(&row, [("confidence", ColumnType::Integer)]);
        assert_eq!(props["confidence"], json!(70));
    }

    #[test]
    fn test_integer_column_rejects_fractional_and_text() {
        let row = single_column("confidence", BoltType::Float(BoltFloat::new(85.5)));
        let props = row_to_properties(&row, [("confidence", ColumnType::Integer)]);
        assert!(matches!(opt_i64(&props, "confidence"), Err(TransformError::WrongType { .. })));

        let row = single_column("confidence", BoltType::String(BoltString::new("high")));
        let props = row_to_properties(&row, [("confidence", ColumnType::Integer)]);
        assert_eq!(props["confidence"], unreadable("confidence"));
    }

    #[test]
    fn test_column_types() {
        assert_eq!(column_type(Some(EntityKind::Vulnerability), "published_date"), ColumnType::Temporal);
        assert_eq!(column_type(Some(EntityKind::Vulnerability), "cvss_score"), ColumnType::Float);
        assert_eq!(column_type(Some(EntityKind::Malware), "is_family"), ColumnType::Boolean);
        assert_eq!(column_type(Some(EntityKind::AttackPattern), "tactics"), ColumnType::TextList);
        assert_eq!(column_type(None, "confidence"), ColumnType::Integer);
        assert_eq!(column_type(None, "first_seen"), ColumnType::Temporal);
    }
}
