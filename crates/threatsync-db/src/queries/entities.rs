//! Entity table queries: upsert by natural identifier, lookups and counts.

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, OptionalExtension};
use threatsync_core::entity::{EntityKind, EntityRecord};
use threatsync_core::property::{format_timestamp, Timestamp};

use crate::pool::{DbPool, DbResult};

/// Database-side "now" in canonical timestamp form.
const NOW_SQL: &str = "strftime('%Y-%m-%dT%H:%M:%SZ', 'now')";

fn text(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |s| Value::Text(s.to_string()))
}

fn ts(value: Option<&Timestamp>) -> Value {
    value.map_or(Value::Null, |t| Value::Text(format_timestamp(t)))
}

/// Column/value pairs for a record, excluding `created_at` / `updated_at`.
fn entity_columns(record: &EntityRecord) -> Vec<(&'static str, Value)> {
    let header = record.header();
    let mut columns = vec![
        ("stix_id", Value::Text(header.stix_id.clone())),
        ("description", text(header.description.as_deref())),
    ];

    match record {
        EntityRecord::ThreatActor(a) => columns.extend([
            ("name", Value::Text(a.name.clone())),
            ("sophistication_level", text(a.sophistication_level.map(|s| s.as_str()))),
            ("first_seen", ts(a.first_seen.as_ref())),
            ("last_seen", ts(a.last_seen.as_ref())),
        ]),
        EntityRecord::Malware(m) => columns.extend([
            ("name", Value::Text(m.name.clone())),
            ("malware_type", text(m.malware_type.as_deref())),
            ("is_family", Value::Integer(i64::from(m.is_family))),
            ("first_seen", ts(m.first_seen.as_ref())),
            ("last_seen", ts(m.last_seen.as_ref())),
        ]),
        EntityRecord::AttackPattern(p) => columns.extend([
            ("name", Value::Text(p.name.clone())),
            ("mitre_id", text(p.mitre_id.as_deref())),
            ("capec_id", text(p.capec_id.as_deref())),
            ("tactics", text(p.tactics_column().as_deref())),
        ]),
        EntityRecord::Vulnerability(v) => columns.extend([
            ("name", Value::Text(v.name.clone())),
            ("cve_id", text(v.cve_id.as_deref())),
            ("cvss_score", v.cvss_score.map_or(Value::Null, Value::Real)),
            ("cvss_vector", text(v.cvss_vector.as_deref())),
            ("published_date", ts(v.published_date.as_ref())),
        ]),
        EntityRecord::Indicator(i) => columns.extend([
            ("name", text(i.name.as_deref())),
            ("type", text(i.indicator_type.as_deref())),
            ("pattern", Value::Text(i.pattern.clone())),
            ("pattern_type", text(i.pattern_type.as_deref())),
            ("valid_from", ts(i.valid_from.as_ref())),
            ("valid_until", ts(i.valid_until.as_ref())),
            ("confidence", i.confidence.map_or(Value::Null, Value::Integer)),
        ]),
    }

    columns
}

/// Build an `INSERT ... ON CONFLICT(stix_id) DO UPDATE ... RETURNING id`.
///
/// Updating in place keeps the surrogate key stable, so join rows written
/// by an earlier run keep pointing at the same entity.
fn upsert_sql(table: &str, columns: &[&str]) -> String {
    let n = columns.len();
    let placeholders: Vec<String> = (1..=n).map(|i| format!("?{i}")).collect();
    let created = n + 1;
    let updated = n + 2;
    let assignments: Vec<String> = columns
        .iter()
        .filter(|c| **c != "stix_id")
        .map(|c| format!("{c} = excluded.{c}"))
        .collect();

    format!(
        "INSERT INTO {table} ({cols}, created_at, updated_at)
         VALUES ({vals}, COALESCE(?{created}, {NOW_SQL}), COALESCE(?{updated}, {NOW_SQL}))
         ON CONFLICT(stix_id) DO UPDATE SET
             {assignments},
             created_at = COALESCE(?{created}, {table}.created_at),
             updated_at = COALESCE(?{updated}, {table}.updated_at)
         RETURNING id",
        cols = columns.join(", "),
        vals = placeholders.join(", "),
        assignments = assignments.join(",\n             "),
    )
}

/// Insert or update an entity by natural identifier. Returns the surrogate key.
pub fn upsert_entity(pool: &DbPool, record: &EntityRecord) -> DbResult<i64> {
    let header = record.header();
    let (names, mut values): (Vec<&str>, Vec<Value>) = entity_columns(record).into_iter().unzip();
    values.push(ts(header.created_at.as_ref()));
    values.push(ts(header.updated_at.as_ref()));

    let sql = upsert_sql(record.kind().table(), &names);
    pool.with_conn(|conn| {
        let id = conn.query_row(&sql, params_from_iter(values), |row| row.get(0))?;
        Ok(id)
    })
}

/// Resolve a natural identifier to its surrogate key.
pub fn lookup_id(pool: &DbPool, kind: EntityKind, stix_id: &str) -> DbResult<Option<i64>> {
    pool.with_conn(|conn| {
        let id = conn
            .query_row(
                &format!("SELECT id FROM {} WHERE stix_id = ?1", kind.table()),
                params![stix_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    })
}

/// Count rows in an entity table.
pub fn count_entities(pool: &DbPool, kind: EntityKind) -> DbResult<i64> {
    count_rows(pool, kind.table())
}

/// Count rows in any schema table.
pub fn count_rows(pool: &DbPool, table: &str) -> DbResult<i64> {
    pool.with_conn(|conn| {
        Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?)
    })
}

/// Row counts for every schema table, in schema order.
pub fn table_counts(pool: &DbPool) -> DbResult<Vec<(&'static str, i64)>> {
    crate::migrations::TABLES
        .iter()
        .map(|table| Ok((*table, count_rows(pool, table)?)))
        .collect()
}

/// Natural identifiers present in an entity table, sorted.
pub fn list_stix_ids(pool: &DbPool, kind: EntityKind) -> DbResult<Vec<String>> {
    pool.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT stix_id FROM {} WHERE stix_id IS NOT NULL ORDER BY stix_id",
            kind.table()
        ))?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    })
}

/// Fetch a full entity row as a JSON object keyed by column name.
pub fn get_entity_row(
    pool: &DbPool,
    kind: EntityKind,
    stix_id: &str,
) -> DbResult<Option<serde_json::Map<String, serde_json::Value>>> {
    pool.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!("SELECT * FROM {} WHERE stix_id = ?1", kind.table()))?;
        let names: Vec<String> = stmt.column_names().into_iter().map(str::to_string).collect();
        let row = stmt
            .query_row(params![stix_id], |row| {
                let mut map = serde_json::Map::new();
                for (idx, name) in names.iter().enumerate() {
                    let value = match row.get::<_, Value>(idx)? {
                        Value::Null => serde_json::Value::Null,
                        Value::Integer(i) => serde_json::Value::from(i),
                        Value::Real(f) => serde_json::Value::from(f),
                        Value::Text(s) => serde_json::Value::from(s),
                        Value::Blob(b) => serde_json::Value::from(b),
                    };
                    map.insert(name.clone(), value);
                }
                Ok(map)
            })
            .optional()?;
        Ok(row)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::run_migrations;
    use serde_json::json;
    use threatsync_core::entity::TransformOptions;

    fn setup() -> DbPool {
        let pool = DbPool::in_memory().unwrap();
        run_migrations(&pool).unwrap();
        pool
    }

    fn record(kind: EntityKind, value: serde_json::Value) -> EntityRecord {
        EntityRecord::from_properties(kind, value.as_object().unwrap(), &TransformOptions::default()).unwrap()
    }

    #[test]
    fn test_upsert_returns_stable_id() {
        let pool = setup();
        let first = record(EntityKind::ThreatActor, json!({
            "stix_id": "threat-actor--1", "name": "APT1", "sophistication_level": "advanced"
        }));
        let id = upsert_entity(&pool, &first).unwrap();

        let changed = record(EntityKind::ThreatActor, json!({
            "stix_id": "threat-actor--1", "name": "APT1", "sophistication_level": "expert"
        }));
        let id_again = upsert_entity(&pool, &changed).unwrap();

        assert_eq!(id, id_again);
        assert_eq!(count_entities(&pool, EntityKind::ThreatActor).unwrap(), 1);
        let row = get_entity_row(&pool, EntityKind::ThreatActor, "threat-actor--1").unwrap().unwrap();
        assert_eq!(row["sophistication_level"], json!("expert"));
    }

    #[test]
    fn test_timestamps_canonical() {
        let pool = setup();
        let m = record(EntityKind::Malware, json!({
            "stix_id": "malware--1", "name": "Emotet", "is_family": true,
            "first_seen": "2023-01-01T02:00:00+02:00",
            "created_at": "2022-12-01"
        }));
        upsert_entity(&pool, &m).unwrap();
        let row = get_entity_row(&pool, EntityKind::Malware, "malware--1").unwrap().unwrap();
        assert_eq!(row["first_seen"], json!("2023-01-01T00:00:00Z"));
        assert_eq!(row["created_at"], json!("2022-12-01T00:00:00Z"));
        assert_eq!(row["is_family"], json!(1));
        assert_eq!(row["last_seen"], serde_json::Value::Null);
    }

    #[test]
    fn test_missing_updated_at_keeps_stored_value() {
        let pool = setup();
        let v = record(EntityKind::Vulnerability, json!({
            "stix_id": "vulnerability--1", "name": "Log4Shell", "cve_id": "CVE-2021-44228", "cvss_score": 10.0
        }));
        upsert_entity(&pool, &v).unwrap();
        let before = get_entity_row(&pool, EntityKind::Vulnerability, "vulnerability--1").unwrap().unwrap();
        upsert_entity(&pool, &v).unwrap();
        let after = get_entity_row(&pool, EntityKind::Vulnerability, "vulnerability--1").unwrap().unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_duplicate_cve_is_row_error() {
        let pool = setup();
        let a = record(EntityKind::Vulnerability, json!({"stix_id": "vulnerability--a", "name": "A", "cve_id": "CVE-1"}));
        let b = record(EntityKind::Vulnerability, json!({"stix_id": "vulnerability--b", "name": "B", "cve_id": "CVE-1"}));
        upsert_entity(&pool, &a).unwrap();
        let err = upsert_entity(&pool, &b).unwrap_err();
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_lookup_and_list() {
        let pool = setup();
        for id in ["indicator--b", "indicator--a"] {
            let i = record(EntityKind::Indicator, json!({"stix_id": id, "pattern": "[file:name = 'x']"}));
            upsert_entity(&pool, &i).unwrap();
        }
        assert!(lookup_id(&pool, EntityKind::Indicator, "indicator--a").unwrap().is_some());
        assert!(lookup_id(&pool, EntityKind::Indicator, "indicator--zzz").unwrap().is_none());
        assert_eq!(
            list_stix_ids(&pool, EntityKind::Indicator).unwrap(),
            vec!["indicator--a".to_string(), "indicator--b".to_string()]
        );
        let counts = table_counts(&pool).unwrap();
        assert_eq!(counts.len(), crate::migrations::TABLES.len());
        assert!(counts.contains(&("indicator", 2)));
    }
}
