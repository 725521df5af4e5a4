//! Join table queries keyed by (source surrogate key, target surrogate key).

use rusqlite::params;
use threatsync_core::property::format_timestamp;
use threatsync_core::relationship::{Relationship, RelationshipKind};

use crate::pool::{DbPool, DbResult};

/// Join row from database.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipRow {
    pub source_key: i64,
    pub target_key: i64,
    pub first_seen: Option<String>,
    pub last_seen: Option<String>,
    pub confidence: Option<i64>,
}

/// Insert or update a join row for an edge whose endpoints are already resolved.
pub fn upsert_relationship(
    pool: &DbPool,
    rel: &Relationship,
    source_key: i64,
    target_key: i64,
) -> DbResult<()> {
    let kind = rel.kind;
    let sql = format!(
        "INSERT INTO {table} ({src}, {dst}, first_seen, last_seen, confidence)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT({src}, {dst}) DO UPDATE SET
             first_seen = excluded.first_seen,
             last_seen = excluded.last_seen,
             confidence = excluded.confidence",
        table = kind.table(),
        src = kind.source_column(),
        dst = kind.target_column(),
    );

    pool.with_conn(|conn| {
        conn.execute(
            &sql,
            params![
                source_key,
                target_key,
                rel.first_seen.as_ref().map(format_timestamp),
                rel.last_seen.as_ref().map(format_timestamp),
                rel.confidence,
            ],
        )?;
        Ok(())
    })
}

/// List join rows for a relationship kind.
pub fn list_relationships(pool: &DbPool, kind: RelationshipKind) -> DbResult<Vec<RelationshipRow>> {
    pool.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {src}, {dst}, first_seen, last_seen, confidence
             FROM {table} ORDER BY {src}, {dst}",
            table = kind.table(),
            src = kind.source_column(),
            dst = kind.target_column(),
        ))?;

        let rows = stmt
            .query_map([], |row| {
                Ok(RelationshipRow {
                    source_key: row.get(0)?,
                    target_key: row.get(1)?,
                    first_seen: row.get(2)?,
                    last_seen: row.get(3)?,
                    confidence: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Count join rows for a relationship kind.
pub fn count_relationships(pool: &DbPool, kind: RelationshipKind) -> DbResult<i64> {
    super::entities::count_rows(pool, kind.table())
}
