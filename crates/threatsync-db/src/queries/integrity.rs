//! Consistency queries used by post-migration validation.

use threatsync_core::entity::EntityKind;
use threatsync_core::relationship::RelationshipKind;

use crate::pool::{DbPool, DbResult};

/// One row of `PRAGMA foreign_key_check`.
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKeyViolation {
    pub table: String,
    pub rowid: Option<i64>,
    pub parent: String,
}

/// Rows whose natural identifier or display field is null.
pub fn count_null_required(pool: &DbPool, kind: EntityKind) -> DbResult<i64> {
    let sql = format!(
        "SELECT COUNT(*) FROM {} WHERE stix_id IS NULL OR {} IS NULL",
        kind.table(),
        kind.required_column()
    );
    pool.with_conn(|conn| Ok(conn.query_row(&sql, [], |row| row.get(0))?))
}

/// Violations reported by SQLite's own foreign key checker.
pub fn foreign_key_violations(pool: &DbPool) -> DbResult<Vec<ForeignKeyViolation>> {
    pool.with_conn(|conn| {
        let mut stmt = conn.prepare("PRAGMA foreign_key_check")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ForeignKeyViolation {
                    table: row.get(0)?,
                    rowid: row.get(1)?,
                    parent: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Join rows whose source or target entity row does not exist.
///
/// Evaluated with plain joins so it holds even when the storage layer was
/// written with foreign keys disabled.
pub fn count_orphans(pool: &DbPool, kind: RelationshipKind) -> DbResult<i64> {
    let sql = format!(
        "SELECT COUNT(*) FROM {table} r
         LEFT JOIN {src_table} s ON r.{src} = s.id
         LEFT JOIN {dst_table} t ON r.{dst} = t.id
         WHERE s.id IS NULL OR t.id IS NULL",
        table = kind.table(),
        src_table = kind.source().table(),
        dst_table = kind.target().table(),
        src = kind.source_column(),
        dst = kind.target_column(),
    );
    pool.with_conn(|conn| Ok(conn.query_row(&sql, [], |row| row.get(0))?))
}

/// Join rows whose confidence lies outside 0..=100.
pub fn count_confidence_out_of_range(pool: &DbPool, kind: RelationshipKind) -> DbResult<i64> {
    let sql = format!(
        "SELECT COUNT(*) FROM {} WHERE confidence < 0 OR confidence > 100",
        kind.table()
    );
    pool.with_conn(|conn| Ok(conn.query_row(&sql, [], |row| row.get(0))?))
}
