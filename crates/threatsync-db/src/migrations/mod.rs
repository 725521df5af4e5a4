//! Database migrations.

use crate::pool::{DbError, DbPool, DbResult};
use rusqlite_migration::{Migrations, M};

/// SQL schema definition.
const SCHEMA: &str = include_str!("schema.sql");

/// Tables created by the schema, entity tables first.
pub const TABLES: &[&str] = &[
    "threat_actor",
    "malware",
    "attack_pattern",
    "vulnerability",
    "indicator",
    "actor_uses_malware",
    "actor_uses_attack_pattern",
    "malware_exploits_vulnerability",
    "indicator_indicates_malware",
];

/// Run all database migrations.
pub fn run_migrations(pool: &DbPool) -> DbResult<()> {
    let migrations = Migrations::new(vec![M::up(SCHEMA)]);

    pool.with_conn_mut(|conn| {
        migrations
            .to_latest(conn)
            .map_err(|e| DbError::Migration(e.to_string()))
    })
}
