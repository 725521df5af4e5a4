//! threatsync relational sink.
//!
//! Owns the SQLite destination schema and exposes upsert, lookup and
//! integrity queries keyed by STIX natural identifiers.

pub mod migrations;
pub mod pool;
pub mod queries;

pub use pool::{DbError, DbPool, DbResult};

/// Open a database file and bring its schema up to date.
pub fn init_pool(path: &std::path::Path) -> DbResult<DbPool> {
    let pool = DbPool::open(path)?;
    migrations::run_migrations(&pool)?;
    Ok(pool)
}

/// Fresh in-memory database with the schema applied.
pub fn init_memory_pool() -> DbResult<DbPool> {
    let pool = DbPool::in_memory()?;
    migrations::run_migrations(&pool)?;
    Ok(pool)
}
