//! Neo4j schema initialization (constraints and indexes).

use neo4rs::Query;
use tracing::info;

use crate::error::GraphResult;
use crate::GraphClient;

/// Cypher statements for schema initialization.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    // Natural identifier uniqueness
    "CREATE CONSTRAINT threat_actor_stix_id IF NOT EXISTS FOR (ta:ThreatActor) REQUIRE ta.stix_id IS UNIQUE",
    "CREATE CONSTRAINT malware_stix_id IF NOT EXISTS FOR (m:Malware) REQUIRE m.stix_id IS UNIQUE",
    "CREATE CONSTRAINT attack_pattern_stix_id IF NOT EXISTS FOR (ap:AttackPattern) REQUIRE ap.stix_id IS UNIQUE",
    "CREATE CONSTRAINT vulnerability_stix_id IF NOT EXISTS FOR (v:Vulnerability) REQUIRE v.stix_id IS UNIQUE",
    "CREATE CONSTRAINT indicator_stix_id IF NOT EXISTS FOR (i:Indicator) REQUIRE i.stix_id IS UNIQUE",
    // Lookup indexes
    "CREATE INDEX threat_actor_name_idx IF NOT EXISTS FOR (ta:ThreatActor) ON (ta.name)",
    "CREATE INDEX malware_name_idx IF NOT EXISTS FOR (m:Malware) ON (m.name)",
    "CREATE INDEX attack_pattern_mitre_idx IF NOT EXISTS FOR (ap:AttackPattern) ON (ap.mitre_id)",
    "CREATE INDEX vulnerability_cve_idx IF NOT EXISTS FOR (v:Vulnerability) ON (v.cve_id)",
    "CREATE INDEX indicator_pattern_idx IF NOT EXISTS FOR (i:Indicator) ON (i.pattern)",
];

/// Initialize Neo4j schema with constraints and indexes.
///
/// Safe to run multiple times - uses IF NOT EXISTS clauses.
pub async fn initialize_schema(client: &GraphClient) -> GraphResult<()> {
    info!("Initializing Neo4j schema...");

    for statement in SCHEMA_STATEMENTS {
        client.execute(Query::new(statement.to_string())).await?;
    }

    info!("Neo4j schema initialized ({} statements)", SCHEMA_STATEMENTS.len());
    Ok(())
}
