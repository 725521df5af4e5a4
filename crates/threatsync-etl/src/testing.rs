//! Shared fixtures for engine tests.

use serde_json::{json, Value};
use threatsync_core::property::PropertyMap;
use threatsync_db::DbPool;
use threatsync_graph::MemoryGraph;

pub fn props(value: Value) -> PropertyMap {
    match value {
        Value::Object(map) => map,
        other => panic!("fixture is not an object: {other}"),
    }
}

pub fn setup() -> (MemoryGraph, DbPool) {
    (MemoryGraph::new(), threatsync_db::init_memory_pool().unwrap())
}

pub fn actor(stix_id: &str, name: &str) -> PropertyMap {
    props(json!({
        "stix_id": stix_id,
        "name": name,
        "sophistication_level": "advanced",
        "first_seen": "2020-01-01T00:00:00Z",
        "created_at": "2023-01-01T00:00:00Z",
        "updated_at": "2023-01-01T00:00:00Z",
    }))
}

pub fn malware(stix_id: &str, name: &str) -> PropertyMap {
    props(json!({
        "stix_id": stix_id,
        "name": name,
        "malware_type": "backdoor",
        "is_family": true,
    }))
}

pub fn attack_pattern(stix_id: &str, mitre_id: &str) -> PropertyMap {
    props(json!({
        "stix_id": stix_id,
        "name": format!("Technique {mitre_id}"),
        "mitre_id": mitre_id,
        "tactics": ["initial-access", "execution"],
    }))
}

pub fn vulnerability(stix_id: &str, cve_id: &str) -> PropertyMap {
    props(json!({
        "stix_id": stix_id,
        "name": cve_id,
        "cve_id": cve_id,
        "cvss_score": 9.8,
        "published_date": "2021-12-10",
    }))
}

pub fn indicator(stix_id: &str, pattern: &str) -> PropertyMap {
    props(json!({
        "stix_id": stix_id,
        "type": "file-hash",
        "pattern": pattern,
        "pattern_type": "stix",
        "valid_from": "2023-01-01T00:00:00Z",
        "confidence": 70,
    }))
}

pub fn edge(confidence: i64, first_seen: &str) -> PropertyMap {
    props(json!({ "confidence": confidence, "first_seen": first_seen }))
}
