//! threatsync core library
//!
//! Domain models for threat intelligence entities and relationships, graph
//! property maps, row transforms and configuration.

pub mod config;
pub mod entity;
pub mod error;
pub mod property;
pub mod relationship;

pub use config::{Config, CountParity, GraphConfig};
pub use entity::{EntityKind, EntityRecord, TransformOptions};
pub use error::{CoreError, CoreResult, TransformError};
pub use property::{PropertyMap, Timestamp};
pub use relationship::{Relationship, RelationshipKind};
