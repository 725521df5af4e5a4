//! Database query implementations.

pub mod entities;
pub mod integrity;
pub mod relationships;
