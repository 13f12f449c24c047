//! Embedded property-graph backend.
//!
//! People and rules are node tables, relationship types are edge tables
//! created on first use. Backed by an embedded SQLite file.

pub mod schema;
pub mod store;

pub use schema::{sanitize_rel_type, REL_TABLE_PREFIX};
pub use store::GraphStore;
