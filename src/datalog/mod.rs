//! Remote Datalog backend.
//!
//! Talks to a CozoDB server over HTTP. People, facts and rules are stored
//! relations; rules are concatenated in front of ad-hoc queries.

pub mod client;
pub mod schema;
pub mod store;

pub use client::{CozoClient, ScriptRunner, AUTH_HEADER};
pub use store::DatalogStore;
