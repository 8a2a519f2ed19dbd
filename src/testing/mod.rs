//! Testing utilities and fixtures
//!
//! Record fixtures and a scripted [`RecordSource`](crate::source::RecordSource)
//! used by unit tests, integration tests and benchmarks.

pub mod fixtures;
pub mod mocks;

pub use fixtures::{unique_users, user, user_page_json, users};
pub use mocks::{ScriptedSource, ScriptedSourceBuilder};
