//! gsatprep-core: Answer keys, scoring and progress persistence.
//!
//! This crate defines the exam data model, the pure scoring engine, the
//! progress store with its stale-write guard, and the session state machine
//! that the CLI and any other front end build on.

pub mod error;
pub mod history;
pub mod model;
pub mod parser;
pub mod progress;
pub mod scoring;
pub mod session;
pub mod statistics;
pub mod store;
pub mod telemetry;
pub mod traits;
