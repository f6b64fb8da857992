//! QueryMesh: multi-source query orchestration with safety-validated,
//! read-only execution.
//!
//! The crate extracts schemas from heterogeneous connections, turns a
//! natural-language question into a set of data requests (AI-assisted or
//! heuristic), validates every piece of SQL against a read-only gate, runs
//! the requests in dependency order with chained variable substitution, and
//! aggregates the outcomes into one envelope.

pub mod ai;
pub mod config;
pub mod conversation;
pub mod error;
pub mod executor;
pub mod extractor;
pub mod generator;
pub mod intent;
pub mod orchestrator;
pub mod planner;
pub mod request;
pub mod safety;
pub mod schema;
pub mod source;
pub mod trainer;

pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use orchestrator::{Orchestrator, TurnOutcome};
pub use request::{DataRequest, ExecutionResult};
pub use safety::QueryValidator;
pub use schema::{Row, SourceSchema};
pub use source::{ConnectionRecord, DataSource, SourceRegistry, SourceType};
