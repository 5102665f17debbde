//! Sandboxed agent scripts
//!
//! Architecture: one binding per team
//! - `AgentSource` supplies the latest script version for an agent id
//! - `AgentBinding` owns a private rhai engine, the compiled script and its
//!   persistent `this` state
//! - the script sees a copied `GameState` and writes orders into `output`

pub mod api;
pub mod binding;
pub mod log;
pub mod source;

pub use api::{ActionCollector, MapView, ScriptChannel, UnitOrders};
pub use binding::{AgentBinding, DecisionFailure, PrepareFailure};
pub use log::{AgentLog, LogEntry, LogLevel};
pub use source::{AgentSource, AgentVersion, DirectoryAgentSource, InMemoryAgentSource, SourceError};
