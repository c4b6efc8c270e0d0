//! Multi-stage dispatch orchestration
pub mod objectives;
pub mod orchestrator;
pub mod report;

pub use orchestrator::{DispatchError, Orchestrator};
pub use report::{InstanceSnapshot, IterationRecord, RunReport, StageName, StageRecord};
