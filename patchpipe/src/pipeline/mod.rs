//! Run orchestration.

mod orchestrator;

pub use orchestrator::Patcher;
