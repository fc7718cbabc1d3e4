pub mod orchestrator;
pub mod stages;
pub mod types;

pub use orchestrator::Pipeline;
