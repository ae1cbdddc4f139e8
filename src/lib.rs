pub mod agent;
pub mod audit;
pub mod config;
pub mod core;
pub mod error;
pub mod log;
pub mod orchestrator;
pub mod refine;
pub mod review;
pub mod storage;

pub use error::{Error, Result};
pub use orchestrator::{ExecutionSummary, TaskOrchestrator, ACCEPTANCE_THRESHOLD};
pub use refine::{IterationBudget, LoopState, RefinementResult};
