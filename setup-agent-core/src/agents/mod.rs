//! The model-driven agents of the workflow

pub mod auditor;
pub mod executor;
pub mod planner;
pub mod prompts;
pub mod verifier;

pub use auditor::{Auditor, AuditorVerdict};
pub use executor::{StepExecutor, StepExplanation};
pub use planner::{Planner, ReadmeAnalysis};
pub use verifier::{ShutdownDecision, SuccessVerifier};
