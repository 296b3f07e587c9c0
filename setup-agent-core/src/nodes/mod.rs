//! Workflow nodes that talk to the user more than to the model

pub mod continue_process;
pub mod guidelines;
pub mod tasks;

pub use continue_process::ContinueProcess;
pub use guidelines::{select_guidelines, GuidelineFileCheck, GuidelinesRetriever, PickedEntries};
pub use tasks::{select_task, DeveloperTasks, TaskIdentifier};
