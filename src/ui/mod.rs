pub mod icons;
pub mod workflow_progress;

pub use workflow_progress::{UiMode, WorkflowUI};
