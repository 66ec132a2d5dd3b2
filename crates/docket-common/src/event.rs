//! Notification record published for every phase and section status change.

use crate::status::PhaseStatus;
use crate::{CaseId, PhaseId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry of the notification stream consumed by UIs and logs.
///
/// Delivery is at-least-once. Ordering across phases is not guaranteed, but
/// `progress` never decreases within one phase's stream while it is active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowEvent {
    pub case_id: CaseId,
    pub phase_id: PhaseId,
    /// Set when the event reports a section of the outline pipeline
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_id: Option<String>,
    pub status: PhaseStatus,
    pub progress: u8,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl WorkflowEvent {
    pub fn new(
        case_id: &str,
        phase_id: &str,
        status: PhaseStatus,
        progress: u8,
        message: impl Into<String>,
    ) -> Self {
        Self {
            case_id: case_id.to_string(),
            phase_id: phase_id.to_string(),
            section_id: None,
            status,
            progress,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_section(mut self, section_id: &str) -> Self {
        self.section_id = Some(section_id.to_string());
        self
    }
}
