//! Task lifecycle: the unified status machine, input kinds, and the
//! update-threshold policy applied during reconciliation.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Minimum progress delta (percentage points) that justifies a write when
/// the status itself has not changed.
pub const PROGRESS_PERSIST_THRESHOLD: i16 = 10;

/// Lower bound of the progress range.
pub const PROGRESS_MIN: i16 = 0;

/// Upper bound of the progress range.
pub const PROGRESS_MAX: i16 = 100;

// ---------------------------------------------------------------------------
// TaskStatus
// ---------------------------------------------------------------------------

/// Unified task status shared by every provider.
///
/// Stored as its upper-case name (`WAIT`, `RUN`, `DONE`, `FAIL`) in the
/// `ai3d_tasks.status` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStatus {
    Wait,
    Run,
    Done,
    Fail,
}

impl TaskStatus {
    /// Statuses the poller still has to reconcile.
    pub const PENDING: [TaskStatus; 2] = [TaskStatus::Wait, TaskStatus::Run];

    /// Statuses after which no further reconciliation happens.
    pub const TERMINAL: [TaskStatus; 2] = [TaskStatus::Done, TaskStatus::Fail];

    /// Database / wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Wait => "WAIT",
            Self::Run => "RUN",
            Self::Done => "DONE",
            Self::Fail => "FAIL",
        }
    }

    /// Parse from the database / wire name.
    pub fn from_name(name: &str) -> Result<Self, CoreError> {
        match name {
            "WAIT" => Ok(Self::Wait),
            "RUN" => Ok(Self::Run),
            "DONE" => Ok(Self::Done),
            "FAIL" => Ok(Self::Fail),
            other => Err(CoreError::Validation(format!(
                "Unknown task status '{other}'. Must be one of: WAIT, RUN, DONE, FAIL"
            ))),
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Fail)
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    ///
    /// Staying put is always allowed for non-terminal states. WAIT may jump
    /// straight to a terminal state because a poll can miss the RUN phase.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        match (self, next) {
            (Self::Done | Self::Fail, _) => false,
            (Self::Wait, _) => true,
            (Self::Run, Self::Wait) => false,
            (Self::Run, _) => true,
        }
    }
}

impl TryFrom<String> for TaskStatus {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_name(&value)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// InputType
// ---------------------------------------------------------------------------

/// What the generation job is driven by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    Text,
    Image,
}

impl InputType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, CoreError> {
        match name {
            "text" => Ok(Self::Text),
            "image" => Ok(Self::Image),
            other => Err(CoreError::Validation(format!(
                "Unknown input type '{other}'. Must be one of: text, image"
            ))),
        }
    }
}

impl TryFrom<String> for InputType {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_name(&value)
    }
}

impl fmt::Display for InputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Progress and persistence policy
// ---------------------------------------------------------------------------

/// Clamp a provider-reported progress value into `0..=100`.
pub fn clamp_progress(value: i64) -> i16 {
    value.clamp(PROGRESS_MIN as i64, PROGRESS_MAX as i64) as i16
}

/// Decide whether an observed remote state is worth writing.
///
/// A write happens when the status changed, when progress moved by at
/// least [`PROGRESS_PERSIST_THRESHOLD`] points in either direction, or when
/// the observed status is terminal. Everything else is discarded.
pub fn should_persist(
    stored_status: TaskStatus,
    stored_progress: i16,
    observed_status: TaskStatus,
    observed_progress: i16,
) -> bool {
    if observed_status.is_terminal() || observed_status != stored_status {
        return true;
    }
    (observed_progress - stored_progress).abs() >= PROGRESS_PERSIST_THRESHOLD
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
