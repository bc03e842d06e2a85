//! Identifier and priority types shared by the queue, the orchestrator and
//! the execution-unit protocol.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque, globally unique task identity issued at submission time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Generate a fresh random identity.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Task priority. Variants are declared in increasing urgency, so the derived
/// `Ord` has `Low < Normal < High < Critical < Urgent`.
///
/// Which end of that order is dispatched first is decided by the queue's
/// [`PriorityOrder`](crate::infra::queue::PriorityOrder), not by this type.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Background work; the default.
    #[default]
    Low,
    /// Regular work.
    Normal,
    /// Should run ahead of regular work.
    High,
    /// Should run ahead of everything but urgent work.
    Critical,
    /// Most urgent.
    Urgent,
}

impl Priority {
    /// Numeric rank, `0` for [`Priority::Low`] up to `4` for [`Priority::Urgent`].
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Low => 0,
            Self::Normal => 1,
            Self::High => 2,
            Self::Critical => 3,
            Self::Urgent => 4,
        }
    }
}
