//! Work item identifier type

use serde::{Deserialize, Serialize};
use std::fmt;

/// One unit of dispatchable work, usually a file path relative to the
/// project root.
///
/// The dispatch core never looks inside the identifier; it is moved between
/// tiers and handed to the runner verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkItem(pub String);

impl WorkItem {
    /// Create a new work item
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for WorkItem {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for WorkItem {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
