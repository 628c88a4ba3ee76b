//! Request lifecycle stages

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

/// Where a processing request currently is
///
/// `Requested → Validating → Decoding → Transforming → Encoding → Persisting
/// → Completed`, or `Failed` from any step. A request whose caller stops
/// waiting before `Persisting` ends as `Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "stage", content = "error", rename_all = "snake_case")]
pub enum ProcessingStage {
    Requested,
    Validating,
    Decoding,
    Transforming,
    Encoding,
    Persisting,
    Completed,
    Cancelled,
    Failed(ErrorKind),
}

impl ProcessingStage {
    /// True for `Completed`, `Cancelled` and `Failed`
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProcessingStage::Completed | ProcessingStage::Cancelled | ProcessingStage::Failed(_)
        )
    }

    /// Abandoning the caller's future no longer stops the request
    pub fn is_committed(&self) -> bool {
        matches!(self, ProcessingStage::Persisting | ProcessingStage::Completed)
    }
}

impl fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessingStage::Requested => f.write_str("Requested"),
            ProcessingStage::Validating => f.write_str("Validating"),
            ProcessingStage::Decoding => f.write_str("Decoding"),
            ProcessingStage::Transforming => f.write_str("Transforming"),
            ProcessingStage::Encoding => f.write_str("Encoding"),
            ProcessingStage::Persisting => f.write_str("Persisting"),
            ProcessingStage::Completed => f.write_str("Completed"),
            ProcessingStage::Cancelled => f.write_str("Cancelled"),
            ProcessingStage::Failed(kind) => write!(f, "Failed({})", kind),
        }
    }
}
