use thiserror::Error;

use crate::store::StoreError;

/// Failures surfaced by the reconciliation engine. No variant is retried
/// internally; re-invoking after any of these is safe.
#[derive(Debug, Error)]
pub enum AttendanceError {
    #[error("student not found: {0}")]
    StudentNotFound(u64),

    #[error("invalid attendance status: {0:?}")]
    InvalidStatus(String),

    #[error("unknown leave type: {0}")]
    InvalidLeaveType(u64),

    #[error("leave request {0} is not approved")]
    NotApproved(u64),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, AttendanceError>;
