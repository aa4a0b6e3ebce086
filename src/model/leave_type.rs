use serde::{Deserialize, Serialize};

/// School-configured leave category. `full_day_exclusive` marks the types
/// (typically sick and personal leave) whose full-day form supersedes every
/// other mark on the same date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct LeaveType {
    pub id: u64,
    pub name: String,
    pub full_day_exclusive: bool,
}
