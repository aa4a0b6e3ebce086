use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use super::attendance::DayOption;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LeaveRequestStatus {
    Pending,
    Approved,
    Rejected,
}

/// An approved (or pending) leave application. A request either names one
/// class session (`period_id`) or covers whole days, optionally narrowed to
/// a part of the day by `day_option`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaveRequest {
    pub id: u64,
    pub student_id: u64,
    pub leave_type_id: u64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub period_id: Option<u64>,
    pub day_option: Option<DayOption>,
    pub reason: Option<String>,
    pub status: LeaveRequestStatus,
    pub approved_by: Option<u64>,
    pub approved_at: Option<DateTime<Utc>>,
}
