pub mod attendance;
pub mod auto_mark;
pub mod leave_request;
pub mod roll_call;

pub use attendance::{
    AttendanceService, AttendanceStatistics, DayStatus, RecordOptions, ReconcilePolicy,
};
