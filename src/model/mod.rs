pub mod attendance;
pub mod leave_request;
pub mod leave_type;
pub mod period;
pub mod student;

pub use attendance::{
    AttendanceEntry, AttendanceStatus, DayOption, EntryDetails, EntryPatch, EntrySource, NewEntry,
    ScopeKey,
};
pub use leave_request::{LeaveRequest, LeaveRequestStatus};
pub use leave_type::LeaveType;
pub use period::Period;
pub use student::Student;
