//! Attendance reconciliation for the school attendance system: one
//! engine owns every write to the attendance table so day baselines,
//! period entries and whole-day leave variants stay consistent with
//! each other. The leave-approval, roll-call and daily-marking
//! workflows are thin adapters over it.

pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod service;
pub mod store;
pub mod utils;

pub use error::AttendanceError;
pub use service::attendance::{AttendanceService, DayStatus, RecordOptions, ReconcilePolicy};
pub use store::{AttendanceStore, MemoryStore, MySqlStore};
