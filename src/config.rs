use chrono::NaiveTime;
use dotenvy::dotenv;
use std::env;

use crate::model::AttendanceStatus;

#[derive(Clone)]
pub struct Config {
    pub database_url: String,

    /// Status written onto auto-created whole-day baselines; schools can
    /// override the usual "present".
    pub baseline_status: AttendanceStatus,

    // Daily marking job
    pub auto_mark_status: AttendanceStatus,
    pub auto_mark_cutoff: NaiveTime,
    pub auto_mark_school_id: Option<u64>,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        Self {
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),

            baseline_status: parse_status("BASELINE_STATUS", "present"),

            auto_mark_status: parse_status("AUTO_MARK_STATUS", "present"),
            auto_mark_cutoff: NaiveTime::parse_from_str(
                &env::var("AUTO_MARK_CUTOFF").unwrap_or_else(|_| "16:00".to_string()),
                "%H:%M",
            )
            .expect("AUTO_MARK_CUTOFF must be HH:MM"),
            auto_mark_school_id: env::var("AUTO_MARK_SCHOOL_ID")
                .ok()
                .map(|v| v.parse().expect("AUTO_MARK_SCHOOL_ID must be an id")),
        }
    }
}

fn parse_status(var: &str, default: &str) -> AttendanceStatus {
    let raw = env::var(var).unwrap_or_else(|_| default.to_string());
    match AttendanceStatus::parse(&raw) {
        Ok(status) => status,
        Err(e) => panic!("{var}: {e}"),
    }
}
