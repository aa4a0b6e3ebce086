use chrono::{NaiveDate, NaiveTime};
use uuid::Uuid;

use crate::error::Result;
use crate::model::{AttendanceStatus, EntrySource};
use crate::service::attendance::{AttendanceService, RecordOptions};
use crate::store::AttendanceStore;

const AUTO_MARK_NOTE: &str = "marked by daily job";

#[derive(Debug, Clone, Copy)]
pub struct AutoMarkConfig {
    /// Status given to students with no entry by the cutoff; schools run
    /// this with `present` or, around holidays, `leave`.
    pub status: AttendanceStatus,
    pub cutoff: NaiveTime,
    pub school_id: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct AutoMarkOutcome {
    pub run_id: Uuid,
    pub date: NaiveDate,
    pub marked: u64,
    pub failed: u64,
}

/// Daily batch: once past the cutoff, every active student without any
/// entry for the date gets a whole-day entry with the configured status.
/// One student failing does not stop the sweep.
pub async fn run<S: AttendanceStore>(
    service: &AttendanceService<S>,
    date: NaiveDate,
    now: NaiveTime,
    config: &AutoMarkConfig,
) -> Result<AutoMarkOutcome> {
    let run_id = Uuid::new_v4();

    if now < config.cutoff {
        tracing::info!(%run_id, %date, cutoff = %config.cutoff, "before cutoff, nothing to mark");
        return Ok(AutoMarkOutcome {
            run_id,
            date,
            marked: 0,
            failed: 0,
        });
    }

    let students = service
        .store()
        .students_without_entry(date, config.school_id)
        .await?;

    let mut marked = 0u64;
    let mut failed = 0u64;
    for student in &students {
        let outcome = service
            .record(
                student.id,
                date,
                None,
                config.status,
                RecordOptions {
                    note: Some(AUTO_MARK_NOTE.to_string()),
                    source: Some(EntrySource::Automatic),
                    ..Default::default()
                },
            )
            .await;
        match outcome {
            Ok(_) => marked += 1,
            Err(e) => {
                failed += 1;
                tracing::error!(%run_id, student_id = student.id, error = %e, "auto-mark failed");
            }
        }
    }

    tracing::info!(%run_id, %date, marked, failed, "daily marking complete");
    Ok(AutoMarkOutcome {
        run_id,
        date,
        marked,
        failed,
    })
}
