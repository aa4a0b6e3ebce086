use chrono::NaiveDate;

use crate::error::Result;
use crate::model::{AttendanceEntry, AttendanceStatus, EntryDetails, EntrySource};
use crate::service::attendance::{AttendanceService, RecordOptions};
use crate::store::AttendanceStore;

/// A completed roll call: one sweep over a group of students covering a
/// fixed set of class periods (morning exercise, evening study, ...).
#[derive(Debug, Clone)]
pub struct RollCall {
    pub id: u64,
    pub date: NaiveDate,
    /// The periods this roll-call type covers; becomes the entries'
    /// details payload and thereby their scope key.
    pub period_ids: Vec<u64>,
}

#[derive(Debug, Clone)]
pub struct RollCallResult {
    pub student_id: u64,
    pub status: AttendanceStatus,
    pub leave_type_id: Option<u64>,
    pub note: Option<String>,
}

/// Write one whole-day entry per student. Entries from different
/// roll-call types the same day keep distinct scope keys, so completing
/// the evening sweep never touches the morning one.
pub async fn complete<S: AttendanceStore>(
    service: &AttendanceService<S>,
    roll_call: &RollCall,
    results: &[RollCallResult],
) -> Result<Vec<AttendanceEntry>> {
    let mut written = Vec::with_capacity(results.len());
    for result in results {
        let entry = service
            .record(
                result.student_id,
                roll_call.date,
                None,
                result.status,
                RecordOptions {
                    leave_type_id: result.leave_type_id,
                    note: result.note.clone(),
                    details: Some(EntryDetails::Periods {
                        periods: roll_call.period_ids.clone(),
                    }),
                    source: Some(EntrySource::System),
                    source_reference: Some(roll_call.id),
                    informed_parent: None,
                },
            )
            .await?;
        written.push(entry);
    }

    tracing::info!(
        roll_call = roll_call.id,
        date = %roll_call.date,
        students = results.len(),
        "roll call recorded"
    );
    Ok(written)
}
