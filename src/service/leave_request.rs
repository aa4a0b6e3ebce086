use crate::error::{AttendanceError, Result};
use crate::model::{
    AttendanceEntry, AttendanceStatus, DayOption, EntryDetails, EntrySource, LeaveRequest,
    LeaveRequestStatus,
};
use crate::service::attendance::{AttendanceService, RecordOptions};
use crate::store::AttendanceStore;

/// Translate an approved leave request into attendance entries, one per
/// day of the request's range. Session-scoped requests produce a period
/// entry; whole-day requests produce a whole-day entry carrying the
/// request's day option (full day when none was picked). All writes go
/// through [`AttendanceService::record`], which owns the reconciliation
/// rules; this adapter adds none of its own.
pub async fn apply_approved<S: AttendanceStore>(
    service: &AttendanceService<S>,
    request: &LeaveRequest,
) -> Result<Vec<AttendanceEntry>> {
    if request.status != LeaveRequestStatus::Approved {
        return Err(AttendanceError::NotApproved(request.id));
    }

    let mut written = Vec::new();
    let mut date = request.start_date;
    while date <= request.end_date {
        let opts = RecordOptions {
            leave_type_id: Some(request.leave_type_id),
            note: approval_note(request),
            details: match request.period_id {
                Some(_) => None,
                None => Some(EntryDetails::DayPart {
                    option: request.day_option.unwrap_or(DayOption::FullDay),
                }),
            },
            source: Some(EntrySource::LeaveRequest),
            source_reference: Some(request.id),
            informed_parent: None,
        };
        let entry = service
            .record(
                request.student_id,
                date,
                request.period_id,
                AttendanceStatus::Excused,
                opts,
            )
            .await?;
        written.push(entry);

        match date.succ_opt() {
            Some(next) => date = next,
            None => break,
        }
    }

    tracing::info!(
        request = request.id,
        student_id = request.student_id,
        entries = written.len(),
        "approved leave applied to attendance"
    );
    Ok(written)
}

/// Undo a previously applied request (rejection after approval). Only the
/// entries this request wrote are removed.
pub async fn revoke_approved<S: AttendanceStore>(
    service: &AttendanceService<S>,
    request: &LeaveRequest,
) -> Result<u64> {
    service
        .revoke_source(EntrySource::LeaveRequest, request.id)
        .await
}

fn approval_note(request: &LeaveRequest) -> Option<String> {
    let mut note = request.reason.clone().unwrap_or_default();
    if let Some(approver) = request.approved_by {
        if !note.is_empty() {
            note.push_str("; ");
        }
        note.push_str(&format!("approved by {approver}"));
        if let Some(at) = request.approved_at {
            note.push_str(&format!(" at {}", at.format("%Y-%m-%d %H:%M")));
        }
    }
    if note.is_empty() { None } else { Some(note) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn request() -> LeaveRequest {
        LeaveRequest {
            id: 9,
            student_id: 1,
            leave_type_id: 2,
            start_date: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 3, 11).unwrap(),
            period_id: None,
            day_option: None,
            reason: Some("flu".to_string()),
            status: LeaveRequestStatus::Approved,
            approved_by: Some(7),
            approved_at: Utc.with_ymd_and_hms(2025, 3, 9, 18, 0, 0).single(),
        }
    }

    #[test]
    fn note_combines_reason_and_approval() {
        assert_eq!(
            approval_note(&request()).as_deref(),
            Some("flu; approved by 7 at 2025-03-09 18:00")
        );
    }

    #[test]
    fn note_absent_when_nothing_to_say() {
        let mut req = request();
        req.reason = None;
        req.approved_by = None;
        assert_eq!(approval_note(&req), None);
    }
}
