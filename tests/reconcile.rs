use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};

use sams::error::AttendanceError;
use sams::model::{
    AttendanceStatus, DayOption, EntryDetails, EntrySource, LeaveRequest, LeaveRequestStatus,
    LeaveType, Period, ScopeKey, Student,
};
use sams::service::attendance::{AttendanceService, DayStatus, RecordOptions};
use sams::service::{auto_mark, leave_request, roll_call};
use sams::store::MemoryStore;

fn service() -> AttendanceService<MemoryStore> {
    let store = MemoryStore::new();
    store.add_student(Student {
        id: 42,
        school_id: 1,
        class_id: 7,
        name: "Wei Chen".to_string(),
        active: true,
    });
    store.add_student(Student {
        id: 43,
        school_id: 1,
        class_id: 7,
        name: "Li Na".to_string(),
        active: true,
    });
    store.add_leave_type(LeaveType {
        id: 1,
        name: "sick".to_string(),
        full_day_exclusive: true,
    });
    store.add_leave_type(LeaveType {
        id: 2,
        name: "school errand".to_string(),
        full_day_exclusive: false,
    });
    for (id, order) in [(1u64, 1u32), (2, 2), (3, 3), (5, 5)] {
        store.add_period(Period {
            id,
            name: format!("period {id}"),
            sort_order: order,
        });
    }
    AttendanceService::new(store)
}

fn d(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, day).expect("valid date")
}

fn day_part(leave_type: Option<u64>, option: DayOption) -> RecordOptions {
    RecordOptions {
        leave_type_id: leave_type,
        details: Some(EntryDetails::DayPart { option }),
        ..Default::default()
    }
}

#[tokio::test]
async fn period_record_creates_whole_day_baseline() {
    let svc = service();
    for period in [1, 2, 3] {
        svc.record(
            42,
            d(10),
            Some(period),
            AttendanceStatus::Late,
            RecordOptions::default(),
        )
        .await
        .unwrap();

        let baselines: Vec<_> = svc
            .store()
            .all_entries()
            .into_iter()
            .filter(|e| e.is_whole_day())
            .collect();
        assert_eq!(baselines.len(), 1, "exactly one baseline after each write");
        assert_eq!(baselines[0].status, AttendanceStatus::Present);
        assert_eq!(baselines[0].source, EntrySource::Automatic);
        assert!(baselines[0].scope_key.is_base());
    }
}

#[tokio::test]
async fn record_is_idempotent() {
    let svc = service();
    let opts = || RecordOptions {
        note: Some("overslept".to_string()),
        ..Default::default()
    };
    let first = svc
        .record(42, d(10), Some(2), AttendanceStatus::Late, opts())
        .await
        .unwrap();
    let second = svc
        .record(42, d(10), Some(2), AttendanceStatus::Late, opts())
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(first.status, second.status);
    let entries = svc.store().all_entries();
    assert_eq!(entries.len(), 2, "baseline plus one period entry");
}

#[tokio::test]
async fn full_day_exclusive_leave_sweeps_the_date() {
    // Periods 1-3 marked, then the student turns out to be sick all day.
    let svc = service();
    for period in [1, 2, 3] {
        svc.record(
            42,
            d(10),
            Some(period),
            AttendanceStatus::Absent,
            RecordOptions::default(),
        )
        .await
        .unwrap();
    }

    let entry = svc
        .record(
            42,
            d(10),
            None,
            AttendanceStatus::Excused,
            day_part(Some(1), DayOption::FullDay),
        )
        .await
        .unwrap();

    let entries = svc.store().all_entries();
    assert_eq!(entries.len(), 1, "period entries and baseline are gone");
    assert_eq!(entries[0].id, entry.id);
    assert!(entries[0].is_whole_day());
    assert_eq!(entries[0].status, AttendanceStatus::Excused);
    assert_eq!(entries[0].leave_type_id, Some(1));
}

#[tokio::test]
async fn partial_day_option_never_cascades() {
    // Early-exercise leave must leave the period records alone even for a
    // full-day-exclusive leave type.
    let svc = service();
    for period in [1, 2, 3] {
        svc.record(
            42,
            d(10),
            Some(period),
            AttendanceStatus::Present,
            RecordOptions::default(),
        )
        .await
        .unwrap();
    }

    svc.record(
        42,
        d(10),
        None,
        AttendanceStatus::Leave,
        day_part(Some(1), DayOption::MorningExercise),
    )
    .await
    .unwrap();

    let entries = svc.store().all_entries();
    let periods: Vec<_> = entries.iter().filter(|e| !e.is_whole_day()).collect();
    assert_eq!(periods.len(), 3, "period entries untouched");
    let day_rows: Vec<_> = entries.iter().filter(|e| e.is_whole_day()).collect();
    assert_eq!(day_rows.len(), 2, "baseline plus the zcao variant");
    assert!(
        day_rows
            .iter()
            .any(|e| e.scope_key == ScopeKey::from_raw("zcao"))
    );
}

#[tokio::test]
async fn full_day_option_without_exclusive_type_keeps_periods() {
    let svc = service();
    svc.record(
        42,
        d(10),
        Some(1),
        AttendanceStatus::Present,
        RecordOptions::default(),
    )
    .await
    .unwrap();

    // Leave type 2 is not configured as full-day-exclusive.
    svc.record(
        42,
        d(10),
        None,
        AttendanceStatus::Excused,
        day_part(Some(2), DayOption::FullDay),
    )
    .await
    .unwrap();

    let entries = svc.store().all_entries();
    assert!(entries.iter().any(|e| e.period_id == Some(1)));
}

#[tokio::test]
async fn distinct_day_options_create_distinct_entries() {
    let svc = service();
    svc.record(
        42,
        d(10),
        None,
        AttendanceStatus::Leave,
        day_part(None, DayOption::MorningExercise),
    )
    .await
    .unwrap();
    svc.record(
        42,
        d(10),
        None,
        AttendanceStatus::Leave,
        day_part(None, DayOption::EveningExercise),
    )
    .await
    .unwrap();

    let entries = svc.store().all_entries();
    assert_eq!(entries.len(), 2);
    let keys: Vec<&str> = entries.iter().map(|e| e.scope_key.as_str()).collect();
    assert!(keys.contains(&"zcao") && keys.contains(&"wcao"));
}

#[tokio::test]
async fn repeating_a_scoped_day_record_updates_in_place() {
    let svc = service();
    let first = svc
        .record(
            42,
            d(10),
            None,
            AttendanceStatus::Leave,
            day_part(None, DayOption::MorningExercise),
        )
        .await
        .unwrap();
    let second = svc
        .record(
            42,
            d(10),
            None,
            AttendanceStatus::Excused,
            day_part(None, DayOption::MorningExercise),
        )
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.status, AttendanceStatus::Excused);
    assert_eq!(svc.store().all_entries().len(), 1);
}

#[tokio::test]
async fn period_status_falls_back_to_whole_day() {
    let svc = service();
    svc.record(
        42,
        d(10),
        None,
        AttendanceStatus::Excused,
        RecordOptions::default(),
    )
    .await
    .unwrap();

    let status = svc.period_status(42, d(10), Some(5)).await.unwrap();
    assert_eq!(status, Some(AttendanceStatus::Excused));

    let missing = svc.period_status(42, d(11), Some(5)).await.unwrap();
    assert_eq!(missing, None);
}

#[tokio::test]
async fn period_status_prefers_the_period_entry() {
    let svc = service();
    svc.record(
        42,
        d(10),
        Some(5),
        AttendanceStatus::Late,
        RecordOptions::default(),
    )
    .await
    .unwrap();

    let status = svc.period_status(42, d(10), Some(5)).await.unwrap();
    assert_eq!(status, Some(AttendanceStatus::Late));
    // The same call without a period reads the baseline.
    let day = svc.period_status(42, d(10), None).await.unwrap();
    assert_eq!(day, Some(AttendanceStatus::Present));
}

#[tokio::test]
async fn day_status_shapes() {
    let svc = service();
    assert_eq!(svc.day_status(42, d(10)).await.unwrap(), DayStatus::NoRecord);

    svc.record(
        42,
        d(10),
        None,
        AttendanceStatus::Excused,
        RecordOptions::default(),
    )
    .await
    .unwrap();
    match svc.day_status(42, d(10)).await.unwrap() {
        DayStatus::FullDay(entry) => assert_eq!(entry.status, AttendanceStatus::Excused),
        other => panic!("expected FullDay, got {other:?}"),
    }

    // Periods recorded out of timetable order come back sorted, after the
    // whole-day rows.
    svc.record(
        42,
        d(10),
        Some(3),
        AttendanceStatus::Late,
        RecordOptions::default(),
    )
    .await
    .unwrap();
    svc.record(
        42,
        d(10),
        Some(1),
        AttendanceStatus::Absent,
        RecordOptions::default(),
    )
    .await
    .unwrap();

    match svc.day_status(42, d(10)).await.unwrap() {
        DayStatus::Periods {
            default_status,
            entries,
        } => {
            assert_eq!(default_status, Some(AttendanceStatus::Excused));
            assert!(entries[0].is_whole_day());
            let periods: Vec<_> = entries
                .iter()
                .filter_map(|e| e.period_id)
                .collect();
            assert_eq!(periods, vec![1, 3]);
        }
        other => panic!("expected Periods, got {other:?}"),
    }
}

#[tokio::test]
async fn statistics_ignore_whole_day_rows_and_round() {
    let svc = service();
    svc.record(
        42,
        d(10),
        Some(1),
        AttendanceStatus::Present,
        RecordOptions::default(),
    )
    .await
    .unwrap();
    svc.record(
        42,
        d(10),
        Some(2),
        AttendanceStatus::Late,
        RecordOptions::default(),
    )
    .await
    .unwrap();
    svc.record(
        42,
        d(11),
        Some(1),
        AttendanceStatus::Absent,
        RecordOptions::default(),
    )
    .await
    .unwrap();

    let stats = svc.statistics(42, d(1), d(31)).await.unwrap();
    assert_eq!(stats.total_periods, 3);
    assert_eq!(stats.present, 1);
    assert_eq!(stats.late, 1);
    assert_eq!(stats.absent, 1);
    assert_eq!(stats.attendance_rate, 0.67);
}

#[tokio::test]
async fn statistics_over_empty_range_report_zero_rate() {
    let svc = service();
    let stats = svc.statistics(42, d(1), d(31)).await.unwrap();
    assert_eq!(stats.total_periods, 0);
    assert_eq!(stats.attendance_rate, 0.0);
}

#[tokio::test]
async fn delete_record_removes_only_its_slot() {
    let svc = service();
    svc.record(
        42,
        d(10),
        Some(1),
        AttendanceStatus::Late,
        RecordOptions::default(),
    )
    .await
    .unwrap();

    assert!(svc.delete_record(42, d(10), Some(1)).await.unwrap());
    assert!(!svc.delete_record(42, d(10), Some(1)).await.unwrap());

    // Deliberately no cascade: the auto-created baseline stays.
    let entries = svc.store().all_entries();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].is_whole_day());
}

#[tokio::test]
async fn unknown_references_are_rejected_before_any_write() {
    let svc = service();
    let err = svc
        .record(
            999,
            d(10),
            Some(1),
            AttendanceStatus::Present,
            RecordOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AttendanceError::StudentNotFound(999)));

    let err = svc
        .record(
            42,
            d(10),
            None,
            AttendanceStatus::Excused,
            RecordOptions {
                leave_type_id: Some(77),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AttendanceError::InvalidLeaveType(77)));
    assert!(svc.store().all_entries().is_empty());
}

// ---- leave-approval workflow ----

fn sick_request() -> LeaveRequest {
    LeaveRequest {
        id: 500,
        student_id: 42,
        leave_type_id: 1,
        start_date: d(10),
        end_date: d(11),
        period_id: None,
        day_option: None,
        reason: Some("flu".to_string()),
        status: LeaveRequestStatus::Approved,
        approved_by: Some(7),
        approved_at: Utc.with_ymd_and_hms(2025, 3, 9, 18, 0, 0).single(),
    }
}

#[tokio::test]
async fn approved_full_day_request_covers_each_day() {
    let svc = service();
    let written = leave_request::apply_approved(&svc, &sick_request())
        .await
        .unwrap();

    assert_eq!(written.len(), 2);
    for entry in &written {
        assert!(entry.is_whole_day());
        assert_eq!(entry.status, AttendanceStatus::Excused);
        assert_eq!(entry.source, EntrySource::LeaveRequest);
        assert_eq!(entry.source_reference, Some(500));
    }
}

#[tokio::test]
async fn approved_request_supersedes_period_marks() {
    let svc = service();
    svc.record(
        42,
        d(10),
        Some(1),
        AttendanceStatus::Absent,
        RecordOptions::default(),
    )
    .await
    .unwrap();

    leave_request::apply_approved(&svc, &sick_request())
        .await
        .unwrap();

    let on_tenth: Vec<_> = svc
        .store()
        .all_entries()
        .into_iter()
        .filter(|e| e.date == d(10))
        .collect();
    assert_eq!(on_tenth.len(), 1, "sick full-day swept the period mark");
    assert_eq!(on_tenth[0].status, AttendanceStatus::Excused);
}

#[tokio::test]
async fn session_scoped_request_writes_one_period_entry() {
    let svc = service();
    let mut request = sick_request();
    request.id = 501;
    request.leave_type_id = 2;
    request.end_date = request.start_date;
    request.period_id = Some(3);

    let written = leave_request::apply_approved(&svc, &request).await.unwrap();
    assert_eq!(written.len(), 1);
    assert_eq!(written[0].period_id, Some(3));
    // Plus the auto-created baseline.
    assert_eq!(svc.store().all_entries().len(), 2);
}

#[tokio::test]
async fn pending_request_is_refused() {
    let svc = service();
    let mut request = sick_request();
    request.status = LeaveRequestStatus::Pending;
    let err = leave_request::apply_approved(&svc, &request)
        .await
        .unwrap_err();
    assert!(matches!(err, AttendanceError::NotApproved(500)));
}

#[tokio::test]
async fn revoking_a_request_leaves_other_entries_alone() {
    let svc = service();
    leave_request::apply_approved(&svc, &sick_request())
        .await
        .unwrap();
    svc.record(
        42,
        d(12),
        Some(1),
        AttendanceStatus::Present,
        RecordOptions::default(),
    )
    .await
    .unwrap();

    let removed = leave_request::revoke_approved(&svc, &sick_request())
        .await
        .unwrap();
    assert_eq!(removed, 2);

    let remaining = svc.store().all_entries();
    assert!(remaining.iter().all(|e| e.source_reference != Some(500)));
    assert!(remaining.iter().any(|e| e.date == d(12)));
}

// ---- roll-call workflow ----

#[tokio::test]
async fn roll_call_types_keep_separate_entries() {
    let svc = service();
    let morning = roll_call::RollCall {
        id: 31,
        date: d(10),
        period_ids: vec![1, 2],
    };
    let evening = roll_call::RollCall {
        id: 32,
        date: d(10),
        period_ids: vec![3, 5],
    };
    let result = |status| {
        vec![roll_call::RollCallResult {
            student_id: 42,
            status,
            leave_type_id: None,
            note: None,
        }]
    };

    roll_call::complete(&svc, &morning, &result(AttendanceStatus::Present))
        .await
        .unwrap();
    roll_call::complete(&svc, &evening, &result(AttendanceStatus::Absent))
        .await
        .unwrap();
    // Completing the same sweep again corrects in place.
    roll_call::complete(&svc, &morning, &result(AttendanceStatus::Late))
        .await
        .unwrap();

    let entries = svc.store().all_entries();
    assert_eq!(entries.len(), 2);
    let morning_entry = entries
        .iter()
        .find(|e| e.scope_key == ScopeKey::from_raw("p1-2"))
        .expect("morning sweep entry");
    assert_eq!(morning_entry.status, AttendanceStatus::Late);
    assert_eq!(morning_entry.source, EntrySource::System);
}

// ---- daily marking workflow ----

fn cutoff_config() -> auto_mark::AutoMarkConfig {
    auto_mark::AutoMarkConfig {
        status: AttendanceStatus::Present,
        cutoff: NaiveTime::from_hms_opt(16, 0, 0).expect("valid time"),
        school_id: None,
    }
}

#[tokio::test]
async fn auto_mark_waits_for_the_cutoff() {
    let svc = service();
    let before = NaiveTime::from_hms_opt(9, 0, 0).expect("valid time");
    let outcome = auto_mark::run(&svc, d(10), before, &cutoff_config())
        .await
        .unwrap();
    assert_eq!(outcome.marked, 0);
    assert!(svc.store().all_entries().is_empty());
}

#[tokio::test]
async fn auto_mark_fills_only_blank_days() {
    let svc = service();
    svc.record(
        42,
        d(10),
        Some(1),
        AttendanceStatus::Late,
        RecordOptions::default(),
    )
    .await
    .unwrap();

    let after = NaiveTime::from_hms_opt(16, 30, 0).expect("valid time");
    let outcome = auto_mark::run(&svc, d(10), after, &cutoff_config())
        .await
        .unwrap();

    assert_eq!(outcome.marked, 1, "only the blank student");
    assert_eq!(outcome.failed, 0);

    let entries = svc.store().all_entries();
    let marked: Vec<_> = entries.iter().filter(|e| e.student_id == 43).collect();
    assert_eq!(marked.len(), 1);
    assert_eq!(marked[0].status, AttendanceStatus::Present);
    assert_eq!(marked[0].source, EntrySource::Automatic);
    // Student 42's day is untouched beyond what was already there.
    assert_eq!(entries.iter().filter(|e| e.student_id == 42).count(), 2);
}
