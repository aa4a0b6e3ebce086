use chrono::NaiveDate;
use serde::Serialize;

use crate::error::{AttendanceError, Result};
use crate::model::{
    AttendanceEntry, AttendanceStatus, EntryDetails, EntryPatch, EntrySource, NewEntry, ScopeKey,
};
use crate::store::AttendanceStore;

const BASELINE_NOTE: &str = "auto-created baseline";

/// School-level knobs for the reconciliation rules.
#[derive(Debug, Clone, Copy)]
pub struct ReconcilePolicy {
    /// Status written onto auto-created whole-day baselines.
    pub baseline_status: AttendanceStatus,
}

impl Default for ReconcilePolicy {
    fn default() -> Self {
        Self {
            baseline_status: AttendanceStatus::Present,
        }
    }
}

/// Optional fields accepted by [`AttendanceService::record`].
#[derive(Debug, Clone, Default)]
pub struct RecordOptions {
    pub leave_type_id: Option<u64>,
    pub note: Option<String>,
    pub details: Option<EntryDetails>,
    /// Defaults to [`EntrySource::Manual`].
    pub source: Option<EntrySource>,
    pub source_reference: Option<u64>,
    pub informed_parent: Option<bool>,
}

/// What a day looks like for one student.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DayStatus {
    NoRecord,
    /// A single whole-day entry and nothing else.
    FullDay(AttendanceEntry),
    /// Mixed day: whole-day entries first, then period entries in
    /// timetable order. `default_status` is the baseline's status and
    /// applies to any period without its own entry.
    Periods {
        default_status: Option<AttendanceStatus>,
        entries: Vec<AttendanceEntry>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AttendanceStatistics {
    pub total_periods: u64,
    pub present: u64,
    pub absent: u64,
    pub late: u64,
    pub excused: u64,
    pub early_leave: u64,
    pub leave: u64,
    /// (present + late) / total_periods, rounded to two decimals; 0 when
    /// there are no period entries at all.
    pub attendance_rate: f64,
}

impl AttendanceStatistics {
    fn tally(&mut self, status: AttendanceStatus) {
        match status {
            AttendanceStatus::Present => self.present += 1,
            AttendanceStatus::Absent => self.absent += 1,
            AttendanceStatus::Late => self.late += 1,
            AttendanceStatus::Excused => self.excused += 1,
            AttendanceStatus::EarlyLeave => self.early_leave += 1,
            AttendanceStatus::Leave => self.leave += 1,
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// The reconciliation engine. Sole writer of attendance entries; the
/// leave-approval, roll-call and daily-marking workflows all go through
/// it so the day invariants hold:
///
/// 1. a period entry implies a whole-day baseline for the same date;
/// 2. one entry per (student, date, period) slot, whole-day sub-variants
///    told apart by scope key;
/// 3. only a full-day exclusive leave may sweep away other entries for
///    the date, and partial-day marks never do.
pub struct AttendanceService<S> {
    store: S,
    policy: ReconcilePolicy,
}

impl<S: AttendanceStore> AttendanceService<S> {
    pub fn new(store: S) -> Self {
        Self::with_policy(store, ReconcilePolicy::default())
    }

    pub fn with_policy(store: S, policy: ReconcilePolicy) -> Self {
        Self { store, policy }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Record attendance for a student on a date, reconciling with
    /// whatever already exists there.
    ///
    /// Steps, in order, each one its own atomic store operation so a
    /// crash in between never leaves a period entry without a baseline:
    ///
    /// 1. when writing a period entry, make sure the whole-day baseline
    ///    exists (created with the policy's status, source automatic);
    /// 2. a whole-day, full-day option with a full-day-exclusive leave
    ///    type supersedes the date: period entries and other whole-day
    ///    variants are deleted;
    /// 3. the entry itself is written: whole-day entries carrying a
    ///    scoped details payload are matched by (leave type, scope key)
    ///    and updated in place, everything else is a plain slot upsert.
    ///
    /// Re-invoking with identical arguments converges to the same final
    /// state, also after a partial failure.
    pub async fn record(
        &self,
        student_id: u64,
        date: NaiveDate,
        period_id: Option<u64>,
        status: AttendanceStatus,
        opts: RecordOptions,
    ) -> Result<AttendanceEntry> {
        let student = self
            .store
            .student(student_id)
            .await?
            .ok_or(AttendanceError::StudentNotFound(student_id))?;

        let leave_type = match opts.leave_type_id {
            Some(id) => Some(
                self.store
                    .leave_type(id)
                    .await?
                    .ok_or(AttendanceError::InvalidLeaveType(id))?,
            ),
            None => None,
        };

        if period_id.is_some() {
            let baseline = NewEntry {
                student_id,
                school_id: student.school_id,
                class_id: student.class_id,
                date,
                period_id: None,
                status: self.policy.baseline_status,
                leave_type_id: None,
                details: None,
                scope_key: ScopeKey::base(),
                note: Some(BASELINE_NOTE.to_string()),
                source: EntrySource::Automatic,
                source_reference: None,
                informed_parent: false,
            };
            if self.store.insert_day_baseline(&baseline).await? {
                tracing::debug!(student_id, %date, "created whole-day baseline");
            }
        }

        let scope = ScopeKey::of(opts.details.as_ref());

        if period_id.is_none() {
            let full_day = matches!(
                &opts.details,
                Some(EntryDetails::DayPart { option }) if option.is_full_day()
            );
            if let Some(leave_type) = leave_type.as_ref().filter(|lt| lt.full_day_exclusive) {
                if full_day {
                    let periods_removed =
                        self.store.delete_period_entries(student_id, date).await?;
                    let variants_removed = self
                        .store
                        .delete_day_entries_except(student_id, date, &scope, leave_type.id)
                        .await?;
                    if periods_removed + variants_removed > 0 {
                        tracing::info!(
                            student_id,
                            %date,
                            leave_type = leave_type.id,
                            periods_removed,
                            variants_removed,
                            "full-day leave superseded existing marks"
                        );
                    }
                }
            }
        }

        let new_entry = NewEntry {
            student_id,
            school_id: student.school_id,
            class_id: student.class_id,
            date,
            period_id,
            status,
            leave_type_id: opts.leave_type_id,
            details: opts.details.clone(),
            scope_key: scope.clone(),
            note: opts.note.clone(),
            source: opts.source.unwrap_or(EntrySource::Manual),
            source_reference: opts.source_reference,
            informed_parent: opts.informed_parent.unwrap_or(false),
        };

        let entry = if period_id.is_none() && !scope.is_base() {
            // Scoped whole-day variant: never overwrite a sibling with a
            // different scope or leave type.
            match self
                .store
                .day_entry_scoped(student_id, date, opts.leave_type_id, &scope)
                .await?
            {
                Some(existing) => {
                    let patch = EntryPatch {
                        status,
                        details: opts.details.clone(),
                        note: opts.note.clone(),
                        source: new_entry.source,
                        source_reference: opts.source_reference,
                        informed_parent: new_entry.informed_parent,
                    };
                    match self.store.update_entry(existing.id, &patch).await? {
                        Some(updated) => updated,
                        // Vanished under us; inserting converges.
                        None => self.store.insert_entry(&new_entry).await?,
                    }
                }
                None => self.store.insert_entry(&new_entry).await?,
            }
        } else {
            self.store.upsert_slot(&new_entry).await?
        };

        tracing::debug!(
            student_id,
            %date,
            period_id,
            status = %entry.status,
            source = %entry.source,
            "attendance recorded"
        );
        Ok(entry)
    }

    /// Everything known about a student's day.
    pub async fn day_status(&self, student_id: u64, date: NaiveDate) -> Result<DayStatus> {
        let mut entries = self.store.entries_for_day(student_id, date).await?;
        if entries.is_empty() {
            return Ok(DayStatus::NoRecord);
        }
        if entries.len() == 1 && entries[0].is_whole_day() {
            return Ok(DayStatus::FullDay(entries.remove(0)));
        }
        let default_status = entries.iter().find(|e| e.is_whole_day()).map(|e| e.status);
        Ok(DayStatus::Periods {
            default_status,
            entries,
        })
    }

    /// Status for one period, falling back to the whole-day entry. The
    /// fallback also answers when the baseline is missing and only some
    /// scoped whole-day variant exists, so out-of-band data still reads.
    pub async fn period_status(
        &self,
        student_id: u64,
        date: NaiveDate,
        period_id: Option<u64>,
    ) -> Result<Option<AttendanceStatus>> {
        if let Some(period) = period_id {
            if let Some(entry) = self.store.period_entry(student_id, date, period).await? {
                return Ok(Some(entry.status));
            }
        }
        let day = self.store.day_entries(student_id, date).await?;
        Ok(day.first().map(|e| e.status))
    }

    /// Remove exactly the slot at (student, date, period-or-null). No
    /// cascade: dropping the last period entry leaves the baseline
    /// behind; the caller decides whether that should go too.
    pub async fn delete_record(
        &self,
        student_id: u64,
        date: NaiveDate,
        period_id: Option<u64>,
    ) -> Result<bool> {
        let removed = self.store.delete_slot(student_id, date, period_id).await?;
        if removed > 0 {
            tracing::info!(student_id, %date, period_id, removed, "attendance entry deleted");
        }
        Ok(removed > 0)
    }

    /// Per-status counts over period entries only; whole-day rows never
    /// count towards the rate.
    pub async fn statistics(
        &self,
        student_id: u64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<AttendanceStatistics> {
        let entries = self
            .store
            .period_entries_between(student_id, start, end)
            .await?;

        let mut stats = AttendanceStatistics::default();
        for entry in &entries {
            stats.tally(entry.status);
        }
        stats.total_periods = entries.len() as u64;
        stats.attendance_rate = if stats.total_periods == 0 {
            0.0
        } else {
            round2((stats.present + stats.late) as f64 / stats.total_periods as f64)
        };
        Ok(stats)
    }

    /// Remove every entry a given origin wrote, e.g. when a previously
    /// approved leave request is rejected. Sibling entries from other
    /// origins stay.
    pub async fn revoke_source(&self, source: EntrySource, reference: u64) -> Result<u64> {
        let removed = self.store.delete_by_source(source, reference).await?;
        if removed > 0 {
            tracing::info!(%source, reference, removed, "entries revoked");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_rounds_to_two_decimals() {
        assert_eq!(round2(2.0 / 3.0), 0.67);
        assert_eq!(round2(1.0 / 3.0), 0.33);
        assert_eq!(round2(1.0), 1.0);
    }

    #[test]
    fn statistics_tally_covers_every_status() {
        let mut stats = AttendanceStatistics::default();
        for status in [
            AttendanceStatus::Present,
            AttendanceStatus::Absent,
            AttendanceStatus::Late,
            AttendanceStatus::Excused,
            AttendanceStatus::EarlyLeave,
            AttendanceStatus::Leave,
        ] {
            stats.tally(status);
        }
        assert_eq!(
            (
                stats.present,
                stats.absent,
                stats.late,
                stats.excused,
                stats.early_leave,
                stats.leave
            ),
            (1, 1, 1, 1, 1, 1)
        );
    }
}
