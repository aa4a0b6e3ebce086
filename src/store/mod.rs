pub mod memory;
pub mod mysql;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use crate::model::{
    AttendanceEntry, EntryPatch, EntrySource, LeaveType, NewEntry, ScopeKey, Student,
};

pub use memory::MemoryStore;
pub use mysql::MySqlStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("failed to encode details payload: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("corrupt attendance row {id}: {reason}")]
    CorruptRow { id: u64, reason: String },
}

/// Persistence seam for attendance entries and the directory rows the
/// engine resolves against. Every write method is one atomic statement on
/// the backing store; the engine sequences them but never wraps them in a
/// shared transaction, so a crash between calls leaves only states that a
/// re-invocation converges from.
#[async_trait]
pub trait AttendanceStore: Send + Sync {
    // ---- directory lookups ----

    async fn student(&self, student_id: u64) -> Result<Option<Student>, StoreError>;

    async fn leave_type(&self, leave_type_id: u64) -> Result<Option<LeaveType>, StoreError>;

    // ---- entry reads ----

    async fn period_entry(
        &self,
        student_id: u64,
        date: NaiveDate,
        period_id: u64,
    ) -> Result<Option<AttendanceEntry>, StoreError>;

    /// Whole-day entries for the date, plain baseline first, then the
    /// scoped variants in key order.
    async fn day_entries(
        &self,
        student_id: u64,
        date: NaiveDate,
    ) -> Result<Vec<AttendanceEntry>, StoreError>;

    /// The whole-day entry matching a leave type and scope key, if any.
    async fn day_entry_scoped(
        &self,
        student_id: u64,
        date: NaiveDate,
        leave_type_id: Option<u64>,
        scope: &ScopeKey,
    ) -> Result<Option<AttendanceEntry>, StoreError>;

    /// Everything recorded for the date: whole-day entries first (baseline
    /// leading), then period entries in timetable order.
    async fn entries_for_day(
        &self,
        student_id: u64,
        date: NaiveDate,
    ) -> Result<Vec<AttendanceEntry>, StoreError>;

    /// Period-scoped entries only, inclusive date range.
    async fn period_entries_between(
        &self,
        student_id: u64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<AttendanceEntry>, StoreError>;

    async fn entries_by_source(
        &self,
        source: EntrySource,
        reference: u64,
    ) -> Result<Vec<AttendanceEntry>, StoreError>;

    // ---- writes ----

    /// Insert the plain whole-day baseline unless the slot is already
    /// taken. Returns whether a row was created.
    async fn insert_day_baseline(&self, entry: &NewEntry) -> Result<bool, StoreError>;

    /// Insert-or-overwrite on the slot key: (student, date, period) for
    /// period entries, (student, date, scope) for whole-day entries. A
    /// concurrent conflicting insert lands as the update.
    async fn upsert_slot(&self, entry: &NewEntry) -> Result<AttendanceEntry, StoreError>;

    async fn insert_entry(&self, entry: &NewEntry) -> Result<AttendanceEntry, StoreError>;

    /// Returns the updated entry, or None when the row disappeared
    /// underneath us.
    async fn update_entry(
        &self,
        id: u64,
        patch: &EntryPatch,
    ) -> Result<Option<AttendanceEntry>, StoreError>;

    // ---- deletes ----

    /// Remove whatever sits at (student, date, period-or-null). A
    /// whole-day delete removes every whole-day variant for the date.
    async fn delete_slot(
        &self,
        student_id: u64,
        date: NaiveDate,
        period_id: Option<u64>,
    ) -> Result<u64, StoreError>;

    async fn delete_period_entries(
        &self,
        student_id: u64,
        date: NaiveDate,
    ) -> Result<u64, StoreError>;

    /// Remove whole-day entries whose (scope, leave type) differs from the
    /// surviving one.
    async fn delete_day_entries_except(
        &self,
        student_id: u64,
        date: NaiveDate,
        keep_scope: &ScopeKey,
        keep_leave_type: u64,
    ) -> Result<u64, StoreError>;

    async fn delete_by_source(
        &self,
        source: EntrySource,
        reference: u64,
    ) -> Result<u64, StoreError>;

    // ---- batch support ----

    /// Active students with no entry at all on the date, optionally
    /// limited to one school.
    async fn students_without_entry(
        &self,
        date: NaiveDate,
        school_id: Option<u64>,
    ) -> Result<Vec<Student>, StoreError>;
}
