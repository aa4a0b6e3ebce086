use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::MySqlPool;

use super::{AttendanceStore, StoreError};
use crate::model::{
    AttendanceEntry, AttendanceStatus, EntryDetails, EntryPatch, EntrySource, LeaveType, NewEntry,
    ScopeKey, Student,
};
use crate::utils::student_cache;

/// MySQL-backed store.
///
/// Slot uniqueness is enforced by the `uq_entry_slot` index over
/// (student_id, date, slot_key), where slot_key is a stored generated
/// column: 'p:<period_id>' for period entries, 'd:<scope_key>' for
/// whole-day entries. Concurrent conflicting inserts therefore collapse
/// into updates inside `upsert_slot` instead of erroring.
pub struct MySqlStore {
    pool: MySqlPool,
}

const ENTRY_COLS: &str = "id, student_id, school_id, class_id, date, period_id, status, \
     leave_type_id, details, scope_key, note, source, source_reference, informed_parent, \
     created_at, updated_at";

#[derive(sqlx::FromRow)]
struct EntryRow {
    id: u64,
    student_id: u64,
    school_id: u64,
    class_id: u64,
    date: NaiveDate,
    period_id: Option<u64>,
    status: String,
    leave_type_id: Option<u64>,
    details: Option<serde_json::Value>,
    scope_key: String,
    note: Option<String>,
    source: String,
    source_reference: Option<u64>,
    informed_parent: bool,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

impl TryFrom<EntryRow> for AttendanceEntry {
    type Error = StoreError;

    fn try_from(row: EntryRow) -> Result<Self, StoreError> {
        let corrupt = |reason: String| StoreError::CorruptRow {
            id: row.id,
            reason,
        };

        let status: AttendanceStatus = row
            .status
            .parse()
            .map_err(|_| corrupt(format!("unknown status {:?}", row.status)))?;
        let source: EntrySource = row
            .source
            .parse()
            .map_err(|_| corrupt(format!("unknown source {:?}", row.source)))?;
        let details: Option<EntryDetails> = match row.details {
            Some(value) => Some(
                serde_json::from_value(value)
                    .map_err(|e| corrupt(format!("bad details payload: {e}")))?,
            ),
            None => None,
        };

        Ok(AttendanceEntry {
            id: row.id,
            student_id: row.student_id,
            school_id: row.school_id,
            class_id: row.class_id,
            date: row.date,
            period_id: row.period_id,
            status,
            leave_type_id: row.leave_type_id,
            details,
            scope_key: ScopeKey::from_raw(row.scope_key),
            note: row.note,
            source,
            source_reference: row.source_reference,
            informed_parent: row.informed_parent,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn details_json(details: Option<&EntryDetails>) -> Result<Option<serde_json::Value>, StoreError> {
    details.map(serde_json::to_value).transpose().map_err(StoreError::from)
}

fn into_entries(rows: Vec<EntryRow>) -> Result<Vec<AttendanceEntry>, StoreError> {
    rows.into_iter().map(AttendanceEntry::try_from).collect()
}

impl MySqlStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    async fn fetch_entry_by_id(&self, id: u64) -> Result<Option<AttendanceEntry>, StoreError> {
        let sql = format!("SELECT {ENTRY_COLS} FROM attendance_entries WHERE id = ?");
        let row = sqlx::query_as::<_, EntryRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(AttendanceEntry::try_from).transpose()
    }

    async fn fetch_slot(
        &self,
        student_id: u64,
        date: NaiveDate,
        period_id: Option<u64>,
        scope: &ScopeKey,
    ) -> Result<Option<AttendanceEntry>, StoreError> {
        match period_id {
            Some(period) => self.period_entry(student_id, date, period).await,
            None => {
                let sql = format!(
                    "SELECT {ENTRY_COLS} FROM attendance_entries \
                     WHERE student_id = ? AND date = ? AND period_id IS NULL AND scope_key = ?"
                );
                let row = sqlx::query_as::<_, EntryRow>(&sql)
                    .bind(student_id)
                    .bind(date)
                    .bind(scope.as_str())
                    .fetch_optional(&self.pool)
                    .await?;
                row.map(AttendanceEntry::try_from).transpose()
            }
        }
    }
}

#[async_trait]
impl AttendanceStore for MySqlStore {
    async fn student(&self, student_id: u64) -> Result<Option<Student>, StoreError> {
        if let Some(student) = student_cache::lookup(student_id).await {
            return Ok(Some(student));
        }

        let found = sqlx::query_as::<_, Student>(
            "SELECT id, school_id, class_id, name, active FROM students WHERE id = ?",
        )
        .bind(student_id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(student) = &found {
            student_cache::remember(student).await;
        }
        Ok(found)
    }

    async fn leave_type(&self, leave_type_id: u64) -> Result<Option<LeaveType>, StoreError> {
        let found = sqlx::query_as::<_, LeaveType>(
            "SELECT id, name, full_day_exclusive FROM leave_types WHERE id = ?",
        )
        .bind(leave_type_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(found)
    }

    async fn period_entry(
        &self,
        student_id: u64,
        date: NaiveDate,
        period_id: u64,
    ) -> Result<Option<AttendanceEntry>, StoreError> {
        let sql = format!(
            "SELECT {ENTRY_COLS} FROM attendance_entries \
             WHERE student_id = ? AND date = ? AND period_id = ?"
        );
        let row = sqlx::query_as::<_, EntryRow>(&sql)
            .bind(student_id)
            .bind(date)
            .bind(period_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(AttendanceEntry::try_from).transpose()
    }

    async fn day_entries(
        &self,
        student_id: u64,
        date: NaiveDate,
    ) -> Result<Vec<AttendanceEntry>, StoreError> {
        let sql = format!(
            "SELECT {ENTRY_COLS} FROM attendance_entries \
             WHERE student_id = ? AND date = ? AND period_id IS NULL \
             ORDER BY (scope_key = '') DESC, scope_key ASC"
        );
        let rows = sqlx::query_as::<_, EntryRow>(&sql)
            .bind(student_id)
            .bind(date)
            .fetch_all(&self.pool)
            .await?;
        into_entries(rows)
    }

    async fn day_entry_scoped(
        &self,
        student_id: u64,
        date: NaiveDate,
        leave_type_id: Option<u64>,
        scope: &ScopeKey,
    ) -> Result<Option<AttendanceEntry>, StoreError> {
        let mut sql = format!(
            "SELECT {ENTRY_COLS} FROM attendance_entries \
             WHERE student_id = ? AND date = ? AND period_id IS NULL AND scope_key = ?"
        );
        if leave_type_id.is_some() {
            sql.push_str(" AND leave_type_id = ?");
        } else {
            sql.push_str(" AND leave_type_id IS NULL");
        }

        let mut query = sqlx::query_as::<_, EntryRow>(&sql)
            .bind(student_id)
            .bind(date)
            .bind(scope.as_str());
        if let Some(leave_type) = leave_type_id {
            query = query.bind(leave_type);
        }

        let row = query.fetch_optional(&self.pool).await?;
        row.map(AttendanceEntry::try_from).transpose()
    }

    async fn entries_for_day(
        &self,
        student_id: u64,
        date: NaiveDate,
    ) -> Result<Vec<AttendanceEntry>, StoreError> {
        let sql = format!(
            "SELECT e.{} FROM attendance_entries e \
             LEFT JOIN periods p ON p.id = e.period_id \
             WHERE e.student_id = ? AND e.date = ? \
             ORDER BY (e.period_id IS NULL) DESC, (e.scope_key = '') DESC, \
                      e.scope_key ASC, p.sort_order ASC, e.period_id ASC",
            ENTRY_COLS.replace(", ", ", e.")
        );
        let rows = sqlx::query_as::<_, EntryRow>(&sql)
            .bind(student_id)
            .bind(date)
            .fetch_all(&self.pool)
            .await?;
        into_entries(rows)
    }

    async fn period_entries_between(
        &self,
        student_id: u64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<AttendanceEntry>, StoreError> {
        let sql = format!(
            "SELECT {ENTRY_COLS} FROM attendance_entries \
             WHERE student_id = ? AND date BETWEEN ? AND ? AND period_id IS NOT NULL \
             ORDER BY date ASC, period_id ASC"
        );
        let rows = sqlx::query_as::<_, EntryRow>(&sql)
            .bind(student_id)
            .bind(start)
            .bind(end)
            .fetch_all(&self.pool)
            .await?;
        into_entries(rows)
    }

    async fn entries_by_source(
        &self,
        source: EntrySource,
        reference: u64,
    ) -> Result<Vec<AttendanceEntry>, StoreError> {
        let sql = format!(
            "SELECT {ENTRY_COLS} FROM attendance_entries \
             WHERE source = ? AND source_reference = ? \
             ORDER BY date ASC, period_id ASC"
        );
        let rows = sqlx::query_as::<_, EntryRow>(&sql)
            .bind(source.as_ref())
            .bind(reference)
            .fetch_all(&self.pool)
            .await?;
        into_entries(rows)
    }

    async fn insert_day_baseline(&self, entry: &NewEntry) -> Result<bool, StoreError> {
        let details = details_json(entry.details.as_ref())?;
        let result = sqlx::query(
            r#"
            INSERT IGNORE INTO attendance_entries
                (student_id, school_id, class_id, date, period_id, status, leave_type_id,
                 details, scope_key, note, source, source_reference, informed_parent)
            VALUES (?, ?, ?, ?, NULL, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.student_id)
        .bind(entry.school_id)
        .bind(entry.class_id)
        .bind(entry.date)
        .bind(entry.status.as_ref())
        .bind(entry.leave_type_id)
        .bind(details)
        .bind(entry.scope_key.as_str())
        .bind(entry.note.as_deref())
        .bind(entry.source.as_ref())
        .bind(entry.source_reference)
        .bind(entry.informed_parent)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn upsert_slot(&self, entry: &NewEntry) -> Result<AttendanceEntry, StoreError> {
        let details = details_json(entry.details.as_ref())?;
        sqlx::query(
            r#"
            INSERT INTO attendance_entries
                (student_id, school_id, class_id, date, period_id, status, leave_type_id,
                 details, scope_key, note, source, source_reference, informed_parent)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON DUPLICATE KEY UPDATE
                status = VALUES(status),
                leave_type_id = VALUES(leave_type_id),
                details = VALUES(details),
                note = VALUES(note),
                source = VALUES(source),
                source_reference = VALUES(source_reference),
                informed_parent = VALUES(informed_parent)
            "#,
        )
        .bind(entry.student_id)
        .bind(entry.school_id)
        .bind(entry.class_id)
        .bind(entry.date)
        .bind(entry.period_id)
        .bind(entry.status.as_ref())
        .bind(entry.leave_type_id)
        .bind(details)
        .bind(entry.scope_key.as_str())
        .bind(entry.note.as_deref())
        .bind(entry.source.as_ref())
        .bind(entry.source_reference)
        .bind(entry.informed_parent)
        .execute(&self.pool)
        .await?;

        self.fetch_slot(entry.student_id, entry.date, entry.period_id, &entry.scope_key)
            .await?
            .ok_or_else(|| StoreError::Database(sqlx::Error::RowNotFound))
    }

    async fn insert_entry(&self, entry: &NewEntry) -> Result<AttendanceEntry, StoreError> {
        let details = details_json(entry.details.as_ref())?;
        let result = sqlx::query(
            r#"
            INSERT INTO attendance_entries
                (student_id, school_id, class_id, date, period_id, status, leave_type_id,
                 details, scope_key, note, source, source_reference, informed_parent)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.student_id)
        .bind(entry.school_id)
        .bind(entry.class_id)
        .bind(entry.date)
        .bind(entry.period_id)
        .bind(entry.status.as_ref())
        .bind(entry.leave_type_id)
        .bind(details)
        .bind(entry.scope_key.as_str())
        .bind(entry.note.as_deref())
        .bind(entry.source.as_ref())
        .bind(entry.source_reference)
        .bind(entry.informed_parent)
        .execute(&self.pool)
        .await?;

        self.fetch_entry_by_id(result.last_insert_id())
            .await?
            .ok_or_else(|| StoreError::Database(sqlx::Error::RowNotFound))
    }

    async fn update_entry(
        &self,
        id: u64,
        patch: &EntryPatch,
    ) -> Result<Option<AttendanceEntry>, StoreError> {
        let details = details_json(patch.details.as_ref())?;
        sqlx::query(
            r#"
            UPDATE attendance_entries
            SET status = ?, details = ?, note = ?, source = ?,
                source_reference = ?, informed_parent = ?
            WHERE id = ?
            "#,
        )
        .bind(patch.status.as_ref())
        .bind(details)
        .bind(patch.note.as_deref())
        .bind(patch.source.as_ref())
        .bind(patch.source_reference)
        .bind(patch.informed_parent)
        .bind(id)
        .execute(&self.pool)
        .await?;

        // rows_affected is 0 both for a vanished row and for a no-op
        // update, so re-read instead of trusting the count.
        self.fetch_entry_by_id(id).await
    }

    async fn delete_slot(
        &self,
        student_id: u64,
        date: NaiveDate,
        period_id: Option<u64>,
    ) -> Result<u64, StoreError> {
        let result = match period_id {
            Some(period) => {
                sqlx::query(
                    "DELETE FROM attendance_entries \
                     WHERE student_id = ? AND date = ? AND period_id = ?",
                )
                .bind(student_id)
                .bind(date)
                .bind(period)
                .execute(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "DELETE FROM attendance_entries \
                     WHERE student_id = ? AND date = ? AND period_id IS NULL",
                )
                .bind(student_id)
                .bind(date)
                .execute(&self.pool)
                .await?
            }
        };
        Ok(result.rows_affected())
    }

    async fn delete_period_entries(
        &self,
        student_id: u64,
        date: NaiveDate,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "DELETE FROM attendance_entries \
             WHERE student_id = ? AND date = ? AND period_id IS NOT NULL",
        )
        .bind(student_id)
        .bind(date)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_day_entries_except(
        &self,
        student_id: u64,
        date: NaiveDate,
        keep_scope: &ScopeKey,
        keep_leave_type: u64,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "DELETE FROM attendance_entries \
             WHERE student_id = ? AND date = ? AND period_id IS NULL \
             AND NOT (scope_key = ? AND leave_type_id <=> ?)",
        )
        .bind(student_id)
        .bind(date)
        .bind(keep_scope.as_str())
        .bind(keep_leave_type)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_by_source(
        &self,
        source: EntrySource,
        reference: u64,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "DELETE FROM attendance_entries WHERE source = ? AND source_reference = ?",
        )
        .bind(source.as_ref())
        .bind(reference)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn students_without_entry(
        &self,
        date: NaiveDate,
        school_id: Option<u64>,
    ) -> Result<Vec<Student>, StoreError> {
        let mut sql = String::from(
            "SELECT s.id, s.school_id, s.class_id, s.name, s.active FROM students s \
             WHERE s.active = 1 \
             AND NOT EXISTS (SELECT 1 FROM attendance_entries e \
                             WHERE e.student_id = s.id AND e.date = ?)",
        );
        if school_id.is_some() {
            sql.push_str(" AND s.school_id = ?");
        }
        sql.push_str(" ORDER BY s.id");

        let mut query = sqlx::query_as::<_, Student>(&sql).bind(date);
        if let Some(school) = school_id {
            query = query.bind(school);
        }

        let students = query.fetch_all(&self.pool).await?;
        Ok(students)
    }
}
