use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};

use super::{AttendanceStore, StoreError};
use crate::model::{
    AttendanceEntry, EntryPatch, EntrySource, LeaveType, NewEntry, Period, ScopeKey, Student,
};

/// In-memory store with the same slot semantics as the MySQL one. Backs
/// the test suite and embedded callers that bring no database.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    students: HashMap<u64, Student>,
    leave_types: HashMap<u64, LeaveType>,
    periods: HashMap<u64, Period>,
    entries: BTreeMap<u64, AttendanceEntry>,
}

impl Inner {
    fn materialize(&mut self, entry: &NewEntry) -> AttendanceEntry {
        self.next_id += 1;
        AttendanceEntry {
            id: self.next_id,
            student_id: entry.student_id,
            school_id: entry.school_id,
            class_id: entry.class_id,
            date: entry.date,
            period_id: entry.period_id,
            status: entry.status,
            leave_type_id: entry.leave_type_id,
            details: entry.details.clone(),
            scope_key: entry.scope_key.clone(),
            note: entry.note.clone(),
            source: entry.source,
            source_reference: entry.source_reference,
            informed_parent: entry.informed_parent,
            created_at: Some(Utc::now()),
            updated_at: Some(Utc::now()),
        }
    }

    /// Slot identity: period entries by period id, whole-day entries by
    /// scope key.
    fn slot_id(
        &self,
        student_id: u64,
        date: NaiveDate,
        period_id: Option<u64>,
        scope: &ScopeKey,
    ) -> Option<u64> {
        self.entries
            .values()
            .find(|e| {
                e.student_id == student_id
                    && e.date == date
                    && match period_id {
                        Some(period) => e.period_id == Some(period),
                        None => e.period_id.is_none() && e.scope_key == *scope,
                    }
            })
            .map(|e| e.id)
    }

    fn period_rank(&self, period_id: u64) -> u32 {
        self.periods
            .get(&period_id)
            .map(|p| p.sort_order)
            .unwrap_or(u32::MAX)
    }

    fn day_order(&self, entry: &AttendanceEntry) -> (u8, u8, String, u32, u64) {
        match entry.period_id {
            None => (
                0,
                u8::from(!entry.scope_key.is_base()),
                entry.scope_key.as_str().to_string(),
                0,
                0,
            ),
            Some(period) => (1, 0, String::new(), self.period_rank(period), period),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_student(&self, student: Student) {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        inner.students.insert(student.id, student);
    }

    pub fn add_leave_type(&self, leave_type: LeaveType) {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        inner.leave_types.insert(leave_type.id, leave_type);
    }

    pub fn add_period(&self, period: Period) {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        inner.periods.insert(period.id, period);
    }

    /// Snapshot of everything recorded, in insertion order. Test helper.
    pub fn all_entries(&self) -> Vec<AttendanceEntry> {
        let inner = self.inner.lock().expect("memory store poisoned");
        inner.entries.values().cloned().collect()
    }
}

#[async_trait]
impl AttendanceStore for MemoryStore {
    async fn student(&self, student_id: u64) -> Result<Option<Student>, StoreError> {
        let inner = self.inner.lock().expect("memory store poisoned");
        Ok(inner.students.get(&student_id).cloned())
    }

    async fn leave_type(&self, leave_type_id: u64) -> Result<Option<LeaveType>, StoreError> {
        let inner = self.inner.lock().expect("memory store poisoned");
        Ok(inner.leave_types.get(&leave_type_id).cloned())
    }

    async fn period_entry(
        &self,
        student_id: u64,
        date: NaiveDate,
        period_id: u64,
    ) -> Result<Option<AttendanceEntry>, StoreError> {
        let inner = self.inner.lock().expect("memory store poisoned");
        Ok(inner
            .entries
            .values()
            .find(|e| {
                e.student_id == student_id && e.date == date && e.period_id == Some(period_id)
            })
            .cloned())
    }

    async fn day_entries(
        &self,
        student_id: u64,
        date: NaiveDate,
    ) -> Result<Vec<AttendanceEntry>, StoreError> {
        let inner = self.inner.lock().expect("memory store poisoned");
        let mut entries: Vec<AttendanceEntry> = inner
            .entries
            .values()
            .filter(|e| e.student_id == student_id && e.date == date && e.is_whole_day())
            .cloned()
            .collect();
        entries.sort_by_key(|e| inner.day_order(e));
        Ok(entries)
    }

    async fn day_entry_scoped(
        &self,
        student_id: u64,
        date: NaiveDate,
        leave_type_id: Option<u64>,
        scope: &ScopeKey,
    ) -> Result<Option<AttendanceEntry>, StoreError> {
        let inner = self.inner.lock().expect("memory store poisoned");
        Ok(inner
            .entries
            .values()
            .find(|e| {
                e.student_id == student_id
                    && e.date == date
                    && e.is_whole_day()
                    && e.scope_key == *scope
                    && e.leave_type_id == leave_type_id
            })
            .cloned())
    }

    async fn entries_for_day(
        &self,
        student_id: u64,
        date: NaiveDate,
    ) -> Result<Vec<AttendanceEntry>, StoreError> {
        let inner = self.inner.lock().expect("memory store poisoned");
        let mut entries: Vec<AttendanceEntry> = inner
            .entries
            .values()
            .filter(|e| e.student_id == student_id && e.date == date)
            .cloned()
            .collect();
        entries.sort_by_key(|e| inner.day_order(e));
        Ok(entries)
    }

    async fn period_entries_between(
        &self,
        student_id: u64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<AttendanceEntry>, StoreError> {
        let inner = self.inner.lock().expect("memory store poisoned");
        let mut entries: Vec<AttendanceEntry> = inner
            .entries
            .values()
            .filter(|e| {
                e.student_id == student_id
                    && e.period_id.is_some()
                    && e.date >= start
                    && e.date <= end
            })
            .cloned()
            .collect();
        entries.sort_by_key(|e| (e.date, e.period_id));
        Ok(entries)
    }

    async fn entries_by_source(
        &self,
        source: EntrySource,
        reference: u64,
    ) -> Result<Vec<AttendanceEntry>, StoreError> {
        let inner = self.inner.lock().expect("memory store poisoned");
        let mut entries: Vec<AttendanceEntry> = inner
            .entries
            .values()
            .filter(|e| e.source == source && e.source_reference == Some(reference))
            .cloned()
            .collect();
        entries.sort_by_key(|e| (e.date, e.period_id));
        Ok(entries)
    }

    async fn insert_day_baseline(&self, entry: &NewEntry) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        if inner
            .slot_id(entry.student_id, entry.date, None, &ScopeKey::base())
            .is_some()
        {
            return Ok(false);
        }
        let materialized = inner.materialize(entry);
        inner.entries.insert(materialized.id, materialized);
        Ok(true)
    }

    async fn upsert_slot(&self, entry: &NewEntry) -> Result<AttendanceEntry, StoreError> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        match inner.slot_id(entry.student_id, entry.date, entry.period_id, &entry.scope_key) {
            Some(id) => {
                let existing = inner
                    .entries
                    .get_mut(&id)
                    .expect("slot id points at live entry");
                existing.status = entry.status;
                existing.leave_type_id = entry.leave_type_id;
                existing.details = entry.details.clone();
                existing.scope_key = entry.scope_key.clone();
                existing.note = entry.note.clone();
                existing.source = entry.source;
                existing.source_reference = entry.source_reference;
                existing.informed_parent = entry.informed_parent;
                existing.updated_at = Some(Utc::now());
                Ok(existing.clone())
            }
            None => {
                let materialized = inner.materialize(entry);
                inner
                    .entries
                    .insert(materialized.id, materialized.clone());
                Ok(materialized)
            }
        }
    }

    async fn insert_entry(&self, entry: &NewEntry) -> Result<AttendanceEntry, StoreError> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        let materialized = inner.materialize(entry);
        inner
            .entries
            .insert(materialized.id, materialized.clone());
        Ok(materialized)
    }

    async fn update_entry(
        &self,
        id: u64,
        patch: &EntryPatch,
    ) -> Result<Option<AttendanceEntry>, StoreError> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        let Some(existing) = inner.entries.get_mut(&id) else {
            return Ok(None);
        };
        existing.status = patch.status;
        existing.details = patch.details.clone();
        existing.note = patch.note.clone();
        existing.source = patch.source;
        existing.source_reference = patch.source_reference;
        existing.informed_parent = patch.informed_parent;
        existing.updated_at = Some(Utc::now());
        Ok(Some(existing.clone()))
    }

    async fn delete_slot(
        &self,
        student_id: u64,
        date: NaiveDate,
        period_id: Option<u64>,
    ) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        let doomed: Vec<u64> = inner
            .entries
            .values()
            .filter(|e| {
                e.student_id == student_id
                    && e.date == date
                    && match period_id {
                        Some(period) => e.period_id == Some(period),
                        None => e.period_id.is_none(),
                    }
            })
            .map(|e| e.id)
            .collect();
        for id in &doomed {
            inner.entries.remove(id);
        }
        Ok(doomed.len() as u64)
    }

    async fn delete_period_entries(
        &self,
        student_id: u64,
        date: NaiveDate,
    ) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        let doomed: Vec<u64> = inner
            .entries
            .values()
            .filter(|e| e.student_id == student_id && e.date == date && e.period_id.is_some())
            .map(|e| e.id)
            .collect();
        for id in &doomed {
            inner.entries.remove(id);
        }
        Ok(doomed.len() as u64)
    }

    async fn delete_day_entries_except(
        &self,
        student_id: u64,
        date: NaiveDate,
        keep_scope: &ScopeKey,
        keep_leave_type: u64,
    ) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        let doomed: Vec<u64> = inner
            .entries
            .values()
            .filter(|e| {
                e.student_id == student_id
                    && e.date == date
                    && e.is_whole_day()
                    && !(e.scope_key == *keep_scope && e.leave_type_id == Some(keep_leave_type))
            })
            .map(|e| e.id)
            .collect();
        for id in &doomed {
            inner.entries.remove(id);
        }
        Ok(doomed.len() as u64)
    }

    async fn delete_by_source(
        &self,
        source: EntrySource,
        reference: u64,
    ) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        let doomed: Vec<u64> = inner
            .entries
            .values()
            .filter(|e| e.source == source && e.source_reference == Some(reference))
            .map(|e| e.id)
            .collect();
        for id in &doomed {
            inner.entries.remove(id);
        }
        Ok(doomed.len() as u64)
    }

    async fn students_without_entry(
        &self,
        date: NaiveDate,
        school_id: Option<u64>,
    ) -> Result<Vec<Student>, StoreError> {
        let inner = self.inner.lock().expect("memory store poisoned");
        let mut students: Vec<Student> = inner
            .students
            .values()
            .filter(|s| {
                s.active
                    && school_id.map_or(true, |school| s.school_id == school)
                    && !inner
                        .entries
                        .values()
                        .any(|e| e.student_id == s.id && e.date == date)
            })
            .cloned()
            .collect();
        students.sort_by_key(|s| s.id);
        Ok(students)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AttendanceStatus, DayOption, EntryDetails};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).expect("valid date")
    }

    fn new_entry(period_id: Option<u64>, details: Option<EntryDetails>) -> NewEntry {
        let scope_key = ScopeKey::of(details.as_ref());
        NewEntry {
            student_id: 1,
            school_id: 10,
            class_id: 100,
            date: day(10),
            period_id,
            status: AttendanceStatus::Present,
            leave_type_id: None,
            details,
            scope_key,
            note: None,
            source: EntrySource::Manual,
            source_reference: None,
            informed_parent: false,
        }
    }

    #[tokio::test]
    async fn period_slot_is_replaced_not_duplicated() {
        let store = MemoryStore::new();
        let mut entry = new_entry(Some(3), None);
        store.upsert_slot(&entry).await.unwrap();
        entry.status = AttendanceStatus::Late;
        let updated = store.upsert_slot(&entry).await.unwrap();

        assert_eq!(updated.status, AttendanceStatus::Late);
        assert_eq!(store.all_entries().len(), 1);
    }

    #[tokio::test]
    async fn day_slots_with_distinct_scopes_coexist() {
        let store = MemoryStore::new();
        store
            .upsert_slot(&new_entry(
                None,
                Some(EntryDetails::DayPart {
                    option: DayOption::MorningExercise,
                }),
            ))
            .await
            .unwrap();
        store
            .upsert_slot(&new_entry(
                None,
                Some(EntryDetails::DayPart {
                    option: DayOption::EveningExercise,
                }),
            ))
            .await
            .unwrap();

        assert_eq!(store.all_entries().len(), 2);
    }

    #[tokio::test]
    async fn baseline_insert_is_idempotent() {
        let store = MemoryStore::new();
        let baseline = new_entry(None, None);
        assert!(store.insert_day_baseline(&baseline).await.unwrap());
        assert!(!store.insert_day_baseline(&baseline).await.unwrap());
        assert_eq!(store.all_entries().len(), 1);
    }

    #[tokio::test]
    async fn day_entries_put_baseline_first() {
        let store = MemoryStore::new();
        store
            .upsert_slot(&new_entry(
                None,
                Some(EntryDetails::DayPart {
                    option: DayOption::MorningExercise,
                }),
            ))
            .await
            .unwrap();
        store.upsert_slot(&new_entry(None, None)).await.unwrap();

        let entries = store.day_entries(1, day(10)).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].scope_key.is_base());
    }
}
