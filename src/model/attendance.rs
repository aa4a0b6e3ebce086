use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::error::AttendanceError;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    Excused,
    EarlyLeave,
    Leave,
}

impl AttendanceStatus {
    /// Parse a status supplied as text (env vars, imported rows).
    pub fn parse(value: &str) -> Result<Self, AttendanceError> {
        value
            .parse()
            .map_err(|_| AttendanceError::InvalidStatus(value.to_string()))
    }
}

/// Who wrote the entry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EntrySource {
    Manual,
    Automatic,
    LeaveRequest,
    System,
}

/// Which stretch of the day a whole-day mark covers. Only `FullDay`
/// qualifies a leave for the full-day-exclusive cascade; the exercise
/// sessions keep their legacy short names on the wire.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DayOption {
    FullDay,
    MorningHalf,
    AfternoonHalf,
    #[strum(serialize = "zcao")]
    #[serde(rename = "zcao")]
    MorningExercise,
    #[strum(serialize = "wcao")]
    #[serde(rename = "wcao")]
    EveningExercise,
}

impl DayOption {
    pub fn is_full_day(self) -> bool {
        matches!(self, DayOption::FullDay)
    }
}

/// Structured payload stored next to an entry. Closed set of shapes so the
/// scope-key derivation never has to probe loose JSON keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntryDetails {
    /// Clock time attached to the mark, e.g. when an early leave happened.
    Time { at: NaiveTime },
    /// The class periods a roll call covered.
    Periods { periods: Vec<u64> },
    /// Which part of the day a whole-day mark covers.
    DayPart { option: DayOption },
}

/// Normalized key telling apart whole-day entries that share the
/// (student, date, NULL period) slot: two half-day leaves on the same
/// date land in different scopes instead of overwriting each other.
/// The empty key is the plain day baseline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display)]
#[display(fmt = "{}", _0)]
pub struct ScopeKey(String);

impl ScopeKey {
    pub fn base() -> Self {
        ScopeKey(String::new())
    }

    /// Derive the key from the details payload. Period lists are sorted and
    /// deduplicated first so the same selection always maps to one key.
    pub fn of(details: Option<&EntryDetails>) -> Self {
        match details {
            None | Some(EntryDetails::Time { .. }) => Self::base(),
            Some(EntryDetails::Periods { periods }) => {
                let mut ids: Vec<u64> = periods.clone();
                ids.sort_unstable();
                ids.dedup();
                let joined = ids
                    .iter()
                    .map(|p| p.to_string())
                    .collect::<Vec<_>>()
                    .join("-");
                ScopeKey(format!("p{joined}"))
            }
            Some(EntryDetails::DayPart { option }) => ScopeKey(option.as_ref().to_string()),
        }
    }

    pub fn from_raw(raw: impl Into<String>) -> Self {
        ScopeKey(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_base(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceEntry {
    pub id: u64,
    pub student_id: u64,
    pub school_id: u64,
    pub class_id: u64,
    pub date: NaiveDate,
    /// NULL means the entry covers the whole day.
    pub period_id: Option<u64>,
    pub status: AttendanceStatus,
    pub leave_type_id: Option<u64>,
    pub details: Option<EntryDetails>,
    pub scope_key: ScopeKey,
    pub note: Option<String>,
    pub source: EntrySource,
    pub source_reference: Option<u64>,
    pub informed_parent: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl AttendanceEntry {
    pub fn is_whole_day(&self) -> bool {
        self.period_id.is_none()
    }
}

/// Insert payload; the store assigns id and timestamps.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub student_id: u64,
    pub school_id: u64,
    pub class_id: u64,
    pub date: NaiveDate,
    pub period_id: Option<u64>,
    pub status: AttendanceStatus,
    pub leave_type_id: Option<u64>,
    pub details: Option<EntryDetails>,
    pub scope_key: ScopeKey,
    pub note: Option<String>,
    pub source: EntrySource,
    pub source_reference: Option<u64>,
    pub informed_parent: bool,
}

/// In-place update for an already matched entry. The slot columns
/// (student, date, period, scope, leave type) stay as they are.
#[derive(Debug, Clone)]
pub struct EntryPatch {
    pub status: AttendanceStatus,
    pub details: Option<EntryDetails>,
    pub note: Option<String>,
    pub source: EntrySource,
    pub source_reference: Option<u64>,
    pub informed_parent: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_text() {
        assert_eq!(AttendanceStatus::EarlyLeave.to_string(), "early_leave");
        assert_eq!(
            AttendanceStatus::parse("early_leave").unwrap(),
            AttendanceStatus::EarlyLeave
        );
        assert!(matches!(
            AttendanceStatus::parse("vacation"),
            Err(AttendanceError::InvalidStatus(_))
        ));
    }

    #[test]
    fn exercise_options_keep_legacy_names() {
        assert_eq!(DayOption::MorningExercise.to_string(), "zcao");
        assert_eq!(DayOption::EveningExercise.to_string(), "wcao");
        assert_eq!(
            "zcao".parse::<DayOption>().unwrap(),
            DayOption::MorningExercise
        );
        assert!(!DayOption::MorningExercise.is_full_day());
        assert!(DayOption::FullDay.is_full_day());
    }

    #[test]
    fn scope_key_normalizes_period_lists() {
        let a = ScopeKey::of(Some(&EntryDetails::Periods {
            periods: vec![3, 1, 2, 1],
        }));
        let b = ScopeKey::of(Some(&EntryDetails::Periods {
            periods: vec![1, 2, 3],
        }));
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "p1-2-3");
    }

    #[test]
    fn scope_key_for_options_and_base() {
        assert_eq!(
            ScopeKey::of(Some(&EntryDetails::DayPart {
                option: DayOption::MorningExercise
            }))
            .as_str(),
            "zcao"
        );
        assert!(ScopeKey::of(None).is_base());
        let at = NaiveTime::from_hms_opt(10, 30, 0).unwrap();
        assert!(ScopeKey::of(Some(&EntryDetails::Time { at })).is_base());
    }
}
