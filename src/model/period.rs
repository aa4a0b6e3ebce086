use serde::{Deserialize, Serialize};

/// A class session slot. `sort_order` is the timetable position used when
/// listing a day's entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Period {
    pub id: u64,
    pub name: String,
    pub sort_order: u32,
}
