use serde::{Deserialize, Serialize};

/// Directory row for a student. School and class are stamped onto every
/// attendance entry the student receives so scoped queries never join back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Student {
    pub id: u64,
    pub school_id: u64,
    pub class_id: u64,
    pub name: String,
    pub active: bool,
}
