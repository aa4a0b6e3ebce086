use anyhow::Result;
use futures_util::StreamExt;
use moka::future::Cache;
use once_cell::sync::Lazy;
use sqlx::MySqlPool;
use std::time::Duration;

use crate::model::Student;

/// student id -> directory row; saves the per-record lookup that stamps
/// school/class onto every entry
pub static STUDENT_CACHE: Lazy<Cache<u64, Student>> = Lazy::new(|| {
    Cache::builder()
        .max_capacity(100_000) // tune based on memory
        .time_to_live(Duration::from_secs(6 * 3600))
        .build()
});

/// Cache a single student row
pub async fn remember(student: &Student) {
    STUDENT_CACHE.insert(student.id, student.clone()).await;
}

pub async fn lookup(student_id: u64) -> Option<Student> {
    STUDENT_CACHE.get(&student_id).await
}

/// Batch cache student rows
async fn batch_remember(students: &[Student]) {
    let futures: Vec<_> = students
        .iter()
        .map(|s| STUDENT_CACHE.insert(s.id, s.clone()))
        .collect();

    // Await all insertions concurrently
    futures::future::join_all(futures).await;
}

/// Load active students into the in-memory cache (batched)
pub async fn warmup_student_cache(pool: &MySqlPool, batch_size: usize) -> Result<()> {
    let mut stream = sqlx::query_as::<_, Student>(
        r#"
        SELECT id, school_id, class_id, name, active
        FROM students
        WHERE active = 1
        ORDER BY id
        "#,
    )
    .fetch(pool);

    let mut batch = Vec::with_capacity(batch_size);
    let mut total_count = 0usize;

    while let Some(row) = stream.next().await {
        batch.push(row?);
        total_count += 1;

        if batch.len() >= batch_size {
            batch_remember(&batch).await;
            batch.clear();
        }
    }

    // Insert any remaining students
    if !batch.is_empty() {
        batch_remember(&batch).await;
    }

    tracing::info!(total_count, "student cache warmup complete");

    Ok(())
}
