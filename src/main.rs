use anyhow::Context;
use chrono::Local;
use dotenvy::dotenv;

use tracing::info;
use tracing_appender::rolling;

use sams::config::Config;
use sams::db::init_db;
use sams::service::attendance::{AttendanceService, ReconcilePolicy};
use sams::service::auto_mark::{self, AutoMarkConfig};
use sams::store::MySqlStore;
use sams::utils::student_cache;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = Config::from_env();

    // Rolling daily log
    let file_appender = rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_target(false) // removes module path
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .pretty()
        .init();

    info!("Daily marking job starting...");

    let pool = init_db(&config.database_url).await;

    // Warm up the student directory in batches of 250
    if let Err(e) = student_cache::warmup_student_cache(&pool, 250).await {
        eprintln!("Failed to warmup student cache: {:?}", e);
    }

    let service = AttendanceService::with_policy(
        MySqlStore::new(pool),
        ReconcilePolicy {
            baseline_status: config.baseline_status,
        },
    );

    let today = Local::now().date_naive();
    let now = Local::now().time();
    let outcome = auto_mark::run(
        &service,
        today,
        now,
        &AutoMarkConfig {
            status: config.auto_mark_status,
            cutoff: config.auto_mark_cutoff,
            school_id: config.auto_mark_school_id,
        },
    )
    .await
    .context("daily marking failed")?;

    info!(
        run_id = %outcome.run_id,
        marked = outcome.marked,
        failed = outcome.failed,
        "job finished"
    );
    Ok(())
}
