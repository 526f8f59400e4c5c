//! Tests for the PostgreSQL status store and work queue.
//!
//! These need a live database reachable through `DATABASE_URL`; run them
//! with `cargo test -p imagejob-db -- --ignored`.

use imagejob_core::job::{JobId, JobStatus, JobStatusRecord, WorkMessage, JOB_PARTITION};
use imagejob_core::storage::{Lookup, StatusStore, WorkQueue};
use imagejob_db::postgres::{PgStatusStore, PgWorkQueue};
use sqlx::PgPool;

fn id(raw: &str) -> JobId {
    JobId::parse(raw).unwrap()
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn put_then_get_round_trips(pool: PgPool) {
    let store = PgStatusStore::new(pool);
    let record = JobStatusRecord::pending(id("round-trip"), "https://x/img.png");

    store.put(&record).await.unwrap();

    let found = store.get(JOB_PARTITION, &id("round-trip")).await.unwrap();
    assert_eq!(found, Lookup::Found(record));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn missing_record_is_not_found(pool: PgPool) {
    let store = PgStatusStore::new(pool);
    assert_eq!(
        store.get(JOB_PARTITION, &id("nonexistent")).await.unwrap(),
        Lookup::NotFound
    );
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn upsert_replaces_existing_row(pool: PgPool) {
    let store = PgStatusStore::new(pool.clone());
    store
        .put(&JobStatusRecord::pending(id("dup"), "https://x/first.png"))
        .await
        .unwrap();
    let second = JobStatusRecord::pending(id("dup"), "https://x/second.png");
    store.put(&second).await.unwrap();

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobstatus WHERE row_key = 'dup'")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
    assert_eq!(
        store.get(JOB_PARTITION, &id("dup")).await.unwrap(),
        Lookup::Found(second)
    );
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn worker_written_fields_are_returned(pool: PgPool) {
    let store = PgStatusStore::new(pool.clone());
    store
        .put(&JobStatusRecord::pending(id("worked"), "https://x/img.png"))
        .await
        .unwrap();

    sqlx::query(
        "UPDATE jobstatus SET status = 'done', extra = '{\"result_url\": \"https://x/out.png\"}' \
         WHERE row_key = 'worked'",
    )
    .execute(&pool)
    .await
    .unwrap();

    let record = store
        .get(JOB_PARTITION, &id("worked"))
        .await
        .unwrap()
        .into_option()
        .unwrap();
    assert_eq!(record.status, JobStatus::Done);
    assert_eq!(record.extra["result_url"], "https://x/out.png");
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn send_appends_to_named_queue(pool: PgPool) {
    let queue = PgWorkQueue::new(pool.clone());
    let message = WorkMessage {
        job_id: id("queued"),
        image_url: "https://x/img.png".into(),
    };

    queue.send(&message).await.unwrap();
    queue.send(&message).await.unwrap();

    let payloads: Vec<serde_json::Value> = sqlx::query_scalar(
        "SELECT payload FROM queue_messages WHERE queue_name = $1 ORDER BY id",
    )
    .bind(queue.queue_name())
    .fetch_all(&pool)
    .await
    .unwrap();

    assert_eq!(payloads.len(), 2);
    assert_eq!(
        payloads[0],
        serde_json::json!({"job_id": "queued", "image_url": "https://x/img.png"})
    );
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn health_checks_pass_against_live_pool(pool: PgPool) {
    assert!(PgStatusStore::new(pool.clone()).health_check().await.is_ok());
    assert!(PgWorkQueue::new(pool).health_check().await.is_ok());
}
