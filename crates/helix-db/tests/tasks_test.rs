use chrono::Utc;
use helix_db::models::ErrorKind;
use helix_db::queries::{artifacts, jobs, tasks};
use helix_test_utils::{create_test_db, drop_test_db};
use serde_json::json;

#[tokio::test]
async fn claim_is_exclusive_to_one_worker() {
    let (pool, db_name) = create_test_db().await;

    let job = jobs::insert_job(&pool, json!({"prompt": "write a poem"}))
        .await
        .unwrap();
    tasks::insert_task(&pool, job.id, "drafter", json!({}))
        .await
        .unwrap();

    let claimed_a = tasks::claim_task(&pool, "drafter", "worker-a")
        .await
        .unwrap();
    let claimed_b = tasks::claim_task(&pool, "drafter", "worker-b")
        .await
        .unwrap();

    assert!(claimed_a.is_some());
    assert!(claimed_b.is_none(), "only one pending task exists; a second claimer must see nothing");

    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn complete_task_rejects_stale_worker() {
    let (pool, db_name) = create_test_db().await;

    let job = jobs::insert_job(&pool, json!({})).await.unwrap();
    let task = tasks::insert_task(&pool, job.id, "drafter", json!({}))
        .await
        .unwrap();
    tasks::claim_task(&pool, "drafter", "worker-a")
        .await
        .unwrap();

    // A worker that never held the claim cannot complete it.
    let mut tx = pool.begin().await.unwrap();
    let completed = tasks::complete_task(
        &mut tx,
        task.id,
        job.id,
        "worker-ghost",
        json!({"ok": true}),
        "drafter",
        "draft.v1",
    )
    .await
    .unwrap();
    assert!(!completed);
    tx.commit().await.unwrap();

    let mut tx = pool.begin().await.unwrap();
    let completed = tasks::complete_task(
        &mut tx,
        task.id,
        job.id,
        "worker-a",
        json!({"ok": true}),
        "drafter",
        "draft.v1",
    )
    .await
    .unwrap();
    assert!(completed);
    tx.commit().await.unwrap();

    let reloaded = tasks::get_task(&pool, task.id).await.unwrap().unwrap();
    assert_eq!(reloaded.status, helix_db::models::TaskStatus::Completed);

    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn completed_artifact_is_unique_per_task_and_name() {
    let (pool, db_name) = create_test_db().await;

    let job = jobs::insert_job(&pool, json!({})).await.unwrap();
    let task = tasks::insert_task(&pool, job.id, "drafter", json!({}))
        .await
        .unwrap();

    artifacts::insert_artifact(&pool, task.id, "draft", "draft.v1", json!({"text": "hi"}))
        .await
        .unwrap();

    let second = artifacts::insert_artifact(&pool, task.id, "draft", "draft.v1", json!({"text": "again"}))
        .await;
    assert!(second.is_err(), "duplicate (task_id, name) must be rejected");

    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn failing_task_retries_until_bound_then_terminal() {
    let (pool, db_name) = create_test_db().await;

    let job = jobs::insert_job(&pool, json!({})).await.unwrap();
    let task = tasks::insert_task(&pool, job.id, "drafter", json!({}))
        .await
        .unwrap();

    // First two failures retry; the third exhausts a max_retries of 2.
    for attempt in 1..=2 {
        tasks::claim_task(&pool, "drafter", "worker-a").await.unwrap();
        let outcome = tasks::fail_task(
            &pool,
            task.id,
            "worker-a",
            "schema mismatch",
            ErrorKind::Validation,
            2,
        )
        .await
        .unwrap();
        assert_eq!(
            outcome,
            tasks::FailOutcome::Retrying { attempt }
        );
    }

    tasks::claim_task(&pool, "drafter", "worker-a").await.unwrap();
    let outcome = tasks::fail_task(
        &pool,
        task.id,
        "worker-a",
        "schema mismatch",
        ErrorKind::Validation,
        2,
    )
    .await
    .unwrap();
    assert_eq!(outcome, tasks::FailOutcome::Terminal);

    let reloaded = tasks::get_task(&pool, task.id).await.unwrap().unwrap();
    assert_eq!(reloaded.status, helix_db::models::TaskStatus::Failed);
    assert_eq!(reloaded.error_kind, Some(ErrorKind::Validation));

    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn permanent_executor_failure_never_retries() {
    let (pool, db_name) = create_test_db().await;

    let job = jobs::insert_job(&pool, json!({})).await.unwrap();
    let task = tasks::insert_task(&pool, job.id, "drafter", json!({}))
        .await
        .unwrap();
    tasks::claim_task(&pool, "drafter", "worker-a").await.unwrap();

    let outcome = tasks::fail_task(
        &pool,
        task.id,
        "worker-a",
        "invalid credentials",
        ErrorKind::ExecutorPermanent,
        10,
    )
    .await
    .unwrap();
    assert_eq!(outcome, tasks::FailOutcome::Terminal);

    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn zombie_task_is_reclaimed_to_pending() {
    let (pool, db_name) = create_test_db().await;

    let job = jobs::insert_job(&pool, json!({})).await.unwrap();
    let task = tasks::insert_task(&pool, job.id, "drafter", json!({}))
        .await
        .unwrap();
    tasks::claim_task(&pool, "drafter", "worker-a").await.unwrap();

    // Heartbeat cutoff in the future makes every in-progress task look stale.
    let cutoff = Utc::now() + chrono::Duration::seconds(60);
    let reclaimed = tasks::reset_zombie_tasks(&pool, cutoff, 3).await.unwrap();
    assert_eq!(reclaimed.len(), 1);
    assert_eq!(reclaimed[0].id, task.id);

    let reloaded = tasks::get_task(&pool, task.id).await.unwrap().unwrap();
    assert_eq!(reloaded.status, helix_db::models::TaskStatus::Pending);
    assert!(reloaded.worker_id.is_none());
    assert_eq!(reloaded.retry_count, 1);

    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn job_progress_tracks_task_status_counts() {
    let (pool, db_name) = create_test_db().await;

    let job = jobs::insert_job(&pool, json!({})).await.unwrap();
    tasks::insert_task(&pool, job.id, "drafter", json!({})).await.unwrap();
    let t2 = tasks::insert_task(&pool, job.id, "editor", json!({})).await.unwrap();

    tasks::claim_task(&pool, "editor", "worker-a").await.unwrap();
    let mut tx = pool.begin().await.unwrap();
    tasks::complete_task(
        &mut tx,
        t2.id,
        job.id,
        "worker-a",
        json!({"ok": true}),
        "editor",
        "edit.v1",
    )
    .await
    .unwrap();
    tx.commit().await.unwrap();

    let progress = tasks::get_job_progress(&pool, job.id).await.unwrap();
    assert_eq!(progress.pending, 1);
    assert_eq!(progress.completed, 1);
    assert!(!tasks::is_job_complete(&pool, job.id).await.unwrap());

    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn requeue_after_evolution_resets_a_terminally_failed_task() {
    let (pool, db_name) = create_test_db().await;

    let job = jobs::insert_job(&pool, json!({})).await.unwrap();
    let task = tasks::insert_task(&pool, job.id, "drafter", json!({}))
        .await
        .unwrap();
    tasks::claim_task(&pool, "drafter", "worker-a").await.unwrap();
    tasks::fail_task(
        &pool,
        task.id,
        "worker-a",
        "schema mismatch",
        ErrorKind::ExecutorPermanent,
        10,
    )
    .await
    .unwrap();

    assert!(tasks::requeue_after_evolution(&pool, task.id).await.unwrap());

    let reloaded = tasks::get_task(&pool, task.id).await.unwrap().unwrap();
    assert_eq!(reloaded.status, helix_db::models::TaskStatus::Pending);
    assert_eq!(reloaded.retry_count, 0);
    assert!(reloaded.error_kind.is_none());

    drop_test_db(&db_name).await;
}
