use helix_db::models::JobStatus;
use helix_db::queries::jobs;
use helix_test_utils::{create_test_db, drop_test_db};
use serde_json::json;

#[tokio::test]
async fn job_lifecycle_transitions() {
    let (pool, db_name) = create_test_db().await;

    let job = jobs::insert_job(&pool, json!({"prompt": "draft a blog post"}))
        .await
        .unwrap();
    assert_eq!(job.status, JobStatus::Pending);

    assert!(jobs::mark_job_in_progress(&pool, job.id).await.unwrap());
    // Already in progress: a second call must be a no-op, not a silent double-transition.
    assert!(!jobs::mark_job_in_progress(&pool, job.id).await.unwrap());

    assert!(jobs::complete_job(&pool, job.id).await.unwrap());
    let reloaded = jobs::get_job(&pool, job.id).await.unwrap().unwrap();
    assert_eq!(reloaded.status, JobStatus::Completed);
    assert!(reloaded.completed_at.is_some());

    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn list_jobs_filters_by_status() {
    let (pool, db_name) = create_test_db().await;

    let a = jobs::insert_job(&pool, json!({})).await.unwrap();
    let _b = jobs::insert_job(&pool, json!({})).await.unwrap();
    jobs::mark_job_in_progress(&pool, a.id).await.unwrap();

    let pending = jobs::list_jobs(&pool, Some(JobStatus::Pending)).await.unwrap();
    assert_eq!(pending.len(), 1);

    let all = jobs::list_jobs(&pool, None).await.unwrap();
    assert_eq!(all.len(), 2);

    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn fail_job_records_error_message() {
    let (pool, db_name) = create_test_db().await;

    let job = jobs::insert_job(&pool, json!({})).await.unwrap();
    assert!(jobs::fail_job(&pool, job.id, "no agent claimed any task")
        .await
        .unwrap());

    let reloaded = jobs::get_job(&pool, job.id).await.unwrap().unwrap();
    assert_eq!(reloaded.status, JobStatus::Failed);
    assert_eq!(
        reloaded.error_message.as_deref(),
        Some("no agent claimed any task")
    );

    drop_test_db(&db_name).await;
}
