use helix_db::queries::prompts;
use helix_test_utils::{create_test_db, drop_test_db};

#[tokio::test]
async fn installing_a_prompt_deactivates_the_previous_one() {
    let (pool, db_name) = create_test_db().await;

    let v1 = prompts::install_prompt(&pool, "drafter", "v1", "write a draft", "operator")
        .await
        .unwrap();
    assert!(v1.is_active);

    let v2 = prompts::install_prompt(&pool, "drafter", "v2", "write a better draft", "evolution")
        .await
        .unwrap();
    assert!(v2.is_active);

    let active = prompts::get_active_prompt(&pool, "drafter")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(active.version, "v2");

    let versions = prompts::list_versions(&pool, "drafter").await.unwrap();
    assert_eq!(versions.len(), 2);

    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn rollback_reactivates_a_prior_version() {
    let (pool, db_name) = create_test_db().await;

    prompts::install_prompt(&pool, "editor", "v1", "edit for clarity", "operator")
        .await
        .unwrap();
    prompts::install_prompt(&pool, "editor", "v2", "edit for clarity and tone", "evolution")
        .await
        .unwrap();

    let rolled_back = prompts::rollback_to_version(&pool, "editor", "v1").await.unwrap();
    assert!(rolled_back.is_active);
    assert_eq!(rolled_back.version, "v1");

    let active = prompts::get_active_prompt(&pool, "editor")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(active.version, "v1");

    drop_test_db(&db_name).await;
}
