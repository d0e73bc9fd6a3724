use httpmock::Method::{DELETE, GET, PATCH, POST};
use httpmock::MockServer;
use serde_json::json;

use chrono::NaiveDate;
use routine_os::auth::{AuthUser, Session};
use routine_os::domains::{Frequency, HabitStatus, System};
use routine_os::error::RoutineOsError;
use routine_os::interfaces::store::HabitStore;
use routine_os::store::SupabaseStore;

fn session() -> Session {
    Session {
        access_token: "access".to_string(),
        refresh_token: Some("refresh".to_string()),
        expires_in: Some(3600),
        user: AuthUser {
            id: "user-1".to_string(),
            email: Some("me@example.com".to_string()),
        },
    }
}

#[tokio::test]
async fn lists_rows_for_the_signed_in_user() {
    let server = MockServer::start_async().await;
    let systems = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/rest/v1/systems")
                .header("apikey", "anon")
                .header("authorization", "Bearer access")
                .query_param("user_id", "eq.user-1")
                .query_param("order", "order_index.asc");
            then.status(200).json_body(json!([
                {"id": "s1", "name": "Body", "color": null, "order_index": 1, "user_id": "user-1"}
            ]));
        })
        .await;
    let habits = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/rest/v1/habits")
                .query_param("user_id", "eq.user-1");
            then.status(200).json_body(json!([
                {
                    "id": "h1",
                    "system_id": "s1",
                    "name": "Walk",
                    "frequency": "everyOtherDay",
                    "status": "Completed",
                    "last_completed_on": "2024-02-01T07:30:00Z",
                    "completion_history": "[{\"date\":\"2024-02-01\",\"status\":\"done\"}]"
                },
                {"name": "No id"}
            ]));
        })
        .await;

    let store = SupabaseStore::new(server.base_url(), "anon", Some(session()));
    let loaded = store.list_systems().await.unwrap();
    systems.assert_async().await;
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].color, "#F97316");
    assert_eq!(loaded[0].order_index, 1);

    let loaded = store.list_habits().await.unwrap();
    habits.assert_async().await;
    assert_eq!(loaded.len(), 1);
    let walk = &loaded[0];
    assert_eq!(walk.frequency, Frequency::every_x_days(2));
    assert_eq!(walk.status, HabitStatus::Completed);
    assert_eq!(walk.last_completed_on, NaiveDate::from_ymd_opt(2024, 2, 1));
    assert_eq!(walk.completion_history.len(), 1);
    assert_eq!(walk.completion_history[0].status, HabitStatus::Completed);
}

#[tokio::test]
async fn upserts_merge_duplicates_with_owner() {
    let server = MockServer::start_async().await;
    let mut system = System::new("Home");
    system.id = "s1".to_string();
    let upsert = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/rest/v1/systems")
                .header("apikey", "anon")
                .header("prefer", "resolution=merge-duplicates,return=minimal")
                .json_body(json!([{
                    "id": "s1",
                    "name": "Home",
                    "description": "",
                    "color": "#F97316",
                    "icon": "✨",
                    "order_index": 0,
                    "user_id": "user-1"
                }]));
            then.status(201);
        })
        .await;

    let store = SupabaseStore::new(server.base_url(), "anon", Some(session()));
    store.upsert_system(&system).await.unwrap();
    upsert.assert_async().await;
}

#[tokio::test]
async fn deletes_and_status_patches_filter_by_id() {
    let server = MockServer::start_async().await;
    let delete = server
        .mock_async(|when, then| {
            when.method(DELETE)
                .path("/rest/v1/habits")
                .query_param("system_id", "eq.s1")
                .query_param("user_id", "eq.user-1");
            then.status(204);
        })
        .await;
    let patch = server
        .mock_async(|when, then| {
            when.method(PATCH)
                .path("/rest/v1/habits")
                .query_param("id", "eq.h1")
                .json_body(json!({
                    "status": "skipped",
                    "last_completed_on": null,
                    "completion_history": []
                }));
            then.status(204);
        })
        .await;

    let store = SupabaseStore::new(server.base_url(), "anon", Some(session()));
    store.delete_habits_for_system("s1").await.unwrap();
    delete.assert_async().await;
    store
        .update_habit_status("h1", HabitStatus::Skipped, None, &[])
        .await
        .unwrap();
    patch.assert_async().await;
}

#[tokio::test]
async fn rejected_requests_are_auth_errors() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/rest/v1/systems");
            then.status(401).json_body(json!({"message": "JWT expired"}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/rest/v1/habits");
            then.status(503).body("maintenance");
        })
        .await;

    let store = SupabaseStore::new(server.base_url(), "anon", None);
    let err = store.list_systems().await.unwrap_err();
    assert!(matches!(err, RoutineOsError::Auth(_)));
    let err = store.list_habits().await.unwrap_err();
    assert!(matches!(err, RoutineOsError::Http(_)));
}
