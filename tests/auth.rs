use httpmock::Method::{GET, POST};
use httpmock::MockServer;
use serde_json::json;

use routine_os::auth::AuthClient;
use routine_os::error::RoutineOsError;

fn session_body() -> serde_json::Value {
    json!({
        "access_token": "jwt-access",
        "token_type": "bearer",
        "expires_in": 3600,
        "refresh_token": "jwt-refresh",
        "user": {"id": "user-1", "email": "me@example.com", "aud": "authenticated"}
    })
}

#[tokio::test]
async fn password_sign_in_returns_a_session() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/auth/v1/token")
                .query_param("grant_type", "password")
                .header("apikey", "anon")
                .json_body(json!({"email": "me@example.com", "password": "hunter2"}));
            then.status(200).json_body(session_body());
        })
        .await;

    let client = AuthClient::new(server.base_url(), "anon");
    let session = client
        .sign_in_with_password(" me@example.com ", "hunter2")
        .await
        .unwrap();
    mock.assert_async().await;
    assert_eq!(session.access_token, "jwt-access");
    assert_eq!(session.refresh_token.as_deref(), Some("jwt-refresh"));
    assert_eq!(session.user.id, "user-1");
}

#[tokio::test]
async fn bad_credentials_surface_the_service_message() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/auth/v1/token");
            then.status(400).json_body(json!({
                "error": "invalid_grant",
                "error_description": "Invalid login credentials"
            }));
        })
        .await;

    let client = AuthClient::new(server.base_url(), "anon");
    let err = client
        .sign_in_with_password("me@example.com", "wrong")
        .await
        .unwrap_err();
    match err {
        RoutineOsError::Auth(message) => assert_eq!(message, "Invalid login credentials"),
        other => panic!("expected auth error, got {other:?}"),
    }
}

#[tokio::test]
async fn sign_up_waits_for_confirmation_or_signs_in() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/auth/v1/signup")
                .json_body(json!({"email": "new@example.com", "password": "pw"}));
            then.status(200)
                .json_body(json!({"id": "user-2", "email": "new@example.com", "confirmation_sent_at": "2024-01-01T00:00:00Z"}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/auth/v1/signup")
                .json_body(json!({"email": "me@example.com", "password": "pw"}));
            then.status(200).json_body(session_body());
        })
        .await;

    let client = AuthClient::new(server.base_url(), "anon");
    assert!(client.sign_up("new@example.com", "pw").await.unwrap().is_none());
    let session = client.sign_up("me@example.com", "pw").await.unwrap().unwrap();
    assert_eq!(session.user.email.as_deref(), Some("me@example.com"));
}

#[tokio::test]
async fn user_lookup_and_sign_out_use_the_access_token() {
    let server = MockServer::start_async().await;
    let user = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/auth/v1/user")
                .header("authorization", "Bearer jwt-access");
            then.status(200)
                .json_body(json!({"id": "user-1", "email": "me@example.com"}));
        })
        .await;
    let logout = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/auth/v1/logout")
                .header("authorization", "Bearer jwt-access");
            then.status(204);
        })
        .await;

    let client = AuthClient::new(format!("{}/", server.base_url()), "anon");
    let found = client.get_user("jwt-access").await.unwrap();
    user.assert_async().await;
    assert_eq!(found.id, "user-1");

    client.sign_out("jwt-access").await.unwrap();
    logout.assert_async().await;
}
