//! End-to-end webhook pipeline tests.
//!
//! Drives the full axum application against an in-memory database: handshake,
//! signature enforcement, normalization of both wire shapes, tenant
//! resolution policy, idempotent persistence under replay, quarantine, and
//! enrichment wiring.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use migration::{Migrator, MigratorTrait};
use sea_orm::{ActiveModelTrait, EntityTrait, PaginatorTrait, Set};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use dm_ingest::config::AppConfig;
use dm_ingest::db::init_pool;
use dm_ingest::models::{connection, message, unmatched_event};
use dm_ingest::server::{AppState, build_state, create_app};
use dm_ingest::webhook_verification::sign_body;

const APP_SECRET: &str = "test-app-secret";
const VERIFY_TOKEN: &str = "hub-verify-token";

fn test_config() -> AppConfig {
    AppConfig {
        profile: "test".to_string(),
        database_url: "sqlite::memory:".to_string(),
        db_max_connections: 1,
        app_secret: Some(APP_SECRET.to_string()),
        webhook_verify_token: Some(VERIFY_TOKEN.to_string()),
        // Inline processing keeps assertions deterministic: by the time the
        // response arrives, the pipeline has finished.
        ingest_mode: "inline".to_string(),
        ..Default::default()
    }
}

async fn setup_app(config: AppConfig) -> (AppState, Router) {
    let db = init_pool(&config).await.expect("Failed to init test DB");
    Migrator::up(&db, None).await.unwrap();

    let state = build_state(Arc::new(config), db, CancellationToken::new());
    let app = create_app(state.clone());
    (state, app)
}

async fn create_tenant_with_connection(state: &AppState, account_id: &str) -> Uuid {
    let tenant_id = Uuid::new_v4();
    dm_ingest::models::tenant::ActiveModel {
        id: Set(tenant_id),
        name: Set(Some("Test Tenant".to_string())),
        created_at: Set(Utc::now().into()),
    }
    .insert(&state.db)
    .await
    .unwrap();

    connection::ActiveModel {
        id: Set(Uuid::new_v4()),
        tenant_id: Set(tenant_id),
        platform_account_id: Set(account_id.to_string()),
        status: Set("active".to_string()),
        display_name: Set(None),
        last_event_at: Set(None),
        created_at: Set(Utc::now().into()),
        updated_at: Set(Utc::now().into()),
    }
    .insert(&state.db)
    .await
    .unwrap();

    tenant_id
}

fn delivery_body(mid: &str, account_id: &str) -> String {
    json!({
        "object": "instagram",
        "entry": [{
            "id": account_id,
            "time": 1717243200000i64,
            "messaging": [{
                "sender": {"id": "u1"},
                "recipient": {"id": account_id},
                "timestamp": 1717243200000i64,
                "message": {"mid": mid, "text": "hi"}
            }]
        }]
    })
    .to_string()
}

fn signed_post(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/webhooks/instagram")
        .header("Content-Type", "application/json")
        .header("X-Hub-Signature-256", sign_body(body.as_bytes(), APP_SECRET))
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn message_count(state: &AppState) -> u64 {
    message::Entity::find().count(&state.db).await.unwrap()
}

async fn quarantine_count(state: &AppState) -> u64 {
    unmatched_event::Entity::find()
        .count(&state.db)
        .await
        .unwrap()
}

#[tokio::test]
async fn handshake_echoes_challenge_as_plain_text() {
    let (_state, app) = setup_app(test_config()).await;

    let request = Request::builder()
        .method("GET")
        .uri(format!(
            "/webhooks/instagram?hub.mode=subscribe&hub.verify_token={}&hub.challenge=1158201444",
            VERIFY_TOKEN
        ))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"1158201444");
}

#[tokio::test]
async fn handshake_rejects_wrong_token() {
    let (_state, app) = setup_app(test_config()).await;

    let request = Request::builder()
        .method("GET")
        .uri("/webhooks/instagram?hub.mode=subscribe&hub.verify_token=wrong&hub.challenge=123")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let error: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(error["code"], "FORBIDDEN");
}

#[tokio::test]
async fn handshake_rejects_wrong_mode() {
    let (_state, app) = setup_app(test_config()).await;

    let request = Request::builder()
        .method("GET")
        .uri(format!(
            "/webhooks/instagram?hub.mode=unsubscribe&hub.verify_token={}&hub.challenge=123",
            VERIFY_TOKEN
        ))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn valid_delivery_stores_exactly_one_message() {
    let (state, app) = setup_app(test_config()).await;
    let tenant_id = create_tenant_with_connection(&state, "acct1").await;

    let body = delivery_body("m1", "acct1");
    let response = app.oneshot(signed_post(&body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let ack = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let ack: serde_json::Value = serde_json::from_slice(&ack).unwrap();
    assert_eq!(ack, json!({"ok": true}));

    let stored = message::Entity::find().all(&state.db).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].platform_message_id.as_deref(), Some("m1"));
    assert_eq!(stored[0].tenant_id, tenant_id);
    assert_eq!(stored[0].sender_id, "u1");
    assert_eq!(stored[0].recipient_id, "acct1");
    assert_eq!(stored[0].text.as_deref(), Some("hi"));

    // Attribution side effect: the connection's last_event_at is set.
    let conn = connection::Entity::find()
        .one(&state.db)
        .await
        .unwrap()
        .unwrap();
    assert!(conn.last_event_at.is_some());
}

#[tokio::test]
async fn replayed_delivery_stores_exactly_one_message() {
    let (state, app) = setup_app(test_config()).await;
    create_tenant_with_connection(&state, "acct1").await;

    let body = delivery_body("m1", "acct1");

    let first = app.clone().oneshot(signed_post(&body)).await.unwrap();
    let second = app.oneshot(signed_post(&body)).await.unwrap();

    // No error surfaced on the duplicate delivery.
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(second.status(), StatusCode::OK);

    assert_eq!(message_count(&state).await, 1);
}

#[tokio::test]
async fn concurrent_replay_stores_exactly_one_message() {
    let (state, app) = setup_app(test_config()).await;
    create_tenant_with_connection(&state, "acct1").await;

    let body = delivery_body("m1", "acct1");

    let (a, b) = tokio::join!(
        app.clone().oneshot(signed_post(&body)),
        app.clone().oneshot(signed_post(&body)),
    );
    assert_eq!(a.unwrap().status(), StatusCode::OK);
    assert_eq!(b.unwrap().status(), StatusCode::OK);

    assert_eq!(message_count(&state).await, 1);
}

#[tokio::test]
async fn wrong_signature_is_rejected_with_no_writes() {
    let (state, app) = setup_app(test_config()).await;
    create_tenant_with_connection(&state, "acct1").await;

    let body = delivery_body("m1", "acct1");
    let request = Request::builder()
        .method("POST")
        .uri("/webhooks/instagram")
        .header("Content-Type", "application/json")
        .header("X-Hub-Signature-256", "sha256=deadbeef")
        .body(Body::from(body))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // No database writes of any kind.
    assert_eq!(message_count(&state).await, 0);
    assert_eq!(quarantine_count(&state).await, 0);
}

#[tokio::test]
async fn missing_signature_is_rejected() {
    let (state, app) = setup_app(test_config()).await;

    let body = delivery_body("m1", "acct1");
    let request = Request::builder()
        .method("POST")
        .uri("/webhooks/instagram")
        .header("Content-Type", "application/json")
        .body(Body::from(body))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(message_count(&state).await, 0);
}

#[tokio::test]
async fn bare_hex_signature_is_accepted() {
    let (state, app) = setup_app(test_config()).await;
    create_tenant_with_connection(&state, "acct1").await;

    let body = delivery_body("m1", "acct1");
    let signature = sign_body(body.as_bytes(), APP_SECRET);
    let bare = signature.strip_prefix("sha256=").unwrap();

    let request = Request::builder()
        .method("POST")
        .uri("/webhooks/instagram")
        .header("Content-Type", "application/json")
        .header("X-Hub-Signature-256", bare)
        .body(Body::from(body.clone()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(message_count(&state).await, 1);
}

#[tokio::test]
async fn malformed_json_after_valid_signature_is_a_400() {
    let (state, app) = setup_app(test_config()).await;

    let body = "{not json";
    let response = app.oneshot(signed_post(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let payload = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let error: serde_json::Value = serde_json::from_slice(&payload).unwrap();
    assert_eq!(error["code"], "VALIDATION_FAILED");

    assert_eq!(message_count(&state).await, 0);
}

#[tokio::test]
async fn deliveries_for_other_objects_are_ignored_with_200() {
    let (state, app) = setup_app(test_config()).await;

    let body = json!({"object": "page", "entry": []}).to_string();
    let response = app.oneshot(signed_post(&body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(message_count(&state).await, 0);
    assert_eq!(quarantine_count(&state).await, 0);
}

#[tokio::test]
async fn unmatched_real_account_is_quarantined_not_misattributed() {
    let (state, app) = setup_app(test_config()).await;
    // A connection exists, but for a different account.
    create_tenant_with_connection(&state, "acct1").await;

    let body = delivery_body("m7", "stranger-acct");
    let response = app.oneshot(signed_post(&body)).await.unwrap();

    // Still acknowledged: retrying would never resolve differently.
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(message_count(&state).await, 0);

    let quarantined = unmatched_event::Entity::find()
        .all(&state.db)
        .await
        .unwrap();
    assert_eq!(quarantined.len(), 1);
    assert_eq!(quarantined[0].platform_account_id, "stranger-acct");
    assert_eq!(quarantined[0].platform_message_id.as_deref(), Some("m7"));
}

#[tokio::test]
async fn sentinel_test_event_resolves_via_fallback() {
    let (state, app) = setup_app(test_config()).await;
    let tenant_id = create_tenant_with_connection(&state, "acct1").await;

    // Entry id "0" is the platform's synthetic test account.
    let body = delivery_body("test-mid", "0");
    let response = app.oneshot(signed_post(&body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let stored = message::Entity::find().all(&state.db).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].tenant_id, tenant_id);
    assert_eq!(quarantine_count(&state).await, 0);
}

#[tokio::test]
async fn changes_shape_delivery_is_normalized_and_stored() {
    let (state, app) = setup_app(test_config()).await;
    let tenant_id = create_tenant_with_connection(&state, "acct1").await;

    let body = json!({
        "object": "instagram",
        "entry": [{
            "id": "acct1",
            "time": 1717243200000i64,
            "changes": [
                {"field": "comments", "value": {"comment_id": "c1"}},
                {"field": "messages", "value": {
                    "sender": {"id": "u1"},
                    "recipient": {"id": "acct1"},
                    "timestamp": 1717243200000i64,
                    "message": {"mid": "m-changes", "text": "hello"}
                }}
            ]
        }]
    })
    .to_string();

    let response = app.oneshot(signed_post(&body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let stored = message::Entity::find().all(&state.db).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].tenant_id, tenant_id);
    assert_eq!(stored[0].platform_message_id.as_deref(), Some("m-changes"));
    assert_eq!(stored[0].text.as_deref(), Some("hello"));
}

#[tokio::test]
async fn partial_failure_is_isolated_within_a_delivery() {
    let (state, app) = setup_app(test_config()).await;
    create_tenant_with_connection(&state, "acct1").await;

    // One resolvable entry and one unknown account in the same delivery.
    let body = json!({
        "object": "instagram",
        "entry": [
            {
                "id": "stranger-acct",
                "messaging": [{
                    "sender": {"id": "u9"},
                    "recipient": {"id": "stranger-acct"},
                    "message": {"mid": "m-bad", "text": "lost"}
                }]
            },
            {
                "id": "acct1",
                "messaging": [{
                    "sender": {"id": "u1"},
                    "recipient": {"id": "acct1"},
                    "message": {"mid": "m-good", "text": "kept"}
                }]
            }
        ]
    })
    .to_string();

    let response = app.oneshot(signed_post(&body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let stored = message::Entity::find().all(&state.db).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].platform_message_id.as_deref(), Some("m-good"));

    assert_eq!(quarantine_count(&state).await, 1);
}

#[tokio::test]
async fn queued_mode_acknowledges_before_processing_completes() {
    let mut config = test_config();
    config.ingest_mode = "queued".to_string();

    let (state, app) = setup_app(config).await;
    create_tenant_with_connection(&state, "acct1").await;

    let body = delivery_body("m-queued", "acct1");
    let response = app.oneshot(signed_post(&body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // The worker picks the job up after the acknowledgment; poll for it.
    let mut stored = 0;
    for _ in 0..100 {
        stored = message_count(&state).await;
        if stored == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(stored, 1);
}

#[tokio::test]
async fn enrichment_attaches_profiles_end_to_end() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "Alice",
            "username": "alice.ig"
        })))
        .mount(&server)
        .await;

    let mut config = test_config();
    config.profile_api_base = server.uri();
    config.profile_api_token = Some("graph-token".to_string());

    let (state, app) = setup_app(config).await;
    create_tenant_with_connection(&state, "acct1").await;

    let body = delivery_body("m1", "acct1");
    let response = app.oneshot(signed_post(&body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let stored = message::Entity::find()
        .one(&state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.sender_name.as_deref(), Some("Alice"));
    assert_eq!(stored.recipient_name.as_deref(), Some("Alice"));
}

#[tokio::test]
async fn enrichment_failure_does_not_fail_the_delivery() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let mut config = test_config();
    config.profile_api_base = server.uri();
    config.profile_api_token = Some("graph-token".to_string());

    let (state, app) = setup_app(config).await;
    create_tenant_with_connection(&state, "acct1").await;

    let body = delivery_body("m1", "acct1");
    let response = app.oneshot(signed_post(&body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Stored without names; the primary write survived the collaborator
    // outage.
    let stored = message::Entity::find()
        .one(&state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.platform_message_id.as_deref(), Some("m1"));
    assert_eq!(stored.sender_name, None);
}

#[tokio::test]
async fn root_and_healthz_respond() {
    let (_state, app) = setup_app(test_config()).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/healthz")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
