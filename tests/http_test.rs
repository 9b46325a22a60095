//! Router tests driven through `tower::ServiceExt::oneshot`.

mod common;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use common::{MockSource, TOKEN, gateway};
use serde_json::{Value, json};
use sql_gateway::transport::router;
use tower::ServiceExt;

const LIMIT: usize = 64 * 1024;

async fn body_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), LIMIT).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", TOKEN))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_root_liveness() {
    let (_, gateway) = gateway(MockSource::default());
    let app = router(gateway, LIMIT);

    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), LIMIT).await.unwrap();
    assert_eq!(&bytes[..], b"Hello World");
}

#[tokio::test]
async fn test_missing_token_is_401() {
    let (source, gateway) = gateway(MockSource::default());
    let app = router(gateway, LIMIT);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/query?database=app&sql=SELECT+1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["kind"], "authorization");
    assert!(body["error"].as_str().unwrap().contains("Authorization"));
    assert_eq!(source.acquires(), 0);
}

#[tokio::test]
async fn test_get_query_with_basic_auth() {
    let (source, gateway) = gateway(MockSource::default());
    let app = router(gateway, LIMIT);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/query?database=app&sql=SELECT+1")
                .header(header::AUTHORIZATION, format!("Basic {}", TOKEN))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!([{"ok": 1}]));
    assert_eq!(source.executed(), vec!["SELECT 1"]);
    assert_eq!(source.releases(), 1);
}

#[tokio::test]
async fn test_post_query_form_body() {
    let (source, gateway) = gateway(MockSource::default());
    let app = router(gateway, LIMIT);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/query")
                .header(header::AUTHORIZATION, format!("Basic {}", TOKEN))
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(
                    "database=app&sql=SELECT+*+FROM+t+WHERE+id+%3D+%3F&format=%5B5%5D",
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(source.executed(), vec!["SELECT * FROM t WHERE id = ?"]);
}

#[tokio::test]
async fn test_upsert_returns_summary() {
    let (source, gateway) = gateway(MockSource::default());
    let app = router(gateway, LIMIT);

    let response = app
        .oneshot(post_json(
            "/upsert",
            json!({"database": "app", "table": "users", "rows": [{"id": 1}, {"id": 2}]}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({"rows_affected": 1, "last_insert_id": 0})
    );
    assert_eq!(source.executed().len(), 4);
}

#[tokio::test]
async fn test_upsert_validation_error_is_400() {
    let (_, gateway) = gateway(MockSource::default());
    let app = router(gateway, LIMIT);

    let response = app
        .oneshot(post_json("/upsert", json!({"database": "app", "row": {"id": 1}})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["kind"], "validation");
    assert!(body["error"].as_str().unwrap().contains("table"));
}

#[tokio::test]
async fn test_engine_error_carries_message_and_sql_state() {
    let (_, gateway) = gateway(MockSource::failing_on(&["INSERT"]));
    let app = router(gateway, LIMIT);

    let response = app
        .oneshot(post_json(
            "/upsert",
            json!({"database": "app", "table": "users", "row": {"id": 1}}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["kind"], "query");
    assert_eq!(body["sql_state"], "23000");
    assert_eq!(body["error"], "Duplicate entry '1' for key 'PRIMARY'");
}

#[tokio::test]
async fn test_pool_error_is_503() {
    let (_, gateway) = gateway(MockSource {
        fail_acquire: true,
        ..Default::default()
    });
    let app = router(gateway, LIMIT);

    let response = app
        .oneshot(post_json(
            "/query",
            json!({"database": "app", "sql": "SELECT 1"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(response).await;
    assert_eq!(body["kind"], "pool");
    assert!(body["suggestion"].is_string());
}

#[tokio::test]
async fn test_body_over_limit_is_rejected() {
    let (source, gateway) = gateway(MockSource::default());
    let app = router(gateway, 128);

    let response = app
        .oneshot(post_json(
            "/upsert",
            json!({"database": "app", "table": "t", "row": {"blob": "x".repeat(1024)}}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(source.acquires(), 0);
}

#[tokio::test]
async fn test_upsert_requires_post() {
    let (_, gateway) = gateway(MockSource::default());
    let app = router(gateway, LIMIT);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/upsert?database=app&table=t")
                .header(header::AUTHORIZATION, format!("Basic {}", TOKEN))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}
