//! Handler lifecycle tests: authorization, acquire/release pairing, rollback.

mod common;

use axum::body::Bytes;
use axum::http::{HeaderMap, HeaderValue, header};
use common::{MockSource, TOKEN, gateway, gateway_with};
use sql_gateway::error::ErrorKind;
use sql_gateway::handlers::RequestInput;
use std::time::Duration;

fn authorized() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::AUTHORIZATION,
        HeaderValue::from_str(&format!("Basic {}", TOKEN)).unwrap(),
    );
    headers
}

fn json(body: &str) -> RequestInput {
    RequestInput {
        query: None,
        content_type: Some("application/json".to_string()),
        body: Bytes::from(body.to_string()),
    }
}

#[tokio::test]
async fn test_unauthorized_request_touches_no_pool() {
    let (source, gateway) = gateway(MockSource::default());

    let err = gateway
        .upsert(
            &HeaderMap::new(),
            &json(r#"{"database": "app", "table": "t", "row": {"id": 1}}"#),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Authorization);
    assert_eq!(source.acquires(), 0);
    assert_eq!(source.release_calls(), 1);
    assert_eq!(source.releases(), 0);
    assert!(source.executed().is_empty());
}

#[tokio::test]
async fn test_wrong_token_rejected_for_query() {
    let (source, gateway) = gateway(MockSource::default());
    let mut headers = HeaderMap::new();
    headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer nope"));

    let err = gateway
        .query(&headers, &json(r#"{"database": "app", "sql": "SELECT 1"}"#))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Authorization);
    assert_eq!(source.acquires(), 0);
}

#[tokio::test]
async fn test_invalid_request_is_rejected_before_acquire() {
    let (source, gateway) = gateway(MockSource::default());

    let err = gateway
        .upsert(&authorized(), &json(r#"{"database": "app", "row": {"id": 1}}"#))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = gateway
        .upsert(
            &authorized(),
            &json(r#"{"database": "app", "table": "bad\u0000name", "row": {"id": 1}}"#),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    assert_eq!(source.acquires(), 0);
    assert_eq!(source.release_calls(), 2);
}

#[tokio::test]
async fn test_single_row_upsert() {
    let (source, gateway) = gateway(MockSource::default());

    let out = gateway
        .upsert(
            &authorized(),
            &json(r#"{"database": "app", "table": "users", "row": {"id": 1, "name": "Ann"}}"#),
        )
        .await
        .unwrap();

    assert_eq!(out.rows_affected(), Some(1));
    assert_eq!(
        source.executed(),
        vec![
            "INSERT INTO `users` (`id`, `name`) VALUES (?, ?) ON DUPLICATE KEY UPDATE `id` = VALUES(`id`), `name` = VALUES(`name`)"
        ]
    );
    assert_eq!(source.databases.lock().unwrap().as_slice(), ["app"]);
    assert_eq!(source.acquires(), 1);
    assert_eq!(source.releases(), 1);
    assert_eq!(source.leased(), 0);
}

#[tokio::test]
async fn test_single_row_failure_has_no_rollback() {
    let (source, gateway) = gateway(MockSource::failing_on(&["INSERT"]));

    let err = gateway
        .upsert(
            &authorized(),
            &json(r#"{"database": "app", "table": "users", "row": {"id": 1}}"#),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Query);
    assert_eq!(source.executed().len(), 1);
    assert_eq!(source.releases(), 1);
}

#[tokio::test]
async fn test_multi_row_upsert_is_wrapped_in_transaction() {
    let (source, gateway) = gateway(MockSource::default());

    gateway
        .upsert(
            &authorized(),
            &json(r#"{"database": "app", "table": "t", "rows": [{"id": 1}, {"id": 2}, {"id": 3}]}"#),
        )
        .await
        .unwrap();

    let log = source.executed();
    assert_eq!(log.len(), 5);
    assert_eq!(log[0], "START TRANSACTION");
    assert_eq!(log[4], "COMMIT");
}

#[tokio::test]
async fn test_multi_row_failure_rolls_back_and_keeps_original_error() {
    let (source, gateway) = gateway(MockSource::failing_on(&["`name`"]));

    let err = gateway
        .upsert(
            &authorized(),
            &json(r#"{"database": "app", "table": "users", "rows": [{"id": 1}, {"id": 2, "name": "B"}]}"#),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Query);
    assert_eq!(err.sql_state(), Some("23000"));
    assert!(err.to_string().contains("Duplicate entry"));

    let log = source.executed();
    assert_eq!(log.len(), 4);
    assert_eq!(log[3], "ROLLBACK");
    assert!(!log.contains(&"COMMIT".to_string()));
    assert_eq!(source.releases(), 1);
    assert_eq!(source.leased(), 0);
}

#[tokio::test]
async fn test_pool_failure_releases_nothing() {
    let (source, gateway) = gateway(MockSource {
        fail_acquire: true,
        ..Default::default()
    });

    let err = gateway
        .query(&authorized(), &json(r#"{"database": "app", "sql": "SELECT 1"}"#))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Pool);
    assert_eq!(source.acquires(), 1);
    assert_eq!(source.release_calls(), 1);
    assert_eq!(source.releases(), 0);
}

#[tokio::test]
async fn test_query_returns_rows() {
    let (source, gateway) = gateway(MockSource::default());

    let out = gateway
        .query(
            &authorized(),
            &json(r#"{"database": "app", "sql": "SELECT * FROM ?? WHERE id IN (?)", "format": ["users", [1, 2]]}"#),
        )
        .await
        .unwrap();

    assert_eq!(out.row_count(), 1);
    assert_eq!(
        source.executed(),
        vec!["SELECT * FROM `users` WHERE id IN (?, ?)"]
    );
}

#[tokio::test]
async fn test_multiple_statements_need_server_opt_in() {
    let body = r#"{"database": "app", "sql": "UPDATE t SET a = 1; SELECT a FROM t", "multiple_statements": true}"#;

    let (source, gateway) = gateway(MockSource::default());
    let err = gateway.query(&authorized(), &json(body)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(source.executed().is_empty());
    assert_eq!(source.acquires(), source.releases());

    let (source, gateway) = gateway_with(MockSource::default(), true);
    let out = gateway.query(&authorized(), &json(body)).await.unwrap();
    assert_eq!(out.row_count(), 1);
    assert_eq!(source.executed().len(), 1);
}

#[tokio::test]
async fn test_concurrent_requests_pair_acquire_and_release() {
    const N: usize = 16;
    let (source, gateway) = gateway(MockSource {
        delay: Some(Duration::from_millis(20)),
        ..Default::default()
    });

    let handles: Vec<_> = (0..N)
        .map(|i| {
            let gateway = gateway.clone();
            tokio::spawn(async move {
                let body = format!(
                    r#"{{"database": "app", "table": "t", "row": {{"id": {}}}}}"#,
                    i
                );
                gateway.upsert(&authorized(), &json(&body)).await
            })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(source.acquires(), N);
    assert_eq!(source.releases(), N);
    assert_eq!(source.leased(), 0);
    assert!(source.peak_leased.load(std::sync::atomic::Ordering::SeqCst) >= 1);
}
