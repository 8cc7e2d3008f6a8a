mod common;

use axum::http::{HeaderValue, StatusCode};
use common::{Signed, body_json, error_code, test_app};
use content_api_server::models::idempotency::IdempotencyStatus;
use tower::ServiceExt;

const BODY: &str = r#"{"title":"Launch","content":"We are live","tags":["news"],"status":"published"}"#;
// Same payload, different key order and whitespace
const REORDERED_BODY: &str = r#"{ "status": "published", "tags": ["news"],
    "content": "We are live", "title": "Launch" }"#;

#[tokio::test]
async fn retry_with_same_key_replays_first_response() {
    let app = test_app(&["content:write"]);

    let first = app
        .router
        .clone()
        .oneshot(
            Signed::new("POST", "/v1/posts", BODY)
                .header("Idempotency-Key", "launch-1")
                .build(),
        )
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);
    let first = body_json(first).await;

    // A retry is a new signed request: fresh nonce, same idempotency key
    let second = app
        .router
        .oneshot(
            Signed::new("POST", "/v1/posts", REORDERED_BODY)
                .header("Idempotency-Key", "launch-1")
                .build(),
        )
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CREATED);
    let second = body_json(second).await;

    assert_eq!(first, second);
    assert_eq!(app.store.post_count(), 1);

    let record = app.store.idempotency_record("launch-1").unwrap();
    assert_eq!(record.status, IdempotencyStatus::Completed);
    assert_eq!(record.response.as_ref(), Some(&first));
}

#[tokio::test]
async fn same_key_with_different_payload_conflicts() {
    let app = test_app(&["content:write"]);

    let response = app
        .router
        .clone()
        .oneshot(
            Signed::new("POST", "/v1/posts", BODY)
                .header("Idempotency-Key", "launch-2")
                .build(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let other = BODY.replace("We are live", "Postponed");
    let response = app
        .router
        .oneshot(
            Signed::new("POST", "/v1/posts", &other)
                .header("Idempotency-Key", "launch-2")
                .build(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(error_code(&body), "idempotency_conflict");
    assert_eq!(body["error"]["retryable"], false);
    assert_eq!(app.store.post_count(), 1);
}

#[tokio::test]
async fn requests_without_a_key_are_not_deduplicated() {
    let app = test_app(&["content:write"]);

    for _ in 0..2 {
        let response = app
            .router
            .clone()
            .oneshot(
                Signed::new("POST", "/v1/posts", BODY)
                    .header("Idempotency-Key", "  ")
                    .build(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }
    assert_eq!(app.store.post_count(), 2);
}

#[tokio::test]
async fn invalid_payload_never_claims_the_key() {
    let app = test_app(&["content:write"]);

    let response = app
        .router
        .clone()
        .oneshot(
            Signed::new("POST", "/v1/posts", r#"{"title":"   ","content":"x"}"#)
                .header("Idempotency-Key", "launch-3")
                .build(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body_json(response).await), "invalid_payload");
    assert!(app.store.idempotency_record("launch-3").is_none());

    let response = app
        .router
        .oneshot(
            Signed::new("POST", "/v1/posts", r#"{"title":"t","content":"x","extra":1}"#)
                .header("Idempotency-Key", "launch-3")
                .build(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn concurrent_retries_execute_once() {
    let app = test_app(&["content:write"]);

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let router = app.router.clone();
            tokio::spawn(async move {
                let response = router
                    .oneshot(
                        Signed::new("POST", "/v1/posts", BODY)
                            .header("Idempotency-Key", "launch-4")
                            .build(),
                    )
                    .await
                    .unwrap();
                let status = response.status();
                (status, body_json(response).await)
            })
        })
        .collect();

    let mut created = Vec::new();
    for task in tasks {
        let (status, body) = task.await.unwrap();
        match status {
            StatusCode::CREATED => created.push(body),
            StatusCode::CONFLICT => {
                assert_eq!(error_code(&body), "idempotency_in_progress");
                assert_eq!(body["error"]["retryable"], true);
            }
            other => panic!("unexpected status {other}: {body}"),
        }
    }

    assert!(!created.is_empty());
    assert!(created.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(app.store.post_count(), 1);
}

#[tokio::test]
async fn non_ascii_keys_still_deduplicate() {
    let app = test_app(&["content:write"]);

    let mut bodies = Vec::new();
    for _ in 0..2 {
        let mut request = Signed::new("POST", "/v1/posts", BODY).build();
        request.headers_mut().insert(
            "idempotency-key",
            HeaderValue::from_bytes("clé-1".as_bytes()).unwrap(),
        );
        let response = app.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        bodies.push(body_json(response).await);
    }

    assert_eq!(bodies[0], bodies[1]);
    assert_eq!(app.store.post_count(), 1);
    assert!(app.store.idempotency_record("clé-1").is_some());
}

#[tokio::test]
async fn undecodable_key_is_rejected_not_ignored() {
    let app = test_app(&["content:write"]);

    let mut request = Signed::new("POST", "/v1/posts", BODY).build();
    request.headers_mut().insert(
        "idempotency-key",
        HeaderValue::from_bytes(&[b'k', 0xe9, b'-', b'1']).unwrap(),
    );
    let response = app.router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body_json(response).await), "invalid_payload");
    assert_eq!(app.store.post_count(), 0);
}
