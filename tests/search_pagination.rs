mod common;

use axum::http::StatusCode;
use chrono::{Duration, TimeZone, Utc};
use common::{body_json, error_code, json_request, test_app};
use content_api_server::models::content::Post;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

fn post(title: &str, locale: &str, status: &str, published_minute: i64) -> Post {
    let base = Utc.with_ymd_and_hms(2025, 4, 1, 9, 0, 0).unwrap();
    let at = base + Duration::minutes(published_minute);
    Post {
        id: Uuid::new_v4(),
        locale: locale.to_string(),
        title: title.to_string(),
        slug: title.to_lowercase().replace(' ', "-"),
        excerpt: None,
        content: format!("{title} body about rust"),
        cover_url: None,
        tags: vec!["rust".to_string()],
        status: status.to_string(),
        published_at: Some(at),
        updated_by: None,
        created_at: base,
        updated_at: at,
    }
}

async fn search(router: &axum::Router, body: Value) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(json_request("POST", "/v1/public/search", &body))
        .await
        .unwrap();
    let status = response.status();
    (status, body_json(response).await)
}

#[tokio::test]
async fn walking_every_page_yields_the_full_ordered_set() {
    let app = test_app(&[]);
    // Groups of three share a timestamp so the id tie-break is exercised
    for i in 0..17 {
        app.store
            .insert_post(post(&format!("Post {i}"), "en", "published", i / 3));
    }
    app.store.insert_post(post("Draft", "en", "draft", 99));

    let (status, unbounded) = search(
        &app.router,
        json!({"section": "post", "query": "rust", "limit": 30}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(unbounded["hasMore"], false);
    assert!(unbounded["nextCursor"].is_null());
    let expected: Vec<Value> = unbounded["items"].as_array().unwrap().clone();
    assert_eq!(expected.len(), 17);

    let mut walked: Vec<Value> = Vec::new();
    let mut cursor = Value::Null;
    loop {
        let (status, page) = search(
            &app.router,
            json!({"section": "post", "query": "rust", "limit": 4, "cursor": cursor}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let items = page["items"].as_array().unwrap();
        assert!(items.len() <= 4);
        walked.extend(items.iter().cloned());

        if page["hasMore"] == false {
            assert!(page["nextCursor"].is_null());
            break;
        }
        cursor = page["nextCursor"].clone();
    }

    assert_eq!(walked, expected);
    let ids: std::collections::HashSet<&str> =
        walked.iter().map(|item| item["id"].as_str().unwrap()).collect();
    assert_eq!(ids.len(), walked.len());
}

#[tokio::test]
async fn items_are_sorted_newest_first() {
    let app = test_app(&[]);
    app.store.insert_post(post("Older", "en", "published", 1));
    app.store.insert_post(post("Newer", "en", "published", 2));

    let (_, page) = search(&app.router, json!({"section": "post", "query": "rust"})).await;
    assert_eq!(page["items"][0]["title"], "Newer");
    assert_eq!(page["items"][0]["section"], "post");
    assert_eq!(page["items"][1]["title"], "Older");
}

#[tokio::test]
async fn locale_scope_current_filters_by_locale() {
    let app = test_app(&[]);
    app.store.insert_post(post("English", "en", "published", 1));
    app.store.insert_post(post("Chinese", "zh", "published", 2));

    let (_, all) = search(
        &app.router,
        json!({"section": "post", "query": "rust", "locale": "zh"}),
    )
    .await;
    assert_eq!(all["items"].as_array().unwrap().len(), 2);

    let (_, current) = search(
        &app.router,
        json!({"section": "post", "query": "rust", "locale": "zh", "filters": {"localeScope": "current"}}),
    )
    .await;
    let items = current["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["locale"], "zh");
}

#[tokio::test]
async fn corrupted_cursor_is_a_client_error() {
    let app = test_app(&[]);
    app.store.insert_post(post("Only", "en", "published", 1));

    for cursor in ["not-a-cursor!", "eyJzb3J0QXQiOiJ4In0", "e30"] {
        let (status, body) = search(
            &app.router,
            json!({"section": "post", "query": "rust", "cursor": cursor}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{cursor}");
        assert_eq!(error_code(&body), "invalid_cursor");
        assert_eq!(body["error"]["retryable"], false);
    }

    let (status, body) = search(
        &app.router,
        json!({"section": "video", "query": "rust", "cursor": "not-a-cursor!"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "invalid_cursor");
}

#[tokio::test]
async fn request_validation_errors_have_stable_codes() {
    let app = test_app(&[]);

    let cases = [
        (json!({"section": "post", "query": "r"}), "query_too_short"),
        (json!({"section": "post", "query": "r".repeat(201)}), "query_too_long"),
        (json!({"section": "video", "query": "rust"}), "invalid_section"),
        (
            json!({"section": "gallery", "query": "rust", "filters": {"isoMin": -1}}),
            "invalid_filters",
        ),
        (json!({"section": "post", "query": "rust", "page": 2}), "invalid_payload"),
    ];

    for (body, code) in cases {
        let (status, response) = search(&app.router, body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{code}");
        assert_eq!(error_code(&response), code);
    }
}
