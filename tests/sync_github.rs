// tests/sync_github.rs
//
// Contents-API publish protocol against a mock GitHub.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Duration, TimeZone, Utc};
use feed_snapshot::{GithubSync, NormalizedItem, PublishMode, Snapshot, SyncError, SyncTarget};
use indexmap::IndexMap;
use serde_json::{json, Value};
use wiremock::matchers::{method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CONTENTS: &str = "/repos/acme/feeds/contents/unified.json";

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap()
}

fn snapshot() -> Snapshot {
    Snapshot {
        generated_at: now(),
        sources: IndexMap::from([(
            "burry".to_string(),
            vec![NormalizedItem {
                source: "burry".into(),
                title: "Cassandra unchained".into(),
                text: "Sell.".into(),
                link: "https://x.com/michaeljburry/status/1".into(),
                author: "@michaeljburry".into(),
                created_at: Some(now()),
            }],
        )]),
    }
}

fn target() -> SyncTarget {
    SyncTarget {
        owner: "acme".into(),
        repository: "feeds".into(),
        token: "ghp_test".into(),
        ..SyncTarget::default()
    }
}

fn client(server: &MockServer) -> GithubSync {
    GithubSync::new().unwrap().with_api_base(server.uri())
}

async fn put_bodies(server: &MockServer) -> Vec<(String, Value)> {
    server
        .received_requests()
        .await
        .expect("recording enabled")
        .into_iter()
        .filter(|r| r.method.as_str() == "PUT")
        .map(|r| (r.url.path().to_string(), serde_json::from_slice(&r.body).unwrap()))
        .collect()
}

fn put_ok(status: u16) -> ResponseTemplate {
    ResponseTemplate::new(status).set_body_json(json!({
        "content": { "path": "unified.json", "sha": "new-blob" },
        "commit": { "sha": "c0ffee" }
    }))
}

#[tokio::test]
async fn upsert_sends_existing_sha() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CONTENTS))
        .and(query_param("ref", "main"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "sha": "old-blob", "type": "file" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(CONTENTS))
        .respond_with(put_ok(200))
        .expect(1)
        .mount(&server)
        .await;

    let out = client(&server)
        .publish_at(&target(), PublishMode::Upsert, &snapshot(), now())
        .await
        .expect("publish ok");
    assert_eq!(out.path, "unified.json");
    assert!(!out.created);
    assert_eq!(out.previous_sha.as_deref(), Some("old-blob"));
    assert_eq!(out.content_sha.as_deref(), Some("new-blob"));
    assert_eq!(out.commit_sha.as_deref(), Some("c0ffee"));

    let puts = put_bodies(&server).await;
    assert_eq!(puts.len(), 1);
    let body = &puts[0].1;
    assert_eq!(body["sha"], "old-blob");
    assert_eq!(body["branch"], "main");
    assert!(body["message"].as_str().unwrap().contains("2024-06-10T12:00:00.000Z"));

    let decoded = STANDARD.decode(body["content"].as_str().unwrap()).unwrap();
    let doc: Snapshot = serde_json::from_slice(&decoded).unwrap();
    assert_eq!(doc, snapshot());
}

#[tokio::test]
async fn upsert_without_existing_object_omits_sha() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CONTENTS))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "message": "Not Found" })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(CONTENTS))
        .respond_with(put_ok(201))
        .mount(&server)
        .await;

    let out = client(&server)
        .publish_at(&target(), PublishMode::Upsert, &snapshot(), now())
        .await
        .expect("publish ok");
    assert!(out.created);
    assert_eq!(out.previous_sha, None);

    let puts = put_bodies(&server).await;
    let body = puts[0].1.as_object().unwrap();
    assert!(!body.contains_key("sha"), "sha must be omitted, got {body:?}");
}

#[tokio::test]
async fn upsert_twice_overwrites_the_same_object() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CONTENTS))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "sha": "blob" })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(CONTENTS))
        .respond_with(put_ok(200))
        .mount(&server)
        .await;

    let c = client(&server);
    let snap = snapshot();
    c.publish_at(&target(), PublishMode::Upsert, &snap, now()).await.unwrap();
    c.publish_at(&target(), PublishMode::Upsert, &snap, now() + Duration::seconds(1))
        .await
        .unwrap();

    let puts = put_bodies(&server).await;
    assert_eq!(puts.len(), 2);
    assert!(puts.iter().all(|(p, _)| p == CONTENTS));
}

#[tokio::test]
async fn append_twice_creates_two_objects_without_lookup() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path_regex(r"^/repos/acme/feeds/contents/snapshots/unified-[0-9TZ-]+\.json$"))
        .respond_with(put_ok(201))
        .expect(2)
        .mount(&server)
        .await;

    let c = client(&server);
    let snap = snapshot();
    let first = c
        .publish_at(&target(), PublishMode::Append, &snap, now())
        .await
        .unwrap();
    let second = c
        .publish_at(&target(), PublishMode::Append, &snap, now() + Duration::milliseconds(1))
        .await
        .unwrap();

    assert_eq!(first.path, "snapshots/unified-2024-06-10T12-00-00-000Z.json");
    assert_ne!(first.path, second.path);

    let requests = server.received_requests().await.unwrap();
    assert!(requests.iter().all(|r| r.method.as_str() == "PUT"), "append never looks up a sha");
    for (_, body) in put_bodies(&server).await {
        assert!(body.get("sha").is_none());
    }
}

#[tokio::test]
async fn stale_sha_is_a_retryable_conflict() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CONTENTS))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "sha": "stale" })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(CONTENTS))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "message": "unified.json does not match stale"
        })))
        .mount(&server)
        .await;

    let err = client(&server)
        .publish_at(&target(), PublishMode::Upsert, &snapshot(), now())
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    match err {
        SyncError::Conflict { status, message, .. } => {
            assert_eq!(status, 409);
            assert!(message.contains("does not match"));
        }
        other => panic!("expected conflict, got {other}"),
    }
}

#[tokio::test]
async fn unexpected_lookup_status_is_fatal_and_skips_the_write() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CONTENTS))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "message": "Bad credentials" })))
        .mount(&server)
        .await;

    let err = client(&server)
        .publish_at(&target(), PublishMode::Upsert, &snapshot(), now())
        .await
        .unwrap_err();
    assert!(!err.is_retryable());
    assert_eq!(err.remote_status(), Some(401));
    assert!(err.to_string().contains("Bad credentials"));
    assert!(put_bodies(&server).await.is_empty());
}

#[tokio::test]
async fn remote_write_failure_reports_status_and_message() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "message": "Resource not accessible by integration"
        })))
        .mount(&server)
        .await;

    let err = client(&server)
        .publish_at(&target(), PublishMode::Append, &snapshot(), now())
        .await
        .unwrap_err();
    match err {
        SyncError::Remote { status, message, .. } => {
            assert_eq!(status, 403);
            assert_eq!(message, "Resource not accessible by integration");
        }
        other => panic!("expected remote error, got {other}"),
    }
}

#[tokio::test]
async fn invalid_target_fails_before_any_request() {
    let server = MockServer::start().await;
    let c = client(&server);

    let mut no_token = target();
    no_token.token = String::new();
    let mut ambiguous = target();
    ambiguous.repository = "other/feeds".into();

    for bad in [no_token, ambiguous] {
        let err = c
            .publish_at(&bad, PublishMode::Upsert, &snapshot(), now())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)), "got {err}");
    }
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn combined_repository_and_custom_branch_are_honored() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/feeds/contents/data/latest.json"))
        .and(query_param("ref", "snapshots"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/repos/acme/feeds/contents/data/latest.json"))
        .respond_with(put_ok(201))
        .expect(1)
        .mount(&server)
        .await;

    let t = SyncTarget {
        owner: String::new(),
        repository: "acme/feeds".into(),
        branch: "snapshots".into(),
        path: Some("data/latest.json".into()),
        path_base: None,
        token: "ghp_test".into(),
    };
    let out = client(&server)
        .publish_at(&t, PublishMode::Upsert, &snapshot(), now())
        .await
        .unwrap();
    assert_eq!(out.path, "data/latest.json");

    let puts = put_bodies(&server).await;
    assert_eq!(puts[0].1["branch"], "snapshots");

    let auth = server.received_requests().await.unwrap()[0]
        .headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    assert_eq!(auth.as_deref(), Some("Bearer ghp_test"));
}
