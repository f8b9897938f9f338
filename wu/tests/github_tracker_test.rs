//! HTTP mock tests for the GitHub tracker.
//!
//! Uses wiremock to stand in for the GitHub REST API.

use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};
use workunit::config::TrackerConfig;
use workunit::tracker::{PullRequestQuery, TrackerError};
use workunit::{GitHubTracker, TrackerFacade};

fn tracker(server: &MockServer, per_page: u32, token_env: &str) -> GitHubTracker {
    let config = TrackerConfig {
        base_url: server.uri(),
        token_env: token_env.to_string(),
        timeout_ms: 5_000,
        per_page,
    };
    GitHubTracker::from_config(&config).unwrap()
}

fn pull(number: u64, head: &str, merged: bool) -> serde_json::Value {
    json!({
        "number": number,
        "state": if merged { "closed" } else { "open" },
        "merged_at": if merged { json!("2024-01-01T00:00:00Z") } else { json!(null) },
        "html_url": format!("https://github.com/acme/widgets/pull/{}", number),
        "head": { "ref": head }
    })
}

// =============================================================================
// Issues
// =============================================================================

#[tokio::test]
async fn test_get_issue() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/acme/widgets/issues/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "number": 42,
            "state": "closed",
            "html_url": "https://github.com/acme/widgets/issues/42",
            "title": "Fix widgets",
            "labels": []
        })))
        .mount(&server)
        .await;

    let issue = tracker(&server, 100, "WORKUNIT_TEST_UNSET_TOKEN")
        .get_issue("acme", "widgets", 42)
        .await
        .unwrap();

    assert_eq!(issue.title, "Fix widgets");
    assert_eq!(issue.state, "closed");
}

#[tokio::test]
async fn test_missing_issue_is_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/acme/widgets/issues/7"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "message": "Not Found" })))
        .mount(&server)
        .await;

    let err = tracker(&server, 100, "WORKUNIT_TEST_UNSET_TOKEN")
        .get_issue("acme", "widgets", 7)
        .await
        .unwrap_err();

    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_server_error_is_api_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/acme/widgets/issues/7"))
        .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
        .mount(&server)
        .await;

    let err = tracker(&server, 100, "WORKUNIT_TEST_UNSET_TOKEN")
        .get_issue("acme", "widgets", 7)
        .await
        .unwrap_err();

    assert!(matches!(err, TrackerError::ApiError { status: 502, .. }));
}

// =============================================================================
// Pull requests
// =============================================================================

#[tokio::test]
async fn test_pull_requests_follow_pages_until_short_page() {
    let server = MockServer::start().await;
    let head = "work-acme/widgets/42";

    Mock::given(method("GET"))
        .and(path("/repos/acme/widgets/pulls"))
        .and(query_param("page", "1"))
        .and(query_param("per_page", "2"))
        .and(query_param("state", "all"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([pull(1, head, true), pull(2, head, false)])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widgets/pulls"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([pull(3, "other", false)])))
        .expect(1)
        .mount(&server)
        .await;

    let pulls = tracker(&server, 2, "WORKUNIT_TEST_UNSET_TOKEN")
        .list_pull_requests("acme", "widgets", &PullRequestQuery::head(head))
        .await
        .unwrap();

    let numbers: Vec<u64> = pulls.iter().map(|pr| pr.number).collect();
    assert_eq!(numbers, vec![1, 2, 3]);
    assert!(pulls[0].is_merged());
    assert!(pulls[1].is_open());
}

#[tokio::test]
async fn test_oversized_page_setting_is_capped_at_host_limit() {
    let server = MockServer::start().await;
    let head = "work-acme/widgets/42";
    let first: Vec<_> = (1..=100).map(|n| pull(n, head, false)).collect();
    let second: Vec<_> = (101..=105).map(|n| pull(n, head, n == 105)).collect();

    Mock::given(method("GET"))
        .and(path("/repos/acme/widgets/pulls"))
        .and(query_param("page", "1"))
        .and(query_param("per_page", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(first)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widgets/pulls"))
        .and(query_param("page", "2"))
        .and(query_param("per_page", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(second)))
        .expect(1)
        .mount(&server)
        .await;

    let pulls = tracker(&server, 200, "WORKUNIT_TEST_UNSET_TOKEN")
        .list_pull_requests("acme", "widgets", &PullRequestQuery::head(head))
        .await
        .unwrap();

    assert_eq!(pulls.len(), 105);
    assert!(pulls.iter().any(|pr| pr.number == 105 && pr.is_merged()));
}

// =============================================================================
// Repositories and branches
// =============================================================================

#[tokio::test]
async fn test_repo_metadata_is_cached() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/acme/widgets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "private": true,
            "default_branch": "main"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let tracker = tracker(&server, 100, "WORKUNIT_TEST_UNSET_TOKEN");
    let first = tracker.get_repo("acme", "widgets").await.unwrap();
    let second = tracker.get_repo("acme", "widgets").await.unwrap();

    assert!(first.private);
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_branch_exists_maps_404_to_false() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/acme/widgets/branches/work-acme/widgets/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "name": "work-acme/widgets/42" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widgets/branches/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widgets/branches/broken"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let tracker = tracker(&server, 100, "WORKUNIT_TEST_UNSET_TOKEN");
    assert!(tracker.branch_exists("acme", "widgets", "work-acme/widgets/42").await.unwrap());
    assert!(!tracker.branch_exists("acme", "widgets", "missing").await.unwrap());
    assert!(tracker.branch_exists("acme", "widgets", "broken").await.is_err());
}

#[tokio::test]
async fn test_fork_request_sends_token() {
    let server = MockServer::start().await;

    // SAFETY: the variable name is used by this test alone
    unsafe {
        std::env::set_var("WORKUNIT_TEST_FORK_TOKEN", "secret");
    }

    Mock::given(method("GET"))
        .and(path("/user"))
        .and(header("authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "login": "dev" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/repos/acme/gears/forks"))
        .and(header("authorization", "Bearer secret"))
        .and(body_json(json!({ "default_branch_only": true })))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({ "full_name": "dev/gears" })))
        .expect(1)
        .mount(&server)
        .await;

    let tracker = tracker(&server, 100, "WORKUNIT_TEST_FORK_TOKEN");
    assert_eq!(tracker.current_login().await.unwrap(), "dev");
    assert_eq!(tracker.current_login().await.unwrap(), "dev");
    tracker.create_fork("acme", "gears").await.unwrap();

    // SAFETY: as above
    unsafe {
        std::env::remove_var("WORKUNIT_TEST_FORK_TOKEN");
    }
}
