use axum::http::{self, Request, StatusCode};
use http_body_util::BodyExt;
use mock_pce::{app, app_with_state, MockBehavior, PceState};
use serde_json::Value;
use tower::ServiceExt;

// "user:key"
const AUTH: &str = "Basic dXNlcjprZXk=";

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

fn json_request(method: &str, uri: &str, body: &str) -> Request<String> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(http::header::AUTHORIZATION, AUTH)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(body.to_string())
        .unwrap()
}

fn get_request(uri: &str) -> Request<String> {
    Request::builder()
        .uri(uri)
        .header(http::header::AUTHORIZATION, AUTH)
        .body(String::new())
        .unwrap()
}

const QUERY: &str = r#"{"sources":{"include":[[]],"exclude":[]},"destinations":{"include":[[]],"exclude":[]},"services":{"include":[],"exclude":[]},"policy_decisions":[]}"#;

// --- auth ---

#[tokio::test]
async fn missing_credentials_return_401() {
    let resp = app()
        .oneshot(
            Request::builder()
                .uri("/api/v1/orgs/1/pairing_profiles")
                .body(String::new())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(resp).await;
    assert_eq!(body[0]["token"], "authentication_required");
}

#[tokio::test]
async fn wrong_credentials_return_401_when_pinned() {
    let state = PceState::new(MockBehavior {
        credentials: Some(("api_1".to_string(), "secret".to_string())),
        ..MockBehavior::default()
    });
    let resp = app_with_state(state)
        .oneshot(get_request("/api/v1/orgs/1/pairing_profiles"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

// --- pairing ---

#[tokio::test]
async fn list_profiles_empty() {
    let resp = app()
        .oneshot(get_request("/api/v1/orgs/1/pairing_profiles"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await, serde_json::json!([]));
}

#[tokio::test]
async fn create_profile_returns_201_with_href() {
    let resp = app()
        .oneshot(json_request(
            "POST",
            "/api/v1/orgs/1/pairing_profiles",
            r#"{"name":"web","enabled":true}"#,
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::CREATED);
    let body = body_json(resp).await;
    assert_eq!(body["href"], "/orgs/1/pairing_profiles/1");
    assert_eq!(body["name"], "web");
}

#[tokio::test]
async fn create_profile_without_name_returns_406() {
    let resp = app()
        .oneshot(json_request(
            "POST",
            "/api/v1/orgs/1/pairing_profiles",
            r#"{"enabled":true}"#,
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_ACCEPTABLE);
}

#[tokio::test]
async fn pairing_key_for_unknown_profile_returns_404() {
    let resp = app()
        .oneshot(json_request(
            "POST",
            "/api/v1/orgs/1/pairing_profiles/99/pairing_key",
            "{}",
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body = body_json(resp).await;
    assert_eq!(body[0]["token"], "not_found");
}

// --- traffic analysis ---

#[tokio::test]
async fn sync_traffic_query_returns_flows() {
    let resp = app()
        .oneshot(json_request(
            "POST",
            "/api/v1/orgs/1/traffic_flows/traffic_analysis_queries",
            QUERY,
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let flows = body_json(resp).await;
    assert_eq!(flows.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn traffic_query_without_sources_returns_406() {
    let resp = app()
        .oneshot(json_request(
            "POST",
            "/api/v1/orgs/1/traffic_flows/traffic_analysis_queries",
            r#"{"policy_decisions":[]}"#,
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_ACCEPTABLE);
}

#[tokio::test]
async fn unknown_job_returns_404() {
    let resp = app()
        .oneshot(get_request(
            "/api/v1/orgs/1/traffic_flows/async_queries/00000000-0000-0000-0000-000000000000",
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// --- full async job lifecycle ---

#[tokio::test]
async fn async_job_lifecycle() {
    use tower::Service;

    let state = PceState::new(MockBehavior {
        pending_polls: 1,
        ..MockBehavior::default()
    });
    let mut app = app_with_state(state.clone()).into_service();

    // submit
    let mut submit = json_request(
        "POST",
        "/api/v1/orgs/1/traffic_flows/traffic_analysis_queries",
        QUERY,
    );
    submit
        .headers_mut()
        .insert("prefer", http::HeaderValue::from_static("respond-async"));
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(submit)
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    assert_eq!(resp.headers()[http::header::RETRY_AFTER], "0");
    let location = resp.headers()[http::header::LOCATION]
        .to_str()
        .unwrap()
        .to_string();
    assert!(location.starts_with("/orgs/1/traffic_flows/async_queries/"));
    let ack = body_bytes(resp).await;
    assert!(!ack.is_empty());

    // first poll: still pending
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(get_request(&format!("/api/v1{location}")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[http::header::RETRY_AFTER], "0");
    let job = body_json(resp).await;
    assert_eq!(job["status"], "pending");
    assert_eq!(job["result"]["href"], "");

    // second poll: done
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(get_request(&format!("/api/v1{location}")))
        .await
        .unwrap();
    let job = body_json(resp).await;
    assert_eq!(job["status"], "done");
    let result_href = job["result"]["href"].as_str().unwrap().to_string();
    assert_eq!(result_href, format!("{location}/download"));

    // download
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(get_request(&format!("/api/v1{result_href}")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let flows = body_json(resp).await;
    assert_eq!(flows.as_array().unwrap().len(), 3);

    assert_eq!(state.poll_count(), 2);
    assert_eq!(state.result_fetch_count(), 1);
}

#[tokio::test]
async fn poll_without_retry_after_when_configured() {
    use tower::Service;

    let state = PceState::new(MockBehavior {
        pending_polls: 5,
        omit_retry_after_on_poll: true,
        ..MockBehavior::default()
    });
    let mut app = app_with_state(state).into_service();

    let mut submit = json_request(
        "POST",
        "/api/v1/orgs/1/traffic_flows/traffic_analysis_queries",
        QUERY,
    );
    submit
        .headers_mut()
        .insert("prefer", http::HeaderValue::from_static("respond-async"));
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(submit)
        .await
        .unwrap();
    let location = resp.headers()[http::header::LOCATION]
        .to_str()
        .unwrap()
        .to_string();

    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(get_request(&format!("/api/v1{location}")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().get(http::header::RETRY_AFTER).is_none());
}
