use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use axum::{
    extract::{Path, Request, State},
    http::{
        header::{AUTHORIZATION, LOCATION, RETRY_AFTER},
        HeaderMap, HeaderValue, StatusCode,
    },
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::debug;
use uuid::Uuid;

/// Knobs for exercising client edge cases.
#[derive(Clone, Debug, Default)]
pub struct MockBehavior {
    /// Job-status polls answered `pending` before the job reports `done`.
    pub pending_polls: usize,
    /// Drop `Retry-After` from job-status responses.
    pub omit_retry_after_on_poll: bool,
    /// Answer job-status polls with a non-JSON body.
    pub garbled_poll_body: bool,
    /// Required `(user, key)`; `None` accepts any basic credentials.
    pub credentials: Option<(String, String)>,
}

struct Job {
    polls: usize,
    result: Vec<Value>,
}

#[derive(Default)]
struct Data {
    profiles: Vec<Value>,
    next_profile_id: u64,
    jobs: HashMap<Uuid, Job>,
}

#[derive(Clone, Default)]
pub struct PceState {
    behavior: Arc<MockBehavior>,
    data: Arc<RwLock<Data>>,
    polls: Arc<AtomicUsize>,
    result_fetches: Arc<AtomicUsize>,
}

impl PceState {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior: Arc::new(behavior),
            ..Self::default()
        }
    }

    /// Job-status requests served so far, across all jobs.
    pub fn poll_count(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    /// Job-result downloads served so far.
    pub fn result_fetch_count(&self) -> usize {
        self.result_fetches.load(Ordering::SeqCst)
    }
}

pub fn app() -> Router {
    app_with_state(PceState::default())
}

pub fn app_with_state(state: PceState) -> Router {
    Router::new()
        .route(
            "/api/v1/orgs/{org}/pairing_profiles",
            get(list_profiles).post(create_profile),
        )
        .route(
            "/api/v1/orgs/{org}/pairing_profiles/{id}/pairing_key",
            post(create_pairing_key),
        )
        .route(
            "/api/v1/orgs/{org}/traffic_flows/traffic_analysis_queries",
            post(traffic_analysis),
        )
        .route(
            "/api/v1/orgs/{org}/traffic_flows/async_queries/{id}",
            get(job_status),
        )
        .route(
            "/api/v1/orgs/{org}/traffic_flows/async_queries/{id}/download",
            get(job_result),
        )
        .layer(middleware::from_fn_with_state(state.clone(), require_basic_auth))
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    run_with_state(listener, PceState::default()).await
}

pub async fn run_with_state(listener: TcpListener, state: PceState) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with_state(state)).await
}

fn api_error(status: StatusCode, token: &str, message: &str) -> Response {
    (status, Json(json!([{ "token": token, "message": message }]))).into_response()
}

async fn require_basic_auth(State(state): State<PceState>, request: Request, next: Next) -> Response {
    let presented = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let authorized = match (&state.behavior.credentials, presented) {
        (_, None) => false,
        (None, Some(header)) => header.starts_with("Basic "),
        (Some((user, key)), Some(header)) => {
            header == format!("Basic {}", STANDARD.encode(format!("{user}:{key}")))
        }
    };
    if !authorized {
        return api_error(
            StatusCode::UNAUTHORIZED,
            "authentication_required",
            "valid API credentials are required",
        );
    }
    next.run(request).await
}

// --- pairing ---

async fn list_profiles(State(state): State<PceState>, Path(org): Path<u32>) -> Json<Vec<Value>> {
    let prefix = format!("/orgs/{org}/");
    let data = state.data.read().await;
    Json(
        data.profiles
            .iter()
            .filter(|p| p["href"].as_str().is_some_and(|h| h.starts_with(&prefix)))
            .cloned()
            .collect(),
    )
}

async fn create_profile(
    State(state): State<PceState>,
    Path(org): Path<u32>,
    Json(mut profile): Json<Value>,
) -> Response {
    if !profile["name"].is_string() {
        return api_error(
            StatusCode::NOT_ACCEPTABLE,
            "input_validation_error",
            "pairing profile name is required",
        );
    }
    let mut data = state.data.write().await;
    data.next_profile_id += 1;
    let href = format!("/orgs/{org}/pairing_profiles/{}", data.next_profile_id);
    profile["href"] = json!(href);
    profile["created_at"] = json!("2024-03-01T00:00:00.000Z");
    profile["created_by"] = json!({ "href": "/users/1" });
    profile["total_use_count"] = json!(0);
    data.profiles.push(profile.clone());
    debug!(%href, "created pairing profile");
    (StatusCode::CREATED, Json(profile)).into_response()
}

async fn create_pairing_key(
    State(state): State<PceState>,
    Path((org, id)): Path<(u32, u64)>,
) -> Response {
    let href = format!("/orgs/{org}/pairing_profiles/{id}");
    let mut data = state.data.write().await;
    let Some(profile) = data.profiles.iter_mut().find(|p| p["href"] == href.as_str()) else {
        return api_error(StatusCode::NOT_FOUND, "not_found", "pairing profile not found");
    };
    let uses = profile["total_use_count"].as_u64().unwrap_or(0);
    profile["total_use_count"] = json!(uses + 1);
    Json(json!({ "activation_code": Uuid::new_v4().simple().to_string() })).into_response()
}

// --- traffic analysis ---

fn sample_flows() -> Vec<Value> {
    vec![
        json!({
            "src": { "ip": "10.0.0.5", "workload": { "href": "/orgs/1/workloads/web-1", "hostname": "web-1" } },
            "dst": { "ip": "10.0.1.7", "workload": { "href": "/orgs/1/workloads/db-1", "hostname": "db-1" } },
            "service": { "port": 5432, "proto": 6, "process_name": "postgres" },
            "num_connections": 42,
            "policy_decision": "allowed",
            "timestamp_range": { "first_detected": "2024-03-01T08:00:00Z", "last_detected": "2024-03-01T09:00:00Z" }
        }),
        json!({
            "src": { "ip": "192.168.10.4" },
            "dst": { "ip": "10.0.0.5", "workload": { "href": "/orgs/1/workloads/web-1", "hostname": "web-1" } },
            "service": { "port": 22, "proto": 6 },
            "num_connections": 3,
            "policy_decision": "potentially_blocked",
            "timestamp_range": { "first_detected": "2024-03-01T08:30:00Z", "last_detected": "2024-03-01T08:31:00Z" }
        }),
        json!({
            "src": { "ip": "10.0.2.9" },
            "dst": { "ip": "10.0.1.7", "workload": { "href": "/orgs/1/workloads/db-1", "hostname": "db-1" } },
            "service": { "port": 3389, "proto": 6 },
            "num_connections": 1,
            "policy_decision": "blocked",
            "timestamp_range": { "first_detected": "2024-03-01T10:00:00Z", "last_detected": "2024-03-01T10:00:00Z" }
        }),
    ]
}

/// Canned flows narrowed by `policy_decisions` and capped by `max_results`.
fn answer_query(query: &Value) -> Vec<Value> {
    let decisions: Vec<&str> = query["policy_decisions"]
        .as_array()
        .map(|d| d.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    let limit = query["max_results"].as_u64().map_or(usize::MAX, |n| n as usize);
    sample_flows()
        .into_iter()
        .filter(|flow| {
            decisions.is_empty()
                || flow["policy_decision"]
                    .as_str()
                    .is_some_and(|d| decisions.contains(&d))
        })
        .take(limit)
        .collect()
}

async fn traffic_analysis(
    State(state): State<PceState>,
    Path(org): Path<u32>,
    headers: HeaderMap,
    Json(query): Json<Value>,
) -> Response {
    if !query["sources"].is_object() || !query["destinations"].is_object() {
        return api_error(
            StatusCode::NOT_ACCEPTABLE,
            "invalid_traffic_query",
            "sources and destinations are required",
        );
    }
    let flows = answer_query(&query);

    let respond_async = headers
        .get("prefer")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("respond-async"));
    if !respond_async {
        return Json(flows).into_response();
    }

    let id = Uuid::new_v4();
    state
        .data
        .write()
        .await
        .jobs
        .insert(id, Job { polls: 0, result: flows });
    let location = format!("/orgs/{org}/traffic_flows/async_queries/{id}");
    debug!(%location, "queued async traffic query");
    (
        StatusCode::ACCEPTED,
        [(LOCATION, location.clone()), (RETRY_AFTER, "0".to_string())],
        Json(json!({ "href": location, "status": "queued" })),
    )
        .into_response()
}

async fn job_status(
    State(state): State<PceState>,
    Path((org, id)): Path<(u32, Uuid)>,
) -> Response {
    state.polls.fetch_add(1, Ordering::SeqCst);
    let mut data = state.data.write().await;
    let Some(job) = data.jobs.get_mut(&id) else {
        return api_error(StatusCode::NOT_FOUND, "not_found", "job not found");
    };
    job.polls += 1;

    let behavior = &state.behavior;
    let mut headers = HeaderMap::new();
    if !behavior.omit_retry_after_on_poll {
        headers.insert(RETRY_AFTER, HeaderValue::from_static("0"));
    }
    if behavior.garbled_poll_body {
        return (headers, "<html>maintenance window</html>").into_response();
    }

    let done = job.polls > behavior.pending_polls;
    let href = format!("/orgs/{org}/traffic_flows/async_queries/{id}");
    let result_href = if done {
        format!("{href}/download")
    } else {
        String::new()
    };
    let body = json!({
        "href": href,
        "job_type": "async_traffic_flows",
        "description": "traffic analysis query",
        "result": { "href": result_href },
        "status": if done { "done" } else { "pending" },
        "requested_at": "2024-03-01T10:00:00.000Z",
        "terminated_at": if done { json!("2024-03-01T10:00:02.000Z") } else { Value::Null },
        "requested_by": { "href": "/users/1" }
    });
    (headers, Json(body)).into_response()
}

async fn job_result(
    State(state): State<PceState>,
    Path((_org, id)): Path<(u32, Uuid)>,
) -> Response {
    let data = state.data.read().await;
    let Some(job) = data.jobs.get(&id) else {
        return api_error(StatusCode::NOT_FOUND, "not_found", "job not found");
    };
    state.result_fetches.fetch_add(1, Ordering::SeqCst);
    Json(job.result.clone()).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answer_query_without_filters_returns_all_flows() {
        assert_eq!(answer_query(&json!({})).len(), 3);
    }

    #[test]
    fn answer_query_filters_by_policy_decision() {
        let flows = answer_query(&json!({ "policy_decisions": ["blocked"] }));
        assert_eq!(flows.len(), 1);
        assert_eq!(flows[0]["service"]["port"], 3389);
    }

    #[test]
    fn answer_query_honours_max_results() {
        let flows = answer_query(&json!({ "policy_decisions": [], "max_results": 2 }));
        assert_eq!(flows.len(), 2);
    }

    #[test]
    fn behavior_defaults_to_immediate_completion() {
        let behavior = MockBehavior::default();
        assert_eq!(behavior.pending_polls, 0);
        assert!(!behavior.omit_retry_after_on_poll);
        assert!(behavior.credentials.is_none());
    }

    #[test]
    fn fresh_state_has_no_traffic() {
        let state = PceState::new(MockBehavior::default());
        assert_eq!(state.poll_count(), 0);
        assert_eq!(state.result_fetch_count(), 0);
    }
}
