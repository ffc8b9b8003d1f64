//! Async job protocol.
//!
//! A request sent with `Prefer: respond-async` is acknowledged with a
//! `Location` header naming a job-status resource. The transport waits the
//! `Retry-After` seconds named by the preceding response, polls the job until
//! it reports `done`, then fetches the result reference. Every phase uses
//! the endpoint's credentials and TLS policy.
//!
//! ```text
//! Submitted -> Polling -> ResultReady -> Fetched
//!                 ^  |
//!                 +--+ (pending, running, ...)
//! ```

use std::thread;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use crate::endpoint::PceEndpoint;
use crate::error::{ApiError, ApiResult};
use crate::http::{HttpMethod, HttpResponse};
use crate::transport::{status_error, Exchange, TlsPolicy, Transport};

/// Job status document returned while polling.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AsyncJob {
    #[serde(default)]
    pub href: String,
    #[serde(default)]
    pub job_type: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub result: Option<JobRef>,
    pub status: JobStatus,
    #[serde(default)]
    pub requested_at: Option<String>,
    #[serde(default)]
    pub terminated_at: Option<String>,
    #[serde(default)]
    pub requested_by: Option<JobRef>,
}

impl AsyncJob {
    /// The result reference, if the server gave a non-empty one.
    pub fn result_href(&self) -> Option<&str> {
        self.result
            .as_ref()
            .map(|r| r.href.as_str())
            .filter(|href| !href.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JobRef {
    #[serde(default)]
    pub href: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    #[serde(other)]
    Other,
}

enum JobPhase {
    Submitted(HttpResponse),
    Polling {
        job_url: String,
        previous: HttpResponse,
        attempts: u32,
    },
    ResultReady {
        result_url: String,
    },
    Fetched(HttpResponse),
}

impl<E: Exchange> Transport<E> {
    /// Drive a submitted job to its result fetch. `ack` is the response to
    /// the submitted `Prefer: respond-async` request.
    pub(crate) fn run_job(
        &self,
        ack: HttpResponse,
        endpoint: &PceEndpoint,
        tls: TlsPolicy,
    ) -> ApiResult<HttpResponse> {
        let api_base = api_base_of(&ack.request.url)?;
        let started = Instant::now();
        let mut phase = JobPhase::Submitted(ack);

        loop {
            phase = match phase {
                JobPhase::Submitted(ack) => {
                    if !ack.is_success() {
                        return Err(status_error(ack));
                    }
                    let location = ack.header("Location").ok_or(ApiError::MissingLocation)?;
                    let job_url = resolve(&api_base, location);
                    info!(job = %job_url, status = ack.status, "async job submitted");
                    JobPhase::Polling {
                        job_url,
                        previous: ack,
                        attempts: 0,
                    }
                }
                JobPhase::Polling {
                    job_url,
                    previous,
                    attempts,
                } => {
                    let wait = retry_after(&previous)?;
                    self.check_poll_budget(&job_url, attempts, started, wait)?;
                    thread::sleep(wait);

                    let request = self.prepare(HttpMethod::Get, &job_url, endpoint, None, false);
                    let poll = self.exchange.send(request, tls)?;
                    if !poll.is_success() {
                        return Err(status_error(poll));
                    }
                    let job: AsyncJob =
                        serde_json::from_str(&poll.body).map_err(|source| ApiError::Decode {
                            what: "job status",
                            source,
                        })?;
                    let attempts = attempts + 1;
                    debug!(job = %job_url, status = ?job.status, attempts, "polled async job");

                    if job.status == JobStatus::Done {
                        let href = job
                            .result_href()
                            .ok_or_else(|| ApiError::JobWithoutResult {
                                href: job_url.clone(),
                            })?;
                        JobPhase::ResultReady {
                            result_url: resolve(&api_base, href),
                        }
                    } else {
                        JobPhase::Polling {
                            job_url,
                            previous: poll,
                            attempts,
                        }
                    }
                }
                JobPhase::ResultReady { result_url } => {
                    info!(result = %result_url, "async job done; fetching result");
                    let request =
                        self.prepare(HttpMethod::Get, &result_url, endpoint, None, false);
                    JobPhase::Fetched(self.exchange.send(request, tls)?)
                }
                JobPhase::Fetched(response) => return Ok(response),
            };
        }
    }

    /// Fails when another poll would exceed the attempt cap, or when waiting
    /// `wait` first would end past the deadline.
    fn check_poll_budget(
        &self,
        job_url: &str,
        attempts: u32,
        started: Instant,
        wait: Duration,
    ) -> ApiResult<()> {
        let attempts_exhausted = self
            .config
            .max_poll_attempts
            .is_some_and(|max| attempts >= max);
        let deadline_passed = self.config.poll_deadline.is_some_and(|deadline| {
            let elapsed = started.elapsed();
            elapsed >= deadline || wait > deadline - elapsed
        });
        if attempts_exhausted || deadline_passed {
            return Err(ApiError::PollTimeout {
                href: job_url.to_string(),
                attempts,
            });
        }
        Ok(())
    }
}

/// Seconds named by the `Retry-After` header of `response`.
fn retry_after(response: &HttpResponse) -> ApiResult<Duration> {
    let value = response.header("Retry-After");
    value
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .ok_or_else(|| ApiError::MissingRetryAfter {
            value: value.map(str::to_string),
        })
}

/// `<scheme>://<host>[:port]/api/v1` for the URL a call was made against.
fn api_base_of(request_url: &str) -> ApiResult<String> {
    let parsed = Url::parse(request_url)?;
    let host = parsed
        .host_str()
        .ok_or(ApiError::InvalidUrl(url::ParseError::EmptyHost))?;
    let port = parsed.port().map(|p| format!(":{p}")).unwrap_or_default();
    Ok(format!("{}://{host}{port}/api/v1", parsed.scheme()))
}

/// Job and result references are relative to the API base unless absolute.
fn resolve(api_base: &str, reference: &str) -> String {
    if reference.starts_with("https://") || reference.starts_with("http://") {
        reference.to_string()
    } else {
        format!("{api_base}{reference}")
    }
}
