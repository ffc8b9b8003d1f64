//! Blocking client core for the PCE REST API.
//!
//! # Overview
//! `Transport::execute` issues one request against a PCE: it validates the
//! action, adds basic auth and JSON headers, and for async calls runs the
//! submit, poll, fetch job protocol before returning the final response.
//! `PceClient` layers the traffic-analysis and pairing operations on top.
//!
//! # Design
//! - No global state: the `PceEndpoint` is passed explicitly on each call.
//! - The network round-trip is behind the `Exchange` trait; `UreqExchange`
//!   is the production implementation.
//! - Non-2xx final responses become `ApiError::HttpStatus`, which still owns
//!   the response so the platform's error body can be inspected.
//! - Request builders (`build_*`) and response decoders (`parse_*`) are pure
//!   and testable without a server.

pub mod client;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod explorer;
pub mod http;
pub mod polling;
pub mod transport;
pub mod types;

pub use client::{ApiCall, PceClient};
pub use config::TransportConfig;
pub use endpoint::{pce_sanitization, PceEndpoint};
pub use error::{ApiError, ApiResult};
pub use explorer::TrafficQuery;
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use polling::{AsyncJob, JobStatus};
pub use transport::{execute, Exchange, TlsPolicy, Transport, UreqExchange};
pub use types::{PairingKey, PairingProfile, TrafficAnalysis, TrafficAnalysisRequest};
