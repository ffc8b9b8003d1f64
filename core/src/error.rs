//! Error types for the PCE client.
//!
//! # Design
//! `HttpStatus` owns the fully populated response: the platform puts
//! structured error detail in the body of non-2xx responses, so callers get
//! both the failure and the body/headers to inspect. Every other variant
//! describes a failure that happened before a final response existed.

use thiserror::Error;

use crate::http::HttpResponse;

/// Result alias used throughout the crate.
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors returned by the transport and the request builders.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The HTTP action was not one of GET, POST, PUT, DELETE.
    #[error("invalid http action {0:?}; action must be GET, POST, PUT, or DELETE")]
    InvalidMethod(String),

    /// A request or reference URL could not be parsed.
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Transport-level failure (DNS, refused connection, TLS handshake, body read).
    #[error("network error: {0}")]
    Network(#[from] ureq::Error),

    /// An async submission was acknowledged without a `Location` header.
    #[error("async response did not include a Location header")]
    MissingLocation,

    /// The response preceding a poll had no usable `Retry-After` value.
    #[error("missing or non-numeric Retry-After header (got {value:?})")]
    MissingRetryAfter { value: Option<String> },

    /// A job-status or response body could not be decoded.
    #[error("failed to decode {what}: {source}")]
    Decode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// The job reported `done` but carried no result reference.
    #[error("job {href} finished without a result reference")]
    JobWithoutResult { href: String },

    /// The final response status code did not start with 2.
    #[error("http status code of {status}")]
    HttpStatus {
        status: u16,
        response: Box<HttpResponse>,
    },

    /// The job did not finish within the configured attempts or deadline.
    #[error("job {href} was not done after {attempts} poll attempts")]
    PollTimeout { href: String, attempts: u32 },

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(#[source] serde_json::Error),

    /// An object needed its href to build a URL but had none.
    #[error("{0} has no href")]
    MissingHref(&'static str),

    /// Endpoint configuration could not be read.
    #[error("configuration error: {0}")]
    Config(String),
}

impl ApiError {
    /// The populated response behind an `HttpStatus` failure.
    pub fn response(&self) -> Option<&HttpResponse> {
        match self {
            ApiError::HttpStatus { response, .. } => Some(response),
            _ => None,
        }
    }

    /// The numeric status code behind an `HttpStatus` failure.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}
