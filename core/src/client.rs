//! PCE API operations built on top of `Transport`.
//!
//! # Design
//! Each operation is split into a `build_*` method producing an `ApiCall`
//! and a `parse_*` function decoding the `HttpResponse`. The convenience
//! methods chain build, execute, and parse, and hand back the response next
//! to the decoded value so callers keep headers and raw body for auditing.

use serde::de::DeserializeOwned;

use crate::endpoint::PceEndpoint;
use crate::error::{ApiError, ApiResult};
use crate::explorer::TrafficQuery;
use crate::http::{HttpMethod, HttpResponse};
use crate::transport::{Exchange, Transport, UreqExchange};
use crate::types::{PairingKey, PairingProfile, TrafficAnalysis};

/// An API call described as plain data, before transport headers are added.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiCall {
    pub method: HttpMethod,
    pub url: String,
    pub body: Option<Vec<u8>>,
    pub respond_async: bool,
}

/// Client bound to one PCE endpoint.
pub struct PceClient<E = UreqExchange> {
    endpoint: PceEndpoint,
    transport: Transport<E>,
}

impl PceClient<UreqExchange> {
    pub fn new(endpoint: PceEndpoint) -> Self {
        Self::with_transport(endpoint, Transport::new())
    }
}

impl<E: Exchange> PceClient<E> {
    pub fn with_transport(endpoint: PceEndpoint, transport: Transport<E>) -> Self {
        Self {
            endpoint,
            transport,
        }
    }

    pub fn endpoint(&self) -> &PceEndpoint {
        &self.endpoint
    }

    pub fn transport(&self) -> &Transport<E> {
        &self.transport
    }

    /// Run a built call through the transport.
    pub fn call(&self, call: &ApiCall) -> ApiResult<HttpResponse> {
        self.transport.execute(
            call.method.as_str(),
            &call.url,
            &self.endpoint,
            call.body.as_deref(),
            call.respond_async,
        )
    }

    // -- traffic analysis ---------------------------------------------------

    pub fn build_traffic_analysis(
        &self,
        query: &TrafficQuery,
        respond_async: bool,
    ) -> ApiResult<ApiCall> {
        let body = serde_json::to_vec(&query.to_request()).map_err(ApiError::Serialization)?;
        Ok(ApiCall {
            method: HttpMethod::Post,
            url: self
                .endpoint
                .org_url("traffic_flows/traffic_analysis_queries")?
                .into(),
            body: Some(body),
            respond_async,
        })
    }

    /// Run a traffic query synchronously.
    pub fn get_traffic_analysis(
        &self,
        query: &TrafficQuery,
    ) -> ApiResult<(Vec<TrafficAnalysis>, HttpResponse)> {
        let response = self.call(&self.build_traffic_analysis(query, false)?)?;
        Ok((parse_traffic_analysis(&response)?, response))
    }

    /// Run a traffic query through the async job protocol; use for queries
    /// expected to return large result sets.
    pub fn get_traffic_analysis_async(
        &self,
        query: &TrafficQuery,
    ) -> ApiResult<(Vec<TrafficAnalysis>, HttpResponse)> {
        let response = self.call(&self.build_traffic_analysis(query, true)?)?;
        Ok((parse_traffic_analysis(&response)?, response))
    }

    // -- pairing ------------------------------------------------------------

    pub fn build_get_all_pairing_profiles(&self) -> ApiResult<ApiCall> {
        Ok(ApiCall {
            method: HttpMethod::Get,
            url: self.endpoint.org_url("pairing_profiles")?.into(),
            body: None,
            respond_async: false,
        })
    }

    pub fn build_create_pairing_profile(&self, profile: &PairingProfile) -> ApiResult<ApiCall> {
        let body = serde_json::to_vec(profile).map_err(ApiError::Serialization)?;
        Ok(ApiCall {
            method: HttpMethod::Post,
            url: self.endpoint.org_url("pairing_profiles")?.into(),
            body: Some(body),
            respond_async: false,
        })
    }

    pub fn build_create_pairing_key(&self, profile: &PairingProfile) -> ApiResult<ApiCall> {
        if profile.href.is_empty() {
            return Err(ApiError::MissingHref("pairing profile"));
        }
        Ok(ApiCall {
            method: HttpMethod::Post,
            url: self
                .endpoint
                .href_url(&format!("{}/pairing_key", profile.href))?
                .into(),
            body: Some(b"{}".to_vec()),
            respond_async: false,
        })
    }

    pub fn get_all_pairing_profiles(&self) -> ApiResult<(Vec<PairingProfile>, HttpResponse)> {
        let response = self.call(&self.build_get_all_pairing_profiles()?)?;
        Ok((parse_pairing_profiles(&response)?, response))
    }

    pub fn create_pairing_profile(
        &self,
        profile: &PairingProfile,
    ) -> ApiResult<(PairingProfile, HttpResponse)> {
        let response = self.call(&self.build_create_pairing_profile(profile)?)?;
        Ok((parse_pairing_profile(&response)?, response))
    }

    pub fn create_pairing_key(
        &self,
        profile: &PairingProfile,
    ) -> ApiResult<(PairingKey, HttpResponse)> {
        let response = self.call(&self.build_create_pairing_key(profile)?)?;
        Ok((parse_pairing_key(&response)?, response))
    }
}

pub fn parse_traffic_analysis(response: &HttpResponse) -> ApiResult<Vec<TrafficAnalysis>> {
    decode(response, "traffic analysis")
}

pub fn parse_pairing_profiles(response: &HttpResponse) -> ApiResult<Vec<PairingProfile>> {
    decode(response, "pairing profiles")
}

pub fn parse_pairing_profile(response: &HttpResponse) -> ApiResult<PairingProfile> {
    decode(response, "pairing profile")
}

pub fn parse_pairing_key(response: &HttpResponse) -> ApiResult<PairingKey> {
    decode(response, "pairing key")
}

fn decode<T: DeserializeOwned>(response: &HttpResponse, what: &'static str) -> ApiResult<T> {
    serde_json::from_str(&response.body).map_err(|source| ApiError::Decode { what, source })
}
