//! The PCE instance a call is made against.
//!
//! # Design
//! `PceEndpoint` is an immutable value passed explicitly to every call; the
//! crate keeps no global session. URL helpers run the host through
//! `pce_sanitization` so callers can paste a host with a scheme or trailing
//! slash and still get a well-formed API URL.

use std::env;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use url::Url;

use crate::error::{ApiError, ApiResult};

/// Host, port, org, credentials, and TLS policy for one PCE.
#[derive(Clone, PartialEq, Eq)]
pub struct PceEndpoint {
    pub fqdn: String,
    pub port: u16,
    pub org: u32,
    pub user: String,
    pub key: String,
    pub disable_tls_checking: bool,
    /// `https` unless talking to a local plaintext test server.
    pub scheme: String,
}

impl PceEndpoint {
    pub fn new(fqdn: &str, port: u16, org: u32, user: &str, key: &str) -> Self {
        Self {
            fqdn: fqdn.to_string(),
            port,
            org,
            user: user.to_string(),
            key: key.to_string(),
            disable_tls_checking: false,
            scheme: "https".to_string(),
        }
    }

    #[must_use]
    pub fn with_tls_checking_disabled(mut self, disabled: bool) -> Self {
        self.disable_tls_checking = disabled;
        self
    }

    #[must_use]
    pub fn with_scheme(mut self, scheme: &str) -> Self {
        self.scheme = scheme.to_string();
        self
    }

    /// Read the endpoint from `PCE_FQDN`, `PCE_PORT`, `PCE_ORG`, `PCE_USER`,
    /// `PCE_KEY` and the optional `PCE_DISABLE_TLS` (`1` or `true`).
    pub fn from_env() -> ApiResult<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as `from_env`, reading each variable through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ApiResult<Self> {
        let required = |name: &str| {
            lookup(name).ok_or_else(|| ApiError::Config(format!("{name} is not set")))
        };
        let fqdn = required("PCE_FQDN")?;
        let port = parse_var("PCE_PORT", &required("PCE_PORT")?)?;
        let org = parse_var("PCE_ORG", &required("PCE_ORG")?)?;
        let user = required("PCE_USER")?;
        let key = required("PCE_KEY")?;
        let disable_tls = lookup("PCE_DISABLE_TLS")
            .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"));
        Ok(Self::new(&fqdn, port, org, &user, &key).with_tls_checking_disabled(disable_tls))
    }

    /// `<scheme>://<host>:<port>/api/v1`
    pub fn api_base(&self) -> String {
        format!(
            "{}://{}:{}/api/v1",
            self.scheme,
            pce_sanitization(&self.fqdn),
            self.port
        )
    }

    /// URL of a resource under this endpoint's org, e.g. `pairing_profiles`.
    pub fn org_url(&self, path: &str) -> ApiResult<Url> {
        let raw = format!(
            "{}/orgs/{}/{}",
            self.api_base(),
            self.org,
            path.trim_start_matches('/')
        );
        Ok(Url::parse(&raw)?)
    }

    /// URL of an href returned by the API, such as `/orgs/1/pairing_profiles/3`.
    pub fn href_url(&self, href: &str) -> ApiResult<Url> {
        Ok(Url::parse(&format!("{}{}", self.api_base(), href))?)
    }

    /// Value of the `Authorization` header for these credentials.
    pub fn basic_auth(&self) -> String {
        let token = STANDARD.encode(format!("{}:{}", self.user, self.key));
        format!("Basic {token}")
    }
}

impl std::fmt::Debug for PceEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PceEndpoint")
            .field("fqdn", &self.fqdn)
            .field("port", &self.port)
            .field("org", &self.org)
            .field("user", &self.user)
            .field("key", &"<redacted>")
            .field("disable_tls_checking", &self.disable_tls_checking)
            .field("scheme", &self.scheme)
            .finish()
    }
}

/// Normalize a user-supplied PCE host: drop one trailing slash, then a
/// leading `https://`. Nothing else is touched.
pub fn pce_sanitization(fqdn: &str) -> String {
    let fqdn = fqdn.strip_suffix('/').unwrap_or(fqdn);
    fqdn.strip_prefix("https://").unwrap_or(fqdn).to_string()
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> ApiResult<T> {
    value
        .parse()
        .map_err(|_| ApiError::Config(format!("{name} has invalid value {value:?}")))
}
