//! Transport configuration.

use std::time::Duration;

/// Limits and identity applied by `Transport` to every call.
///
/// # Example
///
/// ```
/// use pce_core::TransportConfig;
/// use std::time::Duration;
///
/// let config = TransportConfig::new()
///     .with_max_poll_attempts(Some(100))
///     .with_poll_deadline(Some(Duration::from_secs(600)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Maximum number of job-status polls; `None` polls until the job is done.
    pub(crate) max_poll_attempts: Option<u32>,
    /// Wall-clock budget for the polling phase, checked before each wait.
    pub(crate) poll_deadline: Option<Duration>,
    /// Sent as `User-Agent` on every request.
    pub(crate) user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_poll_attempts: Some(720),
            poll_deadline: None,
            user_agent: concat!("pce-core/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl TransportConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap the number of polls. `None` restores unbounded polling.
    #[must_use]
    pub const fn with_max_poll_attempts(mut self, attempts: Option<u32>) -> Self {
        self.max_poll_attempts = attempts;
        self
    }

    #[must_use]
    pub const fn with_poll_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.poll_deadline = deadline;
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn max_poll_attempts(&self) -> Option<u32> {
        self.max_poll_attempts
    }

    pub fn poll_deadline(&self) -> Option<Duration> {
        self.poll_deadline
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_bounds_polling() {
        let config = TransportConfig::default();
        assert_eq!(config.max_poll_attempts(), Some(720));
        assert!(config.poll_deadline().is_none());
        assert!(config.user_agent().starts_with("pce-core/"));
    }

    #[test]
    fn builder_overrides_fields() {
        let config = TransportConfig::new()
            .with_max_poll_attempts(None)
            .with_poll_deadline(Some(Duration::from_secs(30)))
            .with_user_agent("flow-exporter/2.0");
        assert_eq!(config.max_poll_attempts(), None);
        assert_eq!(config.poll_deadline(), Some(Duration::from_secs(30)));
        assert_eq!(config.user_agent(), "flow-exporter/2.0");
    }
}
