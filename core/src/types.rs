//! DTOs mirroring the PCE API JSON shapes.
//!
//! # Design
//! Field names follow the API's snake_case JSON directly. Optional strings
//! use `skip_serializing_if` so payloads only carry what the caller set;
//! the lock flags on `PairingProfile` are always sent because the API reads
//! a missing flag as `false` anyway and round-tripping should be lossless.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

fn is_false(value: &bool) -> bool {
    !*value
}

// ---------------------------------------------------------------------------
// Shared references
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Label {
    pub href: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Workload {
    pub href: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// `{"href": ...}` pointer to the user who created or updated an object.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserRef {
    pub href: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IpAddress {
    pub value: String,
}

// ---------------------------------------------------------------------------
// Traffic analysis (Explorer)
// ---------------------------------------------------------------------------

/// One include or exclude entry of a traffic query.
///
/// Only one kind should be set per entry: a label, a workload, an IP
/// address, or a service (port and protocol or range, process, windows
/// service).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Selector {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<Label>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workload: Option<Workload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<IpAddress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_port: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proto: Option<u32>,
    #[serde(default, rename = "process_name", skip_serializing_if = "Option::is_none")]
    pub process: Option<String>,
    #[serde(
        default,
        rename = "windows_service_name",
        skip_serializing_if = "Option::is_none"
    )]
    pub windows_service: Option<String>,
}

impl Selector {
    pub fn label(href: &str) -> Self {
        Self {
            label: Some(Label {
                href: href.to_string(),
                ..Label::default()
            }),
            ..Self::default()
        }
    }

    pub fn workload(href: &str) -> Self {
        Self {
            workload: Some(Workload {
                href: href.to_string(),
                ..Workload::default()
            }),
            ..Self::default()
        }
    }

    pub fn ip_address(value: &str) -> Self {
        Self {
            ip_address: Some(IpAddress {
                value: value.to_string(),
            }),
            ..Self::default()
        }
    }

    /// A zero port or proto is treated as unset and left out of the payload.
    pub fn port_proto(port: u32, proto: u32) -> Self {
        Self {
            port: nonzero(port),
            proto: nonzero(proto),
            ..Self::default()
        }
    }

    /// Zero bounds are left out, as in `port_proto`.
    pub fn port_range(port: u32, to_port: u32) -> Self {
        Self {
            port: nonzero(port),
            to_port: nonzero(to_port),
            ..Self::default()
        }
    }

    pub fn process(name: &str) -> Self {
        Self {
            process: Some(name.to_string()),
            ..Self::default()
        }
    }

    pub fn windows_service(name: &str) -> Self {
        Self {
            windows_service: Some(name.to_string()),
            ..Self::default()
        }
    }
}

/// Sources or destinations of a traffic query. The API takes the include
/// side as a list of AND-groups; the builder always sends a single group.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FlowSelection {
    pub include: Vec<Vec<Selector>>,
    pub exclude: Vec<Selector>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceSelection {
    pub include: Vec<Selector>,
    pub exclude: Vec<Selector>,
}

/// Payload of `POST .../traffic_flows/traffic_analysis_queries`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrafficAnalysisRequest {
    pub sources: FlowSelection,
    pub destinations: FlowSelection,
    pub services: ServiceSelection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    pub policy_decisions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_results: Option<u32>,
}

/// One aggregated flow returned by a traffic query.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrafficAnalysis {
    #[serde(default)]
    pub src: Option<FlowEnd>,
    #[serde(default)]
    pub dst: Option<FlowEnd>,
    #[serde(default)]
    pub service: Option<FlowService>,
    #[serde(default)]
    pub num_connections: u64,
    #[serde(default)]
    pub policy_decision: String,
    #[serde(default)]
    pub timestamp_range: Option<TimestampRange>,
}

/// Consumer (`src`) or provider (`dst`) side of a flow.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FlowEnd {
    #[serde(default)]
    pub ip: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workload: Option<Workload>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FlowService {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proto: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub windows_service_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimestampRange {
    pub first_detected: String,
    pub last_detected: String,
}

// ---------------------------------------------------------------------------
// Pairing
// ---------------------------------------------------------------------------

/// A pairing profile: the template pairing keys are issued from.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PairingProfile {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub allowed_uses_per_key: String,
    pub app_label_lock: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<UserRef>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub enabled: bool,
    pub env_label_lock: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub external_data_reference: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub external_data_set: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub href: String,
    #[serde(skip_serializing_if = "is_false")]
    pub is_default: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub key_lifespan: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<Label>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub last_pairing_at: String,
    pub loc_label_lock: bool,
    pub log_traffic: bool,
    pub log_traffic_lock: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub mode: String,
    pub mode_lock: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    pub role_label_lock: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_use_count: Option<u64>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<UserRef>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub visibility_level: String,
    pub visibility_level_lock: bool,
}

/// Key a VEN uses to pair with the PCE.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PairingKey {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub activation_code: String,
}

fn nonzero(value: u32) -> Option<u32> {
    (value != 0).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_ports_and_protos_are_omitted() {
        let json = serde_json::to_value(Selector::port_proto(0, 17)).unwrap();
        assert_eq!(json, serde_json::json!({"proto": 17}));

        let json = serde_json::to_value(Selector::port_range(0, 0)).unwrap();
        assert_eq!(json, serde_json::json!({}));
    }

    #[test]
    fn selector_serializes_only_set_fields() {
        let json = serde_json::to_value(Selector::port_proto(3306, 6)).unwrap();
        assert_eq!(json, serde_json::json!({"port": 3306, "proto": 6}));

        let json = serde_json::to_value(Selector::process("sshd")).unwrap();
        assert_eq!(json, serde_json::json!({"process_name": "sshd"}));
    }

    #[test]
    fn label_selector_nests_href() {
        let json = serde_json::to_value(Selector::label("/orgs/1/labels/7")).unwrap();
        assert_eq!(json, serde_json::json!({"label": {"href": "/orgs/1/labels/7"}}));
    }

    #[test]
    fn pairing_profile_always_sends_lock_flags() {
        let profile = PairingProfile {
            name: "web-tier".to_string(),
            enabled: true,
            ..PairingProfile::default()
        };
        let json = serde_json::to_value(&profile).unwrap();
        assert_eq!(json["name"], "web-tier");
        assert_eq!(json["enabled"], true);
        assert_eq!(json["app_label_lock"], false);
        assert_eq!(json["visibility_level_lock"], false);
        assert!(json.get("href").is_none());
        assert!(json.get("is_default").is_none());
        assert!(json.get("labels").is_none());
    }

    #[test]
    fn pairing_profile_tolerates_nulls_and_missing_fields() {
        let profile: PairingProfile = serde_json::from_str(
            r#"{"href":"/orgs/1/pairing_profiles/3","name":"db","created_by":{"href":"/users/1"},"updated_by":null}"#,
        )
        .unwrap();
        assert_eq!(profile.href, "/orgs/1/pairing_profiles/3");
        assert_eq!(profile.created_by.unwrap().href, "/users/1");
        assert!(profile.updated_by.is_none());
        assert!(!profile.enabled);
    }

    #[test]
    fn traffic_analysis_decodes_flow() {
        let flow: TrafficAnalysis = serde_json::from_str(
            r#"{
                "src": {"ip": "10.0.0.5", "workload": {"href": "/orgs/1/workloads/a", "hostname": "web-1"}},
                "dst": {"ip": "10.0.0.9"},
                "service": {"port": 443, "proto": 6},
                "num_connections": 12,
                "policy_decision": "allowed",
                "timestamp_range": {"first_detected": "2024-03-01T00:00:00Z", "last_detected": "2024-03-02T00:00:00Z"}
            }"#,
        )
        .unwrap();
        assert_eq!(flow.src.unwrap().workload.unwrap().hostname.as_deref(), Some("web-1"));
        assert_eq!(flow.service.unwrap().port, Some(443));
        assert_eq!(flow.num_connections, 12);
    }
}
