//! Translation of a flat traffic query into the Explorer API payload.
//!
//! # Design
//! Each source/destination list is classified by its first entry: an href
//! containing `label` makes the whole list labels, one containing `workload`
//! makes it workloads, anything else is taken as IP addresses and left for
//! the API to validate. Empty lists produce empty arrays, never `null`.

use chrono::{DateTime, Utc};

use crate::types::{FlowSelection, Selector, ServiceSelection, TrafficAnalysisRequest};

/// Caller-facing description of a traffic query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrafficQuery {
    pub sources_include: Vec<String>,
    pub sources_exclude: Vec<String>,
    pub destinations_include: Vec<String>,
    pub destinations_exclude: Vec<String>,
    /// `(port, protocol number)`
    pub port_proto_include: Vec<(u32, u32)>,
    pub port_proto_exclude: Vec<(u32, u32)>,
    /// `(port, to_port)`
    pub port_range_include: Vec<(u32, u32)>,
    pub port_range_exclude: Vec<(u32, u32)>,
    pub process_include: Vec<String>,
    pub process_exclude: Vec<String>,
    pub windows_service_include: Vec<String>,
    pub windows_service_exclude: Vec<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// e.g. `allowed`, `potentially_blocked`, `blocked`
    pub policy_statuses: Vec<String>,
    pub max_flows: Option<u32>,
}

impl TrafficQuery {
    pub fn to_request(&self) -> TrafficAnalysisRequest {
        TrafficAnalysisRequest {
            sources: FlowSelection {
                include: vec![classify(&self.sources_include)],
                exclude: classify(&self.sources_exclude),
            },
            destinations: FlowSelection {
                include: vec![classify(&self.destinations_include)],
                exclude: classify(&self.destinations_exclude),
            },
            services: ServiceSelection {
                include: services(
                    &self.port_proto_include,
                    &self.port_range_include,
                    &self.process_include,
                    &self.windows_service_include,
                ),
                exclude: services(
                    &self.port_proto_exclude,
                    &self.port_range_exclude,
                    &self.process_exclude,
                    &self.windows_service_exclude,
                ),
            },
            start_date: self.start_time,
            end_date: self.end_time,
            policy_decisions: self.policy_statuses.clone(),
            max_results: self.max_flows,
        }
    }
}

fn classify(entries: &[String]) -> Vec<Selector> {
    let Some(first) = entries.first() else {
        return Vec::new();
    };
    let make: fn(&str) -> Selector = if first.contains("label") {
        Selector::label
    } else if first.contains("workload") {
        Selector::workload
    } else if !first.is_empty() {
        Selector::ip_address
    } else {
        return Vec::new();
    };
    entries.iter().map(|entry| make(entry)).collect()
}

fn services(
    port_protos: &[(u32, u32)],
    port_ranges: &[(u32, u32)],
    processes: &[String],
    windows_services: &[String],
) -> Vec<Selector> {
    port_protos
        .iter()
        .map(|&(port, proto)| Selector::port_proto(port, proto))
        .chain(
            port_ranges
                .iter()
                .map(|&(port, to_port)| Selector::port_range(port, to_port)),
        )
        .chain(processes.iter().map(|p| Selector::process(p)))
        .chain(windows_services.iter().map(|s| Selector::windows_service(s)))
        .collect()
}
