//! Typed views of the captured resource kinds the analyzers read.
//!
//! Only the fields the analyzers look at are modelled; everything else in the
//! captured JSON is ignored. All fields default so partially captured objects
//! still decode.

use std::collections::BTreeMap;

use serde::Deserialize;
use time::OffsetDateTime;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct List<T> {
    pub items: Vec<T>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    pub namespace: String,
    pub labels: BTreeMap<String, String>,
    pub deletion_timestamp: Option<String>,
    pub creation_timestamp: Option<String>,
    pub finalizers: Vec<String>,
}

impl ObjectMeta {
    pub fn deletion_time(&self) -> Option<OffsetDateTime> {
        self.deletion_timestamp
            .as_deref()
            .and_then(crate::search::parse_timestamp)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: String,
    pub reason: String,
    pub message: String,
}

pub type PodList = List<Pod>;
pub type EventList = List<Event>;
pub type ServiceList = List<Service>;
pub type CertificateList = List<Certificate>;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Pod {
    pub metadata: ObjectMeta,
    pub spec: PodSpec,
    pub status: PodStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PodSpec {
    pub readiness_gates: Vec<ReadinessGate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReadinessGate {
    pub condition_type: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PodStatus {
    pub phase: String,
    pub reason: String,
    pub message: String,
    pub conditions: Vec<Condition>,
    pub init_container_statuses: Vec<ContainerStatus>,
    pub container_statuses: Vec<ContainerStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ContainerStatus {
    pub name: String,
    pub image: String,
    pub ready: bool,
    pub state: ContainerState,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ContainerState {
    pub waiting: Option<StateDetail>,
    pub running: Option<RunningState>,
    pub terminated: Option<StateDetail>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StateDetail {
    pub reason: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RunningState {
    pub started_at: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Event {
    pub metadata: ObjectMeta,
    pub involved_object: ObjectReference,
    pub reason: String,
    pub message: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub first_timestamp: Option<String>,
    pub last_timestamp: Option<String>,
    pub event_time: Option<String>,
}

impl Event {
    /// Most recent time recorded on the event.
    pub fn timestamp(&self) -> Option<OffsetDateTime> {
        [&self.last_timestamp, &self.event_time, &self.first_timestamp]
            .into_iter()
            .flatten()
            .find_map(|s| crate::search::parse_timestamp(s))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ObjectReference {
    pub kind: String,
    pub name: String,
    pub namespace: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Service {
    pub metadata: ObjectMeta,
    pub spec: ServiceSpec,
    pub status: ServiceStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServiceSpec {
    #[serde(rename = "type")]
    pub service_type: String,
    #[serde(rename = "externalIPs")]
    pub external_ips: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServiceStatus {
    pub load_balancer: LoadBalancerStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoadBalancerStatus {
    pub ingress: Vec<LoadBalancerIngress>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoadBalancerIngress {
    pub ip: String,
    pub hostname: String,
}

impl Service {
    pub fn has_external_address(&self) -> bool {
        !self.spec.external_ips.is_empty() || !self.status.load_balancer.ingress.is_empty()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Namespace {
    pub metadata: ObjectMeta,
    pub status: NamespaceStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NamespaceStatus {
    pub phase: String,
    pub conditions: Vec<Condition>,
}

/// cert-manager `Certificate`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Certificate {
    pub metadata: ObjectMeta,
    pub spec: CertificateSpec,
    pub status: CertificateStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CertificateSpec {
    pub secret_name: String,
    pub dns_names: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CertificateStatus {
    pub conditions: Vec<Condition>,
    pub not_after: Option<String>,
}

impl Certificate {
    pub fn is_ready(&self) -> bool {
        self.status
            .conditions
            .iter()
            .any(|c| c.condition_type == "Ready" && c.status == "True")
    }

    pub fn expiry(&self) -> Option<OffsetDateTime> {
        self.status
            .not_after
            .as_deref()
            .and_then(crate::search::parse_timestamp)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CaCrtInfo {
    pub name: String,
    pub expired: bool,
}

/// The Verrazzano install custom resource.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Verrazzano {
    pub metadata: ObjectMeta,
    pub status: VerrazzanoStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VerrazzanoStatus {
    pub state: String,
    pub version: String,
    pub conditions: Vec<Condition>,
    pub components: BTreeMap<String, ComponentStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ComponentStatus {
    pub name: String,
    pub state: String,
    pub available: Option<String>,
}

impl ComponentStatus {
    pub fn is_ready(&self) -> bool {
        self.state == "Ready"
    }

    pub fn is_disabled(&self) -> bool {
        self.state == "Disabled"
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self.available.as_deref(), Some("Unavailable") | Some("False"))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerrazzanoList {
    pub items: Vec<Verrazzano>,
}

/// Captured Verrazzano resources are either a list or a single object.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum VerrazzanoResources {
    List(VerrazzanoList),
    Single(Box<Verrazzano>),
}

impl VerrazzanoResources {
    pub fn into_items(self) -> Vec<Verrazzano> {
        match self {
            VerrazzanoResources::List(list) => list.items,
            VerrazzanoResources::Single(vz) => vec![*vz],
        }
    }
}
