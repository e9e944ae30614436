use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::{check::HealthCheckSpec, descriptor::ServiceDescriptor};

/// Tag advertised when the service exposes an HTTP API.
pub const API_TAG: &str = "Api";

/// Tag advertised when the service exposes gRPC.
pub const GRPC_TAG: &str = "gRPC";

/// Metadata key holding the service URL scheme.
pub const SCHEME_META: &str = "Scheme";

/// Metadata key holding the gRPC load-balancing weight.
pub const GRPC_WEIGHT_META: &str = "GrpcWeight";

/// A registration as submitted to the backend's agent API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistrationRecord {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Address")]
    pub address: String,
    #[serde(rename = "Port")]
    pub port: u16,
    #[serde(rename = "Tags")]
    pub tags: Vec<String>,
    #[serde(rename = "Meta")]
    pub meta: BTreeMap<String, String>,
    #[serde(rename = "Check")]
    pub check: HealthCheckSpec,
}

impl RegistrationRecord {
    /// Builds the record for `descriptor` under the given service ID.
    pub fn new(id: impl Into<String>, descriptor: &ServiceDescriptor) -> Self {
        let address = descriptor.address();

        let mut tags = Vec::with_capacity(2);
        if descriptor.supports_api() {
            tags.push(API_TAG.to_owned());
        }
        if descriptor.supports_grpc() {
            tags.push(GRPC_TAG.to_owned());
        }

        let mut meta = BTreeMap::new();
        meta.insert(SCHEME_META.to_owned(), address.scheme.clone());
        if descriptor.supports_grpc() {
            meta.insert(
                GRPC_WEIGHT_META.to_owned(),
                descriptor.grpc_weight().to_string(),
            );
        }

        Self {
            id: id.into(),
            name: descriptor.name().to_owned(),
            address: address.host.clone(),
            port: address.port,
            tags,
            meta,
            check: descriptor.health_check().clone(),
        }
    }

    /// The entry the backend will report for this record.
    pub fn to_entry(&self) -> ServiceEntry {
        ServiceEntry {
            id: self.id.clone(),
            name: self.name.clone(),
            address: self.address.clone(),
            port: self.port,
            tags: self.tags.clone(),
            meta: self.meta.clone(),
        }
    }
}

/// A service instance as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServiceEntry {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Service")]
    pub name: String,
    #[serde(rename = "Address", default)]
    pub address: String,
    #[serde(rename = "Port", default)]
    pub port: u16,
    #[serde(rename = "Tags", default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    #[serde(rename = "Meta", default, deserialize_with = "null_as_default")]
    pub meta: BTreeMap<String, String>,
}

impl ServiceEntry {
    /// Whether this entry is the registration `descriptor` describes.
    ///
    /// Only name, address and port are compared; tags, metadata and the
    /// check may differ.
    pub fn matches(&self, descriptor: &ServiceDescriptor) -> bool {
        let address = descriptor.address();
        self.name == descriptor.name() && self.address == address.host && self.port == address.port
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
