use url::Url;

use crate::{
    Error, Result,
    check::{CheckTiming, HealthCheckKind, HealthCheckSpec},
};

/// Scheme, host and port of a service, parsed from a URL such as
/// `http://svc:8080`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceAddress {
    pub scheme: String,
    pub host: String,
    pub port: u16,
}

impl ServiceAddress {
    /// Parses a service URL. A missing port falls back to the scheme's
    /// well-known port.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the URL does not parse, has no host,
    /// or has no port and no known default.
    pub fn parse(raw: &str) -> Result<Self> {
        let url = Url::parse(raw)
            .map_err(|e| Error::config(format!("invalid service address `{raw}`: {e}")))?;
        let host = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| Error::config(format!("service address `{raw}` has no host")))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| Error::config(format!("service address `{raw}` has no port")))?;
        Ok(Self {
            scheme: url.scheme().to_owned(),
            host: host.to_owned(),
            port,
        })
    }
}

/// The desired registration of this process, built once at startup.
///
/// Construction validates everything up front, including the health-check
/// declaration, so reconciling a descriptor never fails on configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    name: String,
    address: ServiceAddress,
    api: bool,
    grpc: bool,
    grpc_weight: u32,
    health_check: HealthCheckSpec,
}

impl ServiceDescriptor {
    /// Starts building a descriptor for `name` served at `address`.
    pub fn builder(
        name: impl Into<String>,
        address: impl Into<String>,
    ) -> ServiceDescriptorBuilder {
        ServiceDescriptorBuilder {
            name: name.into(),
            address: address.into(),
            api: true,
            grpc: false,
            grpc_weight: 1,
            health_check: String::new(),
            timing: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &ServiceAddress {
        &self.address
    }

    pub fn supports_api(&self) -> bool {
        self.api
    }

    pub fn supports_grpc(&self) -> bool {
        self.grpc
    }

    /// The gRPC weight advertised in metadata, never below 1.
    pub fn grpc_weight(&self) -> u32 {
        self.grpc_weight
    }

    pub fn health_check(&self) -> &HealthCheckSpec {
        &self.health_check
    }
}

/// Builder for [`ServiceDescriptor`].
#[derive(Debug, Clone)]
pub struct ServiceDescriptorBuilder {
    name: String,
    address: String,
    api: bool,
    grpc: bool,
    grpc_weight: i64,
    health_check: String,
    timing: Option<CheckTiming>,
}

impl ServiceDescriptorBuilder {
    /// Whether the service exposes an HTTP API. Defaults to `true`.
    pub fn api(mut self, enabled: bool) -> Self {
        self.api = enabled;
        self
    }

    /// Whether the service exposes gRPC. Defaults to `false`.
    pub fn grpc(mut self, enabled: bool) -> Self {
        self.grpc = enabled;
        self
    }

    /// Load-balancing weight for gRPC clients. Values `<= 0` mean 1.
    pub fn grpc_weight(mut self, weight: i64) -> Self {
        self.grpc_weight = weight;
        self
    }

    /// The health-check target: a full URL, a bare path, or a gRPC target.
    pub fn health_check(mut self, target: impl Into<String>) -> Self {
        self.health_check = target.into();
        self
    }

    /// Replaces the default check timings.
    pub fn check_timing(mut self, timing: CheckTiming) -> Self {
        self.timing = Some(timing);
        self
    }

    /// Validates the description and derives its health check.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for an empty name or health-check
    /// target, an unparsable service address, or an unparsable `https`
    /// health-check URL.
    pub fn build(self) -> Result<ServiceDescriptor> {
        if self.name.trim().is_empty() {
            return Err(Error::config("service name must not be empty"));
        }
        if self.health_check.trim().is_empty() {
            return Err(Error::config("health check target must not be empty"));
        }

        let address = ServiceAddress::parse(&self.address)?;
        let kind = HealthCheckKind::derive(self.grpc, &self.health_check, &address)?;
        let grpc_weight = u32::try_from(self.grpc_weight.max(1)).unwrap_or(u32::MAX);

        Ok(ServiceDescriptor {
            name: self.name,
            address,
            api: self.api,
            grpc: self.grpc,
            grpc_weight,
            health_check: HealthCheckSpec {
                kind,
                timing: self.timing.unwrap_or_default(),
            },
        })
    }
}
