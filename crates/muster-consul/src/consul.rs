//! Consul agent HTTP client.

use core::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use crate::{Catalog, Error, RegistrationRecord, Result, ServiceEntry};

/// Header carrying the ACL token on every request.
pub const TOKEN_HEADER: &str = "X-Consul-Token";

/// [`Catalog`] backed by a Consul agent.
///
/// - `list_services` → `GET /v1/health/service/{name}`
/// - `register_service` → `PUT /v1/agent/service/register`
/// - `deregister_service` → `PUT /v1/agent/service/deregister/{id}`
#[derive(Debug, Clone)]
pub struct ConsulCatalog {
    base_url: Url,
    token: Option<String>,
    client: reqwest::Client,
}

impl ConsulCatalog {
    /// Creates a client for the agent at `address` (e.g.
    /// `http://127.0.0.1:8500`).
    ///
    /// `request_timeout` bounds every request end to end.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `address` is not an absolute
    /// http(s) URL, or [`Error::BackendUnavailable`] if the HTTP client cannot
    /// be initialised.
    ///
    /// # Examples
    ///
    /// ```
    /// use core::time::Duration;
    /// use muster_consul::ConsulCatalog;
    ///
    /// let consul = ConsulCatalog::new("http://localhost:8500", None, Duration::from_secs(5));
    /// assert!(consul.is_ok());
    /// ```
    pub fn new(address: &str, token: Option<String>, request_timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(address)
            .map_err(|e| Error::config(format!("invalid Consul address `{address}`: {e}")))?;
        if base_url.cannot_be_a_base() || !matches!(base_url.scheme(), "http" | "https") {
            return Err(Error::config(format!(
                "Consul address `{address}` must be an http(s) URL"
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            base_url,
            token: token.filter(|t| !t.is_empty()),
            client,
        })
    }

    /// Appends path segments to the agent address, percent-encoding each.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| Error::config(format!("invalid Consul address `{}`", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let request = self.client.request(method, url);
        match &self.token {
            Some(token) => request.header(TOKEN_HEADER, token),
            None => request,
        }
    }

    async fn check(operation: &'static str, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(Error::Rejected {
            operation,
            status: status.as_u16(),
            body,
        })
    }
}

#[derive(Deserialize)]
struct HealthServiceEntry {
    #[serde(rename = "Service")]
    service: ServiceEntry,
}

#[async_trait]
impl Catalog for ConsulCatalog {
    async fn list_services(&self, name: &str) -> Result<Vec<ServiceEntry>> {
        let url = self.endpoint(&["v1", "health", "service", name])?;
        let response = self.request(Method::GET, url).send().await?;
        let response = Self::check("service query", response).await?;

        let entries: Vec<HealthServiceEntry> = response.json().await?;
        let entries: Vec<ServiceEntry> = entries.into_iter().map(|e| e.service).collect();

        debug!(
            "Discovered {} instances of service {}",
            entries.len(),
            name
        );
        Ok(entries)
    }

    async fn register_service(&self, record: &RegistrationRecord) -> Result<()> {
        let url = self.endpoint(&["v1", "agent", "service", "register"])?;
        let response = self.request(Method::PUT, url).json(record).send().await?;
        Self::check("registration", response).await?;

        info!("Registered service {} with Consul", record.id);
        Ok(())
    }

    async fn deregister_service(&self, id: &str) -> Result<()> {
        let url = self.endpoint(&["v1", "agent", "service", "deregister", id])?;
        let response = self.request(Method::PUT, url).send().await?;
        Self::check("deregistration", response).await?;

        info!("Deregistered service {} from Consul", id);
        Ok(())
    }
}
