//! The health endpoint Consul checks.
//!
//! With gRPC enabled the standard `grpc.health.v1.Health` service is served
//! through `tonic-health`. Otherwise `GET {path}` answers `200 Healthy` while
//! serving and `503 Unhealthy` once shutdown has begun.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use anyhow::bail;
use axum::{Router, extract::State, http::StatusCode, routing::get};
use tonic_health::{ServingStatus, server::HealthReporter};
use url::Url;

/// Served when the health-check target carries no usable path.
pub const DEFAULT_HEALTH_PATH: &str = "/health";

/// The route to serve for a health-check target.
///
/// A bare path is used as is and a URL contributes its path. Anything else
/// (a gRPC `host:port`, say) falls back to [`DEFAULT_HEALTH_PATH`]. Query
/// strings and fragments are dropped.
pub fn health_path(target: &str) -> anyhow::Result<String> {
    let path = if target.starts_with('/') {
        target.split(['?', '#']).next().unwrap_or(DEFAULT_HEALTH_PATH)
    } else {
        match Url::parse(target) {
            Ok(url) if !url.cannot_be_a_base() && url.path() != "/" => {
                return validate(url.path());
            }
            _ => DEFAULT_HEALTH_PATH,
        }
    };
    validate(path)
}

fn validate(path: &str) -> anyhow::Result<String> {
    if path
        .split('/')
        .any(|segment| segment.starts_with([':', '*']) || segment.contains(['{', '}']))
    {
        bail!("health check path `{path}` cannot be served as a literal route");
    }
    Ok(path.to_owned())
}

/// Serving flag behind the HTTP health route.
#[derive(Debug, Clone)]
pub struct HttpHealth {
    serving: Arc<AtomicBool>,
}

impl Default for HttpHealth {
    fn default() -> Self {
        Self {
            serving: Arc::new(AtomicBool::new(true)),
        }
    }
}

impl HttpHealth {
    pub fn router(&self, path: &str) -> Router {
        Router::new()
            .route(path, get(check))
            .with_state(self.clone())
    }

    pub fn set_not_serving(&self) {
        self.serving.store(false, Ordering::Release);
    }

    pub fn is_serving(&self) -> bool {
        self.serving.load(Ordering::Acquire)
    }
}

async fn check(State(health): State<HttpHealth>) -> (StatusCode, &'static str) {
    if health.is_serving() {
        (StatusCode::OK, "Healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "Unhealthy")
    }
}

/// Whichever health endpoint the agent is serving.
#[derive(Clone)]
pub enum Health {
    Grpc {
        reporter: HealthReporter,
        service_name: String,
    },
    Http(HttpHealth),
}

impl Health {
    /// Publishes not-serving so checks fail before the registration goes.
    pub async fn set_not_serving(&self) {
        match self {
            Self::Grpc {
                reporter,
                service_name,
            } => {
                reporter
                    .set_service_status("", ServingStatus::NotServing)
                    .await;
                reporter
                    .set_service_status(service_name, ServingStatus::NotServing)
                    .await;
            }
            Self::Http(health) => health.set_not_serving(),
        }
    }
}
