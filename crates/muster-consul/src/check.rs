//! Health-check declarations handed to the discovery backend.
//!
//! The backend checks the service; this module only decides *how* it should
//! check it. Exactly one transport is declared per registration:
//!
//! | condition                                   | check  |
//! |---------------------------------------------|--------|
//! | gRPC enabled                                | `GRPC` |
//! | target starts with `https` (any case)       | `TCP`  |
//! | target is a bare path (`/…`)                | `HTTP`, expanded against the service URL |
//! | anything else                               | `HTTP`, verbatim |

use core::{fmt, time::Duration};

use serde::{Serialize, Serializer};
use url::Url;

use crate::{Error, Result, descriptor::ServiceAddress};

/// Default for each of the check timings.
pub const DEFAULT_CHECK_TIMING: Duration = Duration::from_millis(5000);

/// The transport-specific part of a health check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthCheckKind {
    /// gRPC health protocol over TLS, without certificate verification.
    Grpc { target: String },
    /// Plain TCP connect to `host:port`.
    Tcp { address: String },
    /// HTTP GET against a fully-qualified URL.
    Http { url: String },
}

impl HealthCheckKind {
    /// Chooses the check transport for a service.
    ///
    /// gRPC wins over everything. Otherwise an `https`-prefixed target is
    /// declared as a TCP check on its host and port, a bare path is expanded
    /// to `{scheme}://{host}:{port}{path}` using the service's own address,
    /// and any other target is passed through as an HTTP URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if an `https` target is not a valid
    /// URL with a host.
    pub fn derive(grpc: bool, target: &str, service: &ServiceAddress) -> Result<Self> {
        if grpc {
            return Ok(Self::Grpc {
                target: target.to_owned(),
            });
        }

        if starts_with_ignore_ascii_case(target, "https") {
            let url = Url::parse(target)
                .map_err(|e| Error::config(format!("invalid health check URL `{target}`: {e}")))?;
            let host = url
                .host_str()
                .ok_or_else(|| Error::config(format!("health check URL `{target}` has no host")))?;
            let port = url.port_or_known_default().ok_or_else(|| {
                Error::config(format!("health check URL `{target}` has no port"))
            })?;
            return Ok(Self::Tcp {
                address: format!("{host}:{port}"),
            });
        }

        let url = if target.starts_with('/') {
            format!(
                "{}://{}:{}{}",
                service.scheme, service.host, service.port, target
            )
        } else {
            target.to_owned()
        };
        Ok(Self::Http { url })
    }
}

/// Timeout, check interval and the critical period after which the backend
/// drops the registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckTiming {
    pub timeout: Duration,
    pub interval: Duration,
    pub deregister_critical_after: Duration,
}

impl Default for CheckTiming {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_CHECK_TIMING,
            interval: DEFAULT_CHECK_TIMING,
            deregister_critical_after: DEFAULT_CHECK_TIMING,
        }
    }
}

/// A complete health-check declaration.
///
/// Serializes to the backend's check object, e.g.
///
/// ```json
/// { "HTTP": "http://svc:8080/healthz", "Timeout": "5s", "Interval": "5s",
///   "DeregisterCriticalServiceAfter": "5s" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheckSpec {
    pub kind: HealthCheckKind,
    pub timing: CheckTiming,
}

#[derive(Serialize)]
struct CheckPayload<'a> {
    #[serde(rename = "HTTP", skip_serializing_if = "Option::is_none")]
    http: Option<&'a str>,
    #[serde(rename = "TCP", skip_serializing_if = "Option::is_none")]
    tcp: Option<&'a str>,
    #[serde(rename = "GRPC", skip_serializing_if = "Option::is_none")]
    grpc: Option<&'a str>,
    #[serde(rename = "GRPCUseTLS", skip_serializing_if = "Option::is_none")]
    grpc_use_tls: Option<bool>,
    #[serde(rename = "TLSSkipVerify", skip_serializing_if = "Option::is_none")]
    tls_skip_verify: Option<bool>,
    #[serde(rename = "Timeout")]
    timeout: GoDuration,
    #[serde(rename = "Interval")]
    interval: GoDuration,
    #[serde(rename = "DeregisterCriticalServiceAfter")]
    deregister_critical_service_after: GoDuration,
}

impl Serialize for HealthCheckSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        let mut payload = CheckPayload {
            http: None,
            tcp: None,
            grpc: None,
            grpc_use_tls: None,
            tls_skip_verify: None,
            timeout: GoDuration(self.timing.timeout),
            interval: GoDuration(self.timing.interval),
            deregister_critical_service_after: GoDuration(self.timing.deregister_critical_after),
        };
        match &self.kind {
            HealthCheckKind::Grpc { target } => {
                payload.grpc = Some(target);
                payload.grpc_use_tls = Some(true);
                payload.tls_skip_verify = Some(true);
            }
            HealthCheckKind::Tcp { address } => payload.tcp = Some(address),
            HealthCheckKind::Http { url } => payload.http = Some(url),
        }
        payload.serialize(serializer)
    }
}

/// A [`Duration`] rendered the way Go's `time.Duration.String()` does
/// (`5s`, `1.5s`, `500ms`, `1m30s`), which is what the backend parses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GoDuration(pub Duration);

impl fmt::Display for GoDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NANOS_PER_SEC: u128 = 1_000_000_000;

        let nanos = self.0.as_nanos();
        if nanos == 0 {
            return f.write_str("0s");
        }

        if nanos < NANOS_PER_SEC {
            let (scale, unit) = match nanos {
                0..1_000 => (1, "ns"),
                1_000..1_000_000 => (1_000, "µs"),
                _ => (1_000_000, "ms"),
            };
            write_fraction(f, nanos, scale)?;
            return f.write_str(unit);
        }

        let secs = nanos / NANOS_PER_SEC;
        let (hours, minutes, seconds) = (secs / 3600, (secs / 60) % 60, secs % 60);
        if hours > 0 {
            write!(f, "{hours}h")?;
        }
        if hours > 0 || minutes > 0 {
            write!(f, "{minutes}m")?;
        }
        write_fraction(f, seconds * NANOS_PER_SEC + nanos % NANOS_PER_SEC, NANOS_PER_SEC)?;
        f.write_str("s")
    }
}

impl Serialize for GoDuration {
    fn serialize<S: Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Writes `value / scale` with trailing fractional zeros trimmed.
fn write_fraction(f: &mut fmt::Formatter<'_>, value: u128, scale: u128) -> fmt::Result {
    let (whole, rem) = (value / scale, value % scale);
    if rem == 0 {
        return write!(f, "{whole}");
    }
    let width = scale.ilog10() as usize;
    let digits = format!("{rem:0width$}");
    write!(f, "{whole}.{}", digits.trim_end_matches('0'))
}

fn starts_with_ignore_ascii_case(s: &str, prefix: &str) -> bool {
    s.get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}
