use core::time::Duration;
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{ArgAction, Parser};
use muster::SnowflakeId;
use muster_consul::{CheckTiming, DEFAULT_CHECK_TIMING, HealthCheckKind, ServiceDescriptor};
use tonic::transport::Identity;

use super::health::health_path;

/// Runtime configuration for the `muster-agent` binary.
///
/// Every setting can be given as a CLI flag or an environment variable (a
/// `.env` file in the working directory is loaded first).
#[derive(Parser, Debug, Clone)]
#[command(
    name = "muster-agent",
    version,
    about = "Registers a service with Consul and deregisters it on shutdown"
)]
pub struct CliArgs {
    /// Address of the Consul agent's HTTP API.
    ///
    /// Environment variable: `CONSUL_ADDRESS`
    #[arg(long, env = "CONSUL_ADDRESS", default_value_t = String::from("http://127.0.0.1:8500"))]
    pub consul_address: String,

    /// ACL token sent as `X-Consul-Token` on every Consul request.
    ///
    /// Environment variable: `CONSUL_TOKEN`
    #[arg(long, env = "CONSUL_TOKEN", hide_env_values = true)]
    pub consul_token: Option<String>,

    /// Logical service name shared by every instance.
    ///
    /// Environment variable: `SERVICE_NAME`
    #[arg(long, env = "SERVICE_NAME")]
    pub service_name: String,

    /// URL other services use to reach this instance, e.g.
    /// `http://10.0.0.5:8080`.
    ///
    /// Environment variable: `SERVICE_ADDRESS`
    #[arg(long, env = "SERVICE_ADDRESS")]
    pub service_address: String,

    /// Health-check target: a bare path (`/health`), a full URL, or a gRPC
    /// `host:port` when gRPC is enabled.
    ///
    /// Environment variable: `HEALTH_CHECK`
    #[arg(long, env = "HEALTH_CHECK", default_value_t = String::from("/health"))]
    pub health_check: String,

    /// Advertise the HTTP API (`Api` tag).
    ///
    /// Environment variable: `ENABLE_API_SERVICE`
    #[arg(long, env = "ENABLE_API_SERVICE", default_value_t = true, action = ArgAction::Set)]
    pub enable_api_service: bool,

    /// Advertise gRPC (`gRPC` tag). Switches the health check to the gRPC
    /// health protocol.
    ///
    /// Environment variable: `ENABLE_GRPC_SERVICE`
    #[arg(long, env = "ENABLE_GRPC_SERVICE", default_value_t = false, action = ArgAction::Set)]
    pub enable_grpc_service: bool,

    /// Load-balancing weight published as `GrpcWeight`. Values below 1 are
    /// published as 1.
    ///
    /// Environment variable: `GRPC_WEIGHT`
    #[arg(long, env = "GRPC_WEIGHT", default_value_t = 1, allow_negative_numbers = true)]
    pub grpc_weight: i64,

    /// Health-check timeout in milliseconds.
    ///
    /// Environment variable: `CHECK_TIMEOUT_MS`
    #[arg(long, env = "CHECK_TIMEOUT_MS")]
    pub check_timeout_ms: Option<u64>,

    /// Health-check interval in milliseconds.
    ///
    /// Environment variable: `CHECK_INTERVAL_MS`
    #[arg(long, env = "CHECK_INTERVAL_MS")]
    pub check_interval_ms: Option<u64>,

    /// How long the check may stay critical before Consul drops the
    /// registration, in milliseconds.
    ///
    /// Environment variable: `CHECK_DEREGISTER_AFTER_MS`
    #[arg(long, env = "CHECK_DEREGISTER_AFTER_MS")]
    pub check_deregister_after_ms: Option<u64>,

    /// Machine ID embedded in minted service IDs. Must be unique among
    /// instances that may register at the same millisecond.
    ///
    /// Environment variable: `MACHINE_ID`
    #[arg(long, env = "MACHINE_ID", default_value_t = 0)]
    pub machine_id: u64,

    /// Address the health endpoint listens on.
    ///
    /// Environment variable: `LISTEN_ADDR`
    #[arg(long, env = "LISTEN_ADDR", default_value_t = String::from("0.0.0.0:8080"))]
    pub listen_addr: String,

    /// Deadline for each Consul request, in milliseconds.
    ///
    /// Environment variable: `REQUEST_TIMEOUT_MS`
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value_t = 5_000)]
    pub request_timeout_ms: u64,

    /// Upper bound on deregistration during shutdown, in milliseconds.
    ///
    /// Environment variable: `DEREGISTER_TIMEOUT_MS`
    #[arg(long, env = "DEREGISTER_TIMEOUT_MS", default_value_t = 10_000)]
    pub deregister_timeout_ms: u64,

    /// PEM certificate chain for the gRPC health endpoint. Required with
    /// gRPC, since Consul checks it over TLS.
    ///
    /// Environment variable: `TLS_CERT_PATH`
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<PathBuf>,

    /// PEM private key matching `TLS_CERT_PATH`.
    ///
    /// Environment variable: `TLS_KEY_PATH`
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<PathBuf>,
}

/// Certificate and key files the gRPC health endpoint is served with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsFiles {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

impl TlsFiles {
    /// Reads both PEM files.
    pub async fn identity(&self) -> anyhow::Result<Identity> {
        let cert = tokio::fs::read(&self.cert_path).await.with_context(|| {
            format!("failed to read TLS_CERT_PATH {}", self.cert_path.display())
        })?;
        let key = tokio::fs::read(&self.key_path).await.with_context(|| {
            format!("failed to read TLS_KEY_PATH {}", self.key_path.display())
        })?;
        Ok(Identity::from_pem(cert, key))
    }
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub consul_address: String,
    pub consul_token: Option<String>,
    pub descriptor: ServiceDescriptor,
    pub health_path: String,
    pub machine_id: u64,
    pub listen_addr: SocketAddr,
    pub request_timeout: Duration,
    pub deregister_timeout: Duration,
    /// Set exactly when the descriptor advertises gRPC.
    pub tls: Option<TlsFiles>,
}

impl TryFrom<CliArgs> for AgentConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let max_machine_id = SnowflakeId::max_machine_id();
        if args.machine_id > max_machine_id {
            bail!(
                "MACHINE_ID ({}) exceeds the Snowflake machine ID space (max = {})",
                args.machine_id,
                max_machine_id
            );
        }
        if args.request_timeout_ms == 0 {
            bail!("REQUEST_TIMEOUT_MS must be greater than 0");
        }
        if args.deregister_timeout_ms == 0 {
            bail!("DEREGISTER_TIMEOUT_MS must be greater than 0");
        }

        let listen_addr = args
            .listen_addr
            .parse::<SocketAddr>()
            .with_context(|| format!("invalid LISTEN_ADDR `{}`", args.listen_addr))?;
        let health_path = health_path(&args.health_check)?;
        let tls = tls_files(
            args.enable_grpc_service,
            args.tls_cert_path,
            args.tls_key_path,
        )?;

        let mut builder = ServiceDescriptor::builder(args.service_name, args.service_address)
            .api(args.enable_api_service)
            .grpc(args.enable_grpc_service)
            .grpc_weight(args.grpc_weight)
            .health_check(args.health_check);
        if let Some(timing) = check_timing(
            args.check_timeout_ms,
            args.check_interval_ms,
            args.check_deregister_after_ms,
        ) {
            builder = builder.check_timing(timing);
        }
        let descriptor = builder.build().context("invalid service description")?;
        if let HealthCheckKind::Http { url } = &descriptor.health_check().kind {
            if url.get(..8).is_some_and(|s| s.eq_ignore_ascii_case("https://")) {
                bail!(
                    "health check `{url}` would be checked over HTTPS, but the agent serves plain \
                     HTTP; give HEALTH_CHECK as a full http:// URL"
                );
            }
        }

        Ok(Self {
            consul_address: args.consul_address,
            consul_token: args.consul_token,
            descriptor,
            health_path,
            machine_id: args.machine_id,
            listen_addr,
            request_timeout: Duration::from_millis(args.request_timeout_ms),
            deregister_timeout: Duration::from_millis(args.deregister_timeout_ms),
            tls,
        })
    }
}

/// The gRPC check is registered with TLS, so gRPC needs both files and the
/// plain HTTP endpoint takes neither.
fn tls_files(
    grpc: bool,
    cert_path: Option<PathBuf>,
    key_path: Option<PathBuf>,
) -> anyhow::Result<Option<TlsFiles>> {
    match (grpc, cert_path, key_path) {
        (true, Some(cert_path), Some(key_path)) => Ok(Some(TlsFiles {
            cert_path,
            key_path,
        })),
        (true, _, _) => {
            bail!("ENABLE_GRPC_SERVICE requires TLS_CERT_PATH and TLS_KEY_PATH")
        }
        (false, None, None) => Ok(None),
        (false, _, _) => {
            bail!("TLS_CERT_PATH and TLS_KEY_PATH only apply with ENABLE_GRPC_SERVICE")
        }
    }
}

/// Any timing given overrides the defaults; unset timings stay at the default.
fn check_timing(
    timeout_ms: Option<u64>,
    interval_ms: Option<u64>,
    deregister_after_ms: Option<u64>,
) -> Option<CheckTiming> {
    if timeout_ms.is_none() && interval_ms.is_none() && deregister_after_ms.is_none() {
        return None;
    }
    let or_default = |ms: Option<u64>| ms.map_or(DEFAULT_CHECK_TIMING, Duration::from_millis);
    Some(CheckTiming {
        timeout: or_default(timeout_ms),
        interval: or_default(interval_ms),
        deregister_critical_after: or_default(deregister_after_ms),
    })
}
