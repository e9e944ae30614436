#![doc = include_str!("../README.md")]

mod agent;

use std::sync::Arc;

use agent::config::{AgentConfig, CliArgs};
use agent::health::{Health, HttpHealth};
use agent::shutdown;
use agent::telemetry::{TelemetryProviders, init_telemetry};
use anyhow::Context;
use clap::Parser;
use muster::{LockSnowflakeGenerator, SystemClock};
use muster_consul::{ConsulCatalog, Lifecycle, Registrar};
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::{Identity, Server, ServerTlsConfig};
use tonic_health::ServingStatus;
use tracing::info;

type AgentLifecycle = Lifecycle<ConsulCatalog, SystemClock>;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = AgentConfig::try_from(args)?;

    let providers = init_telemetry()?;

    let generator = LockSnowflakeGenerator::new(config.machine_id, SystemClock::default())?;
    let catalog = ConsulCatalog::new(
        &config.consul_address,
        config.consul_token.clone(),
        config.request_timeout,
    )?;
    let lifecycle = Arc::new(Lifecycle::with_deregister_timeout(
        Registrar::new(catalog, Arc::new(generator)),
        config.deregister_timeout,
    ));

    // Fail on unreadable key material before anything is registered.
    let identity = match &config.tls {
        Some(tls) => Some(tls.identity().await?),
        None => None,
    };

    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    log_startup_info(&config);

    let service_id = lifecycle
        .on_start(&config.descriptor)
        .await
        .context("service registration failed")?;
    info!(
        "Service {} registered with Consul as {}",
        config.descriptor.name(),
        service_id
    );

    let served = match identity {
        Some(identity) => {
            serve_grpc(listener, &config, identity, Arc::clone(&lifecycle), providers).await
        }
        None => serve_http(listener, &config, Arc::clone(&lifecycle), providers).await,
    };
    shutdown::deregister_on_error(served, &lifecycle).await?;

    info!("Agent shut down successfully");
    Ok(())
}

async fn serve_grpc(
    listener: TcpListener,
    config: &AgentConfig,
    identity: Identity,
    lifecycle: Arc<AgentLifecycle>,
    providers: TelemetryProviders,
) -> anyhow::Result<()> {
    let (reporter, health_service) = tonic_health::server::health_reporter();
    reporter
        .set_service_status(config.descriptor.name(), ServingStatus::Serving)
        .await;
    let health = Health::Grpc {
        reporter,
        service_name: config.descriptor.name().to_owned(),
    };

    Server::builder()
        .tls_config(ServerTlsConfig::new().identity(identity))?
        .add_service(health_service)
        .serve_with_incoming_shutdown(
            TcpListenerStream::new(listener),
            shutdown::on_signal(health, lifecycle, providers),
        )
        .await?;
    Ok(())
}

async fn serve_http(
    listener: TcpListener,
    config: &AgentConfig,
    lifecycle: Arc<AgentLifecycle>,
    providers: TelemetryProviders,
) -> anyhow::Result<()> {
    let http = HttpHealth::default();
    let app = http.router(&config.health_path);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown::on_signal(
            Health::Http(http),
            lifecycle,
            providers,
        ))
        .await?;
    Ok(())
}

fn log_startup_info(config: &AgentConfig) {
    let address = config.descriptor.address();
    if cfg!(debug_assertions) {
        info!(
            "Starting agent on {} for {} at {}://{}:{} (Consul {}, machine ID {}, check {:#?})",
            config.listen_addr,
            config.descriptor.name(),
            address.scheme,
            address.host,
            address.port,
            config.consul_address,
            config.machine_id,
            config.descriptor.health_check(),
        );
    } else {
        info!(
            "Starting agent on {} for {} at {}://{}:{}",
            config.listen_addr,
            config.descriptor.name(),
            address.scheme,
            address.host,
            address.port,
        );
    }
}
