//! Stopping the agent: on a signal, or when the server itself fails.

use std::sync::Arc;

use muster::TimeSource;
use muster_consul::{Catalog, Lifecycle};
use tokio::signal;
use tracing::{error, info};

use super::health::Health;
use super::telemetry::TelemetryProviders;

/// Resolves on SIGTERM or Ctrl+C after walking the shutdown sequence:
/// publish not-serving, deregister, flush telemetry.
pub async fn on_signal<C, T>(
    health: Health,
    lifecycle: Arc<Lifecycle<C, T>>,
    providers: TelemetryProviders,
) where
    C: Catalog,
    T: TimeSource + Send + Sync,
{
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C signal"),
        () = terminate => info!("Received SIGTERM signal"),
    }

    info!("Shutdown signal received, terminating gracefully...");

    // 1. Publish the status
    health.set_not_serving().await;

    // 2. Deregister; failures are logged inside
    lifecycle.on_stop().await;

    // 3. Flush telemetry
    providers.shutdown();
}

/// Deregisters when the server exits with an error, so the registration
/// does not outlive the process until the backend reaps it.
pub async fn deregister_on_error<C, T, E>(
    served: Result<(), E>,
    lifecycle: &Lifecycle<C, T>,
) -> Result<(), E>
where
    C: Catalog,
    T: TimeSource + Send + Sync,
    E: core::fmt::Display,
{
    if let Err(e) = &served {
        error!("Server failed: {}", e);
        lifecycle.on_stop().await;
    }
    served
}

#[cfg(test)]
mod tests {
    use super::*;
    use muster::{LockSnowflakeGenerator, SystemClock};
    use muster_consul::{InMemoryCatalog, Registrar, ServiceDescriptor};

    async fn registered(catalog: &InMemoryCatalog) -> Lifecycle<InMemoryCatalog, SystemClock> {
        let generator = LockSnowflakeGenerator::new(1, SystemClock::default()).unwrap();
        let lifecycle = Lifecycle::new(Registrar::new(catalog.clone(), Arc::new(generator)));
        let descriptor = ServiceDescriptor::builder("orders", "http://svc:8080")
            .health_check("/health")
            .build()
            .unwrap();
        lifecycle.on_start(&descriptor).await.unwrap();
        lifecycle
    }

    #[tokio::test]
    async fn server_error_deregisters() {
        let catalog = InMemoryCatalog::new();
        let lifecycle = registered(&catalog).await;

        let served = deregister_on_error(Err::<(), _>("accept failed"), &lifecycle).await;

        assert_eq!(served, Err("accept failed"));
        assert_eq!(catalog.deregister_calls(), 1);
        assert_eq!(catalog.count().await, 0);
        assert!(lifecycle.service_id().is_none());
    }

    #[tokio::test]
    async fn clean_exit_leaves_deregistration_to_the_signal() {
        let catalog = InMemoryCatalog::new();
        let lifecycle = registered(&catalog).await;

        let served = deregister_on_error(Ok::<(), &str>(()), &lifecycle).await;

        assert_eq!(served, Ok(()));
        assert_eq!(catalog.deregister_calls(), 0);
        assert!(lifecycle.service_id().is_some());
    }
}
