use core::time::Duration;

use muster::TimeSource;
use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::{Catalog, Registrar, Result, ServiceDescriptor};

/// Default bound on the shutdown deregistration.
pub const DEFAULT_DEREGISTER_TIMEOUT: Duration = Duration::from_secs(10);

/// Ties a service registration to the host process's start and stop.
///
/// `on_start` registers (or reuses a registration) and remembers the ID;
/// `on_stop` removes that registration. A failure to deregister never fails
/// shutdown: the backend drops the entry once its check stays critical.
pub struct Lifecycle<C, T>
where
    C: Catalog,
    T: TimeSource,
{
    registrar: Registrar<C, T>,
    service_id: Mutex<Option<String>>,
    deregister_timeout: Duration,
}

impl<C, T> Lifecycle<C, T>
where
    C: Catalog,
    T: TimeSource + Send + Sync,
{
    pub fn new(registrar: Registrar<C, T>) -> Self {
        Self::with_deregister_timeout(registrar, DEFAULT_DEREGISTER_TIMEOUT)
    }

    pub fn with_deregister_timeout(
        registrar: Registrar<C, T>,
        deregister_timeout: Duration,
    ) -> Self {
        Self {
            registrar,
            service_id: Mutex::new(None),
            deregister_timeout,
        }
    }

    pub fn registrar(&self) -> &Registrar<C, T> {
        &self.registrar
    }

    /// The ID recorded by the last successful [`Self::on_start`], if it has
    /// not been deregistered yet.
    pub fn service_id(&self) -> Option<String> {
        self.service_id.lock().clone()
    }

    /// Reconciles `descriptor` and records the resulting service ID.
    ///
    /// # Errors
    ///
    /// Any reconciliation error; the caller should abort startup.
    pub async fn on_start(&self, descriptor: &ServiceDescriptor) -> Result<String> {
        let id = self.registrar.reconcile(descriptor).await?;
        *self.service_id.lock() = Some(id.clone());
        Ok(id)
    }

    /// Deregisters the recorded service, waiting at most the configured
    /// timeout. Does nothing if no ID was recorded.
    pub async fn on_stop(&self) {
        let taken = self.service_id.lock().take();
        let Some(id) = taken else {
            return;
        };

        let deregister = self.registrar.catalog().deregister_service(&id);
        match tokio::time::timeout(self.deregister_timeout, deregister).await {
            Ok(Ok(())) => info!("Service {} deregistered", id),
            Ok(Err(e)) => error!("Failed to deregister service {}: {}", id, e),
            Err(_) => warn!(
                "Deregistration of service {} timed out after {:?}",
                id, self.deregister_timeout
            ),
        }
    }
}
