use std::sync::Arc;

use muster::{LockSnowflakeGenerator, TimeSource};
use tracing::{info, instrument};

use crate::{Catalog, RegistrationRecord, Result, ServiceDescriptor};

/// Makes sure a service is registered with the discovery backend.
///
/// Reconciliation is idempotent per process: an existing entry with the same
/// name, address and port is reused rather than registered twice.
pub struct Registrar<C, T>
where
    C: Catalog,
    T: TimeSource,
{
    catalog: C,
    generator: Arc<LockSnowflakeGenerator<T>>,
}

impl<C, T> Registrar<C, T>
where
    C: Catalog,
    T: TimeSource + Send + Sync,
{
    pub fn new(catalog: C, generator: Arc<LockSnowflakeGenerator<T>>) -> Self {
        Self { catalog, generator }
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    /// Returns the service ID under which `descriptor` is registered,
    /// registering it first if the backend has no matching entry.
    ///
    /// A fresh registration gets a newly minted Snowflake ID, rendered in
    /// decimal.
    ///
    /// # Errors
    ///
    /// - [`Error::BackendUnavailable`] or [`Error::Rejected`] if listing or
    ///   registering fails
    /// - [`Error::IdGeneration`] if the generator cannot mint an ID
    ///
    /// Nothing is submitted when listing or minting fails.
    ///
    /// [`Error::BackendUnavailable`]: crate::Error::BackendUnavailable
    /// [`Error::Rejected`]: crate::Error::Rejected
    /// [`Error::IdGeneration`]: crate::Error::IdGeneration
    #[instrument(skip_all, fields(service = descriptor.name()))]
    pub async fn reconcile(&self, descriptor: &ServiceDescriptor) -> Result<String> {
        let entries = self.catalog.list_services(descriptor.name()).await?;
        if let Some(existing) = entries.into_iter().find(|e| e.matches(descriptor)) {
            info!(
                "Service {} already registered as {} at {}:{}",
                existing.name, existing.id, existing.address, existing.port
            );
            return Ok(existing.id);
        }

        let id = self.generator.next_id()?.to_string();
        let record = RegistrationRecord::new(id.clone(), descriptor);
        self.catalog.register_service(&record).await?;

        info!(
            "Service {} registered as {} at {}:{}",
            record.name, record.id, record.address, record.port
        );
        Ok(id)
    }
}
