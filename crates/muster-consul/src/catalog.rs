//! The discovery-backend capabilities registration depends on.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{RegistrationRecord, Result, ServiceEntry};

/// Query and mutation access to a discovery backend.
///
/// Implementations perform one backend round trip per call and do not retry;
/// deadlines belong to the transport.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Every instance currently registered under `name`, healthy or not.
    async fn list_services(&self, name: &str) -> Result<Vec<ServiceEntry>>;

    /// Submits a registration. Re-submitting an existing ID updates it.
    async fn register_service(&self, record: &RegistrationRecord) -> Result<()>;

    /// Removes the registration with the given service ID.
    async fn deregister_service(&self, id: &str) -> Result<()>;
}

#[async_trait]
impl<C> Catalog for Arc<C>
where
    C: Catalog + ?Sized,
{
    async fn list_services(&self, name: &str) -> Result<Vec<ServiceEntry>> {
        (**self).list_services(name).await
    }

    async fn register_service(&self, record: &RegistrationRecord) -> Result<()> {
        (**self).register_service(record).await
    }

    async fn deregister_service(&self, id: &str) -> Result<()> {
        (**self).deregister_service(id).await
    }
}
