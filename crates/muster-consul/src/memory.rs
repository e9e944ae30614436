//! In-memory catalog (for testing)

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{Catalog, Error, RegistrationRecord, Result, ServiceEntry};

/// In-memory [`Catalog`] (for testing/development).
///
/// Clones share state, so a test can hand one clone to the code under test
/// and inspect the other afterwards.
#[derive(Clone, Default)]
pub struct InMemoryCatalog {
    entries: Arc<RwLock<HashMap<String, ServiceEntry>>>,
    records: Arc<RwLock<Vec<RegistrationRecord>>>,
    deregistered: Arc<RwLock<Vec<String>>>,
    list_calls: Arc<AtomicUsize>,
    register_calls: Arc<AtomicUsize>,
    deregister_calls: Arc<AtomicUsize>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populates an entry, as if another process registered it.
    pub async fn insert(&self, entry: ServiceEntry) {
        self.entries.write().await.insert(entry.id.clone(), entry);
    }

    /// Makes every subsequent call fail with
    /// [`Error::BackendUnavailable`] until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Records submitted through [`Catalog::register_service`], in order.
    pub async fn registrations(&self) -> Vec<RegistrationRecord> {
        self.records.read().await.clone()
    }

    /// IDs removed through [`Catalog::deregister_service`], in order.
    pub async fn deregistrations(&self) -> Vec<String> {
        self.deregistered.read().await.clone()
    }

    /// Number of entries currently registered.
    pub async fn count(&self) -> usize {
        self.entries.read().await.len()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn register_calls(&self) -> usize {
        self.register_calls.load(Ordering::SeqCst)
    }

    pub fn deregister_calls(&self) -> usize {
        self.deregister_calls.load(Ordering::SeqCst)
    }

    fn ensure_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(Error::BackendUnavailable("in-memory catalog marked unavailable".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn list_services(&self, name: &str) -> Result<Vec<ServiceEntry>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.ensure_available()?;

        let entries = self.entries.read().await;
        let mut instances: Vec<ServiceEntry> = entries
            .values()
            .filter(|e| e.name == name)
            .cloned()
            .collect();
        instances.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(instances)
    }

    async fn register_service(&self, record: &RegistrationRecord) -> Result<()> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        self.ensure_available()?;

        self.entries
            .write()
            .await
            .insert(record.id.clone(), record.to_entry());
        self.records.write().await.push(record.clone());
        Ok(())
    }

    async fn deregister_service(&self, id: &str) -> Result<()> {
        self.deregister_calls.fetch_add(1, Ordering::SeqCst);
        self.ensure_available()?;

        self.entries.write().await.remove(id);
        self.deregistered.write().await.push(id.to_owned());
        Ok(())
    }
}
