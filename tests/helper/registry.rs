//! Registry test utilities

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use chart_updates::chart::cache::UpdateCache;
use chart_updates::chart::discovery::UpdateChecker;
use chart_updates::chart::error::{CredentialError, RegistryError};
use chart_updates::chart::reference::ChartReference;
use chart_updates::chart::registry::{
    BasicAuth, ContentFetcher, CredentialStore, RegistryContext, TagLister,
};
use chart_updates::config::RegistryConfig;

/// In-memory registry for testing
#[derive(Default)]
pub struct MockRegistry {
    tags: HashMap<String, Vec<String>>,
    charts: HashMap<String, Vec<u8>>,
    failing: Mutex<HashSet<String>>,
    list_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
}

#[allow(dead_code)]
impl MockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tags(mut self, identity: &str, tags: Vec<&str>) -> Self {
        self.tags.insert(
            identity.to_string(),
            tags.into_iter().map(|t| t.to_string()).collect(),
        );
        self
    }

    pub fn with_chart(mut self, image: &str, content: &[u8]) -> Self {
        self.charts.insert(image.to_string(), content.to_vec());
        self
    }

    /// Make every later tag listing for `identity` fail as if the network dropped
    pub fn fail_listing(&self, identity: &str) {
        self.failing.lock().unwrap().insert(identity.to_string());
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TagLister for MockRegistry {
    async fn list_tags(
        &self,
        _context: &RegistryContext,
        reference: &ChartReference,
    ) -> Result<Vec<String>, RegistryError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);

        if self.failing.lock().unwrap().contains(reference.identity()) {
            return Err(RegistryError::InvalidResponse(
                "connection reset by peer".to_string(),
            ));
        }

        self.tags
            .get(reference.identity())
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(reference.identity().to_string()))
    }
}

#[async_trait]
impl ContentFetcher for MockRegistry {
    async fn fetch(&self, image: &str) -> Result<Vec<u8>, RegistryError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);

        self.charts
            .get(image)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(image.to_string()))
    }
}

/// In-memory credential store for testing
#[derive(Default)]
pub struct MemoryCredentialStore {
    entries: Mutex<HashMap<String, BasicAuth>>,
    read_only: bool,
}

#[allow(dead_code)]
impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose writes always fail
    pub fn read_only() -> Self {
        Self {
            entries: Mutex::default(),
            read_only: true,
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn write_credentials(&self, scope: &str, auth: &BasicAuth) -> Result<(), CredentialError> {
        if self.read_only {
            return Err(CredentialError::Io {
                path: scope.into(),
                source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
            });
        }
        self.entries
            .lock()
            .unwrap()
            .insert(scope.to_string(), auth.clone());
        Ok(())
    }

    fn read_credentials(&self, scope: &str) -> Result<Option<BasicAuth>, CredentialError> {
        Ok(self.entries.lock().unwrap().get(scope).cloned())
    }
}

/// Create an update checker over `registry` with a fresh cache
#[allow(dead_code)]
pub fn create_test_checker(registry: Arc<MockRegistry>) -> (Arc<UpdateCache>, UpdateChecker) {
    let cache = Arc::new(UpdateCache::new());
    let checker = UpdateChecker::new(registry, Arc::clone(&cache), &RegistryConfig::default());
    (cache, checker)
}
