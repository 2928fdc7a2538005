//! Update discovery: registry tags to cached catalog

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use indexmap::IndexSet;
use semver::Version;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::chart::cache::UpdateCache;
use crate::chart::catalog::{ChartUpdate, ChartUpdates};
use crate::chart::error::{RegistryError, UpdateError};
use crate::chart::reference::ChartReference;
use crate::chart::registry::{BasicAuth, RegistryContext, TagLister};
use crate::chart::semver::parse_tolerant;
use crate::config::{DISCOVERY_STAGGER_DELAY_MS, RegistryConfig};

/// One chart to check in [`UpdateChecker::check_all`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateRequest {
    pub identity: String,
    pub license_id: String,
    pub current_version: Option<Version>,
}

/// Discovers available chart updates and publishes them into the cache
pub struct UpdateChecker {
    lister: Arc<dyn TagLister>,
    cache: Arc<UpdateCache>,
    context: RegistryContext,
}

impl UpdateChecker {
    pub fn new(
        lister: Arc<dyn TagLister>,
        cache: Arc<UpdateCache>,
        config: &RegistryConfig,
    ) -> Self {
        Self {
            lister,
            cache,
            context: RegistryContext::from_config(config),
        }
    }

    pub fn cache(&self) -> &Arc<UpdateCache> {
        &self.cache
    }

    /// Find the versions of a chart newer than `current_version`
    ///
    /// Lists the chart's tags with the license ID as registry credentials,
    /// keeps the tags that parse as versions and are strictly newer than
    /// `current_version` (all of them when it is `None`), and replaces the
    /// cached catalog with the result, newest first.
    ///
    /// # Returns
    /// * `Ok(ChartUpdates)` - The computed catalog, possibly empty
    /// * `Err(UpdateError)` - If the reference is malformed or tag listing fails;
    ///   the cached catalog is left untouched
    pub async fn check_for_updates(
        &self,
        identity: &str,
        license_id: &str,
        current_version: Option<&Version>,
    ) -> Result<ChartUpdates, UpdateError> {
        let reference = ChartReference::parse(identity).map_err(UpdateError::InvalidReference)?;
        if reference.tag().is_some() {
            return Err(UpdateError::InvalidReference(
                RegistryError::InvalidReference {
                    reference: identity.to_string(),
                    reason: "chart identity must not include a tag".to_string(),
                },
            ));
        }

        let context = self
            .context
            .clone()
            .with_auth(BasicAuth::from_license_id(license_id));

        let generation = self.cache.begin_update(reference.identity());

        let tags = self
            .lister
            .list_tags(&context, &reference)
            .await
            .map_err(|source| UpdateError::ListTags {
                reference: reference.to_string(),
                source,
            })?;

        let updates = build_updates(tags, current_version);

        if !self
            .cache
            .publish(reference.identity(), generation, updates.clone())
        {
            info!(
                "Discarded updates for {}: superseded by a newer check",
                reference.identity()
            );
        }

        info!(
            "Found {} updates for {}{}",
            updates.len(),
            reference.identity(),
            current_version
                .map(|v| format!(" newer than {v}"))
                .unwrap_or_default()
        );

        Ok(updates)
    }

    /// Check several charts concurrently
    ///
    /// Failures are logged and returned per chart; they do not stop the other
    /// checks. Starts are staggered to avoid rate limiting.
    pub async fn check_all(
        &self,
        requests: Vec<UpdateRequest>,
    ) -> Vec<(String, Result<ChartUpdates, UpdateError>)> {
        let futures = requests.into_iter().enumerate().map(|(i, request)| {
            let delay = Duration::from_millis(DISCOVERY_STAGGER_DELAY_MS * i as u64);
            async move {
                sleep(delay).await;
                let result = self
                    .check_for_updates(
                        &request.identity,
                        &request.license_id,
                        request.current_version.as_ref(),
                    )
                    .await
                    .inspect_err(|e| {
                        error!("Failed to check updates for {}: {}", request.identity, e)
                    });
                (request.identity, result)
            }
        });

        join_all(futures).await
    }
}

/// Turn raw registry tags into a catalog of updates newer than `current_version`
pub fn build_updates(tags: Vec<String>, current_version: Option<&Version>) -> ChartUpdates {
    // Registries are not supposed to return duplicate tags, but some do
    let tags: IndexSet<String> = tags.into_iter().collect();

    let updates = tags.into_iter().filter_map(|tag| {
        let Some(version) = parse_tolerant(&tag) else {
            debug!("Skipping tag {:?}: not a version", tag);
            return None;
        };

        if current_version.is_some_and(|current| version <= *current) {
            return None;
        }

        Some(ChartUpdate::new(tag, version))
    });

    ChartUpdates::new(updates)
}
