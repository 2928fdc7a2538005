//! Chart retrieval: pull the archive of one chart version

use std::sync::Arc;

use tracing::{debug, info};

use crate::chart::error::{CredentialError, RegistryError, UpdateError};
use crate::chart::reference::ChartReference;
use crate::chart::registry::{BasicAuth, ContentFetcher, CredentialStore};

/// Pulls chart archives using license-derived registry credentials
///
/// Archives are not cached; every pull goes to the registry.
pub struct ChartPuller {
    credentials: Arc<dyn CredentialStore>,
    fetcher: Arc<dyn ContentFetcher>,
}

impl ChartPuller {
    pub fn new(credentials: Arc<dyn CredentialStore>, fetcher: Arc<dyn ContentFetcher>) -> Self {
        Self {
            credentials,
            fetcher,
        }
    }

    /// Pull the archive of `identity` at `version`
    ///
    /// Stores the license ID as the chart's registry credentials first; if
    /// that fails, the registry is never contacted. `identity` must not carry
    /// a tag of its own.
    pub async fn pull_chart_version(
        &self,
        identity: &str,
        license_id: &str,
        version: &str,
    ) -> Result<Vec<u8>, UpdateError> {
        let reference = ChartReference::parse(identity).map_err(UpdateError::InvalidReference)?;
        if reference.tag().is_some() {
            return Err(UpdateError::InvalidReference(
                RegistryError::InvalidReference {
                    reference: identity.to_string(),
                    reason: "chart identity must not include a tag".to_string(),
                },
            ));
        }
        let scope = reference.identity();

        let credentials = Arc::clone(&self.credentials);
        let owned_scope = scope.to_string();
        let auth = BasicAuth::from_license_id(license_id);
        tokio::task::spawn_blocking(move || credentials.write_credentials(&owned_scope, &auth))
            .await
            .map_err(CredentialError::from)
            .and_then(|written| written)
            .map_err(|source| UpdateError::Credentials {
                scope: scope.to_string(),
                source,
            })?;
        debug!("Stored registry credentials for {}", scope);

        let image = format!("{scope}:{version}");
        let content = self
            .fetcher
            .fetch(&image)
            .await
            .map_err(|source| UpdateError::Fetch {
                image: image.clone(),
                source,
            })?;

        info!("Pulled chart {} ({} bytes)", image, content.len());
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::registry::{MockContentFetcher, MockCredentialStore};
    use mockall::Sequence;

    const CHART: &str = "oci://registry.example.com/app/chart";

    #[tokio::test]
    async fn pull_chart_version_stores_credentials_before_fetching() {
        let mut seq = Sequence::new();

        let mut credentials = MockCredentialStore::new();
        credentials
            .expect_write_credentials()
            .withf(|scope, auth| {
                scope == "registry.example.com/app/chart"
                    && *auth == BasicAuth::new("license-123", "license-123")
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));

        let mut fetcher = MockContentFetcher::new();
        fetcher
            .expect_fetch()
            .withf(|image| image == "registry.example.com/app/chart:1.2.3")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(b"chart-archive".to_vec()));

        let puller = ChartPuller::new(Arc::new(credentials), Arc::new(fetcher));
        let content = puller
            .pull_chart_version(CHART, "license-123", "1.2.3")
            .await
            .unwrap();

        assert_eq!(content, b"chart-archive");
    }

    #[tokio::test]
    async fn pull_chart_version_does_not_fetch_when_credentials_fail() {
        let mut credentials = MockCredentialStore::new();
        credentials.expect_write_credentials().returning(|_, _| {
            Err(CredentialError::Io {
                path: "/read-only/registry".into(),
                source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
            })
        });

        let mut fetcher = MockContentFetcher::new();
        fetcher.expect_fetch().times(0);

        let puller = ChartPuller::new(Arc::new(credentials), Arc::new(fetcher));
        let result = puller.pull_chart_version(CHART, "license", "1.2.3").await;

        assert!(matches!(result, Err(UpdateError::Credentials { .. })));
    }

    #[tokio::test]
    async fn pull_chart_version_wraps_fetch_error_with_image() {
        let mut credentials = MockCredentialStore::new();
        credentials
            .expect_write_credentials()
            .returning(|_, _| Ok(()));

        let mut fetcher = MockContentFetcher::new();
        fetcher
            .expect_fetch()
            .returning(|image| Err(RegistryError::NotFound(image.to_string())));

        let puller = ChartPuller::new(Arc::new(credentials), Arc::new(fetcher));
        let result = puller.pull_chart_version(CHART, "license", "9.9.9").await;

        match result {
            Err(UpdateError::Fetch { image, source }) => {
                assert_eq!(image, "registry.example.com/app/chart:9.9.9");
                assert!(matches!(source, RegistryError::NotFound(_)));
            }
            other => panic!("expected Fetch error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn pull_chart_version_rejects_malformed_reference() {
        let mut credentials = MockCredentialStore::new();
        credentials.expect_write_credentials().times(0);
        let mut fetcher = MockContentFetcher::new();
        fetcher.expect_fetch().times(0);

        let puller = ChartPuller::new(Arc::new(credentials), Arc::new(fetcher));
        let result = puller.pull_chart_version("oci://", "license", "1.0.0").await;

        assert!(matches!(result, Err(UpdateError::InvalidReference(_))));
    }

    #[tokio::test]
    async fn pull_chart_version_rejects_identity_with_tag() {
        let mut credentials = MockCredentialStore::new();
        credentials.expect_write_credentials().times(0);
        let mut fetcher = MockContentFetcher::new();
        fetcher.expect_fetch().times(0);

        let puller = ChartPuller::new(Arc::new(credentials), Arc::new(fetcher));
        let result = puller
            .pull_chart_version("registry.example.com/app/chart:1.0.0", "license", "2.0.0")
            .await;

        match result {
            Err(UpdateError::InvalidReference(RegistryError::InvalidReference {
                reference, ..
            })) => assert_eq!(reference, "registry.example.com/app/chart:1.0.0"),
            other => panic!("expected InvalidReference error, got {other:?}"),
        }
    }
}
