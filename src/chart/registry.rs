//! Boundary traits for talking to chart registries

use std::fmt;

#[cfg(test)]
use mockall::automock;

use crate::chart::error::{CredentialError, RegistryError};
use crate::chart::reference::ChartReference;
use crate::config::RegistryConfig;

/// Username/password pair for registry basic authentication
#[derive(Clone, PartialEq, Eq)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

impl BasicAuth {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Licensed charts authenticate with the license ID as both username and password
    pub fn from_license_id(license_id: &str) -> Self {
        Self::new(license_id, license_id)
    }
}

impl fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Per-request registry access settings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryContext {
    pub auth: Option<BasicAuth>,
    /// Accept invalid or self-signed TLS certificates
    pub insecure_skip_tls_verify: bool,
    /// Use HTTP instead of HTTPS
    pub plain_http: bool,
}

impl RegistryContext {
    /// Context with the transport posture from `config` and no credentials
    pub fn from_config(config: &RegistryConfig) -> Self {
        Self {
            auth: None,
            insecure_skip_tls_verify: config.insecure_skip_tls_verify,
            plain_http: config.plain_http,
        }
    }

    pub fn with_auth(mut self, auth: BasicAuth) -> Self {
        self.auth = Some(auth);
        self
    }
}

/// Trait for listing the tags published for a chart
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait TagLister: Send + Sync {
    /// Fetches every tag of the chart repository, in registry order
    ///
    /// # Returns
    /// * `Ok(Vec<String>)` - All tags; may contain duplicates
    /// * `Err(RegistryError)` - If the registry is unreachable or rejects the request
    async fn list_tags(
        &self,
        context: &RegistryContext,
        reference: &ChartReference,
    ) -> Result<Vec<String>, RegistryError>;
}

/// Trait for fetching the content of one chart version
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Fetches the chart archive for an image reference of the form `identity:version`
    async fn fetch(&self, image: &str) -> Result<Vec<u8>, RegistryError>;
}

/// Trait for persisting registry credentials per chart
///
/// `scope` is the normalized chart identity. Implementations must keep the
/// credentials of distinct scopes apart, so that concurrent pulls of
/// different charts never see each other's credentials.
#[cfg_attr(test, automock)]
pub trait CredentialStore: Send + Sync {
    fn write_credentials(&self, scope: &str, auth: &BasicAuth) -> Result<(), CredentialError>;

    fn read_credentials(&self, scope: &str) -> Result<Option<BasicAuth>, CredentialError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_license_id_uses_license_for_both_fields() {
        let auth = BasicAuth::from_license_id("license-123");
        assert_eq!(auth.username, "license-123");
        assert_eq!(auth.password, "license-123");
    }

    #[test]
    fn basic_auth_debug_redacts_password() {
        let auth = BasicAuth::new("user", "secret");
        let debug = format!("{auth:?}");
        assert!(debug.contains("user"));
        assert!(!debug.contains("secret"));
    }

    #[test]
    fn from_config_copies_transport_posture() {
        let config = RegistryConfig {
            insecure_skip_tls_verify: false,
            plain_http: true,
            ..RegistryConfig::default()
        };

        let context = RegistryContext::from_config(&config).with_auth(BasicAuth::new("a", "b"));

        assert!(!context.insecure_skip_tls_verify);
        assert!(context.plain_http);
        assert_eq!(context.auth, Some(BasicAuth::new("a", "b")));
    }
}
