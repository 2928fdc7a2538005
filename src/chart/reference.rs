//! Chart reference normalization and parsing
//!
//! Charts are identified by a registry reference such as
//! `oci://registry.example.com/app/chart`. The scheme marker is stripped
//! before the reference is used as a cache key or credential scope, so
//! `oci://registry.example.com/app/chart` and `registry.example.com/app/chart`
//! name the same chart.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::chart::error::RegistryError;

const OCI_SCHEME: &str = "oci://";

/// Registry used when a reference has no explicit host
const DEFAULT_DOMAIN: &str = "docker.io";

/// Host that actually serves the registry API for [`DEFAULT_DOMAIN`]
const DEFAULT_API_HOST: &str = "registry-1.docker.io";

/// Path component grammar from the OCI distribution specification
static PATH_COMPONENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]+(?:(?:\.|_|__|-+)[a-z0-9]+)*$").expect("valid path component regex")
});

/// Strip the scheme marker and trailing slashes from a chart identity.
///
/// This is the key under which a chart's updates are cached and its
/// credentials are scoped.
pub fn normalize_identity(identity: &str) -> &str {
    let trimmed = identity.trim();
    trimmed
        .strip_prefix(OCI_SCHEME)
        .unwrap_or(trimmed)
        .trim_end_matches('/')
}

/// A parsed chart reference: `host/repository[:tag]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartReference {
    identity: String,
    host: String,
    repository: String,
    tag: Option<String>,
}

impl ChartReference {
    /// Parse a chart identity, optionally suffixed with `:tag`.
    ///
    /// A leading `oci://` is accepted. References without a registry host
    /// resolve against Docker Hub, as container tooling does.
    pub fn parse(reference: &str) -> Result<Self, RegistryError> {
        let invalid = |reason: &str| RegistryError::InvalidReference {
            reference: reference.to_string(),
            reason: reason.to_string(),
        };

        let normalized = normalize_identity(reference);
        if normalized.is_empty() {
            return Err(invalid("empty reference"));
        }
        if normalized.contains('@') {
            return Err(invalid("digest references are not supported"));
        }
        if normalized.contains(char::is_whitespace) {
            return Err(invalid("reference contains whitespace"));
        }

        // Tag separator is the last ':' after the last '/'; a host port comes earlier
        let last_slash = normalized.rfind('/').map_or(0, |i| i + 1);
        let (identity, tag) = match normalized[last_slash..].rfind(':') {
            Some(i) => {
                let split = last_slash + i;
                let tag = &normalized[split + 1..];
                if tag.is_empty() {
                    return Err(invalid("empty tag"));
                }
                (&normalized[..split], Some(tag.to_string()))
            }
            None => (normalized, None),
        };

        let (host, repository) = match identity.split_once('/') {
            Some((first, rest)) if Self::looks_like_host(first) => {
                (first.to_string(), rest.to_string())
            }
            Some(_) => (DEFAULT_DOMAIN.to_string(), identity.to_string()),
            None => (DEFAULT_DOMAIN.to_string(), format!("library/{identity}")),
        };

        if host.is_empty() {
            return Err(invalid("empty registry host"));
        }
        if repository.is_empty() {
            return Err(invalid("missing repository path"));
        }
        if let Some(component) = repository
            .split('/')
            .find(|c| !PATH_COMPONENT.is_match(c))
        {
            return Err(invalid(&format!("invalid path component {component:?}")));
        }

        Ok(Self {
            identity: identity.to_string(),
            host,
            repository,
            tag,
        })
    }

    fn looks_like_host(component: &str) -> bool {
        component.contains(['.', ':']) || component == "localhost"
    }

    /// Normalized identity without tag, the cache and credential scope key
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Registry host as written in the reference (may include a port)
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Host serving the registry API for this reference
    pub fn api_host(&self) -> &str {
        if self.host == DEFAULT_DOMAIN {
            DEFAULT_API_HOST
        } else {
            &self.host
        }
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }
}

impl fmt::Display for ChartReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.host, self.repository)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{tag}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("oci://registry.example.com/app/chart", "registry.example.com/app/chart")]
    #[case("registry.example.com/app/chart", "registry.example.com/app/chart")]
    #[case("oci://registry.example.com/app/chart/", "registry.example.com/app/chart")]
    #[case(" oci://localhost:5000/chart ", "localhost:5000/chart")]
    fn normalize_identity_strips_scheme_and_trailing_slash(
        #[case] identity: &str,
        #[case] expected: &str,
    ) {
        assert_eq!(normalize_identity(identity), expected);
    }

    #[test]
    fn normalize_identity_does_not_strip_scheme_characters_from_host() {
        // A character-set trim would eat the leading "o" and "c" of this host
        assert_eq!(
            normalize_identity("oci://ocean.example.com/chart"),
            "ocean.example.com/chart"
        );
        assert_eq!(
            normalize_identity("ocean.example.com/chart"),
            "ocean.example.com/chart"
        );
    }

    #[rstest]
    #[case(
        "oci://registry.example.com/app/chart",
        "registry.example.com",
        "app/chart",
        None
    )]
    #[case(
        "registry.example.com/app/chart:1.2.3",
        "registry.example.com",
        "app/chart",
        Some("1.2.3")
    )]
    #[case("localhost:5000/chart", "localhost:5000", "chart", None)]
    #[case("localhost:5000/chart:v2", "localhost:5000", "chart", Some("v2"))]
    #[case("bitnami/redis", "docker.io", "bitnami/redis", None)]
    #[case("redis:7.0", "docker.io", "library/redis", Some("7.0"))]
    fn parse_splits_host_repository_and_tag(
        #[case] reference: &str,
        #[case] host: &str,
        #[case] repository: &str,
        #[case] tag: Option<&str>,
    ) {
        let parsed = ChartReference::parse(reference).unwrap();
        assert_eq!(parsed.host(), host);
        assert_eq!(parsed.repository(), repository);
        assert_eq!(parsed.tag(), tag);
    }

    #[test]
    fn parse_keeps_identity_without_tag() {
        let parsed = ChartReference::parse("oci://registry.example.com/app/chart:1.0.0").unwrap();
        assert_eq!(parsed.identity(), "registry.example.com/app/chart");
        assert_eq!(parsed.to_string(), "registry.example.com/app/chart:1.0.0");
    }

    #[test]
    fn api_host_maps_default_domain_to_registry_host() {
        let parsed = ChartReference::parse("bitnami/redis").unwrap();
        assert_eq!(parsed.api_host(), "registry-1.docker.io");

        let parsed = ChartReference::parse("ghcr.io/org/chart").unwrap();
        assert_eq!(parsed.api_host(), "ghcr.io");
    }

    #[rstest]
    #[case("")]
    #[case("oci://")]
    #[case("registry.example.com/-chart")]
    #[case("registry.example.com/App/Chart")]
    #[case("registry.example.com/app/chart:")]
    #[case("registry.example.com/app/chart@sha256:abcd")]
    #[case("registry.example.com/app//chart")]
    #[case("registry.example.com/app chart")]
    fn parse_rejects_malformed_references(#[case] reference: &str) {
        assert!(matches!(
            ChartReference::parse(reference),
            Err(RegistryError::InvalidReference { .. })
        ));
    }
}
