//! OCI distribution API registry implementation
//!
//! Lists chart tags and pulls chart archives from any registry speaking the
//! OCI distribution v2 API. Requests carry basic auth from the context; when
//! the registry answers with a bearer challenge, the same credentials are
//! exchanged for a pull token at the advertised realm.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{ACCEPT, HeaderMap, LINK, WWW_AUTHENTICATE};
use reqwest::{Response, StatusCode, Url};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::chart::error::{CredentialError, RegistryError};
use crate::chart::reference::ChartReference;
use crate::chart::registry::{ContentFetcher, CredentialStore, RegistryContext, TagLister};
use crate::config::{MAX_TAG_PAGES, RegistryConfig};

const MANIFEST_ACCEPT: &str = concat!(
    "application/vnd.oci.image.manifest.v1+json,",
    "application/vnd.docker.distribution.manifest.v2+json,",
    "application/vnd.oci.image.index.v1+json,",
    "application/vnd.docker.distribution.manifest.list.v2+json"
);

const HELM_CHART_LAYER_MEDIA_TYPE: &str = "application/vnd.cncf.helm.chart.content.v1.tar+gzip";
const TAR_GZIP_MEDIA_TYPE: &str = "application/tar+gzip";

/// How many image indexes are followed before giving up on a manifest
const MAX_INDEX_DEPTH: usize = 2;

/// Response from the tag list endpoint
#[derive(Debug, Deserialize)]
struct TagListResponse {
    #[serde(default)]
    tags: Option<Vec<String>>,
}

/// Response from a bearer token endpoint
#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Option<String>,
    access_token: Option<String>,
}

/// Image manifest or image index; only the fields used here
#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    manifests: Vec<Descriptor>,
    #[serde(default)]
    layers: Vec<Descriptor>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Descriptor {
    #[serde(default)]
    media_type: String,
    digest: String,
}

/// Parsed `WWW-Authenticate: Bearer ...` challenge
#[derive(Debug, PartialEq, Eq)]
struct BearerChallenge {
    realm: String,
    service: Option<String>,
}

impl BearerChallenge {
    fn parse(header: &str) -> Option<Self> {
        let params = header
            .strip_prefix("Bearer ")
            .or_else(|| header.strip_prefix("bearer "))?;

        let mut realm = None;
        let mut service = None;
        let mut remaining = params;

        loop {
            remaining = remaining.trim_start_matches([' ', ',']);
            if remaining.is_empty() {
                break;
            }

            let (key, rest) = remaining.split_once('=')?;
            let (value, rest) = match rest.strip_prefix('"') {
                Some(quoted) => {
                    let (value, rest) = quoted.split_once('"')?;
                    (value, rest)
                }
                None => {
                    let end = rest.find([',', ' ']).unwrap_or(rest.len());
                    rest.split_at(end)
                }
            };
            remaining = rest;

            match key.trim() {
                "realm" => realm = Some(value.to_string()),
                "service" => service = Some(value.to_string()),
                _ => {}
            }
        }

        realm.map(|realm| Self { realm, service })
    }
}

/// Registry client for the OCI distribution API
pub struct OciRegistry {
    client: reqwest::Client,
    insecure_client: reqwest::Client,
    tag_page_size: usize,
}

impl OciRegistry {
    pub fn new(config: &RegistryConfig) -> Result<Self, RegistryError> {
        let builder = || {
            reqwest::Client::builder()
                .user_agent(config.user_agent.as_str())
                .timeout(Duration::from_millis(config.request_timeout_ms))
        };

        Ok(Self {
            client: builder().build()?,
            insecure_client: builder().danger_accept_invalid_certs(true).build()?,
            tag_page_size: config.tag_page_size.max(1),
        })
    }

    fn session<'a>(
        &'a self,
        context: &'a RegistryContext,
        reference: &'a ChartReference,
    ) -> Session<'a> {
        let client = if context.insecure_skip_tls_verify {
            &self.insecure_client
        } else {
            &self.client
        };
        let scheme = if context.plain_http { "http" } else { "https" };

        Session {
            client,
            context,
            reference,
            base_url: format!("{}://{}", scheme, reference.api_host()),
            bearer: None,
        }
    }

    /// Pulls the chart archive tagged `tag`
    pub async fn pull_chart(
        &self,
        context: &RegistryContext,
        reference: &ChartReference,
        tag: &str,
    ) -> Result<Vec<u8>, RegistryError> {
        let mut session = self.session(context, reference);
        let image = format!("{}:{}", reference.identity(), tag);

        let manifest = session.fetch_manifest(&image, tag).await?;
        let layer = find_chart_layer(&manifest).ok_or_else(|| {
            RegistryError::InvalidResponse(format!("manifest of {image} has no chart layer"))
        })?;

        let url = format!(
            "{}/v2/{}/blobs/{}",
            session.base_url,
            reference.repository(),
            layer.digest
        );
        let response = check_status(session.get(&url, None).await?, &image)?;
        let content = response.bytes().await?.to_vec();

        verify_digest(&layer.digest, &content)?;
        debug!("Pulled {} bytes for {}", content.len(), image);

        Ok(content)
    }
}

#[async_trait::async_trait]
impl TagLister for OciRegistry {
    async fn list_tags(
        &self,
        context: &RegistryContext,
        reference: &ChartReference,
    ) -> Result<Vec<String>, RegistryError> {
        let mut session = self.session(context, reference);
        let mut url = format!(
            "{}/v2/{}/tags/list?n={}",
            session.base_url,
            reference.repository(),
            self.tag_page_size
        );
        let mut tags = Vec::new();

        for _ in 0..MAX_TAG_PAGES {
            let response = check_status(session.get(&url, None).await?, reference.identity())?;
            let next = next_page_url(response.headers(), &session.base_url);

            let page: TagListResponse = response.json().await.map_err(|e| {
                warn!("Failed to parse tag list response from {}: {}", url, e);
                RegistryError::InvalidResponse(e.to_string())
            })?;
            tags.extend(page.tags.unwrap_or_default());

            match next {
                Some(next) => url = next,
                None => {
                    debug!("Listed {} tags for {}", tags.len(), reference);
                    return Ok(tags);
                }
            }
        }

        warn!("Tag list for {} exceeded {} pages", reference, MAX_TAG_PAGES);
        Err(RegistryError::InvalidResponse(format!(
            "tag list pagination exceeded {MAX_TAG_PAGES} pages"
        )))
    }
}

/// Request state for one operation against one repository.
///
/// Holds the bearer token once one has been negotiated, so paginated and
/// multi-step operations authenticate only once.
struct Session<'a> {
    client: &'a reqwest::Client,
    context: &'a RegistryContext,
    reference: &'a ChartReference,
    base_url: String,
    bearer: Option<String>,
}

impl Session<'_> {
    async fn get(&mut self, url: &str, accept: Option<&str>) -> Result<Response, RegistryError> {
        let response = self.send(url, accept).await?;
        if response.status() != StatusCode::UNAUTHORIZED || self.bearer.is_some() {
            return Ok(response);
        }

        let Some(challenge) = response
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .and_then(BearerChallenge::parse)
        else {
            return Ok(response);
        };

        self.bearer = Some(self.fetch_token(&challenge).await?);
        self.send(url, accept).await
    }

    async fn send(&self, url: &str, accept: Option<&str>) -> Result<Response, RegistryError> {
        let mut request = self.client.get(url);
        if let Some(accept) = accept {
            request = request.header(ACCEPT, accept);
        }

        request = match (&self.bearer, &self.context.auth) {
            (Some(token), _) => request.bearer_auth(token),
            (None, Some(auth)) => request.basic_auth(&auth.username, Some(&auth.password)),
            (None, None) => request,
        };

        Ok(request.send().await?)
    }

    async fn fetch_token(&self, challenge: &BearerChallenge) -> Result<String, RegistryError> {
        let mut url = Url::parse(&challenge.realm).map_err(|e| {
            RegistryError::InvalidResponse(format!(
                "invalid token realm {:?}: {e}",
                challenge.realm
            ))
        })?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair(
                "scope",
                &format!("repository:{}:pull", self.reference.repository()),
            );
            if let Some(service) = &challenge.service {
                query.append_pair("service", service);
            }
        }

        let mut request = self.client.get(url);
        if let Some(auth) = &self.context.auth {
            request = request.basic_auth(&auth.username, Some(&auth.password));
        }

        let response = check_status(request.send().await?, &challenge.realm)?;
        let token: TokenResponse = response.json().await.map_err(|e| {
            warn!("Failed to parse token response from {}: {}", challenge.realm, e);
            RegistryError::InvalidResponse(e.to_string())
        })?;

        token
            .token
            .or(token.access_token)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                RegistryError::InvalidResponse(format!(
                    "token response from {} has no token",
                    challenge.realm
                ))
            })
    }

    async fn fetch_manifest(&mut self, image: &str, tag: &str) -> Result<Manifest, RegistryError> {
        let mut target = tag.to_string();

        for _ in 0..=MAX_INDEX_DEPTH {
            let url = format!(
                "{}/v2/{}/manifests/{}",
                self.base_url,
                self.reference.repository(),
                target
            );
            let response = check_status(self.get(&url, Some(MANIFEST_ACCEPT)).await?, image)?;
            let manifest: Manifest = response.json().await.map_err(|e| {
                warn!("Failed to parse manifest from {}: {}", url, e);
                RegistryError::InvalidResponse(e.to_string())
            })?;

            // Image index: charts are platform independent, any entry will do
            match manifest.manifests.first() {
                Some(entry) => target = entry.digest.clone(),
                None => return Ok(manifest),
            }
        }

        Err(RegistryError::InvalidResponse(format!(
            "image index of {image} nested deeper than {MAX_INDEX_DEPTH} levels"
        )))
    }
}

/// Map non-success statuses to registry errors, naming `what` was requested
fn check_status(response: Response, what: &str) -> Result<Response, RegistryError> {
    let status = response.status();

    if status.is_success() {
        return Ok(response);
    }

    match status {
        StatusCode::NOT_FOUND => Err(RegistryError::NotFound(what.to_string())),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(RegistryError::Unauthorized(
            format!("{what}: registry returned {status}"),
        )),
        _ => {
            warn!("Registry returned status {}: {}", status, response.url());
            Err(RegistryError::InvalidResponse(format!(
                "Unexpected status: {status}"
            )))
        }
    }
}

/// Extract the `rel="next"` target of a `Link` header, resolved against `base_url`
///
/// Absolute targets on another origin are refused, so registry credentials
/// never leave the registry being listed.
fn next_page_url(headers: &HeaderMap, base_url: &str) -> Option<String> {
    let link = headers
        .get_all(LINK)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .find(|link| link.contains("rel=\"next\"") || link.contains("rel=next"))?;

    let start = link.find('<')? + 1;
    let end = link[start..].find('>')? + start;
    let target = &link[start..end];

    if !(target.starts_with("http://") || target.starts_with("https://")) {
        return Some(format!("{base_url}{target}"));
    }

    let base = Url::parse(base_url).ok()?;
    let next = Url::parse(target).ok()?;
    if next.origin() != base.origin() {
        warn!("Ignoring tag list link to another origin: {}", target);
        return None;
    }
    Some(next.to_string())
}

fn find_chart_layer(manifest: &Manifest) -> Option<&Descriptor> {
    manifest
        .layers
        .iter()
        .find(|l| l.media_type == HELM_CHART_LAYER_MEDIA_TYPE)
        .or_else(|| {
            manifest
                .layers
                .iter()
                .find(|l| l.media_type == TAR_GZIP_MEDIA_TYPE)
        })
}

fn verify_digest(digest: &str, content: &[u8]) -> Result<(), RegistryError> {
    let Some(expected) = digest.strip_prefix("sha256:") else {
        debug!("Skipping verification of non-sha256 digest {}", digest);
        return Ok(());
    };

    let actual = hex::encode(Sha256::digest(content));
    if actual != expected {
        return Err(RegistryError::InvalidResponse(format!(
            "blob digest mismatch: expected {digest}, got sha256:{actual}"
        )));
    }

    Ok(())
}

/// Fetches chart archives, authenticating with the credentials stored for each chart
pub struct OciChartGetter {
    registry: Arc<OciRegistry>,
    credentials: Arc<dyn CredentialStore>,
    context: RegistryContext,
}

impl OciChartGetter {
    /// `context` supplies the transport posture; its credentials are ignored
    /// in favor of the ones stored for the chart being fetched.
    pub fn new(
        registry: Arc<OciRegistry>,
        credentials: Arc<dyn CredentialStore>,
        context: RegistryContext,
    ) -> Self {
        Self {
            registry,
            credentials,
            context,
        }
    }
}

#[async_trait::async_trait]
impl ContentFetcher for OciChartGetter {
    async fn fetch(&self, image: &str) -> Result<Vec<u8>, RegistryError> {
        let reference = ChartReference::parse(image)?;
        let Some(tag) = reference.tag() else {
            return Err(RegistryError::InvalidReference {
                reference: image.to_string(),
                reason: "missing version tag".to_string(),
            });
        };

        let credentials = Arc::clone(&self.credentials);
        let scope = reference.identity().to_string();
        let mut context = self.context.clone();
        context.auth = tokio::task::spawn_blocking(move || credentials.read_credentials(&scope))
            .await
            .map_err(CredentialError::from)??;

        self.registry.pull_chart(&context, &reference, tag).await
    }
}
