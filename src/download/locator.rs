//! Open-access artifact lookup by DOI
//!
//! Records found without a PDF link often carry a DOI. This module asks
//! open-access indexes for a PDF location:
//! - Unpaywall: the best open-access location of a DOI
//! - CrossRef: full-text links published with the DOI's metadata
//!
//! Lookups go through the same [`Fetch`] transport as everything else, so they
//! are paced, retried and block-checked like any other request. A lookup never
//! fails: anything other than a usable URL is "not found".

use crate::config::OpenAccessConfig;
use crate::crawler::Fetch;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use url::Url;

/// A PDF location found for a DOI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedArtifact {
    pub url: String,

    /// Which index reported the location
    pub source: &'static str,
}

/// One index that can map a DOI to a PDF URL
#[async_trait]
pub trait ArtifactLocator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns a PDF URL for `doi`, or `None` if the index has none
    async fn locate(&self, doi: &str) -> Option<String>;
}

/// Builds `{root}/{doi}`; DOIs keep their `/` separators
fn doi_url(root: &str, doi: &str) -> Option<Url> {
    Url::parse(&format!("{}/{}", root.trim_end_matches('/'), doi.trim())).ok()
}

/// Fetches and decodes a JSON document, logging why nothing came back
async fn fetch_json<T: for<'de> Deserialize<'de>>(
    transport: &dyn Fetch,
    source: &str,
    url: &str,
) -> Option<T> {
    let body = match transport.fetch(url).await {
        Ok(body) => body,
        Err(e) if e.is_blocked() => {
            tracing::warn!("{} lookup blocked: {}", source, e);
            return None;
        }
        Err(e) => {
            tracing::debug!("{} lookup failed: {}", source, e);
            return None;
        }
    };

    match serde_json::from_slice(&body) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(
                "{} returned an unreadable response for {}: {}",
                source,
                url,
                e
            );
            None
        }
    }
}

#[derive(Debug, Deserialize)]
struct UnpaywallWork {
    #[serde(default)]
    is_oa: bool,
    best_oa_location: Option<UnpaywallLocation>,
}

#[derive(Debug, Deserialize)]
struct UnpaywallLocation {
    url_for_pdf: Option<String>,
    version: Option<String>,
    license: Option<String>,
}

/// Unpaywall client (`GET {root}/{doi}?email=...`)
pub struct UnpaywallLocator {
    transport: Arc<dyn Fetch>,
    root: String,
    email: String,
}

impl UnpaywallLocator {
    pub fn new(transport: Arc<dyn Fetch>, root: &str, email: &str) -> Self {
        Self {
            transport,
            root: root.to_string(),
            email: email.to_string(),
        }
    }
}

#[async_trait]
impl ArtifactLocator for UnpaywallLocator {
    fn name(&self) -> &'static str {
        "unpaywall"
    }

    async fn locate(&self, doi: &str) -> Option<String> {
        let mut url = doi_url(&self.root, doi)?;
        url.query_pairs_mut().append_pair("email", &self.email);

        let work: UnpaywallWork =
            fetch_json(self.transport.as_ref(), "Unpaywall", url.as_str()).await?;
        if !work.is_oa {
            tracing::debug!("Not open access according to Unpaywall: {}", doi);
            return None;
        }

        let location = work.best_oa_location?;
        let pdf = location.url_for_pdf.filter(|u| !u.trim().is_empty())?;
        tracing::debug!(
            "Unpaywall location for {}: version {}, license {}",
            doi,
            location.version.as_deref().unwrap_or("unknown"),
            location.license.as_deref().unwrap_or("unknown")
        );
        Some(pdf)
    }
}

#[derive(Debug, Deserialize)]
struct CrossRefEnvelope {
    message: CrossRefWork,
}

#[derive(Debug, Deserialize)]
struct CrossRefWork {
    #[serde(default)]
    link: Vec<CrossRefLink>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct CrossRefLink {
    #[serde(rename = "URL")]
    url: Option<String>,
    content_type: Option<String>,
}

/// CrossRef works client (`GET {root}/{doi}`), using `application/pdf` links
pub struct CrossRefLocator {
    transport: Arc<dyn Fetch>,
    root: String,
}

impl CrossRefLocator {
    pub fn new(transport: Arc<dyn Fetch>, root: &str) -> Self {
        Self {
            transport,
            root: root.to_string(),
        }
    }
}

#[async_trait]
impl ArtifactLocator for CrossRefLocator {
    fn name(&self) -> &'static str {
        "crossref"
    }

    async fn locate(&self, doi: &str) -> Option<String> {
        let url = doi_url(&self.root, doi)?;
        let envelope: CrossRefEnvelope =
            fetch_json(self.transport.as_ref(), "CrossRef", url.as_str()).await?;

        envelope
            .message
            .link
            .into_iter()
            .filter(|link| link.content_type.as_deref() == Some("application/pdf"))
            .find_map(|link| link.url.filter(|u| !u.trim().is_empty()))
    }
}

/// Asks each locator in turn and returns the first location found
pub struct OpenAccessResolver {
    locators: Vec<Box<dyn ArtifactLocator>>,
}

impl OpenAccessResolver {
    pub fn new(locators: Vec<Box<dyn ArtifactLocator>>) -> Self {
        Self { locators }
    }

    /// Builds the Unpaywall then CrossRef chain described by `config`
    ///
    /// # Returns
    ///
    /// * `None` - Lookups are disabled
    /// * `Some(resolver)` - Unpaywall is included only when a contact email is set
    pub fn from_config(transport: Arc<dyn Fetch>, config: &OpenAccessConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }

        let mut locators: Vec<Box<dyn ArtifactLocator>> = Vec::new();
        match &config.contact_email {
            Some(email) => locators.push(Box::new(UnpaywallLocator::new(
                transport.clone(),
                &config.unpaywall_url,
                email,
            ))),
            None => tracing::debug!("No contact email configured, skipping Unpaywall lookups"),
        }
        locators.push(Box::new(CrossRefLocator::new(transport, &config.crossref_url)));

        Some(Self::new(locators))
    }

    /// Finds a PDF location for `doi`
    pub async fn resolve(&self, doi: &str) -> Option<LocatedArtifact> {
        for locator in &self.locators {
            if let Some(url) = locator.locate(doi).await {
                tracing::info!("{} found a PDF for {}: {}", locator.name(), doi, url);
                return Some(LocatedArtifact {
                    url,
                    source: locator.name(),
                });
            }
        }

        tracing::debug!("No open-access PDF found for {}", doi);
        None
    }
}
