//! OData (Atom) package feeds
//!
//! Query results come back in pages. Each page may end with a
//! `<link rel="next" href="..."/>` pointing at the following page.

use super::http::DocumentFetcher;
use crate::error::{FeedError, FeedResult};
use crate::packaging::{PackageIdentity, PackageVersion};
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

/// A package entry from a feed page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedPackage {
    pub identity: PackageIdentity,
    pub is_listed: bool,
}

/// One parsed page
#[derive(Debug, Default)]
struct FeedPage {
    packages: Vec<FeedPackage>,
    next: Option<String>,
}

/// Client for an OData package feed
pub struct ODataFeedResource {
    base: String,
    fetcher: Arc<dyn DocumentFetcher>,
}

impl ODataFeedResource {
    pub fn new(base: &Url, fetcher: Arc<dyn DocumentFetcher>) -> Self {
        let mut base = base.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        Self { base, fetcher }
    }

    pub fn base_address(&self) -> &str {
        &self.base
    }

    /// Every version of a package, newest first, without duplicates
    pub async fn find_packages_by_id(
        &self,
        id: &str,
        token: &CancellationToken,
    ) -> FeedResult<Vec<FeedPackage>> {
        if id.trim().is_empty() {
            return Err(FeedError::argument("id", "must not be empty"));
        }

        let uri = format!(
            "{}FindPackagesById()?id='{}'",
            self.base,
            url::form_urlencoded::byte_serialize(id.as_bytes()).collect::<String>()
        );
        let mut packages = self.query(&uri, token).await?;

        packages.sort_by(|a, b| b.identity.version().cmp(a.identity.version()));
        packages.dedup_by(|a, b| a.identity == b.identity);
        Ok(packages)
    }

    /// Walk every page starting at `uri`
    async fn query(&self, uri: &str, token: &CancellationToken) -> FeedResult<Vec<FeedPackage>> {
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(uri.to_ascii_lowercase());

        let mut results = Vec::new();
        let mut current = uri.to_string();
        let mut page_number = 1;

        loop {
            if token.is_cancelled() {
                return Err(FeedError::Cancelled);
            }

            let body = self.fetcher.fetch(&current, token).await?;
            let text = String::from_utf8_lossy(&body);
            let page = parse_page(&text).map_err(|reason| FeedError::InvalidFeed {
                uri: current.clone(),
                reason,
            })?;
            debug!("Feed page {} returned {} packages", page_number, page.packages.len());
            results.extend(page.packages);

            let Some(next) = page.next else {
                break;
            };
            // Some servers hand back the same next link on every page
            if !visited.insert(next.to_ascii_lowercase()) {
                return Err(FeedError::CyclicLink { uri: next });
            }
            current = next;
            page_number += 1;
        }

        Ok(results)
    }
}

fn child<'a, 'input>(
    node: roxmltree::Node<'a, 'input>,
    name: &str,
) -> Option<roxmltree::Node<'a, 'input>> {
    node.children()
        .find(|n| n.is_element() && n.has_tag_name(name))
}

fn child_text<'a>(node: roxmltree::Node<'a, '_>, name: &str) -> Option<&'a str> {
    child(node, name)
        .and_then(|n| n.text())
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn parse_page(xml: &str) -> Result<FeedPage, String> {
    let doc = roxmltree::Document::parse(xml).map_err(|e| format!("invalid XML: {}", e))?;
    let root = doc.root_element();

    let mut page = FeedPage::default();
    let entries: Vec<roxmltree::Node> = match root.tag_name().name() {
        "feed" => root
            .children()
            .filter(|n| n.is_element() && n.has_tag_name("entry"))
            .collect(),
        "entry" => vec![root],
        other => return Err(format!("unexpected root element '{}'", other)),
    };

    for entry in entries {
        if let Some(package) = parse_entry(entry) {
            page.packages.push(package);
        }
    }

    page.next = root
        .children()
        .filter(|n| n.is_element() && n.has_tag_name("link"))
        .find(|n| {
            n.attribute("rel")
                .is_some_and(|rel| rel.eq_ignore_ascii_case("next"))
        })
        .and_then(|n| n.attribute("href"))
        .filter(|href| !href.is_empty())
        .map(str::to_string);

    Ok(page)
}

fn parse_entry(entry: roxmltree::Node<'_, '_>) -> Option<FeedPackage> {
    let properties = child(entry, "properties");

    let id = properties
        .and_then(|p| child_text(p, "Id"))
        .or_else(|| child_text(entry, "title"))?;
    let version_text = properties.and_then(|p| child_text(p, "Version"))?;
    let version = match PackageVersion::parse(version_text) {
        Ok(version) => version,
        Err(e) => {
            warn!("Skipping feed entry {}: {}", id, e);
            return None;
        }
    };

    // Unlisted packages carry a published date in 1900
    let is_listed = properties
        .and_then(|p| child_text(p, "Published"))
        .is_none_or(|published| !published.starts_with("1900-"));

    Some(FeedPackage {
        identity: PackageIdentity::new(id, version),
        is_listed,
    })
}
