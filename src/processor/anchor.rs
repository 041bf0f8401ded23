use crate::crawler::{Link, Processor};
use scraper::{Html, Selector};
use url::Url;

/// Follows `<a href>` anchors found in HTML pages
///
/// # Link Extraction Rules
///
/// **Include:**
/// - `<a href="...">` anywhere in the document, resolved against the page URL
///
/// **Exclude:**
/// - `<a href="..." download>`
/// - `javascript:`, `mailto:`, `tel:` links
/// - Data URIs
/// - Fragment-only links (`#section`)
/// - Anything that is not http(s) after resolution
/// - Other hosts, when restricted to one host
///
/// The trimmed anchor text is kept in the `text` attribute of each link.
#[derive(Debug, Clone, Default)]
pub struct AnchorProcessor {
    allowed_host: Option<String>,
}

impl AnchorProcessor {
    /// Follows links to any host
    pub fn new() -> Self {
        Self::default()
    }

    /// Follows only links to the host of `start_url`
    pub fn same_host(start_url: &str) -> Result<Self, url::ParseError> {
        let url = Url::parse(start_url)?;
        Ok(Self {
            allowed_host: url.host_str().map(str::to_string),
        })
    }

    pub fn allowed_host(&self) -> Option<&str> {
        self.allowed_host.as_deref()
    }

    fn is_allowed(&self, url: &Url) -> bool {
        match &self.allowed_host {
            Some(host) => url.host_str() == Some(host.as_str()),
            None => true,
        }
    }
}

impl Processor for AnchorProcessor {
    fn process(&self, link: &Link, body: &str) -> Vec<Link> {
        let base_url = match Url::parse(link.url()) {
            Ok(url) => url,
            Err(e) => {
                tracing::debug!("Cannot resolve links on {}: {}", link.url(), e);
                return Vec::new();
            }
        };

        let document = Html::parse_document(body);
        let Ok(selector) = Selector::parse("a[href]") else {
            return Vec::new();
        };

        let mut links = Vec::new();
        for element in document.select(&selector) {
            if element.value().attr("download").is_some() {
                continue;
            }

            let Some(href) = element.value().attr("href") else {
                continue;
            };
            let Some(url) = resolve_link(href, &base_url) else {
                continue;
            };
            if !self.is_allowed(&url) {
                tracing::trace!("Skipping off-host link {}", url);
                continue;
            }

            let text = element.text().collect::<String>();
            let text = text.trim();
            let mut found = Link::new(url.to_string());
            if !text.is_empty() {
                found = found.with_attr("text", text);
            }
            links.push(found);
        }

        links
    }
}

/// Resolves an href to an absolute http(s) URL without fragment
fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    let mut url = base_url.join(href).ok()?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return None;
    }
    url.set_fragment(None);
    Some(url)
}
