use std::collections::HashMap;

/// A URL queued for fetching, plus auxiliary attributes
///
/// Attributes are free-form key/value pairs a [`Processor`] can attach
/// (anchor text, the page the link was found on, ...). Once a link has
/// been handed to the frontier it is never modified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    url: String,
    attrs: HashMap<String, String>,
}

impl Link {
    /// Creates a link without attributes
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            attrs: HashMap::new(),
        }
    }

    /// Creates a link with a full attribute map
    pub fn with_attrs(url: impl Into<String>, attrs: HashMap<String, String>) -> Self {
        Self {
            url: url.into(),
            attrs,
        }
    }

    /// Returns the link with one more attribute set
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn attrs(&self) -> &HashMap<String, String> {
        &self.attrs
    }

    /// Looks up a single attribute
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }

    pub fn into_url(self) -> String {
        self.url
    }
}

impl From<&str> for Link {
    fn from(url: &str) -> Self {
        Link::new(url)
    }
}

impl From<String> for Link {
    fn from(url: String) -> Self {
        Link::new(url)
    }
}

/// Turns a fetched page into follow-on links
///
/// The crawler calls `process` from many fetch tasks at once, with no
/// serialization, so implementations must be safe to share across threads.
pub trait Processor: Send + Sync {
    /// Processes a page body and returns the links to enqueue next
    fn process(&self, link: &Link, body: &str) -> Vec<Link>;
}

impl<F> Processor for F
where
    F: Fn(&Link, &str) -> Vec<Link> + Send + Sync,
{
    fn process(&self, link: &Link, body: &str) -> Vec<Link> {
        self(link, body)
    }
}
