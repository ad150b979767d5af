//! Connection metadata for a watched target.

use serde::{Deserialize, Serialize};

/// Ephemeral connection metadata needed to reach a target.
///
/// A locator can go stale at any time (the target may be re-hosted), so
/// holders treat it as a cache and expect it to be replaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLocator {
    /// Address workers and probes connect to.
    pub url: String,

    /// Resolver-specific identifier of the resource behind the URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
}

impl ResourceLocator {
    /// Create a locator for the given URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            resource_id: None,
        }
    }

    /// Builder method to attach a resource identifier.
    pub fn with_resource_id(mut self, id: impl Into<String>) -> Self {
        self.resource_id = Some(id.into());
        self
    }

    /// A locator is only usable when it carries an address.
    pub fn is_usable(&self) -> bool {
        !self.url.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_url_is_not_usable() {
        assert!(!ResourceLocator::new("  ").is_usable());
        assert!(ResourceLocator::new("http://edge-1/live").is_usable());
    }

    #[test]
    fn test_resource_id_omitted_when_absent() {
        let json = serde_json::to_string(&ResourceLocator::new("http://a")).unwrap();
        assert_eq!(json, r#"{"url":"http://a"}"#);
    }
}
