//! HTTP target resolver.
//!
//! Resolves a target by `GET {base_url}/{target}`, which must answer with
//! `{"url": "...", "resource_id": "..."}`. A probe is a plain `GET` of the
//! locator URL that must come back with a success status.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use watchpool_core::ResourceLocator;

use crate::client::{ResolveError, TargetResolver};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Resolver body. Every field is optional so a half-populated answer maps
/// to `NoLocator` rather than a decode error.
#[derive(Debug, Deserialize)]
struct LocatorBody {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    resource_id: Option<String>,
}

/// Resolver backed by a REST lookup service.
pub struct HttpTargetResolver {
    inner: reqwest::Client,
    base_url: String,
}

impl HttpTargetResolver {
    /// Create a resolver for the lookup service at `base_url`.
    pub fn new(base_url: &str) -> Self {
        Self {
            inner: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl TargetResolver for HttpTargetResolver {
    async fn resolve(&self, target: &str) -> Result<ResourceLocator, ResolveError> {
        let url = format!("{}/{}", self.base_url, target);
        debug!(url = %url, "Resolving target");

        let response = self
            .inner
            .get(&url)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| ResolveError::Request(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => return Err(ResolveError::TargetNotFound(target.to_string())),
            status if !status.is_success() => {
                return Err(ResolveError::Request(format!("HTTP {}: {}", status, url)));
            }
            _ => {}
        }

        let body: LocatorBody = response
            .json()
            .await
            .map_err(|e| ResolveError::Request(e.to_string()))?;

        let locator = match body.url {
            Some(url) => ResourceLocator {
                url,
                resource_id: body.resource_id,
            },
            None => return Err(ResolveError::NoLocator(target.to_string())),
        };
        if !locator.is_usable() {
            return Err(ResolveError::NoLocator(target.to_string()));
        }
        Ok(locator)
    }

    async fn probe(&self, locator: &ResourceLocator) -> Result<(), ResolveError> {
        let response = self
            .inner
            .get(&locator.url)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| ResolveError::Unreachable(format!("{}: {}", locator.url, e)))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(ResolveError::Unreachable(format!(
                "HTTP {}: {}",
                response.status(),
                locator.url
            )))
        }
    }
}
