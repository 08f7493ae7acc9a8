//! Concurrent version discovery.
//!
//! Fetchers query remote sources for newly published versions of known
//! packages. Individual failures are collected rather than aborting the
//! sweep; discovery only fails as a whole when every fetcher failed.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use indexmap::IndexMap;
use log::{debug, warn};
use serde::Deserialize;

use crate::error::{ConcretizeError, Result};
use crate::facts::VersionDecl;

/// One remote source of version listings for one package.
#[async_trait]
pub trait VersionFetcher: Send + Sync {
    /// The package this fetcher discovers versions for.
    fn package(&self) -> &str;

    async fn fetch(&self) -> std::result::Result<Vec<VersionDecl>, String>;
}

/// The outcome of one discovery sweep. Partial failure is normal; callers
/// decide what to do with the error list.
#[derive(Debug, Default)]
pub struct DiscoveryReport {
    /// Discovered versions per package, in package name order.
    pub discovered: IndexMap<String, Vec<VersionDecl>>,
    pub errors: Vec<String>,
}

/// Run every fetcher, at most `concurrency` in flight at once.
///
/// Results are reassembled in package name order so the report is
/// deterministic regardless of completion order.
pub async fn discover_versions(
    fetchers: &[Arc<dyn VersionFetcher>],
    concurrency: usize,
) -> Result<DiscoveryReport> {
    if fetchers.is_empty() {
        return Ok(DiscoveryReport::default());
    }
    let width = concurrency.max(1).min(fetchers.len());
    debug!(
        "discovering versions for {} packages ({} concurrent)",
        fetchers.len(),
        width
    );

    let results: Vec<(String, std::result::Result<Vec<VersionDecl>, String>)> =
        stream::iter(fetchers.iter().cloned())
            .map(|fetcher| async move {
                let package = fetcher.package().to_string();
                let result = fetcher.fetch().await;
                (package, result)
            })
            .buffer_unordered(width)
            .collect()
            .await;

    let mut report = DiscoveryReport::default();
    let mut ordered = results;
    ordered.sort_by(|(a, _), (b, _)| a.cmp(b));
    for (package, result) in ordered {
        match result {
            Ok(versions) => {
                report.discovered.insert(package, versions);
            }
            Err(message) => {
                warn!("version discovery for {package} failed: {message}");
                report.errors.push(format!("{package}: {message}"));
            }
        }
    }

    if report.discovered.is_empty() && !report.errors.is_empty() {
        return Err(ConcretizeError::DiscoveryFailed {
            errors: report.errors,
        });
    }
    Ok(report)
}

/// A fetcher reading a JSON version listing over HTTP.
pub struct HttpVersionFetcher {
    package: String,
    url: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct RemoteVersion {
    version: String,
    #[serde(default)]
    deprecated: bool,
    #[serde(default)]
    sha256: Option<String>,
}

impl HttpVersionFetcher {
    pub fn new(package: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl VersionFetcher for HttpVersionFetcher {
    fn package(&self) -> &str {
        &self.package
    }

    async fn fetch(&self) -> std::result::Result<Vec<VersionDecl>, String> {
        let listed: Vec<RemoteVersion> = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| e.to_string())?
            .error_for_status()
            .map_err(|e| e.to_string())?
            .json()
            .await
            .map_err(|e| e.to_string())?;

        let mut out = Vec::with_capacity(listed.len());
        for remote in listed {
            let version = strata_spec::Version::parse(&remote.version)
                .map_err(|e| e.to_string())?;
            let mut decl = VersionDecl::new(version);
            decl.deprecated = remote.deprecated;
            decl.sha256 = remote.sha256;
            out.push(decl);
        }
        Ok(out)
    }
}
