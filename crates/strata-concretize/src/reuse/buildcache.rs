use std::io::Read;

use log::debug;
use serde::Deserialize;

use crate::config::SourceKind;
use crate::error::{ConcretizeError, Result};

use super::selector::{ReusableSpec, ReuseSource};

/// Index document served by a binary cache: a flat list of reusable specs.
#[derive(Debug, Deserialize)]
struct IndexDocument {
    specs: Vec<ReusableSpec>,
}

/// Reuse candidates from a remote buildcache index.
///
/// The index is fetched (or read) once and held in memory; `gather` is then
/// a cheap clone, which keeps concurrent reads trivially safe.
pub struct BuildcacheIndex {
    entries: Vec<ReusableSpec>,
}

impl BuildcacheIndex {
    pub fn from_entries(mut entries: Vec<ReusableSpec>) -> Self {
        for entry in &mut entries {
            entry.provenance = SourceKind::Buildcache;
        }
        Self { entries }
    }

    /// Parse an index document from a reader (a file, or a test fixture).
    pub fn from_reader(reader: impl Read) -> Result<Self> {
        let doc: IndexDocument =
            serde_json::from_reader(reader).map_err(|err| ConcretizeError::SpecSyntax {
                spec: "buildcache index".to_string(),
                message: err.to_string(),
            })?;
        debug!("loaded buildcache index with {} specs", doc.specs.len());
        Ok(Self::from_entries(doc.specs))
    }

    /// Fetch and parse the index document at `url`.
    pub fn fetch(url: &str) -> Result<Self> {
        let response = reqwest::blocking::get(url)
            .and_then(|r| r.error_for_status())
            .map_err(|err| ConcretizeError::SpecSyntax {
                spec: url.to_string(),
                message: format!("buildcache index fetch failed: {err}"),
            })?;
        let doc: IndexDocument = response.json().map_err(|err| ConcretizeError::SpecSyntax {
            spec: url.to_string(),
            message: format!("buildcache index parse failed: {err}"),
        })?;
        Ok(Self::from_entries(doc.specs))
    }
}

impl ReuseSource for BuildcacheIndex {
    fn kind(&self) -> SourceKind {
        SourceKind::Buildcache
    }

    fn gather(&self) -> Result<Vec<ReusableSpec>> {
        Ok(self.entries.clone())
    }
}
