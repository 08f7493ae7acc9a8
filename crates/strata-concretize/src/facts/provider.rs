use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use indexmap::IndexMap;
use log::debug;

use crate::error::{ConcretizeError, Result};

use super::package::PackageFacts;

/// Read-only source of package facts. Implemented by the repository layer;
/// the in-memory implementation below backs tests and preloaded tables.
pub trait PackageRepository: Send + Sync {
    fn namespace(&self) -> &str;

    /// Load the fact table for `name`, or `None` if the repository does not
    /// define the package.
    fn load(&self, name: &str) -> Option<PackageFacts>;

    /// All package names this repository defines, sorted.
    fn package_names(&self) -> Vec<String>;
}

/// A preloaded, in-memory package repository.
#[derive(Debug, Clone, Default)]
pub struct MemoryRepository {
    namespace: String,
    packages: IndexMap<String, PackageFacts>,
}

impl MemoryRepository {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            packages: IndexMap::new(),
        }
    }

    pub fn add(&mut self, mut facts: PackageFacts) -> &mut Self {
        facts.namespace = self.namespace.clone();
        self.packages.insert(facts.name.clone(), facts);
        self
    }

    pub fn with(mut self, facts: PackageFacts) -> Self {
        self.add(facts);
        self
    }
}

impl PackageRepository for MemoryRepository {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn load(&self, name: &str) -> Option<PackageFacts> {
        self.packages.get(name).cloned()
    }

    fn package_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.packages.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Fact provider over an ordered list of repositories, with a process-wide
/// invalidatable cache.
///
/// Lookup order matters: the first repository defining a name wins, unless
/// the query is fully qualified as `namespace.name`. The cache is replaced
/// under a write lock on invalidation so that package definitions reloaded
/// mid-process (tests, hot reload) are picked up.
pub struct FactProvider {
    repositories: Vec<Arc<dyn PackageRepository>>,
    cache: RwLock<HashMap<String, Arc<PackageFacts>>>,
}

impl FactProvider {
    pub fn new(repositories: Vec<Arc<dyn PackageRepository>>) -> Self {
        Self {
            repositories,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn single(repository: impl PackageRepository + 'static) -> Self {
        Self::new(vec![Arc::new(repository)])
    }

    /// Fetch facts for `name` or fully qualified `namespace.name`.
    pub fn facts(&self, name: &str) -> Result<Arc<PackageFacts>> {
        if let Some(hit) = self.cache.read().expect("facts cache poisoned").get(name) {
            return Ok(Arc::clone(hit));
        }

        let loaded = self.lookup(name).ok_or_else(|| ConcretizeError::UnknownPackage {
            name: name.to_string(),
        })?;

        let shared = Arc::new(loaded);
        self.cache
            .write()
            .expect("facts cache poisoned")
            .insert(name.to_string(), Arc::clone(&shared));
        Ok(shared)
    }

    fn lookup(&self, name: &str) -> Option<PackageFacts> {
        if let Some((namespace, bare)) = name.split_once('.') {
            return self
                .repositories
                .iter()
                .find(|r| r.namespace() == namespace)
                .and_then(|r| r.load(bare));
        }
        self.repositories.iter().find_map(|r| r.load(name))
    }

    /// Names of all packages that can provide `virtual_name` under some
    /// condition, deduplicated by search order and sorted for determinism.
    pub fn providers_of(&self, virtual_name: &str) -> Vec<String> {
        let mut providers = Vec::new();
        for name in self.all_package_names() {
            if let Ok(facts) = self.facts(&name) {
                if facts.provided_virtual_names().contains(virtual_name) {
                    providers.push(name);
                }
            }
        }
        providers.sort();
        providers.dedup();
        providers
    }

    /// All visible package names, respecting search order (first repository
    /// defining a name shadows later ones).
    pub fn all_package_names(&self) -> Vec<String> {
        let mut seen = std::collections::BTreeSet::new();
        for repo in &self.repositories {
            for name in repo.package_names() {
                seen.insert(name);
            }
        }
        seen.into_iter().collect()
    }

    pub fn is_virtual(&self, name: &str) -> bool {
        !self.all_package_names().contains(&name.to_string())
            && !self.providers_of(name).is_empty()
    }

    /// Drop a single cached entry.
    pub fn invalidate(&self, name: &str) {
        debug!("invalidating cached facts for {name}");
        self.cache.write().expect("facts cache poisoned").remove(name);
    }

    /// Drop the whole cache, forcing reloads from the repositories.
    pub fn clear(&self) {
        self.cache.write().expect("facts cache poisoned").clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo(namespace: &str, names: &[&str]) -> MemoryRepository {
        let mut repo = MemoryRepository::new(namespace);
        for name in names {
            repo.add(PackageFacts::new(*name).version("1.0"));
        }
        repo
    }

    #[test]
    fn test_unknown_package() {
        let provider = FactProvider::single(repo("builtin", &["zlib"]));
        assert!(provider.facts("zlib").is_ok());
        let err = provider.facts("nonexistent").unwrap_err();
        assert!(matches!(err, ConcretizeError::UnknownPackage { .. }));
    }

    #[test]
    fn test_search_order_first_match_wins() {
        let site = repo("site", &["zlib"]);
        let builtin = repo("builtin", &["zlib", "cmake"]);
        let provider = FactProvider::new(vec![Arc::new(site), Arc::new(builtin)]);

        assert_eq!(provider.facts("zlib").unwrap().namespace, "site");
        assert_eq!(provider.facts("cmake").unwrap().namespace, "builtin");
    }

    #[test]
    fn test_qualified_lookup_bypasses_search_order() {
        let site = repo("site", &["zlib"]);
        let builtin = repo("builtin", &["zlib"]);
        let provider = FactProvider::new(vec![Arc::new(site), Arc::new(builtin)]);

        assert_eq!(provider.facts("builtin.zlib").unwrap().namespace, "builtin");
        assert!(provider.facts("missing.zlib").is_err());
    }

    #[test]
    fn test_cache_invalidation_picks_up_reload() {
        // Two providers sharing a repository type; simulate a reload by
        // using a fresh provider after invalidate.
        let provider = FactProvider::single(repo("builtin", &["zlib"]));
        let first = provider.facts("zlib").unwrap();
        let again = provider.facts("zlib").unwrap();
        assert!(Arc::ptr_eq(&first, &again));

        provider.invalidate("zlib");
        let reloaded = provider.facts("zlib").unwrap();
        assert!(!Arc::ptr_eq(&first, &reloaded));
        assert_eq!(first.name, reloaded.name);
    }

    #[test]
    fn test_providers_of() {
        let mut repo = MemoryRepository::new("builtin");
        repo.add(PackageFacts::new("openmpi").version("4.1").provides("mpi"));
        repo.add(PackageFacts::new("mpich").version("4.0").provides("mpi"));
        repo.add(PackageFacts::new("zlib").version("1.3"));
        let provider = FactProvider::single(repo);

        assert_eq!(provider.providers_of("mpi"), vec!["mpich", "openmpi"]);
        assert!(provider.is_virtual("mpi"));
        assert!(!provider.is_virtual("zlib"));
    }
}
