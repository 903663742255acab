//! The process-wide package schema cache.
//!
//! Keyed by `(package name, version-or-empty)`. Loads go through the external
//! [`SchemaLoader`], which may block; a single mutex serializes loads so
//! concurrent lookups for the same package cause exactly one loader call.
//! Failed loads are cached too, with a deferred diagnostic factory, so a
//! broken package is reported at its first use site and never retried.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use pulumi_yaml_schema::{index_package, Function, Package, Resource, SchemaLoader};

use crate::bind::diags;
use crate::diagnostic::Diagnostic;
use crate::position::Range;

/// Cache key: package name plus the requested version, empty for "latest".
pub type PkgKey = (String, String);

type DeferredDiag = Box<dyn Fn(Option<Range>) -> Diagnostic + Send + Sync>;

/// A resource descriptor plus any warning that applies wherever it is used.
pub struct ResourceSpec {
    pub resource: Arc<Resource>,
    diag: Option<DeferredDiag>,
}

impl ResourceSpec {
    pub fn use_site_diag(&self, loc: Option<Range>) -> Option<Diagnostic> {
        self.diag.as_ref().map(|f| f(loc))
    }
}

/// A function descriptor plus any warning that applies wherever it is used.
pub struct FunctionSpec {
    pub function: Arc<Function>,
    diag: Option<DeferredDiag>,
}

impl FunctionSpec {
    pub fn use_site_diag(&self, loc: Option<Range>) -> Option<Diagnostic> {
        self.diag.as_ref().map(|f| f(loc))
    }
}

/// One cache slot: the package (absent on load failure) and token-indexed
/// lookup maps.
pub struct PackageEntry {
    pub package: Option<Arc<Package>>,
    resources: HashMap<String, ResourceSpec>,
    functions: HashMap<String, FunctionSpec>,
    provider: Option<ResourceSpec>,
    diag: Option<DeferredDiag>,
}

impl PackageEntry {
    fn from_package(package: Arc<Package>) -> Self {
        let (resources_by_token, functions_by_token, duplicated) = index_package(&package);
        let mut resources = HashMap::new();
        for (token, resource) in resources_by_token {
            let diag: Option<DeferredDiag> = if duplicated.contains(&token) {
                let token = token.clone();
                Some(Box::new(move |loc| diags::multiple_resources(&token, loc)))
            } else if resource.is_deprecated() {
                let token = resource.token.clone();
                let msg = resource.deprecation_message.clone();
                Some(Box::new(move |loc| diags::deprecated(&token, &msg, loc)))
            } else {
                None
            };
            resources.insert(token, ResourceSpec { resource, diag });
        }
        let mut functions = HashMap::new();
        for (token, function) in functions_by_token {
            let diag: Option<DeferredDiag> = if function.is_deprecated() {
                let token = function.token.clone();
                let msg = function.deprecation_message.clone();
                Some(Box::new(move |loc| diags::deprecated(&token, &msg, loc)))
            } else {
                None
            };
            functions.insert(token, FunctionSpec { function, diag });
        }
        let provider = package.provider.clone().map(|resource| ResourceSpec {
            resource,
            diag: None,
        });
        Self {
            package: Some(package),
            resources,
            functions,
            provider,
            diag: None,
        }
    }

    fn from_error(name: &str, err: String) -> Self {
        let name = name.to_string();
        Self {
            package: None,
            resources: HashMap::new(),
            functions: HashMap::new(),
            provider: None,
            diag: Some(Box::new(move |loc| {
                diags::failed_to_load_package(&name, &err, loc)
            })),
        }
    }

    /// The deferred load-failure warning, applied at a use site.
    pub fn load_failure(&self, loc: Option<Range>) -> Option<Diagnostic> {
        self.diag.as_ref().map(|f| f(loc))
    }

    pub fn is_valid(&self) -> bool {
        self.package.is_some()
    }

    /// Resolve a raw resource token through the package's alias-aware rule.
    pub fn resolve_resource(&self, token: &str) -> Option<&ResourceSpec> {
        let package = self.package.as_ref()?;
        if token == format!("pulumi:providers:{}", package.name) {
            return self.provider.as_ref();
        }
        let canonical = package.resolve_resource_token(token)?;
        self.resources
            .get(&canonical)
            .or_else(|| self.resources.get(token))
    }

    pub fn resolve_function(&self, token: &str) -> Option<&FunctionSpec> {
        let package = self.package.as_ref()?;
        let function = package.resolve_function(token)?;
        self.functions.get(&function.token)
    }
}

/// The process-wide cache over a schema loader.
pub struct SchemaCache {
    loader: Arc<dyn SchemaLoader>,
    entries: Mutex<HashMap<PkgKey, Arc<PackageEntry>>>,
}

impl SchemaCache {
    pub fn new(loader: Arc<dyn SchemaLoader>) -> Self {
        Self {
            loader,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Get the entry for a package, loading it on first use. The mutex is
    /// held across the load: concurrent callers for the same key line up
    /// behind one loader call.
    pub fn load(&self, name: &str, version: Option<&str>) -> Arc<PackageEntry> {
        let key: PkgKey = (name.to_string(), version.unwrap_or("").to_string());
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.get(&key) {
            return entry.clone();
        }
        let entry = match self.loader.load_package(name, version) {
            Ok(package) => {
                tracing::info!(package = name, version = ?version, "loaded package");
                Arc::new(PackageEntry::from_package(package))
            }
            Err(err) => {
                tracing::warn!(package = name, version = ?version, error = %err, "failed to load package");
                Arc::new(PackageEntry::from_error(name, err.to_string()))
            }
        };
        entries.insert(key, entry.clone());
        entry
    }

    /// A non-loading lookup, for request handlers that must not block on the
    /// external loader.
    pub fn peek(&self, name: &str, version: Option<&str>) -> Option<Arc<PackageEntry>> {
        let key: PkgKey = (name.to_string(), version.unwrap_or("").to_string());
        self.entries.lock().unwrap().get(&key).cloned()
    }

    /// Every cached entry, valid or failed, in key order.
    pub fn loaded(&self) -> Vec<(PkgKey, Arc<PackageEntry>)> {
        let entries = self.entries.lock().unwrap();
        let mut all: Vec<_> = entries.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// Warm the cache off the calling thread. Used by completion, which may
    /// not block on the loader: the miss returns empty and the next request
    /// finds the entry.
    pub fn ensure_background(self: &Arc<Self>, name: &str, version: Option<&str>) {
        if self.peek(name, version).is_some() {
            return;
        }
        let cache = self.clone();
        let name = name.to_string();
        let version = version.map(str::to_string);
        std::thread::spawn(move || {
            cache.load(&name, version.as_deref());
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulumi_yaml_schema::{LoadError, Property, Type};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingLoader {
        calls: AtomicUsize,
    }

    impl SchemaLoader for CountingLoader {
        fn load_package(
            &self,
            name: &str,
            _version: Option<&str>,
        ) -> Result<Arc<Package>, LoadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if name == "ex" {
                let mut pkg = Package::new("ex");
                let mut bucket = Resource::new("ex:index:Bucket");
                bucket.input_properties.push(Property::new("name", Type::String).required());
                pkg.resources.push(Arc::new(bucket));
                Ok(Arc::new(pkg))
            } else {
                Err(LoadError::NotFound {
                    name: name.to_string(),
                })
            }
        }
    }

    fn cache() -> Arc<SchemaCache> {
        Arc::new(SchemaCache::new(Arc::new(CountingLoader {
            calls: AtomicUsize::new(0),
        })))
    }

    #[test]
    fn hit_returns_cached_entry() {
        let cache = cache();
        let a = cache.load("ex", None);
        let b = cache.load("ex", None);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn failures_are_cached_and_deferred() {
        let loader = Arc::new(CountingLoader {
            calls: AtomicUsize::new(0),
        });
        let cache = SchemaCache::new(loader.clone());
        let entry = cache.load("nope", None);
        assert!(!entry.is_valid());
        let diag = entry.load_failure(None).unwrap();
        assert!(diag.summary.contains("Failed to load package 'nope'"));
        // A second lookup does not re-trigger the loader.
        cache.load("nope", None);
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_loads_are_single_flight() {
        let loader = Arc::new(CountingLoader {
            calls: AtomicUsize::new(0),
        });
        let cache = Arc::new(SchemaCache::new(loader.clone()));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            handles.push(std::thread::spawn(move || {
                cache.load("ex", None);
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn versions_key_separate_entries() {
        let cache = cache();
        cache.load("ex", None);
        cache.load("ex", Some("1.0.0"));
        assert_eq!(cache.loaded().len(), 2);
        assert!(cache.peek("ex", Some("1.0.0")).is_some());
        assert!(cache.peek("ex", Some("2.0.0")).is_none());
    }

    #[test]
    fn resolves_resources_through_the_entry() {
        let cache = cache();
        let entry = cache.load("ex", None);
        let spec = entry.resolve_resource("ex:Bucket").unwrap();
        assert_eq!(spec.resource.token, "ex:index:Bucket");
    }
}
