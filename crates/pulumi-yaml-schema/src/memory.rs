//! An in-memory loader for tests and embedding.

use std::collections::HashMap;
use std::sync::Arc;

use crate::loader::{LoadError, SchemaLoader};
use crate::package::Package;

/// A loader that serves packages from a fixed in-memory set. Versions are
/// ignored: whatever was registered under the name is returned.
#[derive(Debug, Default)]
pub struct MemoryLoader {
    packages: HashMap<String, Arc<Package>>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_package(mut self, pkg: Package) -> Self {
        self.packages.insert(pkg.name.clone(), Arc::new(pkg));
        self
    }
}

impl SchemaLoader for MemoryLoader {
    fn load_package(&self, name: &str, _version: Option<&str>) -> Result<Arc<Package>, LoadError> {
        self.packages
            .get(name)
            .cloned()
            .ok_or_else(|| LoadError::NotFound {
                name: name.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_package_is_not_found() {
        let loader = MemoryLoader::new();
        assert!(matches!(
            loader.load_package("nope", None),
            Err(LoadError::NotFound { .. })
        ));
    }

    #[test]
    fn registered_package_round_trips() {
        let loader = MemoryLoader::new().with_package(Package::new("ex"));
        assert_eq!(loader.load_package("ex", None).unwrap().name, "ex");
    }
}
