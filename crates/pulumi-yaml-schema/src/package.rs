//! Package descriptors and token resolution.
//!
//! Tokens have the form `package[:module]:Type`; the two-segment form is
//! shorthand for the `index` module. Provider resources use the synthetic
//! `pulumi:providers:<package>` token. Resolution is alias-aware: old tokens
//! recorded in a resource's alias list resolve to the current descriptor.

use std::collections::HashMap;
use std::sync::Arc;

use crate::types::{Property, Type};

/// A resource descriptor.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Resource {
    pub token: String,
    pub comment: String,
    pub deprecation_message: String,
    pub input_properties: Vec<Property>,
    /// Output properties, available on references after deployment.
    pub properties: Vec<Property>,
    /// Previous tokens this resource answered to.
    pub aliases: Vec<String>,
}

impl Resource {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            ..Self::default()
        }
    }

    pub fn is_deprecated(&self) -> bool {
        !self.deprecation_message.is_empty()
    }

    /// Every property reachable through a reference: the synthetic `id` and
    /// `urn`, the outputs, then the inputs.
    pub fn all_properties(&self) -> Vec<Property> {
        let mut properties = vec![
            Property::new("id", Type::Output(Arc::new(Type::String))),
            Property::new("urn", Type::Output(Arc::new(Type::String))),
        ];
        properties.extend(self.properties.iter().cloned());
        properties.extend(self.input_properties.iter().cloned());
        properties
    }

    pub fn property(&self, name: &str) -> Option<Property> {
        self.all_properties().into_iter().find(|p| p.name == name)
    }
}

/// A function (invoke) descriptor.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Function {
    pub token: String,
    pub comment: String,
    pub deprecation_message: String,
    pub inputs: Option<crate::types::ObjectType>,
    pub outputs: Option<crate::types::ObjectType>,
}

impl Function {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            ..Self::default()
        }
    }

    pub fn is_deprecated(&self) -> bool {
        !self.deprecation_message.is_empty()
    }

    pub fn input_properties(&self) -> &[Property] {
        self.inputs.as_ref().map(|o| o.properties.as_slice()).unwrap_or(&[])
    }

    pub fn output_properties(&self) -> &[Property] {
        self.outputs.as_ref().map(|o| o.properties.as_slice()).unwrap_or(&[])
    }
}

/// A loaded package schema.
#[derive(Debug, Clone, Default)]
pub struct Package {
    pub name: String,
    pub version: Option<String>,
    pub description: String,
    pub resources: Vec<Arc<Resource>>,
    pub functions: Vec<Arc<Function>>,
    /// The provider resource, resolved for `pulumi:providers:<name>` tokens.
    pub provider: Option<Arc<Resource>>,
}

impl Package {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Resolve a raw resource token to a canonical one, honoring the
    /// two-segment shorthand, aliases and provider tokens.
    pub fn resolve_resource_token(&self, token: &str) -> Option<String> {
        if token == format!("pulumi:providers:{}", self.name) {
            return Some(token.to_string());
        }
        let canonical = canonicalize(token);
        for resource in &self.resources {
            if resource.token == canonical || canonicalize(&resource.token) == canonical {
                return Some(resource.token.clone());
            }
            for alias in &resource.aliases {
                if canonicalize(alias) == canonical {
                    return Some(resource.token.clone());
                }
            }
        }
        None
    }

    /// Look up a resource by raw token.
    pub fn resolve_resource(&self, token: &str) -> Option<Arc<Resource>> {
        if token == format!("pulumi:providers:{}", self.name) {
            return self.provider.clone();
        }
        let canonical = self.resolve_resource_token(token)?;
        self.resources.iter().find(|r| r.token == canonical).cloned()
    }

    /// Look up a function by raw token.
    pub fn resolve_function(&self, token: &str) -> Option<Arc<Function>> {
        let canonical = canonicalize(token);
        self.functions
            .iter()
            .find(|f| canonicalize(&f.token) == canonical)
            .cloned()
    }

}

/// Normalize a token for comparison: expand the two-segment shorthand and
/// collapse `mod/name` sub-module paths to `mod` when the trailing name
/// matches (`pkg:s3/bucket:Bucket` ≡ `pkg:s3:Bucket`).
fn canonicalize(token: &str) -> String {
    let parts: Vec<&str> = token.split(':').collect();
    match parts.as_slice() {
        [pkg, name] => format!("{pkg}:index:{name}"),
        [pkg, module, name] => {
            let module = match module.split_once('/') {
                Some((head, tail)) if tail.eq_ignore_ascii_case(name) => head,
                _ => module,
            };
            let module = if module.is_empty() { "index" } else { module };
            format!("{pkg}:{module}:{name}")
        }
        _ => token.to_string(),
    }
}

/// The module segment of a token, with sub-module paths collapsed. The
/// two-segment shorthand maps to `index`.
pub fn token_module(token: &str) -> Option<String> {
    let parts: Vec<&str> = token.split(':').collect();
    match parts.as_slice() {
        [_, _] => Some("index".to_string()),
        [_, module, name] => {
            let module = match module.split_once('/') {
                Some((head, tail)) if tail.eq_ignore_ascii_case(name) => head,
                _ => module,
            };
            Some(if module.is_empty() { "index".to_string() } else { module.to_string() })
        }
        _ => None,
    }
}

/// Errors from taking a token apart.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("wrong number of components")]
    WrongComponentCount,
    #[error("package missing from provider type")]
    MissingProviderPackage,
}

/// The package a token belongs to. Provider tokens name their package in the
/// final segment.
pub fn package_name_from_token(token: &str) -> Result<String, TokenError> {
    let parts: Vec<&str> = token.split(':').collect();
    match parts.as_slice() {
        ["pulumi", "providers"] => Err(TokenError::MissingProviderPackage),
        [pkg, _] => Ok(pkg.to_string()),
        ["pulumi", "providers", pkg] => Ok(pkg.to_string()),
        [pkg, _, _] => Ok(pkg.to_string()),
        _ => Err(TokenError::WrongComponentCount),
    }
}

/// Build the lookup maps a cache keeps per package: canonical resource token
/// to descriptor (including aliases) and function token to descriptor. The
/// second return lists tokens claimed by more than one resource or alias.
pub fn index_package(
    pkg: &Package,
) -> (
    HashMap<String, Arc<Resource>>,
    HashMap<String, Arc<Function>>,
    Vec<String>,
) {
    let mut resources: HashMap<String, Arc<Resource>> = HashMap::new();
    let mut duplicated = Vec::new();
    for resource in &pkg.resources {
        let mut insert = |token: &str| {
            if resources.insert(token.to_string(), resource.clone()).is_some() {
                duplicated.push(token.to_string());
            }
        };
        insert(&resource.token);
        for alias in resource.aliases.clone() {
            insert(&alias);
        }
    }
    let functions = pkg
        .functions
        .iter()
        .map(|f| (f.token.clone(), f.clone()))
        .collect();
    (resources, functions, duplicated)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eks() -> Package {
        let mut pkg = Package::new("eks");
        pkg.resources.push(Arc::new(Resource {
            token: "eks:index:Cluster".to_string(),
            aliases: vec!["eks:index:cluster".to_string()],
            ..Resource::default()
        }));
        pkg.functions.push(Arc::new(Function::new("eks:index:getCluster")));
        pkg.provider = Some(Arc::new(Resource::new("pulumi:providers:eks")));
        pkg
    }

    #[test]
    fn two_segment_shorthand_resolves() {
        let pkg = eks();
        assert_eq!(
            pkg.resolve_resource("eks:Cluster").unwrap().token,
            "eks:index:Cluster"
        );
    }

    #[test]
    fn aliases_resolve_to_the_current_token() {
        let pkg = eks();
        assert_eq!(
            pkg.resolve_resource("eks:index:cluster").unwrap().token,
            "eks:index:Cluster"
        );
    }

    #[test]
    fn provider_token_resolves_to_provider_resource() {
        let pkg = eks();
        let provider = pkg.resolve_resource("pulumi:providers:eks").unwrap();
        assert_eq!(provider.token, "pulumi:providers:eks");
    }

    #[test]
    fn submodule_tokens_collapse() {
        assert_eq!(token_module("aws:s3/bucket:Bucket").unwrap(), "s3");
        assert_eq!(token_module("aws:s3:Bucket").unwrap(), "s3");
        assert_eq!(token_module("aws:Bucket").unwrap(), "index");
    }

    #[test]
    fn package_name_follows_provider_rule() {
        assert_eq!(package_name_from_token("aws:s3:Bucket").unwrap(), "aws");
        assert_eq!(package_name_from_token("aws:Bucket").unwrap(), "aws");
        assert_eq!(
            package_name_from_token("pulumi:providers:gcp").unwrap(),
            "gcp"
        );
        assert!(package_name_from_token("pulumi:providers").is_err());
        assert!(package_name_from_token("toomany:a:b:c").is_err());
    }

    #[test]
    fn index_reports_duplicate_aliases() {
        let mut pkg = Package::new("p");
        pkg.resources.push(Arc::new(Resource {
            token: "p:index:A".into(),
            aliases: vec!["p:index:B".into()],
            ..Resource::default()
        }));
        pkg.resources.push(Arc::new(Resource::new("p:index:B")));
        let (_, _, duplicated) = index_package(&pkg);
        assert_eq!(duplicated, vec!["p:index:B".to_string()]);
    }
}
