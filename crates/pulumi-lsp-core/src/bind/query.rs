//! Read-side queries over a bound declaration.

use std::collections::BTreeMap;

use pulumi_yaml_schema::package_name_from_token;

use crate::bind::{Decl, Definition, InvokeBinding, Reference, ResourceBinding, Variable};
use crate::diagnostic::Diagnostic;

impl Decl {
    /// The accumulated diagnostics, in the order they were found.
    pub fn diags(&self) -> &[Diagnostic] {
        &self.diags
    }

    /// The variable table.
    pub fn variables(&self) -> &BTreeMap<String, Variable> {
        &self.variables
    }

    /// Every invoke bound in the document.
    pub fn invokes(&self) -> &[InvokeBinding] {
        &self.invokes
    }

    /// Every reference bound in the document.
    pub fn references(&self) -> impl Iterator<Item = &Reference> {
        self.variables.values().flat_map(|v| v.uses.iter())
    }

    /// All resource bindings whose token matches `token`, including through
    /// the token's aliases. Fails when the token's package is not loaded.
    pub fn get_resources(&self, token: &str, version: Option<&str>) -> Result<Vec<&ResourceBinding>, String> {
        let pkg_name = package_name_from_token(token)
            .map_err(|err| format!("cannot get resources: {err}"))?;
        let key = (pkg_name.clone(), version.unwrap_or("").to_string());
        let entry = self.loaded_packages.get(&key).ok_or_else(|| {
            format!("package '{pkg_name}' is not loaded for query '{token}'")
        })?;

        let mut names = vec![token.to_string()];
        if let Some(spec) = entry.resolve_resource(token) {
            names.push(spec.resource.token.clone());
            names.extend(spec.resource.aliases.iter().cloned());
        }

        Ok(self
            .variables
            .values()
            .filter_map(|v| match &v.definition {
                Some(Definition::Resource(binding)) => binding
                    .token
                    .as_ref()
                    .filter(|t| names.contains(t))
                    .map(|_| binding),
                _ => None,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use crate::testutil::analyze;

    #[test]
    fn get_resources_matches_by_token() {
        let (_, decl) = analyze(
            "resources:\n  my:\n    type: ex:index:Bucket\n    properties:\n      name: x\n",
        );
        let found = decl.get_resources("ex:index:Bucket", None).unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].schema.is_some());
    }

    #[test]
    fn get_resources_requires_a_loaded_package() {
        let (_, decl) = analyze("outputs:\n  o: 1\n");
        assert!(decl.get_resources("ex:index:Bucket", None).is_err());
    }

    #[test]
    fn references_iterates_all_uses() {
        let (_, decl) = analyze("variables:\n  a: 1\noutputs:\n  o: ${a}\n  p: ${pulumi.stack}\n");
        assert_eq!(decl.references().count(), 2);
    }
}
