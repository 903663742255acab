//! Schema attachment and property-access typing.
//!
//! Runs after binding: loads the packages the document's tokens name (through
//! the process-wide cache), attaches resource/function descriptors, validates
//! property maps against input property lists, and walks every reference's
//! accessor chain against its variable's resolved type.

use std::sync::Arc;

use pulumi_yaml_ast::Expr;
use pulumi_yaml_schema::{package_name_from_token, unwrap_type, Property, Type};

use crate::bind::{diags, Accessor, Decl, Definition};
use crate::cache::SchemaCache;
use crate::diagnostic::Diagnostic;
use crate::position::Range;

impl Decl {
    /// Load and attach schemas, then type-check property accesses. New
    /// diagnostics accumulate on the declaration.
    pub fn load_schema(&mut self, cache: &SchemaCache) {
        self.schematize_invokes(cache);
        self.schematize_resources(cache);
        self.check_property_accesses();
    }

    fn schematize_invokes(&mut self, cache: &SchemaCache) {
        for i in 0..self.invokes.len() {
            let token = self.invokes[i].token.clone();
            let token_range = self.invokes[i].token_range;
            let Some(pkg_name) = self.load_package(cache, &token, None, token_range) else {
                continue;
            };
            let entry = self.loaded_packages[&(pkg_name.clone(), String::new())].clone();
            if let Some(diag) = entry.load_failure(Some(token_range)) {
                self.diags.push(diag);
                continue;
            }
            if !entry.is_valid() {
                continue;
            }
            match entry.resolve_function(&token) {
                Some(spec) => {
                    if let Some(diag) = spec.use_site_diag(Some(token_range)) {
                        self.diags.push(diag);
                    }
                    let function = spec.function.clone();
                    let invoke = &mut self.invokes[i];
                    invoke.schema = Some(function.clone());

                    let arg_keys = self.invokes[i].arg_keys.clone();
                    let fallback = self.invokes[i].args_range.unwrap_or(token_range);
                    self.validate_properties(
                        &arg_keys,
                        function.input_properties(),
                        &function.token,
                        fallback,
                    );

                    if let Some((ret, ret_range)) = self.invokes[i].ret.clone() {
                        if let Some(outputs) = &function.outputs {
                            if outputs.property(&ret).is_none() {
                                let parent = if outputs.token.is_empty() {
                                    function.token.clone()
                                } else {
                                    outputs.token.clone()
                                };
                                self.diags.push(diags::property_does_not_exist(
                                    &ret,
                                    &parent,
                                    outputs.property_names(),
                                    Some(ret_range),
                                ));
                            }
                        }
                    }
                }
                None => {
                    self.diags
                        .push(diags::missing_token(&pkg_name, &token, Some(token_range)));
                }
            }
        }
    }

    fn schematize_resources(&mut self, cache: &SchemaCache) {
        let names: Vec<String> = self.variables.keys().cloned().collect();
        for name in names {
            let Some(variable) = self.variables.get(&name) else {
                continue;
            };
            let Some(Definition::Resource(binding)) = &variable.definition else {
                continue;
            };
            // A resource without a `type` was already diagnosed.
            let Some(token) = binding.token.clone() else {
                continue;
            };
            let token_range = binding.token_range.unwrap_or(binding.key_range);
            let key_range = binding.key_range;
            let version = binding.version.clone();
            let property_keys = binding.property_keys.clone();

            let Some(pkg_name) =
                self.load_package(cache, &token, version.as_deref(), token_range)
            else {
                continue;
            };
            let key = (pkg_name.clone(), version.clone().unwrap_or_default());
            let entry = self.loaded_packages[&key].clone();
            if let Some(diag) = entry.load_failure(Some(token_range)) {
                self.diags.push(diag);
            }
            if !entry.is_valid() {
                continue;
            }
            match entry.resolve_resource(&token) {
                Some(spec) => {
                    if let Some(diag) = spec.use_site_diag(Some(token_range)) {
                        self.diags.push(diag);
                    }
                    let resource = spec.resource.clone();
                    if let Some(Definition::Resource(binding)) = self
                        .variables
                        .get_mut(&name)
                        .and_then(|v| v.definition.as_mut())
                    {
                        binding.schema = Some(resource.clone());
                    }
                    self.validate_properties(
                        &property_keys,
                        &resource.input_properties,
                        &resource.token,
                        key_range,
                    );
                }
                None => {
                    self.diags
                        .push(diags::missing_token(&pkg_name, &token, Some(token_range)));
                }
            }
        }
    }

    /// Load a package into the declaration's package map if necessary.
    /// Returns the package name, or `None` when the token does not parse.
    fn load_package(
        &mut self,
        cache: &SchemaCache,
        token: &str,
        version: Option<&str>,
        err_range: Range,
    ) -> Option<String> {
        let pkg_name = match package_name_from_token(token) {
            Ok(name) => name,
            Err(err) => {
                self.diags
                    .push(diags::unparsable_token(token, &err, Some(err_range)));
                return None;
            }
        };
        let key = (pkg_name.clone(), version.unwrap_or("").to_string());
        if !self.loaded_packages.contains_key(&key) {
            let entry = cache.load(&pkg_name, version);
            self.loaded_packages.insert(key, entry);
        }
        Some(pkg_name)
    }

    /// Check a property map against a schema property list: required
    /// properties must be present, present properties must exist.
    fn validate_properties(
        &mut self,
        existing: &[(String, Range)],
        typed: &[Property],
        parent: &str,
        fallback: Range,
    ) {
        for property in typed {
            if property.required && !existing.iter().any(|(name, _)| name == &property.name) {
                self.diags.push(diags::missing_required_property(
                    &property.name,
                    Some(fallback),
                ));
            }
        }
        let known: Vec<&str> = typed.iter().map(|p| p.name.as_str()).collect();
        for (name, range) in existing {
            if !known.contains(&name.as_str()) {
                self.diags.push(diags::property_does_not_exist(
                    name,
                    parent,
                    known.iter().map(|s| s.to_string()).collect(),
                    Some(*range),
                ));
            }
        }
    }

    /// Walk every reference against its variable's resolved type.
    fn check_property_accesses(&mut self) {
        let mut found = Vec::new();
        for variable in self.variables.values() {
            let Some(def) = &variable.definition else {
                continue;
            };
            let Some(root) = self.resolve_definition_type(def) else {
                continue;
            };
            for reference in &variable.uses {
                if reference.accessors.is_empty() {
                    continue;
                }
                let (_, diag) = type_from_root(&root, &reference.accessors);
                found.extend(diag);
            }
        }
        self.diags.extend(found);
    }

    /// The type a definition's references resolve against. `None` means no
    /// schema is available, which silences access checking.
    pub(crate) fn resolve_definition_type(&self, def: &Definition) -> Option<Type> {
        match def {
            Definition::Builtin { typ } => Some(typ.clone()),
            Definition::Resource(binding) => {
                binding.schema.clone().map(Type::Resource)
            }
            Definition::Variable { value, .. } => self.type_expr(value),
            Definition::Config { value, .. } => config_type(value).or(Some(Type::String)),
        }
    }

    /// Best-effort typing of an expression against the bound schemas.
    pub(crate) fn type_expr(&self, e: &Expr) -> Option<Type> {
        match e {
            Expr::Null { .. } => None,
            Expr::Boolean { .. } => Some(Type::Bool),
            Expr::Number { .. } => Some(Type::Number),
            Expr::String(_) | Expr::Interpolate { .. } => Some(Type::String),

            Expr::Symbol { access, range } => {
                let root = match access.accessors.first()? {
                    pulumi_yaml_ast::PropertyAccessor::Name { name, .. } => name.clone(),
                    _ => return None,
                };
                let variable = self.variables.get(&root)?;
                let typ = self.resolve_definition_type(variable.definition.as_ref()?)?;
                if access.accessors.len() == 1 {
                    return Some(typ);
                }
                let location = crate::position::promote_range(*range);
                let reference = variable.uses.iter().find(|u| u.location == location)?;
                let (types, _) = type_from_root(&typ, &reference.accessors);
                types.last().cloned().flatten()
            }

            Expr::List { elements, .. } => {
                let element = elements
                    .first()
                    .and_then(|e| self.type_expr(e))
                    .unwrap_or(Type::Any);
                Some(Type::Array(Arc::new(element)))
            }
            Expr::Object { .. } => None,

            Expr::Invoke(invoke) => {
                let token = invoke.token.as_ref()?;
                let binding = self.invokes.iter().find(|i| i.token == token.value)?;
                let function = binding.schema.as_ref()?;
                let outputs = function.outputs.as_ref()?;
                match &invoke.ret {
                    Some(ret) => outputs.property(&ret.value).map(|p| p.typ.clone()),
                    None => Some(Type::Object(Arc::new(outputs.clone()))),
                }
            }

            Expr::FileAsset { .. } | Expr::StringAsset { .. } | Expr::RemoteAsset { .. } => {
                Some(Type::Asset)
            }
            Expr::FileArchive { .. }
            | Expr::RemoteArchive { .. }
            | Expr::AssetArchive { .. } => Some(Type::Archive),

            Expr::StackReference(_) => None,

            Expr::Join { .. }
            | Expr::Split { .. }
            | Expr::ToJson { .. }
            | Expr::ToBase64 { .. }
            | Expr::ReadFile { .. } => Some(Type::String),
            Expr::Secret { value, .. } => self.type_expr(value),
            Expr::Select { values, .. } => match self.type_expr(values) {
                Some(Type::Array(element)) => Some((*element).clone()),
                _ => None,
            },
        }
    }
}

/// Resolve a configuration entry's declared type, from its `type` field or
/// its `default` value.
fn config_type(value: &Expr) -> Option<Type> {
    let Expr::Object { entries, .. } = value else {
        return None;
    };
    for entry in entries {
        let Expr::String(key) = &entry.key else {
            continue;
        };
        if key.value == "type" {
            if let Expr::String(name) = &entry.value {
                return match name.value.as_str() {
                    "String" | "string" => Some(Type::String),
                    "Number" | "number" => Some(Type::Number),
                    "Int" | "int" | "integer" => Some(Type::Int),
                    "Boolean" | "boolean" => Some(Type::Bool),
                    "List<String>" | "List<Number>" => Some(Type::Array(Arc::new(Type::String))),
                    _ => None,
                };
            }
        }
    }
    None
}

/// Walk an accessor chain from a root type, returning the type at each step
/// (the root first) and the first error found.
///
/// Pure over the schema snapshot: repeated calls on the same input return the
/// same result. After an error, or once no schema is available, the remaining
/// positions are `None` so callers can still compute an arity.
pub fn type_from_root(
    root: &Type,
    accessors: &[Accessor],
) -> (Vec<Option<Type>>, Option<Diagnostic>) {
    let mut types: Vec<Option<Type>> = Vec::with_capacity(accessors.len() + 1);
    types.push(Some(root.clone()));
    let mut current = Some(root.clone());
    let mut first_diag: Option<Diagnostic> = None;

    for accessor in accessors {
        let Some(cur) = current.take() else {
            types.push(None);
            continue;
        };
        if first_diag.is_some() {
            types.push(None);
            continue;
        }
        let cur = unwrap_type(&cur).clone();
        let loc = Some(accessor.range());
        let outcome: Result<Option<Type>, Diagnostic> = match (&cur, accessor) {
            (Type::Array(element), Accessor::IntIndex { .. }) => Ok(Some((**element).clone())),
            (Type::Array(_), Accessor::Name { .. }) => {
                Err(diags::no_property_access(&cur.to_string(), loc))
            }
            (Type::Array(_), Accessor::StringIndex { .. }) => {
                Err(diags::no_property_index(&cur.to_string(), loc))
            }

            (Type::Map(element), Accessor::Name { .. })
            | (Type::Map(element), Accessor::StringIndex { .. }) => Ok(Some((**element).clone())),
            (Type::Map(_), Accessor::IntIndex { .. }) => {
                Err(diags::no_property_index(&cur.to_string(), loc))
            }

            (Type::Resource(resource), Accessor::Name { name, .. })
            | (Type::Resource(resource), Accessor::StringIndex { key: name, .. }) => {
                match resource.property(name) {
                    Some(property) => Ok(Some(property.typ)),
                    None => Err(diags::property_does_not_exist(
                        name,
                        &resource.token,
                        resource.all_properties().iter().map(|p| p.name.clone()).collect(),
                        loc,
                    )),
                }
            }
            (Type::Resource(_), Accessor::IntIndex { .. }) => {
                Err(diags::no_property_index(&cur.to_string(), loc))
            }

            (Type::Object(object), Accessor::Name { name, .. })
            | (Type::Object(object), Accessor::StringIndex { key: name, .. }) => {
                match object.property(name) {
                    Some(property) => Ok(Some(property.typ.clone())),
                    None => Err(diags::property_does_not_exist(
                        name,
                        if object.token.is_empty() { "object" } else { &object.token },
                        object.property_names(),
                        loc,
                    )),
                }
            }
            (Type::Object(_), Accessor::IntIndex { .. }) => {
                Err(diags::no_property_index(&cur.to_string(), loc))
            }

            (_, Accessor::Name { .. }) => Err(diags::no_property_access(&cur.to_string(), loc)),
            (_, _) => Err(diags::no_property_index(&cur.to_string(), loc)),
        };
        match outcome {
            Ok(next) => {
                current = next.clone();
                types.push(next);
            }
            Err(diag) => {
                first_diag = Some(diag);
                types.push(None);
            }
        }
    }
    (types, first_diag)
}
