//! A loader over directories of Pulumi-schema JSON documents.
//!
//! Looks for `<name>-<version>.json`, then `<name>.json`, in each search
//! path in order. Only the subset of the schema format the language server
//! needs is modeled; unknown fields are ignored.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;

use crate::loader::{LoadError, SchemaLoader};
use crate::package::{Function, Package, Resource};
use crate::types::{EnumType, ObjectType, Property, Type};

/// Loads package schemas from JSON files on disk.
#[derive(Debug, Clone)]
pub struct FileSchemaLoader {
    search_paths: Vec<PathBuf>,
}

impl FileSchemaLoader {
    pub fn new(search_paths: Vec<PathBuf>) -> Self {
        Self { search_paths }
    }

    fn find_file(&self, name: &str, version: Option<&str>) -> Option<PathBuf> {
        let mut candidates = Vec::new();
        if let Some(version) = version {
            // Normalize "v5.4.0" and "5.4.0" to one file name.
            let version = version.trim().trim_start_matches('v');
            if semver::Version::parse(version).is_ok() {
                candidates.push(format!("{name}-{version}.json"));
            }
        }
        candidates.push(format!("{name}.json"));
        for dir in &self.search_paths {
            for candidate in &candidates {
                let path = dir.join(candidate);
                if path.is_file() {
                    return Some(path);
                }
            }
        }
        None
    }
}

impl SchemaLoader for FileSchemaLoader {
    fn load_package(&self, name: &str, version: Option<&str>) -> Result<Arc<Package>, LoadError> {
        let path = self
            .find_file(name, version)
            .ok_or_else(|| LoadError::NotFound {
                name: name.to_string(),
            })?;
        let raw = std::fs::read_to_string(&path).map_err(|source| LoadError::Io {
            name: name.to_string(),
            source,
        })?;
        let spec: PackageSpec =
            serde_json::from_str(&raw).map_err(|err| LoadError::Invalid {
                name: name.to_string(),
                message: err.to_string(),
            })?;
        let package = convert_package(spec);
        tracing::info!(package = name, path = %path.display(), "loaded package schema");
        Ok(Arc::new(package))
    }
}

// ============================================================================
// JSON model (the subset of the Pulumi schema format we consume)
// ============================================================================

#[derive(Debug, Deserialize)]
struct PackageSpec {
    name: String,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    resources: BTreeMap<String, ResourceSpec>,
    #[serde(default)]
    functions: BTreeMap<String, FunctionSpec>,
    #[serde(default)]
    types: BTreeMap<String, TypeSpec>,
    #[serde(default)]
    provider: Option<ResourceSpec>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceSpec {
    #[serde(default)]
    description: String,
    #[serde(default)]
    deprecation_message: String,
    #[serde(default)]
    input_properties: BTreeMap<String, PropertySpec>,
    #[serde(default)]
    required_inputs: Vec<String>,
    #[serde(default)]
    properties: BTreeMap<String, PropertySpec>,
    #[serde(default)]
    required: Vec<String>,
    #[serde(default)]
    aliases: Vec<AliasSpec>,
}

#[derive(Debug, Deserialize)]
struct AliasSpec {
    #[serde(rename = "type")]
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FunctionSpec {
    #[serde(default)]
    description: String,
    #[serde(default)]
    deprecation_message: String,
    #[serde(default)]
    inputs: Option<TypeSpec>,
    #[serde(default)]
    outputs: Option<TypeSpec>,
}

/// A named type from the `types` section, or an inline inputs/outputs shape.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TypeSpec {
    #[serde(default)]
    description: String,
    #[serde(default)]
    properties: BTreeMap<String, PropertySpec>,
    #[serde(default)]
    required: Vec<String>,
    #[serde(default, rename = "enum")]
    enum_values: Vec<EnumValueSpec>,
}

#[derive(Debug, Deserialize)]
struct EnumValueSpec {
    value: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PropertySpec {
    #[serde(rename = "type", default)]
    typ: Option<String>,
    #[serde(rename = "$ref", default)]
    reference: Option<String>,
    #[serde(default)]
    items: Option<Box<PropertySpec>>,
    #[serde(default)]
    additional_properties: Option<Box<PropertySpec>>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    deprecation_message: String,
}

// ============================================================================
// Conversion into descriptors
// ============================================================================

struct Converter<'a> {
    types: &'a BTreeMap<String, TypeSpec>,
    memo: HashMap<String, Type>,
    /// Tokens currently being converted; a back-reference to one of these is
    /// a cycle and converts to a shallow object.
    in_progress: Vec<String>,
}

fn convert_package(spec: PackageSpec) -> Package {
    let mut converter = Converter {
        types: &spec.types,
        memo: HashMap::new(),
        in_progress: Vec::new(),
    };
    let mut package = Package::new(spec.name.clone());
    package.version = spec.version;
    package.description = spec.description;
    for (token, resource) in &spec.resources {
        package
            .resources
            .push(Arc::new(converter.resource(token, resource)));
    }
    for (token, function) in &spec.functions {
        package
            .functions
            .push(Arc::new(converter.function(token, function)));
    }
    if let Some(provider) = &spec.provider {
        let token = format!("pulumi:providers:{}", spec.name);
        package.provider = Some(Arc::new(converter.resource(&token, provider)));
    }
    package
}

impl Converter<'_> {
    fn resource(&mut self, token: &str, spec: &ResourceSpec) -> Resource {
        Resource {
            token: token.to_string(),
            comment: spec.description.clone(),
            deprecation_message: spec.deprecation_message.clone(),
            input_properties: self.properties(&spec.input_properties, &spec.required_inputs),
            properties: self.properties(&spec.properties, &spec.required),
            aliases: spec.aliases.iter().filter_map(|a| a.token.clone()).collect(),
        }
    }

    fn function(&mut self, token: &str, spec: &FunctionSpec) -> Function {
        Function {
            token: token.to_string(),
            comment: spec.description.clone(),
            deprecation_message: spec.deprecation_message.clone(),
            inputs: spec.inputs.as_ref().map(|t| self.object_type("", t)),
            outputs: spec.outputs.as_ref().map(|t| self.object_type("", t)),
        }
    }

    fn properties(
        &mut self,
        specs: &BTreeMap<String, PropertySpec>,
        required: &[String],
    ) -> Vec<Property> {
        specs
            .iter()
            .map(|(name, spec)| Property {
                name: name.clone(),
                typ: self.property_type(spec),
                comment: spec.description.clone(),
                deprecation_message: spec.deprecation_message.clone(),
                required: required.iter().any(|r| r == name),
            })
            .collect()
    }

    fn object_type(&mut self, token: &str, spec: &TypeSpec) -> ObjectType {
        ObjectType {
            token: token.to_string(),
            comment: spec.description.clone(),
            properties: self.properties(&spec.properties, &spec.required),
        }
    }

    fn property_type(&mut self, spec: &PropertySpec) -> Type {
        if let Some(reference) = &spec.reference {
            return self.reference_type(reference);
        }
        match spec.typ.as_deref() {
            Some("string") => Type::String,
            Some("integer") => Type::Int,
            Some("number") => Type::Number,
            Some("boolean") => Type::Bool,
            Some("array") => {
                let element = spec
                    .items
                    .as_ref()
                    .map(|i| self.property_type(i))
                    .unwrap_or(Type::Any);
                Type::Array(Arc::new(element))
            }
            Some("object") => {
                let element = spec
                    .additional_properties
                    .as_ref()
                    .map(|p| self.property_type(p))
                    .unwrap_or(Type::Any);
                Type::Map(Arc::new(element))
            }
            _ => Type::Any,
        }
    }

    fn reference_type(&mut self, reference: &str) -> Type {
        match reference {
            "pulumi.json#/Any" => return Type::Any,
            "pulumi.json#/Asset" => return Type::Asset,
            "pulumi.json#/Archive" => return Type::Archive,
            _ => {}
        }
        let Some(token) = reference.strip_prefix("#/types/") else {
            return Type::Any;
        };
        if let Some(cached) = self.memo.get(token) {
            return cached.clone();
        }
        let Some(spec) = self.types.get(token) else {
            return Type::Any;
        };
        if !spec.enum_values.is_empty() {
            let typ = Type::Enum(Arc::new(EnumType {
                token: token.to_string(),
                comment: spec.description.clone(),
                values: spec
                    .enum_values
                    .iter()
                    .map(|v| match &v.value {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect(),
            }));
            self.memo.insert(token.to_string(), typ.clone());
            return typ;
        }
        if self.in_progress.iter().any(|t| t == token) {
            // Recursive type: break the cycle with a shallow object.
            return Type::Object(Arc::new(ObjectType {
                token: token.to_string(),
                comment: spec.description.clone(),
                properties: Vec::new(),
            }));
        }
        self.in_progress.push(token.to_string());
        let object = self.object_type(token, spec);
        self.in_progress.pop();
        let typ = Type::Object(Arc::new(object));
        self.memo.insert(token.to_string(), typ.clone());
        typ
    }
}
