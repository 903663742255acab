//! # pulumi-yaml-schema
//!
//! Package schema descriptors for Pulumi YAML analysis.
//!
//! A package schema describes the resources and functions a provider package
//! exposes: their tokens, documentation, deprecations, aliases and
//! input/output property shapes. This crate defines the descriptor types and
//! the type graph property accesses are checked against, the [`SchemaLoader`]
//! seam the analysis engine consumes, and two loaders: a directory-based
//! loader over Pulumi-schema JSON documents and an in-memory loader for
//! tests.

mod file;
mod loader;
mod memory;
mod package;
mod types;

pub use file::FileSchemaLoader;
pub use loader::{LoadError, SchemaLoader};
pub use memory::MemoryLoader;
pub use package::{
    index_package, package_name_from_token, token_module, Function, Package, Resource, TokenError,
};
pub use types::{unwrap_type, EnumType, ObjectType, Property, Type};
