//! # pulumi-yaml-ast
//!
//! Source-located AST for Pulumi YAML templates.
//!
//! This crate parses a template document into typed sections
//! (configuration, variables, resources, outputs) whose every node carries a
//! source range. It sits on top of `yaml-rust2`'s event parser: a first pass
//! builds a source-located YAML tree, a second pass lowers that tree into the
//! template AST, scanning string scalars for `${...}` interpolations and
//! parsing property-access chains with per-accessor sub-ranges.
//!
//! Positions are 1-based line/column with byte offsets; downstream layers
//! convert to LSP 0-based positions at the protocol boundary.
//!
//! ## Example
//!
//! ```rust
//! use pulumi_yaml_ast::load_template;
//!
//! let source = "resources:\n  site:\n    type: aws:s3:Bucket\n";
//! let (template, diags) = load_template("Pulumi.yaml", source);
//! assert!(diags.is_empty());
//! assert_eq!(template.unwrap().resources.len(), 1);
//! ```

mod access;
mod expr;
mod syntax;
mod template;
mod yaml;

pub use access::{PropertyAccess, PropertyAccessor};
pub use expr::{
    Expr, InterpolatePart, InvokeExpr, ObjectEntry, StackReferenceExpr, BUILTIN_FUNCTION_NAMES,
};
pub use syntax::{Diagnostic, Pos, Range, Severity};
pub use template::{
    load_template, ConfigEntry, OutputEntry, PropertyEntry, ResourceDecl, ResourceOptions,
    ResourcesEntry, StringWithRange, Template, VariablesEntry,
};
pub use yaml::{parse_yaml, MappingEntry, ScalarStyle, YamlNode, YamlValue};
