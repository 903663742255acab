//! The schema type graph.
//!
//! Types are immutable and shared with `Arc`, so a loaded package can hand
//! the same graph to every document. Optional and output wrappers are
//! transparent to property access; [`unwrap_type`] strips them.

use std::fmt;
use std::sync::Arc;

use crate::package::Resource;

/// A schema type.
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Bool,
    Int,
    Number,
    String,
    Any,
    Asset,
    Archive,
    /// A list with a single element type.
    Array(Arc<Type>),
    /// A string-keyed map with a single element type.
    Map(Arc<Type>),
    /// A named object type with properties.
    Object(Arc<ObjectType>),
    /// A resource reference; property access sees inputs, outputs and the
    /// synthetic `id`/`urn` fields.
    Resource(Arc<Resource>),
    Enum(Arc<EnumType>),
    Union(Vec<Type>),
    /// A property that may be absent.
    Optional(Arc<Type>),
    /// A value only known after deployment.
    Output(Arc<Type>),
}

/// A named object type.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectType {
    pub token: String,
    pub comment: String,
    pub properties: Vec<Property>,
}

impl ObjectType {
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn property_names(&self) -> Vec<String> {
        self.properties.iter().map(|p| p.name.clone()).collect()
    }
}

/// An enum type; values are kept in their string form for display.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EnumType {
    pub token: String,
    pub comment: String,
    pub values: Vec<String>,
}

/// One property of an object, resource or function signature.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub name: String,
    pub typ: Type,
    pub comment: String,
    pub deprecation_message: String,
    pub required: bool,
}

impl Property {
    pub fn new(name: impl Into<String>, typ: Type) -> Self {
        Self {
            name: name.into(),
            typ,
            comment: String::new(),
            deprecation_message: String::new(),
            required: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    pub fn is_deprecated(&self) -> bool {
        !self.deprecation_message.is_empty()
    }
}

/// Strip optional and output wrappers, which are transparent to property
/// access and display.
pub fn unwrap_type(typ: &Type) -> &Type {
    match typ {
        Type::Optional(inner) | Type::Output(inner) => unwrap_type(inner),
        other => other,
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Bool => write!(f, "boolean"),
            Type::Int => write!(f, "integer"),
            Type::Number => write!(f, "number"),
            Type::String => write!(f, "string"),
            Type::Any => write!(f, "any"),
            Type::Asset => write!(f, "asset"),
            Type::Archive => write!(f, "archive"),
            Type::Array(el) => write!(f, "list<{el}>"),
            Type::Map(el) => write!(f, "map<{el}>"),
            Type::Object(obj) => {
                if obj.token.is_empty() {
                    write!(f, "object")
                } else {
                    write!(f, "{}", obj.token)
                }
            }
            Type::Resource(r) => write!(f, "{}", r.token),
            Type::Enum(e) => write!(f, "enum {}", e.token),
            Type::Union(els) => {
                let parts: Vec<String> = els.iter().map(|t| t.to_string()).collect();
                write!(f, "{}", parts.join(" | "))
            }
            Type::Optional(inner) | Type::Output(inner) => write!(f, "{inner}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwrap_strips_nested_wrappers() {
        let t = Type::Output(Arc::new(Type::Optional(Arc::new(Type::String))));
        assert_eq!(unwrap_type(&t), &Type::String);
    }

    #[test]
    fn display_is_compact() {
        let t = Type::Array(Arc::new(Type::Map(Arc::new(Type::String))));
        assert_eq!(t.to_string(), "list<map<string>>");
    }
}
