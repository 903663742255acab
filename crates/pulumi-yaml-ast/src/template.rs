//! The template document: configuration, variables, resources, outputs.

use crate::expr::Expr;
use crate::syntax::{Diagnostic, Range};
use crate::yaml::{parse_yaml, YamlNode, YamlValue};

/// A string carrying the range it was parsed from.
#[derive(Debug, Clone, PartialEq)]
pub struct StringWithRange {
    pub value: String,
    pub range: Range,
}

/// A parsed template. Sections keep document order; entries that failed to
/// lower cleanly are still present so analysis can see them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Template {
    pub configuration: Vec<ConfigEntry>,
    pub variables: Vec<VariablesEntry>,
    pub resources: Vec<ResourcesEntry>,
    pub outputs: Vec<OutputEntry>,
}

/// One configuration entry. The body (type/default) is kept as a bound
/// expression; the language treats it as data.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigEntry {
    pub key: StringWithRange,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariablesEntry {
    pub key: StringWithRange,
    pub value: Expr,
}

/// A resources-section entry. `body` is absent when the entry has no value
/// (a dangling key mid-edit); the binder still records a placeholder.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourcesEntry {
    pub key: StringWithRange,
    pub body: Option<ResourceDecl>,
    pub range: Range,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceDecl {
    /// The `type` token. Absent when the resource has no `type` key.
    pub type_token: Option<StringWithRange>,
    pub properties: Vec<PropertyEntry>,
    pub options: ResourceOptions,
    pub range: Range,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyEntry {
    pub key: StringWithRange,
    pub value: Expr,
}

/// Resource options. Only the expression-backed options participate in
/// binding; `version` is kept for schema-version hints.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceOptions {
    pub depends_on: Option<Expr>,
    pub parent: Option<Expr>,
    pub provider: Option<Expr>,
    pub providers: Option<Expr>,
    pub version: Option<StringWithRange>,
    pub range: Option<Range>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputEntry {
    pub key: StringWithRange,
    pub value: Expr,
}

/// Parse a template document.
///
/// Returns the template (absent when the YAML itself is unreadable) plus the
/// syntax diagnostics collected along the way. The filename only decorates
/// log output; ranges identify positions within the document.
pub fn load_template(filename: &str, source: &str) -> (Option<Template>, Vec<Diagnostic>) {
    let _ = filename;
    let (root, mut diags) = parse_yaml(source);
    let Some(root) = root else {
        return (None, diags);
    };
    let Some(entries) = root.as_mapping() else {
        diags.push(Diagnostic::error(
            "Invalid template",
            "a template must be a YAML mapping",
            Some(root.range),
        ));
        return (None, diags);
    };

    let mut template = Template::default();
    for entry in entries {
        let Some(key) = entry.key.as_scalar() else {
            continue;
        };
        match key {
            "configuration" | "config" => {
                for (key, value) in section_entries(&entry.value, key, &mut diags) {
                    template.configuration.push(ConfigEntry {
                        key,
                        value: Expr::from_yaml(value, &mut diags),
                    });
                }
            }
            "variables" => {
                for (key, value) in section_entries(&entry.value, key, &mut diags) {
                    template.variables.push(VariablesEntry {
                        key,
                        value: Expr::from_yaml(value, &mut diags),
                    });
                }
            }
            "resources" => {
                for (key, value) in section_entries(&entry.value, key, &mut diags) {
                    let range = key.range.union(value.range);
                    let body = lower_resource(value, &mut diags);
                    template.resources.push(ResourcesEntry { key, body, range });
                }
            }
            "outputs" => {
                for (key, value) in section_entries(&entry.value, key, &mut diags) {
                    template.outputs.push(OutputEntry {
                        key,
                        value: Expr::from_yaml(value, &mut diags),
                    });
                }
            }
            // name, runtime, description, plugins: project metadata, not
            // analyzed here.
            _ => {}
        }
    }
    (Some(template), diags)
}

fn is_null_scalar(value: &str) -> bool {
    matches!(value, "" | "~" | "null" | "Null" | "NULL")
}

/// Iterate a section mapping's entries, keeping string keys with ranges.
fn section_entries<'a>(
    node: &'a YamlNode,
    section: &str,
    diags: &mut Vec<Diagnostic>,
) -> Vec<(StringWithRange, &'a YamlNode)> {
    match &node.value {
        YamlValue::Mapping(entries) => entries
            .iter()
            .filter_map(|e| {
                let key = e.key.as_scalar()?;
                Some((
                    StringWithRange {
                        value: key.to_string(),
                        range: e.key.range,
                    },
                    &e.value,
                ))
            })
            .collect(),
        YamlValue::Scalar { value, .. } if is_null_scalar(value) => Vec::new(),
        _ => {
            diags.push(Diagnostic::error(
                format!("Invalid '{section}' section"),
                "expected a mapping of names to entries",
                Some(node.range),
            ));
            Vec::new()
        }
    }
}

fn lower_resource(node: &YamlNode, diags: &mut Vec<Diagnostic>) -> Option<ResourceDecl> {
    let entries = match &node.value {
        YamlValue::Mapping(entries) => entries,
        YamlValue::Scalar { value, .. } if is_null_scalar(value) => return None,
        _ => {
            diags.push(Diagnostic::error(
                "Invalid resource",
                "a resource must be a mapping",
                Some(node.range),
            ));
            return None;
        }
    };

    let mut decl = ResourceDecl {
        type_token: None,
        properties: Vec::new(),
        options: ResourceOptions::default(),
        range: node.range,
    };
    for entry in entries {
        let Some(key) = entry.key.as_scalar() else {
            continue;
        };
        match key {
            "type" => {
                decl.type_token = entry.value.as_scalar().map(|s| StringWithRange {
                    value: s.to_string(),
                    range: entry.value.range,
                });
            }
            "properties" => {
                if let YamlValue::Mapping(props) = &entry.value.value {
                    for prop in props {
                        let Some(name) = prop.key.as_scalar() else {
                            continue;
                        };
                        decl.properties.push(PropertyEntry {
                            key: StringWithRange {
                                value: name.to_string(),
                                range: prop.key.range,
                            },
                            value: Expr::from_yaml(&prop.value, diags),
                        });
                    }
                }
            }
            "options" => {
                decl.options.range = Some(entry.value.range);
                if let YamlValue::Mapping(opts) = &entry.value.value {
                    for opt in opts {
                        let Some(name) = opt.key.as_scalar() else {
                            continue;
                        };
                        match name {
                            "dependsOn" => {
                                decl.options.depends_on =
                                    Some(Expr::from_yaml(&opt.value, diags));
                            }
                            "parent" => {
                                decl.options.parent = Some(Expr::from_yaml(&opt.value, diags));
                            }
                            "provider" => {
                                decl.options.provider = Some(Expr::from_yaml(&opt.value, diags));
                            }
                            "providers" => {
                                decl.options.providers =
                                    Some(Expr::from_yaml(&opt.value, diags));
                            }
                            "version" => {
                                decl.options.version =
                                    opt.value.as_scalar().map(|s| StringWithRange {
                                        value: s.to_string(),
                                        range: opt.value.range,
                                    });
                            }
                            // The remaining options are plain data.
                            _ => {}
                        }
                    }
                }
            }
            // defaultProvider and future keys are validated by the binder
            // against the schema, not here.
            _ => {}
        }
    }
    Some(decl)
}
