//! Static analysis of a parsed template.
//!
//! The entry point is [`Decl::new`], which binds an AST template into a
//! variable table, output map and invoke set, accumulating diagnostics as it
//! goes. `schema.rs` later attaches package schemas and checks property
//! accesses; `query.rs` answers questions about the bound result.
//!
//! The variable table allows forward references: a use of a not-yet-defined
//! name allocates an entry holding only uses, upgraded in place when the
//! definition arrives. References point back at their variable by name, not
//! by pointer, so the table stays acyclic.

pub(crate) mod diags;
mod query;
mod schema;

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use pulumi_yaml_ast as ast;
use pulumi_yaml_ast::{Expr, PropertyAccess, PropertyAccessor, StringWithRange, Template};
use pulumi_yaml_schema::{ObjectType, Property, Type};

use crate::cache::{PackageEntry, PkgKey};
use crate::diagnostic::Diagnostic;
use crate::position::{promote_range, Range};

pub use schema::type_from_root;

/// The name of the built-in variable, pre-populated in every document.
pub const BUILTIN_VARIABLE: &str = "pulumi";

/// A bound declaration, shared between the pipeline and query paths.
pub type DeclHandle = Arc<RwLock<Decl>>;

/// Tunable binder behavior.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinderOptions {
    /// Also warn about configuration entries that are never referenced.
    pub warn_unused_config: bool,
}

/// What a name is bound to.
pub enum Definition {
    Config { key: StringWithRange, value: Expr },
    Variable { key: StringWithRange, value: Expr },
    Resource(ResourceBinding),
    /// The `pulumi` built-in, exempt from unused warnings.
    Builtin { typ: Type },
}

impl Definition {
    /// Where the name was defined; the built-in has no source location.
    pub fn range(&self) -> Option<Range> {
        match self {
            Definition::Config { key, .. } | Definition::Variable { key, .. } => {
                Some(promote_range(key.range))
            }
            Definition::Resource(binding) => Some(binding.key_range),
            Definition::Builtin { .. } => None,
        }
    }
}

/// A resources-section entry, with everything schema resolution and queries
/// need promoted into LSP coordinates.
pub struct ResourceBinding {
    pub token: Option<String>,
    pub token_range: Option<Range>,
    pub key_range: Range,
    /// Key through body, for hover.
    pub decl_range: Range,
    pub property_keys: Vec<(String, Range)>,
    /// The `options.version` hint, when present.
    pub version: Option<String>,
    /// Attached by schema resolution.
    pub schema: Option<Arc<pulumi_yaml_schema::Resource>>,
}

/// An `fn::invoke` use site.
pub struct InvokeBinding {
    pub token: String,
    pub token_range: Range,
    pub expr_range: Range,
    pub ret: Option<(String, Range)>,
    pub arg_keys: Vec<(String, Range)>,
    pub args_range: Option<Range>,
    /// Attached by schema resolution.
    pub schema: Option<Arc<pulumi_yaml_schema::Function>>,
}

/// One step of a promoted property path.
#[derive(Debug, Clone, PartialEq)]
pub enum Accessor {
    Name { name: String, range: Range },
    IntIndex { index: i64, range: Range },
    StringIndex { key: String, range: Range },
}

impl Accessor {
    pub fn range(&self) -> Range {
        match self {
            Accessor::Name { range, .. }
            | Accessor::IntIndex { range, .. }
            | Accessor::StringIndex { range, .. } => *range,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Accessor::Name { name, .. } => name.clone(),
            Accessor::IntIndex { index, .. } => format!("[{index}]"),
            Accessor::StringIndex { key, .. } => format!("[\"{key}\"]"),
        }
    }

    fn promote(accessor: &PropertyAccessor) -> Self {
        match accessor {
            PropertyAccessor::Name { name, range } => Accessor::Name {
                name: name.clone(),
                range: promote_range(*range),
            },
            PropertyAccessor::IntIndex { index, range } => Accessor::IntIndex {
                index: *index,
                range: promote_range(*range),
            },
            PropertyAccessor::StringIndex { key, range } => Accessor::StringIndex {
                key: key.clone(),
                range: promote_range(*range),
            },
        }
    }
}

/// One use of a variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    /// The range of the enclosing expression.
    pub location: Range,
    /// Accessors past the root name, each with its own sub-range.
    pub accessors: Vec<Accessor>,
    /// The variable this reference resolves to, by name. Empty when the
    /// access began with an index and no root name exists.
    pub variable: String,
    /// The textual form, for display.
    pub text: String,
}

/// A name in the variable table: a definition, a list of uses, or both.
pub struct Variable {
    pub definition: Option<Definition>,
    pub uses: Vec<Reference>,
}

/// The bound form of a template.
pub struct Decl {
    variables: BTreeMap<String, Variable>,
    outputs: BTreeMap<String, Range>,
    invokes: Vec<InvokeBinding>,
    diags: Vec<Diagnostic>,
    loaded_packages: HashMap<PkgKey, Arc<PackageEntry>>,
    options: BinderOptions,
}

impl Decl {
    /// Bind a template. Never fails: problems become diagnostics.
    pub fn new(template: &Template, options: BinderOptions) -> Decl {
        let mut decl = Decl {
            variables: BTreeMap::new(),
            outputs: BTreeMap::new(),
            invokes: Vec::new(),
            diags: Vec::new(),
            loaded_packages: HashMap::new(),
            options,
        };
        decl.variables.insert(
            BUILTIN_VARIABLE.to_string(),
            Variable {
                definition: Some(Definition::Builtin {
                    typ: builtin_variable_type(),
                }),
                uses: Vec::new(),
            },
        );

        for entry in &template.configuration {
            decl.insert_definition(
                &entry.key.value,
                promote_range(entry.key.range),
                Definition::Config {
                    key: entry.key.clone(),
                    value: entry.value.clone(),
                },
            );
        }
        for entry in &template.variables {
            let inserted = decl.insert_definition(
                &entry.key.value,
                promote_range(entry.key.range),
                Definition::Variable {
                    key: entry.key.clone(),
                    value: entry.value.clone(),
                },
            );
            if inserted {
                decl.bind_expr(&entry.value);
            }
        }
        for entry in &template.resources {
            decl.bind_resource(entry);
        }
        for entry in &template.outputs {
            let key_range = promote_range(entry.key.range);
            if let Some(previous) = decl.outputs.get(&entry.key.value) {
                decl.diags.push(diags::duplicate_source(
                    &entry.key.value,
                    Some(key_range),
                    Some(*previous),
                ));
            } else {
                decl.outputs.insert(entry.key.value.clone(), key_range);
                decl.bind_expr(&entry.value);
            }
        }

        decl.analyze_bindings();
        decl
    }

    /// Enter a definition, diagnosing duplicates and upgrading
    /// forward-reference entries in place. Returns false on a duplicate.
    fn insert_definition(&mut self, name: &str, key_range: Range, def: Definition) -> bool {
        match self.variables.get_mut(name) {
            Some(existing) => {
                if let Some(previous) = &existing.definition {
                    self.diags.push(diags::duplicate_source(
                        name,
                        Some(key_range),
                        previous.range(),
                    ));
                    false
                } else {
                    existing.definition = Some(def);
                    true
                }
            }
            None => {
                self.variables.insert(
                    name.to_string(),
                    Variable {
                        definition: Some(def),
                        uses: Vec::new(),
                    },
                );
                true
            }
        }
    }

    fn bind_resource(&mut self, entry: &ast::ResourcesEntry) {
        let name = &entry.key.value;
        let key_range = promote_range(entry.key.range);
        let decl_range = promote_range(entry.range);

        let mut binding = ResourceBinding {
            token: None,
            token_range: None,
            key_range,
            decl_range,
            property_keys: Vec::new(),
            version: None,
            schema: None,
        };

        match &entry.body {
            None => {
                self.diags
                    .push(diags::missing_resource_body(name, Some(key_range)));
            }
            Some(body) => {
                match &body.type_token {
                    Some(token) => {
                        binding.token = Some(token.value.clone());
                        binding.token_range = Some(promote_range(token.range));
                    }
                    None => {
                        self.diags
                            .push(diags::missing_resource_type(name, Some(key_range)));
                    }
                }
                binding.version = body.options.version.as_ref().map(|v| v.value.clone());

                let mut seen: Vec<&str> = Vec::new();
                for property in &body.properties {
                    let prop_range = promote_range(property.key.range);
                    if seen.contains(&property.key.value.as_str()) {
                        self.diags
                            .push(diags::duplicate_key(&property.key.value, Some(prop_range)));
                    }
                    seen.push(&property.key.value);
                    binding
                        .property_keys
                        .push((property.key.value.clone(), prop_range));
                    self.bind_expr(&property.value);
                }
                for option in [
                    &body.options.depends_on,
                    &body.options.parent,
                    &body.options.provider,
                    &body.options.providers,
                ]
                .into_iter()
                .flatten()
                {
                    self.bind_expr(option);
                }
            }
        }

        self.insert_definition(name, key_range, Definition::Resource(binding));
    }

    fn bind_expr(&mut self, e: &Expr) {
        match e {
            Expr::Null { .. } | Expr::Boolean { .. } | Expr::Number { .. } | Expr::String(_) => {}

            Expr::Interpolate { parts, range } => {
                for part in parts {
                    if let Some(access) = &part.value {
                        self.bind_property_access(access, *range);
                    }
                }
            }
            Expr::Symbol { access, range } => self.bind_property_access(access, *range),

            Expr::List { elements, .. } => {
                for element in elements {
                    self.bind_expr(element);
                }
            }
            Expr::Object { entries, .. } | Expr::AssetArchive { entries, .. } => {
                let mut seen: Vec<&str> = Vec::new();
                for entry in entries {
                    if let Expr::String(key) = &entry.key {
                        if seen.contains(&key.value.as_str()) {
                            self.diags.push(diags::duplicate_key(
                                &key.value,
                                Some(promote_range(key.range)),
                            ));
                        }
                        seen.push(&key.value);
                    }
                    self.bind_expr(&entry.key);
                    self.bind_expr(&entry.value);
                }
            }

            Expr::Invoke(invoke) => self.bind_invoke(invoke),

            Expr::Join { delimiter: a, values: b, .. }
            | Expr::Select { index: a, values: b, .. }
            | Expr::Split { delimiter: a, source: b, .. } => {
                self.bind_expr(a);
                self.bind_expr(b);
            }
            Expr::ToJson { value, .. }
            | Expr::ToBase64 { value, .. }
            | Expr::ReadFile { path: value, .. }
            | Expr::Secret { value, .. }
            | Expr::FileAsset { path: value, .. }
            | Expr::StringAsset { content: value, .. }
            | Expr::RemoteAsset { url: value, .. }
            | Expr::FileArchive { path: value, .. }
            | Expr::RemoteArchive { url: value, .. } => self.bind_expr(value),

            Expr::StackReference(sr) => {
                if let Some(stack) = &sr.stack {
                    self.bind_expr(stack);
                }
                if let Some(output) = &sr.output {
                    self.bind_expr(output);
                }
            }
        }
    }

    fn bind_invoke(&mut self, invoke: &ast::InvokeExpr) {
        if let Some(token) = &invoke.token {
            let mut arg_keys = Vec::new();
            let mut args_range = None;
            if let Some(Expr::Object { entries, range }) = &invoke.args {
                args_range = Some(promote_range(*range));
                for entry in entries {
                    if let Expr::String(key) = &entry.key {
                        arg_keys.push((key.value.clone(), promote_range(key.range)));
                    }
                }
            }
            self.invokes.push(InvokeBinding {
                token: token.value.clone(),
                token_range: promote_range(token.range),
                expr_range: promote_range(invoke.range),
                ret: invoke
                    .ret
                    .as_ref()
                    .map(|r| (r.value.clone(), promote_range(r.range))),
                arg_keys,
                args_range,
                schema: None,
            });
        }
        if let Some(args) = &invoke.args {
            self.bind_expr(args);
        }
        if let Some(options) = &invoke.options {
            self.bind_expr(options);
        }
    }

    fn bind_property_access(&mut self, access: &PropertyAccess, expr_range: ast::Range) {
        if access.accessors.is_empty() {
            self.diags
                .push(diags::empty_property_access(Some(promote_range(access.range))));
            return;
        }
        match &access.accessors[0] {
            PropertyAccessor::Name { name, .. } => {
                let name = name.clone();
                self.new_reference(&name, &access.accessors[1..], expr_range, &access.text);
            }
            _ => {
                self.diags.push(diags::property_starts_with_index(
                    &access.text,
                    Some(promote_range(access.range)),
                ));
                // Still record the use under the empty name so queries can
                // compute an arity for the access.
                self.new_reference("", &access.accessors, expr_range, &access.text);
            }
        }
    }

    fn new_reference(
        &mut self,
        variable: &str,
        accessors: &[PropertyAccessor],
        expr_range: ast::Range,
        text: &str,
    ) {
        let reference = Reference {
            location: promote_range(expr_range),
            accessors: accessors.iter().map(Accessor::promote).collect(),
            variable: variable.to_string(),
            text: text.to_string(),
        };
        self.variables
            .entry(variable.to_string())
            .or_insert_with(|| Variable {
                definition: None,
                uses: Vec::new(),
            })
            .uses
            .push(reference);
    }

    /// The pre-schema analysis pass: missing-variable errors and
    /// unused-variable warnings.
    fn analyze_bindings(&mut self) {
        let mut found = Vec::new();
        for (name, variable) in &self.variables {
            match &variable.definition {
                None => {
                    for reference in &variable.uses {
                        found.push(diags::variable_does_not_exist(name, Some(reference.location)));
                    }
                }
                Some(def) if variable.uses.is_empty() => {
                    let warn = match def {
                        Definition::Variable { .. } => true,
                        Definition::Config { .. } => self.options.warn_unused_config,
                        Definition::Resource(_) | Definition::Builtin { .. } => false,
                    };
                    if warn {
                        found.push(diags::unused_variable(name, def.range()));
                    }
                }
                Some(_) => {}
            }
        }
        self.diags.extend(found);
    }
}

/// The type of the built-in `pulumi` variable.
fn builtin_variable_type() -> Type {
    Type::Object(Arc::new(ObjectType {
        token: BUILTIN_VARIABLE.to_string(),
        comment: "Built-in values of the current deployment.".to_string(),
        properties: vec![
            Property::new("cwd", Type::String)
                .with_comment("The working directory of the deployment."),
            Property::new("project", Type::String).with_comment("The current project name."),
            Property::new("stack", Type::String).with_comment("The current stack name."),
        ],
    }))
}
