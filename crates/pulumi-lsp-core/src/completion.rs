//! The completion engine.
//!
//! Dispatches on cursor context, in order: type-token completion (`type:` /
//! `function:` lines, which rarely parse as YAML while being typed), key
//! completion (driven by the structural walker so it works on broken
//! documents), then reference completion inside `${...}` interpolations.
//!
//! Completion never blocks on the external schema loader: misses peek the
//! cache, kick off a background load, and return nothing; the client's next
//! request finds the entry.

use std::sync::Arc;

use pulumi_yaml_schema::{token_module, unwrap_type, Property, Type};

use crate::analysis::AnalysisPipeline;
use crate::bind::{type_from_root, Accessor, Reference};
use crate::cache::SchemaCache;
use crate::position::Position;
use crate::query::{object_at_point, Object};
use crate::step::StepResult;
use crate::text::Document;
use crate::walker;

/// A transport-agnostic completion item; the LSP layer converts it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionItem {
    pub label: String,
    pub kind: Option<CompletionItemKind>,
    pub detail: Option<String>,
    pub documentation: Option<String>,
    pub insert_text: Option<String>,
    pub filter_text: Option<String>,
    pub sort_text: Option<String>,
    pub commit_characters: Vec<String>,
    pub deprecated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionItemKind {
    Text,
    Value,
    Class,
    Interface,
    Module,
    Function,
    Enum,
    Variable,
    File,
    Field,
    Keyword,
}

/// Everything a completion request needs to see.
pub struct CompletionContext<'a> {
    pub doc: &'a Document,
    pub pipeline: &'a AnalysisPipeline,
    pub cache: &'a Arc<SchemaCache>,
}

/// The session's completion order: type tokens, then keys, then references.
/// The first context that produces items wins.
pub fn completions(ctx: &CompletionContext, pos: Position) -> Vec<CompletionItem> {
    if let Some(items) = complete_type(ctx, pos) {
        return items;
    }
    if let Some(items) = complete_key(ctx, pos) {
        return items;
    }
    if let Ok(Some(Object::Reference { reference, .. })) = object_at_point(ctx.pipeline, pos) {
        if let Some(items) = complete_reference(ctx, &reference) {
            return items;
        }
    }
    Vec::new()
}

// ============================================================================
// Type-token completion
// ============================================================================

/// Complete `type: pkg:mod:Name` and `function: pkg:mod:Name` lines. Works
/// straight off the text buffer: a dangling token is a parse failure.
pub fn complete_type(ctx: &CompletionContext, pos: Position) -> Option<Vec<CompletionItem>> {
    let line = ctx.doc.line(pos.line as usize).ok()?;
    // Past the second field the cursor is no longer in the token.
    if end_of_nth_field(&line, 2) < pos.character as usize {
        return None;
    }
    let trimmed = line.trim();

    let version = || version_hint(ctx.doc, pos);

    for (prefix, functions) in [("type:", false), ("function:", true)] {
        if !trimmed.to_ascii_lowercase().starts_with(prefix) {
            continue;
        }
        let current = trimmed[prefix.len()..].trim_start();
        if current.contains(char::is_whitespace) {
            return None;
        }
        // Pad the insertion with a space when the cursor sits right after
        // the colon (`type:` with nothing typed yet).
        let pad = current.is_empty() && line.trim_start().len() == prefix.len();
        let parts: Vec<&str> = current.split(':').collect();
        return match parts.len() {
            1 => Some(package_completions(ctx.cache, functions, pad)),
            2 => {
                if parts[0] == "pulumi" {
                    return Some(vec![providers_module_item()]);
                }
                let entry = peek_package(ctx, parts[0], version().as_deref())?;
                let package = entry.package.as_ref()?;
                let mut items = module_completions(package, functions);
                items.extend(token_completions(package, "", functions));
                Some(items)
            }
            3 => {
                if parts[0] == "pulumi" {
                    if parts[1] == "providers" {
                        return Some(loaded_package_names(ctx.cache));
                    }
                    return None;
                }
                let entry = peek_package(ctx, parts[0], version().as_deref())?;
                let package = entry.package.as_ref()?;
                Some(token_completions(package, parts[1], functions))
            }
            _ => None,
        };
    }
    None
}

/// The `options.version` sibling, read through the walker.
fn version_hint(doc: &Document, pos: Position) -> Option<String> {
    let siblings = walker::sibling_keys(doc, pos);
    let options = siblings.iter().find(|k| k.key == "options")?;
    let version = walker::nested_key(doc, options.position, &["version"])?;
    let value = walker::value_at_line(doc, version.line)?;
    let value = value.trim().trim_start_matches('v').to_string();
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Peek the cache; on a miss, warm it in the background and give up for
/// this request. Request handlers must not block on the loader.
fn peek_package(
    ctx: &CompletionContext,
    name: &str,
    version: Option<&str>,
) -> Option<Arc<crate::cache::PackageEntry>> {
    match ctx.cache.peek(name, version) {
        Some(entry) => Some(entry),
        None => {
            ctx.cache.ensure_background(name, version);
            None
        }
    }
}

fn package_completions(cache: &SchemaCache, functions: bool, pad: bool) -> Vec<CompletionItem> {
    let mut items = Vec::new();
    for ((name, _), entry) in cache.loaded() {
        let Some(package) = &entry.package else {
            continue;
        };
        let populated = if functions {
            !package.functions.is_empty()
        } else {
            !package.resources.is_empty()
        };
        if !populated {
            continue;
        }
        let insert = if pad {
            format!(" {name}:")
        } else {
            format!("{name}:")
        };
        items.push(CompletionItem {
            label: name.clone(),
            kind: Some(CompletionItemKind::Module),
            documentation: Some(package.description.clone()),
            insert_text: Some(insert),
            filter_text: Some(name.clone()),
            commit_characters: vec![":".to_string()],
            ..CompletionItem::default()
        });
    }
    if !functions {
        // The special `pulumi` package, whose only module is `providers`.
        items.push(CompletionItem {
            label: "pulumi".to_string(),
            kind: Some(CompletionItemKind::Module),
            insert_text: Some(if pad { " pulumi:" } else { "pulumi:" }.to_string()),
            commit_characters: vec![":".to_string()],
            ..CompletionItem::default()
        });
    }
    items
}

fn providers_module_item() -> CompletionItem {
    CompletionItem {
        label: "providers".to_string(),
        kind: Some(CompletionItemKind::Module),
        filter_text: Some("pulumi:providers".to_string()),
        insert_text: Some("providers:".to_string()),
        commit_characters: vec![":".to_string()],
        ..CompletionItem::default()
    }
}

/// The names of every package the cache has seen, valid or not: the
/// `pulumi:providers:` namespace completes to loaded packages.
fn loaded_package_names(cache: &SchemaCache) -> Vec<CompletionItem> {
    let mut names: Vec<String> = cache.loaded().into_iter().map(|((name, _), _)| name).collect();
    names.dedup();
    names
        .into_iter()
        .map(|name| CompletionItem {
            label: name.clone(),
            kind: Some(CompletionItemKind::Module),
            filter_text: Some(format!("pulumi:providers:{name}")),
            insert_text: Some(name),
            ..CompletionItem::default()
        })
        .collect()
}

fn module_completions(package: &pulumi_yaml_schema::Package, functions: bool) -> Vec<CompletionItem> {
    let tokens: Vec<&str> = if functions {
        package.functions.iter().map(|f| f.token.as_str()).collect()
    } else {
        package.resources.iter().map(|r| r.token.as_str()).collect()
    };
    let mut modules: Vec<String> = Vec::new();
    for token in tokens {
        if let Some(module) = token_module(token) {
            if !modules.contains(&module) {
                modules.push(module);
            }
        }
    }
    modules
        .into_iter()
        .filter(|module| module != "index")
        .map(|module| CompletionItem {
            label: module.clone(),
            kind: Some(CompletionItemKind::Module),
            filter_text: Some(format!("{}:{module}", package.name)),
            insert_text: Some(format!("{module}:")),
            commit_characters: vec![":".to_string()],
            ..CompletionItem::default()
        })
        .collect()
}

/// Resources or functions of a package whose module matches `mod_hint`.
/// An empty hint means the `index` module exactly; otherwise the hint is a
/// weak prefix filter.
fn token_completions(
    package: &pulumi_yaml_schema::Package,
    mod_hint: &str,
    functions: bool,
) -> Vec<CompletionItem> {
    let kind = if functions {
        CompletionItemKind::Function
    } else {
        CompletionItemKind::Class
    };
    let tokens: Vec<(String, bool)> = if functions {
        package
            .functions
            .iter()
            .map(|f| (f.token.clone(), f.is_deprecated()))
            .collect()
    } else {
        package
            .resources
            .iter()
            .map(|r| (r.token.clone(), r.is_deprecated()))
            .collect()
    };

    let mut items = Vec::new();
    for (token, deprecated) in tokens {
        let Some(module) = token_module(&token) else {
            continue;
        };
        let matches = if mod_hint.is_empty() {
            module == "index"
        } else {
            module == mod_hint || module.starts_with(mod_hint)
        };
        if !matches {
            continue;
        }
        let name = token.rsplit(':').next().unwrap_or(&token).to_string();
        items.push(CompletionItem {
            label: name.clone(),
            kind: Some(kind),
            filter_text: Some(token),
            insert_text: Some(name),
            deprecated,
            ..CompletionItem::default()
        });
    }
    items
}

// ============================================================================
// Key completion
// ============================================================================

/// Complete a key at the start of a line, choosing the candidate set from
/// the chain of enclosing keys.
pub fn complete_key(ctx: &CompletionContext, pos: Position) -> Option<Vec<CompletionItem>> {
    let line = ctx.doc.line(pos.line as usize).ok()?;
    // Past the first field the cursor is in value position.
    if end_of_nth_field(&line, 1) < pos.character as usize {
        return None;
    }

    let parents = walker::parent_keys(ctx.doc, pos);
    let post = PostFix::infer(ctx.doc, &parents, pos);

    let matches_path = |path: &[&str]| -> bool {
        parents.len() >= path.len()
            && path
                .iter()
                .rev()
                .zip(parents.iter())
                .all(|(segment, parent)| parent.key.eq_ignore_ascii_case(segment))
    };

    if parents.is_empty() {
        return Some(top_level_key_completions(ctx.doc, &post));
    }

    let lowered: Vec<String> = parents.iter().map(|p| p.key.to_ascii_lowercase()).collect();

    if parents.len() == 3 && lowered[0] == "options" && lowered[2] == "resources" {
        return Some(resource_option_completions(ctx.doc, parents[0].position, &post));
    }
    if parents.len() == 2 && lowered[1] == "resources" {
        return Some(resource_key_completions(ctx.doc, parents[0].position, &post));
    }
    if parents.len() == 3 && lowered[0] == "properties" && lowered[2] == "resources" {
        return resource_property_completions(ctx, parents[0].position, &post);
    }
    if matches_path(&["fn::invoke", "arguments"]) {
        return invoke_argument_completions(ctx, parents[1].position, parents[0].position, &post);
    }
    if matches_path(&["fn::invoke", "options"]) {
        return Some(provided_completions(
            ctx.doc,
            parents[0].position,
            parents.len() + 1,
            &post,
            &[
                ("parent", "resource", "The parent resource of this invoke.", Shape::Scalar),
                ("provider", "provider", "The explicit provider for this invoke.", Shape::Scalar),
                ("version", "string", "The provider version to use for this invoke.", Shape::Scalar),
                (
                    "pluginDownloadURL",
                    "string",
                    "The provider plugin download URL to use for this invoke.",
                    Shape::Scalar,
                ),
            ],
        ));
    }
    if matches_path(&["fn::invoke"]) {
        return Some(provided_completions(
            ctx.doc,
            parents[0].position,
            parents.len() + 1,
            &post,
            &[
                ("function", "string", "The name of the function to invoke.", Shape::Scalar),
                ("arguments", "map<string, any>", "The arguments to the function.", Shape::Object),
                ("return", "string", "An index into the return value.", Shape::Scalar),
                ("options", "invokeOptions", "Options to control the invoke.", Shape::Object),
            ],
        ));
    }

    let trimmed = line.trim().to_ascii_lowercase();
    if parents.len() >= 2 && trimmed.starts_with("fn::") {
        return complete_fn_shorthand(ctx, &trimmed, parents.len() + 1, &post);
    }
    None
}

/// How a key's value is laid out, which selects the insertion snippet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Scalar,
    Object,
    List,
}

/// Indentation-aware insertion suffixes: scalar keys stay on the line,
/// object keys open an indented block, list keys open a block with a dash.
#[derive(Debug, Clone, Copy)]
struct PostFix {
    indentation: usize,
}

impl PostFix {
    /// Infer the indentation unit from the enclosing block, defaulting to
    /// two spaces.
    fn infer(doc: &Document, parents: &[walker::KeyPos], pos: Position) -> PostFix {
        let mut indents: Vec<usize> = parents.iter().map(|p| p.position.character as usize).collect();
        if let Ok(line) = doc.line(pos.line as usize) {
            let (ind, blank) = walker::indentation_level(&line);
            if !blank {
                indents.insert(0, ind);
            }
        }
        let unit = indents
            .windows(2)
            .map(|w| w[0].saturating_sub(w[1]))
            .find(|d| *d > 0)
            .unwrap_or(2);
        PostFix { indentation: unit }
    }

    fn apply(&self, shape: Shape, level: usize) -> String {
        match shape {
            Shape::Scalar => ": ".to_string(),
            Shape::Object => format!(":\n{}", " ".repeat(self.indentation * level)),
            Shape::List => format!(":\n{}- ", " ".repeat(self.indentation * level)),
        }
    }
}

/// Build completions from a fixed option list, excluding keys that already
/// exist under `key_pos` (case-insensitive).
fn provided_completions(
    doc: &Document,
    key_pos: Position,
    indent_level: usize,
    post: &PostFix,
    options: &[(&str, &str, &str, Shape)],
) -> Vec<CompletionItem> {
    let existing: Vec<String> = walker::child_keys(doc, key_pos)
        .into_iter()
        .map(|k| k.key.to_ascii_lowercase())
        .collect();
    options
        .iter()
        .filter(|(label, ..)| !existing.contains(&label.to_ascii_lowercase()))
        .map(|(label, typ, doc_text, shape)| CompletionItem {
            label: label.to_string(),
            detail: Some(typ.to_string()),
            documentation: Some(doc_text.to_string()),
            insert_text: Some(format!("{label}{}", post.apply(*shape, indent_level))),
            ..CompletionItem::default()
        })
        .collect()
}

fn top_level_key_completions(doc: &Document, post: &PostFix) -> Vec<CompletionItem> {
    let existing: Vec<String> = walker::top_level_keys(doc)
        .into_iter()
        .map(|k| k.key.to_ascii_lowercase())
        .collect();
    let options: &[(&str, &str, Shape)] = &[
        ("configuration", "Configuration values used in Pulumi YAML", Shape::Object),
        ("resources", "A map of Pulumi resources", Shape::Object),
        ("outputs", "A map of outputs", Shape::Object),
        ("variables", "A map of variable names to their values", Shape::Object),
        ("name", "The name of your project", Shape::Scalar),
        ("runtime", "The runtime of your project", Shape::Scalar),
        ("description", "The description of your project", Shape::Scalar),
        ("plugins", "Specify what plugins you use. Intended for package authors", Shape::Object),
    ];
    options
        .iter()
        .filter(|(label, ..)| !existing.contains(&label.to_string()))
        .map(|(label, detail, shape)| CompletionItem {
            label: label.to_string(),
            detail: Some(detail.to_string()),
            insert_text: Some(format!("{label}{}", post.apply(*shape, 1))),
            ..CompletionItem::default()
        })
        .collect()
}

fn resource_option_completions(
    doc: &Document,
    key_pos: Position,
    post: &PostFix,
) -> Vec<CompletionItem> {
    provided_completions(
        doc,
        key_pos,
        4,
        post,
        &[
            (
                "additionalSecretOutputs",
                "list<string>",
                "Specifies properties that must be encrypted as secrets.",
                Shape::List,
            ),
            (
                "aliases",
                "list<string>",
                "Specifies names that this resource used to have, so that renaming or refactoring doesn't replace it.",
                Shape::List,
            ),
            (
                "customTimeouts",
                "customTimeout",
                "Overrides the default retry/timeout behavior for resource provisioning.",
                Shape::Object,
            ),
            (
                "deleteBeforeReplace",
                "boolean",
                "Overrides the default create-before-delete behavior when replacing.",
                Shape::Scalar,
            ),
            (
                "dependsOn",
                "list<expression>",
                "Makes this resource explicitly depend on another resource, by name, so that it won't \
                 be created before the dependent finishes being created (and the reverse for destruction). \
                 Normally dependencies are tracked implicitly through inputs and outputs.",
                Shape::List,
            ),
            (
                "ignoreChanges",
                "list<string>",
                "Declares that changes to certain properties should be ignored during diffing.",
                Shape::List,
            ),
            (
                "import",
                "string",
                "Adopts an existing resource from your cloud account under the control of Pulumi.",
                Shape::Scalar,
            ),
            ("parent", "resource", "Specifies a parent for the resource.", Shape::Scalar),
            (
                "protect",
                "boolean",
                "Prevents accidental deletion of a resource.",
                Shape::Scalar,
            ),
            (
                "provider",
                "provider resource",
                "Specifies an explicitly configured provider, instead of the default global provider.",
                Shape::Scalar,
            ),
            (
                "providers",
                "map<provider resource>",
                "A map of providers for a resource and its children.",
                Shape::Object,
            ),
            (
                "version",
                "string",
                "Specifies a provider plugin version to use when operating on a resource.",
                Shape::Scalar,
            ),
        ],
    )
}

fn resource_key_completions(doc: &Document, key_pos: Position, post: &PostFix) -> Vec<CompletionItem> {
    let children = walker::child_keys(doc, key_pos);
    let existing: Vec<String> = children.iter().map(|k| k.key.to_ascii_lowercase()).collect();

    let mut items = Vec::new();
    let mut add = |label: &str, detail: &str, shape: Shape| {
        if existing.contains(&label.to_ascii_lowercase()) {
            return;
        }
        items.push(CompletionItem {
            label: label.to_string(),
            detail: Some(detail.to_string()),
            insert_text: Some(format!("{label}{}", post.apply(shape, 3))),
            ..CompletionItem::default()
        });
    };

    // `defaultProvider` only applies to provider resources; suggest it when
    // the type is a provider token or not yet written.
    let is_provider = children
        .iter()
        .find(|k| k.key.eq_ignore_ascii_case("type"))
        .and_then(|k| walker::token_at_line(doc, k.position.line))
        .map(|token| token.starts_with("pulumi:providers:"));
    if is_provider.unwrap_or(true) {
        add(
            "defaultProvider",
            "Whether this provider should be the default for its package.",
            Shape::Scalar,
        );
    }
    add("properties", "A map of resource properties.", Shape::Object);
    add("type", "The Pulumi type token for this resource.", Shape::Scalar);
    add("options", "A map of resource options.", Shape::Object);
    items
}

/// Property-key completion for a resource, driven by the resolved schema.
fn resource_property_completions(
    ctx: &CompletionContext,
    properties_pos: Position,
    post: &PostFix,
) -> Option<Vec<CompletionItem>> {
    let siblings = walker::sibling_keys(ctx.doc, properties_pos);
    let type_key = siblings.iter().find(|k| k.key.eq_ignore_ascii_case("type"))?;
    let token = walker::token_at_line(ctx.doc, type_key.position.line)?;

    let version = siblings
        .iter()
        .find(|k| k.key.eq_ignore_ascii_case("options"))
        .and_then(|options| walker::nested_key(ctx.doc, options.position, &["version"]))
        .and_then(|v| walker::value_at_line(ctx.doc, v.line))
        .filter(|v| !v.is_empty());

    let pkg_name = pulumi_yaml_schema::package_name_from_token(&token).ok()?;
    let entry = peek_package(ctx, &pkg_name, version.as_deref())?;
    let resource = entry.resolve_resource(&token)?.resource.clone();

    let existing: Vec<String> = walker::child_keys(ctx.doc, properties_pos)
        .into_iter()
        .map(|k| k.key)
        .collect();
    Some(property_completions(
        &resource.input_properties,
        &existing,
        post,
        4,
    ))
}

/// Argument-key completion for `fn::invoke`, driven by the function schema.
fn invoke_argument_completions(
    ctx: &CompletionContext,
    invoke_pos: Position,
    arguments_pos: Position,
    post: &PostFix,
) -> Option<Vec<CompletionItem>> {
    let keys = walker::child_keys(ctx.doc, invoke_pos);
    let function_key = keys.iter().find(|k| k.key.eq_ignore_ascii_case("function"))?;
    let token = walker::token_at_line(ctx.doc, function_key.position.line)?;

    let version = keys
        .iter()
        .find(|k| k.key.eq_ignore_ascii_case("options"))
        .and_then(|options| walker::nested_key(ctx.doc, options.position, &["version"]))
        .and_then(|v| walker::value_at_line(ctx.doc, v.line))
        .filter(|v| !v.is_empty());

    let pkg_name = pulumi_yaml_schema::package_name_from_token(&token).ok()?;
    let entry = peek_package(ctx, &pkg_name, version.as_deref())?;
    let function = entry.resolve_function(&token)?.function.clone();

    let existing: Vec<String> = walker::child_keys(ctx.doc, arguments_pos)
        .into_iter()
        .map(|k| k.key)
        .collect();
    Some(property_completions(
        function.input_properties(),
        &existing,
        post,
        5,
    ))
}

/// Completions for a schema property list, excluding existing keys, with
/// insertion shapes chosen by each property's type.
fn property_completions(
    properties: &[Property],
    existing: &[String],
    post: &PostFix,
    indent_level: usize,
) -> Vec<CompletionItem> {
    let existing: Vec<String> = existing.iter().map(|e| e.to_ascii_lowercase()).collect();
    properties
        .iter()
        .filter(|p| !existing.contains(&p.name.to_ascii_lowercase()))
        .map(|p| {
            let shape = match unwrap_type(&p.typ) {
                Type::Array(_) => Shape::List,
                Type::Map(_) | Type::Object(_) => Shape::Object,
                _ => Shape::Scalar,
            };
            let mut item = completion_item_from_type(&p.typ);
            item.label = p.name.clone();
            item.insert_text = Some(format!("{}{}", p.name, post.apply(shape, indent_level)));
            item.filter_text = Some(p.name.clone());
            item.deprecated = p.is_deprecated();
            if item.documentation.is_none() && !p.comment.is_empty() {
                item.documentation = Some(p.comment.clone());
            }
            item
        })
        .collect()
}

// ============================================================================
// `fn::` shorthand completion
// ============================================================================

const FN_PREFIX: &str = "fn::";

/// The builtin functions, their docs and their insertion shapes.
fn builtin_functions() -> &'static [(&'static str, &'static str, Shape)] {
    &[
        ("join", "Join a list of strings together.", Shape::List),
        ("split", "Split a string into a list.", Shape::List),
        ("toJSON", "Encode a value into a string as JSON.", Shape::List),
        ("select", "Select an element from a list by index.", Shape::List),
        ("toBase64", "Encode a string with base64.", Shape::List),
        ("fileAsset", "Create an asset from a file path.", Shape::Scalar),
        ("stringAsset", "Create an asset from a string.", Shape::Scalar),
        ("remoteAsset", "Create an asset from a remote URL.", Shape::Scalar),
        ("fileArchive", "Create an archive from a file path.", Shape::Scalar),
        ("remoteArchive", "Create an archive from a remote URL.", Shape::Scalar),
        ("assetArchive", "Create an archive from a map of assets or archives.", Shape::Object),
        ("secret", "Make a value secret.", Shape::Scalar),
        ("readFile", "Read a file into a string.", Shape::Scalar),
    ]
}

/// Complete `fn::` into a builtin function or a package-qualified invoke.
fn complete_fn_shorthand(
    ctx: &CompletionContext,
    line: &str,
    indent_level: usize,
    post: &PostFix,
) -> Option<Vec<CompletionItem>> {
    let current = line.strip_prefix(FN_PREFIX)?;
    let parts: Vec<&str> = current.split(':').collect();
    match parts.len() {
        1 => {
            let mut items: Vec<CompletionItem> = builtin_functions()
                .iter()
                .map(|(label, doc, shape)| CompletionItem {
                    label: label.to_string(),
                    kind: Some(CompletionItemKind::Function),
                    documentation: Some(doc.to_string()),
                    insert_text: Some(format!(
                        "{FN_PREFIX}{label}{}",
                        post.apply(*shape, indent_level)
                    )),
                    filter_text: Some(format!("{FN_PREFIX}{label}")),
                    sort_text: Some(format!("2{label}")),
                    commit_characters: vec![":".to_string()],
                    ..CompletionItem::default()
                })
                .collect();
            for ((name, _), entry) in ctx.cache.loaded() {
                let Some(package) = &entry.package else { continue };
                if package.functions.is_empty() {
                    continue;
                }
                items.push(CompletionItem {
                    label: name.clone(),
                    kind: Some(CompletionItemKind::Module),
                    documentation: Some(package.description.clone()),
                    insert_text: Some(format!("{name}:")),
                    filter_text: Some(format!("{FN_PREFIX}{name}")),
                    sort_text: Some(format!("1{name}")),
                    commit_characters: vec![":".to_string()],
                    ..CompletionItem::default()
                });
            }
            Some(items)
        }
        2 => {
            // A builtin with a colon after it has no further completions.
            if builtin_functions()
                .iter()
                .any(|(label, ..)| label.eq_ignore_ascii_case(parts[0]))
            {
                return None;
            }
            let entry = peek_package(ctx, parts[0], None)?;
            let package = entry.package.as_ref()?;
            let mut seen_modules: Vec<String> = Vec::new();
            let mut items = Vec::new();
            for function in &package.functions {
                let Some(module) = token_module(&function.token) else { continue };
                let name = function.token.rsplit(':').next().unwrap_or_default().to_string();
                if module == "index" {
                    // Top-level invokes complete directly.
                    let label = format!("{}:{name}", package.name);
                    let sort = if function.is_deprecated() { "9" } else { "1" };
                    items.push(CompletionItem {
                        label: label.clone(),
                        kind: Some(CompletionItemKind::Function),
                        detail: Some(function.comment.clone()),
                        insert_text: Some(format!(
                            "{name}{}",
                            post.apply(Shape::Object, indent_level)
                        )),
                        sort_text: Some(format!("{sort}{label}")),
                        deprecated: function.is_deprecated(),
                        ..CompletionItem::default()
                    });
                } else if !seen_modules.contains(&module) {
                    seen_modules.push(module.clone());
                    let full = format!("{}:{module}", package.name);
                    items.push(CompletionItem {
                        label: full.clone(),
                        kind: Some(CompletionItemKind::Module),
                        insert_text: Some(format!("{module}:")),
                        sort_text: Some(format!("2{module}")),
                        commit_characters: vec![":".to_string()],
                        ..CompletionItem::default()
                    });
                }
            }
            Some(items)
        }
        3 => {
            let entry = peek_package(ctx, parts[0], None)?;
            let package = entry.package.as_ref()?;
            let mut items = Vec::new();
            for function in &package.functions {
                let Some(module) = token_module(&function.token) else { continue };
                if !module.eq_ignore_ascii_case(parts[1]) {
                    continue;
                }
                let name = function.token.rsplit(':').next().unwrap_or_default().to_string();
                let token = format!("{}:{module}:{name}", package.name);
                let sort = if function.is_deprecated() { "9" } else { "1" };
                items.push(CompletionItem {
                    label: token.clone(),
                    kind: Some(CompletionItemKind::Function),
                    detail: Some(function.comment.clone()),
                    insert_text: Some(format!("{name}{}", post.apply(Shape::Object, indent_level))),
                    sort_text: Some(format!("{sort}{token}")),
                    deprecated: function.is_deprecated(),
                    commit_characters: vec![":".to_string()],
                    ..CompletionItem::default()
                });
            }
            Some(items)
        }
        _ => None,
    }
}

// ============================================================================
// Reference completion
// ============================================================================

/// Complete inside a `${...}` interpolation: all variables at the root,
/// a type's properties past an accessor chain.
pub fn complete_reference(ctx: &CompletionContext, reference: &Reference) -> Option<Vec<CompletionItem>> {
    let decl = match ctx.pipeline.bound().try_get() {
        StepResult::Ready(decl) => decl,
        _ => return None,
    };
    let decl = decl.read().unwrap_or_else(|poisoned| poisoned.into_inner());

    let mut accessors = reference.accessors.clone();
    // A trailing `.` parses as an empty name segment; completion targets
    // the type before it.
    let trailing_dot = matches!(accessors.last(), Some(Accessor::Name { name, .. }) if name.is_empty());
    if trailing_dot {
        accessors.pop();
    }

    if accessors.is_empty() && !trailing_dot && !reference.text.ends_with('.') {
        // Root position: offer every bound variable.
        let items = decl
            .variables()
            .iter()
            .map(|(name, variable)| {
                let typ = variable
                    .definition
                    .as_ref()
                    .and_then(|def| decl.resolve_definition_type(def));
                let mut item = match &typ {
                    Some(t) => completion_item_from_type(t),
                    None => CompletionItem::default(),
                };
                item.label = name.clone();
                item.insert_text = Some(name.clone());
                item.commit_characters = vec![".".to_string()];
                item
            })
            .collect();
        return Some(items);
    }

    let variable = decl.variables().get(&reference.variable)?;
    let root = decl.resolve_definition_type(variable.definition.as_ref()?)?;
    let (types, _) = type_from_root(&root, &accessors);
    let last = types.last().cloned().flatten()?;
    type_property_completion(&last)
}

/// The properties of a type, for reference completion.
fn type_property_completion(typ: &Type) -> Option<Vec<CompletionItem>> {
    let properties: Vec<Property> = match unwrap_type(typ) {
        Type::Resource(resource) => resource.all_properties(),
        Type::Object(object) => object.properties.clone(),
        _ => return None,
    };
    Some(
        properties
            .iter()
            .map(|p| {
                let mut item = completion_item_from_type(&p.typ);
                item.label = p.name.clone();
                item.insert_text = Some(p.name.clone());
                item.filter_text = Some(p.name.clone());
                item.deprecated = p.is_deprecated();
                item.commit_characters = vec![".".to_string(), "[".to_string()];
                item
            })
            .collect(),
    )
}

/// Derive an item's kind and detail from a schema type.
fn completion_item_from_type(typ: &Type) -> CompletionItem {
    let typ = unwrap_type(typ);
    let (kind, detail) = match typ {
        Type::String => (CompletionItemKind::Text, "string".to_string()),
        Type::Bool => (CompletionItemKind::Value, "boolean".to_string()),
        Type::Int | Type::Number => (CompletionItemKind::Value, "number".to_string()),
        Type::Any => (CompletionItemKind::Value, "any".to_string()),
        Type::Asset => (CompletionItemKind::File, "asset".to_string()),
        Type::Archive => (CompletionItemKind::File, "archive".to_string()),
        Type::Array(_) | Type::Map(_) => (CompletionItemKind::Variable, typ.to_string()),
        Type::Resource(r) => {
            let mut item = CompletionItem {
                kind: Some(CompletionItemKind::Class),
                detail: Some(format!("resource {}", r.token)),
                ..CompletionItem::default()
            };
            if !r.comment.is_empty() {
                item.documentation = Some(r.comment.clone());
            }
            return item;
        }
        Type::Object(o) => {
            let mut item = CompletionItem {
                kind: Some(CompletionItemKind::Interface),
                detail: Some(format!("object {}", o.token)),
                ..CompletionItem::default()
            };
            if !o.comment.is_empty() {
                item.documentation = Some(o.comment.clone());
            }
            return item;
        }
        Type::Enum(e) => (CompletionItemKind::Enum, format!("enum {}", e.token)),
        Type::Union(_) => (CompletionItemKind::Value, typ.to_string()),
        Type::Optional(_) | Type::Output(_) => unreachable!("unwrapped above"),
    };
    CompletionItem {
        kind: Some(kind),
        detail: Some(detail),
        ..CompletionItem::default()
    }
}

/// The character index just past the `n`th whitespace-separated field of
/// `line`; `usize::MAX` when the line has fewer fields.
fn end_of_nth_field(line: &str, n: usize) -> usize {
    let mut fields_seen = 0;
    let mut in_field = false;
    for (i, c) in line.char_indices() {
        if c.is_whitespace() {
            if in_field {
                in_field = false;
                if fields_seen == n {
                    return i;
                }
            }
        } else if !in_field {
            in_field = true;
            fields_seen += 1;
        }
    }
    if in_field && fields_seen == n {
        return line.len();
    }
    usize::MAX
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{ex_cache_arc, ready_pipeline};
    use crate::text::Document;

    fn labels(items: &[CompletionItem]) -> Vec<String> {
        let mut labels: Vec<String> = items.iter().map(|i| i.label.clone()).collect();
        labels.sort();
        labels
    }

    struct Fixture {
        doc: Document,
        pipeline: crate::analysis::AnalysisPipeline,
        cache: Arc<SchemaCache>,
    }

    impl Fixture {
        fn new(source: &str) -> Fixture {
            let cache = ex_cache_arc();
            // Key/type completion sees packages the analysis already pulled
            // into the cache.
            cache.load("ex", None);
            Fixture {
                doc: Document::new("file:///test.yaml", "yaml", source, 1),
                pipeline: ready_pipeline(source),
                cache,
            }
        }

        fn ctx(&self) -> CompletionContext<'_> {
            CompletionContext {
                doc: &self.doc,
                pipeline: &self.pipeline,
                cache: &self.cache,
            }
        }
    }

    #[test]
    fn end_of_nth_field_counts_words() {
        assert_eq!(end_of_nth_field("  type: eks", 1), 7);
        assert_eq!(end_of_nth_field("  type: eks", 2), 11);
        assert_eq!(end_of_nth_field("type:", 2), usize::MAX);
    }

    #[test]
    fn type_completion_offers_packages() {
        let f = Fixture::new("resources:\n  my:\n    type: \n");
        let items = complete_type(&f.ctx(), Position::new(2, 10)).unwrap();
        let labels = labels(&items);
        assert!(labels.contains(&"ex".to_string()));
        assert!(labels.contains(&"pulumi".to_string()));
    }

    #[test]
    fn type_completion_offers_resources_in_a_package() {
        let f = Fixture::new("resources:\n  my:\n    type: ex:\n");
        let items = complete_type(&f.ctx(), Position::new(2, 13)).unwrap();
        // `ex` has only `ex:index:Bucket`; the index module completes
        // directly.
        assert!(labels(&items).contains(&"Bucket".to_string()));
    }

    #[test]
    fn type_completion_expands_provider_namespace() {
        let f = Fixture::new("resources:\n  my:\n    type: pulumi:providers:\n");
        let items = complete_type(&f.ctx(), Position::new(2, 27)).unwrap();
        assert_eq!(labels(&items), vec!["ex".to_string()]);
    }

    #[test]
    fn type_completion_stays_left_of_the_value_end() {
        let f = Fixture::new("resources:\n  my:\n    type: ex:index:Bucket  extra\n");
        assert!(complete_type(&f.ctx(), Position::new(2, 28)).is_none());
    }

    #[test]
    fn function_line_completes_functions() {
        let src = "variables:\n  v:\n    fn::invoke:\n      function: ex:\n";
        let f = Fixture::new(src);
        let items = complete_type(&f.ctx(), Position::new(3, 19)).unwrap();
        // `ex:ec2:getVpc` lives in the ec2 module.
        assert!(labels(&items).contains(&"ec2".to_string()));
    }

    #[test]
    fn top_level_keys_exclude_existing_sections() {
        let f = Fixture::new("resources:\n  my:\n    type: ex:index:Bucket\n");
        let items = complete_key(&f.ctx(), Position::new(2, 0));
        // Cursor at column 0 of a line inside `resources` block still has
        // parents; use a fresh top-level document instead.
        drop(items);
        let f = Fixture::new("name: demo\n\n");
        let items = complete_key(&f.ctx(), Position::new(1, 0)).unwrap();
        let labels = labels(&items);
        assert!(!labels.contains(&"name".to_string()));
        assert!(labels.contains(&"resources".to_string()));
        assert!(labels.contains(&"variables".to_string()));
    }

    #[test]
    fn resource_keys_complete_without_duplicates() {
        let src = "resources:\n  my:\n    type: ex:index:Bucket\n    \n";
        let f = Fixture::new(src);
        let items = complete_key(&f.ctx(), Position::new(3, 4)).unwrap();
        let labels = labels(&items);
        assert!(labels.contains(&"properties".to_string()));
        assert!(labels.contains(&"options".to_string()));
        assert!(!labels.contains(&"type".to_string()));
        assert!(!labels.contains(&"defaultProvider".to_string()));
    }

    #[test]
    fn provider_resources_offer_default_provider() {
        let src = "resources:\n  p:\n    type: pulumi:providers:ex\n    \n";
        let f = Fixture::new(src);
        let items = complete_key(&f.ctx(), Position::new(3, 4)).unwrap();
        assert!(labels(&items).contains(&"defaultProvider".to_string()));
    }

    #[test]
    fn resource_property_keys_come_from_the_schema() {
        let src = "resources:\n  my:\n    type: ex:index:Bucket\n    properties:\n      \n";
        let f = Fixture::new(src);
        let items = complete_key(&f.ctx(), Position::new(4, 6)).unwrap();
        assert_eq!(labels(&items), vec!["name".to_string()]);
        // Scalar string input completes on the same line.
        assert_eq!(items[0].insert_text.as_deref(), Some("name: "));
    }

    #[test]
    fn existing_property_keys_are_excluded() {
        let src = "resources:\n  my:\n    type: ex:index:Bucket\n    properties:\n      name: x\n      \n";
        let f = Fixture::new(src);
        let items = complete_key(&f.ctx(), Position::new(5, 6)).unwrap();
        assert!(items.is_empty(), "{items:?}");
    }

    #[test]
    fn resource_option_keys_complete() {
        let src = "resources:\n  my:\n    type: ex:index:Bucket\n    options:\n      \n";
        let f = Fixture::new(src);
        let items = complete_key(&f.ctx(), Position::new(4, 6)).unwrap();
        let labels = labels(&items);
        assert!(labels.contains(&"version".to_string()));
        assert!(labels.contains(&"dependsOn".to_string()));
        // List-shaped options open a dash block.
        let depends = items.iter().find(|i| i.label == "dependsOn").unwrap();
        assert!(depends.insert_text.as_deref().unwrap().ends_with("- "));
    }

    #[test]
    fn invoke_keys_complete() {
        let src = "variables:\n  v:\n    fn::invoke:\n      \n";
        let f = Fixture::new(src);
        let items = complete_key(&f.ctx(), Position::new(3, 6)).unwrap();
        let labels = labels(&items);
        assert_eq!(
            labels,
            vec![
                "arguments".to_string(),
                "function".to_string(),
                "options".to_string(),
                "return".to_string()
            ]
        );
    }

    #[test]
    fn invoke_argument_keys_come_from_the_schema() {
        let src = "variables:\n  v:\n    fn::invoke:\n      function: ex:ec2:getVpc\n      arguments:\n        \n";
        let f = Fixture::new(src);
        let items = complete_key(&f.ctx(), Position::new(5, 8)).unwrap();
        assert_eq!(labels(&items), vec!["default".to_string()]);
    }

    #[test]
    fn fn_shorthand_offers_builtins_and_packages() {
        let src = "variables:\n  v:\n    fn::\n";
        let f = Fixture::new(src);
        let items = complete_key(&f.ctx(), Position::new(2, 8)).unwrap();
        let labels = labels(&items);
        assert!(labels.contains(&"join".to_string()));
        assert!(labels.contains(&"secret".to_string()));
        assert!(labels.contains(&"ex".to_string()));
    }

    #[test]
    fn fn_shorthand_expands_package_modules() {
        let src = "variables:\n  v:\n    fn::ex:\n";
        let f = Fixture::new(src);
        let items = complete_key(&f.ctx(), Position::new(2, 11)).unwrap();
        assert!(labels(&items).contains(&"ex:ec2".to_string()));
    }

    #[test]
    fn fn_shorthand_expands_module_functions() {
        let src = "variables:\n  v:\n    fn::ex:ec2:\n";
        let f = Fixture::new(src);
        let items = complete_key(&f.ctx(), Position::new(2, 15)).unwrap();
        assert_eq!(labels(&items), vec!["ex:ec2:getVpc".to_string()]);
    }

    #[test]
    fn reference_completion_at_root_offers_variables() {
        let src = "variables:\n  width: 1\noutputs:\n  o: ${width}\n";
        let f = Fixture::new(src);
        let items = completions(&f.ctx(), Position::new(3, 8));
        let labels = labels(&items);
        assert!(labels.contains(&"width".to_string()));
        assert!(labels.contains(&"pulumi".to_string()));
    }

    #[test]
    fn reference_completion_after_dot_offers_properties() {
        let src = "resources:\n  my:\n    type: ex:index:Bucket\n    properties:\n      name: x\noutputs:\n  o: ${my.}\n";
        let f = Fixture::new(src);
        let items = completions(&f.ctx(), Position::new(6, 10));
        assert_eq!(
            labels(&items),
            vec![
                "arn".to_string(),
                "id".to_string(),
                "name".to_string(),
                "tags".to_string(),
                "urn".to_string()
            ]
        );
    }

    #[test]
    fn reference_completion_walks_accessor_chains() {
        let src = "resources:\n  my:\n    type: ex:index:Bucket\n    properties:\n      name: x\noutputs:\n  o: ${my.tags.}\n";
        let f = Fixture::new(src);
        let items = completions(&f.ctx(), Position::new(6, 15));
        // `tags` is a map of strings: no properties to offer.
        assert!(items.is_empty(), "{items:?}");
    }
}
