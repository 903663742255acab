//! Template expressions.
//!
//! Expressions are a closed set: literals, interpolated strings, symbols,
//! lists, objects, `fn::invoke`, asset/archive forms, stack references and
//! the builtin string functions. Lowering from the located YAML tree happens
//! here; string scalars are scanned for `${...}` interpolations as part of
//! lowering.

use crate::access::{parse_property_access, PropertyAccess};
use crate::syntax::{Diagnostic, Pos, Range};
use crate::template::StringWithRange;
use crate::yaml::{MappingEntry, ScalarStyle, YamlNode, YamlValue};

/// Builtin function names recognized after the `fn::` prefix, in the casing
/// the language documents.
pub const BUILTIN_FUNCTION_NAMES: &[&str] = &[
    "invoke",
    "join",
    "select",
    "split",
    "toJSON",
    "toBase64",
    "readFile",
    "secret",
    "fileAsset",
    "stringAsset",
    "remoteAsset",
    "fileArchive",
    "remoteArchive",
    "assetArchive",
    "stackReference",
];

/// A template expression with its source range.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Null { range: Range },
    Boolean { value: bool, range: Range },
    Number { value: f64, range: Range },
    String(StringWithRange),
    /// A string with one or more `${...}` parts.
    Interpolate { parts: Vec<InterpolatePart>, range: Range },
    /// A scalar that is exactly one `${...}` access.
    Symbol { access: PropertyAccess, range: Range },
    List { elements: Vec<Expr>, range: Range },
    Object { entries: Vec<ObjectEntry>, range: Range },
    Invoke(Box<InvokeExpr>),
    Join { delimiter: Box<Expr>, values: Box<Expr>, range: Range },
    Select { index: Box<Expr>, values: Box<Expr>, range: Range },
    Split { delimiter: Box<Expr>, source: Box<Expr>, range: Range },
    ToJson { value: Box<Expr>, range: Range },
    ToBase64 { value: Box<Expr>, range: Range },
    ReadFile { path: Box<Expr>, range: Range },
    Secret { value: Box<Expr>, range: Range },
    FileAsset { path: Box<Expr>, range: Range },
    StringAsset { content: Box<Expr>, range: Range },
    RemoteAsset { url: Box<Expr>, range: Range },
    FileArchive { path: Box<Expr>, range: Range },
    RemoteArchive { url: Box<Expr>, range: Range },
    AssetArchive { entries: Vec<ObjectEntry>, range: Range },
    StackReference(Box<StackReferenceExpr>),
}

/// One literal-or-access piece of an interpolated string.
#[derive(Debug, Clone, PartialEq)]
pub struct InterpolatePart {
    /// Literal text preceding the access.
    pub text: String,
    /// The access, absent for a trailing literal part.
    pub value: Option<PropertyAccess>,
}

/// An entry of an object expression, in document order.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectEntry {
    pub key: Expr,
    pub value: Expr,
}

/// An `fn::invoke` expression.
#[derive(Debug, Clone, PartialEq)]
pub struct InvokeExpr {
    /// The function token (`pkg[:module]:Name`).
    pub token: Option<StringWithRange>,
    /// The `arguments` object, lowered as an `Expr::Object`.
    pub args: Option<Expr>,
    /// The `return` field naming one output property.
    pub ret: Option<StringWithRange>,
    /// The `options` object; bound but otherwise opaque here.
    pub options: Option<Expr>,
    pub range: Range,
}

/// An `fn::stackReference` expression.
#[derive(Debug, Clone, PartialEq)]
pub struct StackReferenceExpr {
    pub stack: Option<Expr>,
    pub output: Option<Expr>,
    pub range: Range,
}

impl Expr {
    pub fn range(&self) -> Range {
        match self {
            Expr::Null { range }
            | Expr::Boolean { range, .. }
            | Expr::Number { range, .. }
            | Expr::Interpolate { range, .. }
            | Expr::Symbol { range, .. }
            | Expr::List { range, .. }
            | Expr::Object { range, .. }
            | Expr::Join { range, .. }
            | Expr::Select { range, .. }
            | Expr::Split { range, .. }
            | Expr::ToJson { range, .. }
            | Expr::ToBase64 { range, .. }
            | Expr::ReadFile { range, .. }
            | Expr::Secret { range, .. }
            | Expr::FileAsset { range, .. }
            | Expr::StringAsset { range, .. }
            | Expr::RemoteAsset { range, .. }
            | Expr::FileArchive { range, .. }
            | Expr::RemoteArchive { range, .. }
            | Expr::AssetArchive { range, .. } => *range,
            Expr::String(s) => s.range,
            Expr::Invoke(invoke) => invoke.range,
            Expr::StackReference(sr) => sr.range,
        }
    }

    /// Lower a YAML node into an expression, appending any problems found.
    pub fn from_yaml(node: &YamlNode, diags: &mut Vec<Diagnostic>) -> Expr {
        match &node.value {
            YamlValue::Scalar { value, style } => lower_scalar(value, *style, node.range, diags),
            YamlValue::Sequence(items) => Expr::List {
                elements: items.iter().map(|n| Expr::from_yaml(n, diags)).collect(),
                range: node.range,
            },
            YamlValue::Mapping(entries) => lower_mapping(entries, node.range, diags),
        }
    }
}

fn lower_scalar(
    value: &str,
    style: ScalarStyle,
    range: Range,
    diags: &mut Vec<Diagnostic>,
) -> Expr {
    if style == ScalarStyle::Plain {
        match value {
            "" | "~" | "null" | "Null" | "NULL" => return Expr::Null { range },
            "true" | "True" | "TRUE" => return Expr::Boolean { value: true, range },
            "false" | "False" | "FALSE" => return Expr::Boolean { value: false, range },
            _ => {}
        }
        if let Ok(n) = value.parse::<f64>() {
            return Expr::Number { value: n, range };
        }
    }

    let mut content_start = range.start;
    if style.content_offset() > 0 {
        content_start.column += style.content_offset();
        content_start.byte += style.content_offset();
    }
    match scan_interpolations(value, content_start, diags) {
        Some(parts) => {
            // A scalar that is a single bare access is a symbol; anything
            // with literal text around the access stays an interpolation.
            let is_symbol = parts.len() == 1
                && parts[0].text.is_empty()
                && parts[0].value.is_some();
            if is_symbol {
                let access = parts.into_iter().next().unwrap().value.unwrap();
                Expr::Symbol { access, range }
            } else {
                Expr::Interpolate { parts, range }
            }
        }
        None => Expr::String(StringWithRange {
            value: value.to_string(),
            range,
        }),
    }
}

/// Scan a string for `${...}` parts. Returns `None` when the string contains
/// no interpolation at all. `$${` escapes a literal `${`.
fn scan_interpolations(
    value: &str,
    start: Pos,
    diags: &mut Vec<Diagnostic>,
) -> Option<Vec<InterpolatePart>> {
    let mut parts: Vec<InterpolatePart> = Vec::new();
    let mut literal = String::new();
    let mut pos = start;
    let mut rest = value;
    let mut found = false;

    while !rest.is_empty() {
        if let Some(tail) = rest.strip_prefix("$${") {
            literal.push_str("${");
            pos = pos.advance("$${");
            rest = tail;
        } else if let Some(tail) = rest.strip_prefix("${") {
            found = true;
            let body_start = pos.advance("${");
            match tail.find('}') {
                Some(close) => {
                    let body = &tail[..close];
                    let (access, diag) = parse_property_access(body, body_start);
                    diags.extend(diag);
                    parts.push(InterpolatePart {
                        text: std::mem::take(&mut literal),
                        value: Some(access),
                    });
                    pos = body_start.advance(body).advance("}");
                    rest = &tail[close + 1..];
                }
                None => {
                    diags.push(Diagnostic::error(
                        "Unterminated interpolation",
                        format!("missing '}}' in '{value}'"),
                        Some(Range::new(pos, pos.advance(rest))),
                    ));
                    literal.push_str(rest);
                    pos = pos.advance(rest);
                    rest = "";
                }
            }
        } else {
            let next = rest
                .char_indices()
                .skip(1)
                .find(|(_, c)| *c == '$')
                .map(|(i, _)| i)
                .unwrap_or(rest.len());
            literal.push_str(&rest[..next]);
            pos = pos.advance(&rest[..next]);
            rest = &rest[next..];
        }
    }

    if !found {
        return None;
    }
    if !literal.is_empty() {
        parts.push(InterpolatePart {
            text: literal,
            value: None,
        });
    }
    Some(parts)
}

fn lower_mapping(entries: &[MappingEntry], range: Range, diags: &mut Vec<Diagnostic>) -> Expr {
    // A single-entry mapping whose key carries the `fn::` prefix is a
    // builtin form; everything else is a plain object.
    if entries.len() == 1 {
        if let Some(key) = entries[0].key.as_scalar() {
            if let Some(name) = key.strip_prefix("fn::").or_else(|| key.strip_prefix("Fn::")) {
                return lower_builtin(name, &entries[0], range, diags);
            }
        }
    }
    Expr::Object {
        entries: lower_object_entries(entries, diags),
        range,
    }
}

fn lower_object_entries(entries: &[MappingEntry], diags: &mut Vec<Diagnostic>) -> Vec<ObjectEntry> {
    entries
        .iter()
        .map(|e| ObjectEntry {
            key: Expr::from_yaml(&e.key, diags),
            value: Expr::from_yaml(&e.value, diags),
        })
        .collect()
}

fn lower_builtin(
    name: &str,
    entry: &MappingEntry,
    range: Range,
    diags: &mut Vec<Diagnostic>,
) -> Expr {
    let body = &entry.value;
    let unary = |diags: &mut Vec<Diagnostic>| Box::new(Expr::from_yaml(body, diags));
    match name {
        "invoke" => lower_invoke(body, range, diags),
        "join" => {
            let (a, b) = binary_args(body, diags);
            Expr::Join { delimiter: a, values: b, range }
        }
        "select" => {
            let (a, b) = binary_args(body, diags);
            Expr::Select { index: a, values: b, range }
        }
        "split" => {
            let (a, b) = binary_args(body, diags);
            Expr::Split { delimiter: a, source: b, range }
        }
        "toJSON" => Expr::ToJson { value: unary(diags), range },
        "toBase64" => Expr::ToBase64 { value: unary(diags), range },
        "readFile" => Expr::ReadFile { path: unary(diags), range },
        "secret" => Expr::Secret { value: unary(diags), range },
        "fileAsset" => Expr::FileAsset { path: unary(diags), range },
        "stringAsset" => Expr::StringAsset { content: unary(diags), range },
        "remoteAsset" => Expr::RemoteAsset { url: unary(diags), range },
        "fileArchive" => Expr::FileArchive { path: unary(diags), range },
        "remoteArchive" => Expr::RemoteArchive { url: unary(diags), range },
        "assetArchive" => {
            let entries = match &body.value {
                YamlValue::Mapping(entries) => lower_object_entries(entries, diags),
                _ => {
                    diags.push(Diagnostic::error(
                        "Invalid fn::assetArchive",
                        "fn::assetArchive expects a map of assets or archives",
                        Some(body.range),
                    ));
                    Vec::new()
                }
            };
            Expr::AssetArchive { entries, range }
        }
        "stackReference" => {
            let (stack, output) = match &body.value {
                YamlValue::Sequence(items) => (
                    items.first().map(|n| Expr::from_yaml(n, diags)),
                    items.get(1).map(|n| Expr::from_yaml(n, diags)),
                ),
                _ => {
                    diags.push(Diagnostic::error(
                        "Invalid fn::stackReference",
                        "fn::stackReference expects [stackName, outputName]",
                        Some(body.range),
                    ));
                    (None, None)
                }
            };
            Expr::StackReference(Box::new(StackReferenceExpr { stack, output, range }))
        }
        other => {
            diags.push(Diagnostic::error(
                format!("Unknown function 'fn::{other}'"),
                format!(
                    "supported functions are {}",
                    BUILTIN_FUNCTION_NAMES.join(", ")
                ),
                Some(entry.key.range),
            ));
            Expr::Object {
                entries: lower_object_entries(std::slice::from_ref(entry), diags),
                range,
            }
        }
    }
}

/// Split a two-element sequence into its parts, padding with nulls when the
/// shape is wrong so binding can continue.
fn binary_args(body: &YamlNode, diags: &mut Vec<Diagnostic>) -> (Box<Expr>, Box<Expr>) {
    if let YamlValue::Sequence(items) = &body.value {
        if items.len() == 2 {
            return (
                Box::new(Expr::from_yaml(&items[0], diags)),
                Box::new(Expr::from_yaml(&items[1], diags)),
            );
        }
    }
    diags.push(Diagnostic::error(
        "Invalid function arguments",
        "expected a two-element list",
        Some(body.range),
    ));
    (
        Box::new(Expr::Null { range: body.range }),
        Box::new(Expr::Null { range: body.range }),
    )
}

fn lower_invoke(body: &YamlNode, range: Range, diags: &mut Vec<Diagnostic>) -> Expr {
    let mut invoke = InvokeExpr {
        token: None,
        args: None,
        ret: None,
        options: None,
        range,
    };
    match &body.value {
        YamlValue::Mapping(entries) => {
            for entry in entries {
                let Some(key) = entry.key.as_scalar() else {
                    continue;
                };
                match key.to_ascii_lowercase().as_str() {
                    "function" => {
                        invoke.token = string_with_range(&entry.value);
                        if invoke.token.is_none() {
                            diags.push(Diagnostic::error(
                                "Invalid fn::invoke",
                                "'function' must be a string token",
                                Some(entry.value.range),
                            ));
                        }
                    }
                    "arguments" => invoke.args = Some(Expr::from_yaml(&entry.value, diags)),
                    "return" => invoke.ret = string_with_range(&entry.value),
                    "options" => invoke.options = Some(Expr::from_yaml(&entry.value, diags)),
                    other => diags.push(Diagnostic::warning(
                        format!("Unexpected key '{other}' in fn::invoke"),
                        "expected function, arguments, return or options",
                        Some(entry.key.range),
                    )),
                }
            }
        }
        _ => diags.push(Diagnostic::error(
            "Invalid fn::invoke",
            "fn::invoke expects a map with a 'function' entry",
            Some(body.range),
        )),
    }
    Expr::Invoke(Box::new(invoke))
}

fn string_with_range(node: &YamlNode) -> Option<StringWithRange> {
    node.as_scalar().map(|s| StringWithRange {
        value: s.to_string(),
        range: node.range,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::yaml::parse_yaml;

    fn lower(src: &str) -> (Expr, Vec<Diagnostic>) {
        let (node, diags) = parse_yaml(src);
        assert!(diags.is_empty(), "parse failed: {diags:?}");
        let mut diags = Vec::new();
        let expr = Expr::from_yaml(&node.unwrap(), &mut diags);
        (expr, diags)
    }

    #[test]
    fn plain_scalars_lower_to_literals() {
        assert!(matches!(lower("true").0, Expr::Boolean { value: true, .. }));
        assert!(matches!(lower("null").0, Expr::Null { .. }));
        match lower("3.5").0 {
            Expr::Number { value, .. } => assert_eq!(value, 3.5),
            other => panic!("expected number, got {other:?}"),
        }
    }

    #[test]
    fn quoted_scalar_stays_a_string() {
        match lower("\"true\"").0 {
            Expr::String(s) => assert_eq!(s.value, "true"),
            other => panic!("expected string, got {other:?}"),
        }
    }

    #[test]
    fn bare_access_is_a_symbol() {
        match lower("${cluster.name}").0 {
            Expr::Symbol { access, .. } => {
                assert_eq!(access.accessors.len(), 2);
                assert_eq!(access.text, "cluster.name");
            }
            other => panic!("expected symbol, got {other:?}"),
        }
    }

    #[test]
    fn mixed_text_is_an_interpolation() {
        match lower("\"arn:${bucket.arn}:suffix\"").0 {
            Expr::Interpolate { parts, .. } => {
                assert_eq!(parts.len(), 2);
                assert_eq!(parts[0].text, "arn:");
                assert!(parts[0].value.is_some());
                assert_eq!(parts[1].text, ":suffix");
                assert!(parts[1].value.is_none());
            }
            other => panic!("expected interpolation, got {other:?}"),
        }
    }

    #[test]
    fn dollar_escape_is_literal() {
        match lower("\"$${not.a.ref}\"").0 {
            Expr::String(s) => assert_eq!(s.value, "$${not.a.ref}"),
            other => panic!("expected string, got {other:?}"),
        }
    }

    #[test]
    fn invoke_form_collects_fields() {
        let src = "fn::invoke:\n  function: aws:ec2:getVpc\n  arguments:\n    default: true\n  return: id\n";
        match lower(src).0 {
            Expr::Invoke(invoke) => {
                assert_eq!(invoke.token.as_ref().unwrap().value, "aws:ec2:getVpc");
                assert!(invoke.args.is_some());
                assert_eq!(invoke.ret.as_ref().unwrap().value, "id");
            }
            other => panic!("expected invoke, got {other:?}"),
        }
    }

    #[test]
    fn join_takes_two_arguments() {
        let src = "fn::join:\n  - \"-\"\n  - [a, b]\n";
        match lower(src).0 {
            Expr::Join { values, .. } => assert!(matches!(*values, Expr::List { .. })),
            other => panic!("expected join, got {other:?}"),
        }
    }

    #[test]
    fn unknown_builtin_reports_and_falls_back() {
        let (expr, diags) = lower("fn::frobnicate: 1\n");
        assert!(matches!(expr, Expr::Object { .. }));
        assert_eq!(diags.len(), 1);
        assert!(diags[0].summary.contains("fn::frobnicate"));
    }

    #[test]
    fn symbol_range_points_into_the_scalar() {
        let (node, _) = parse_yaml("v: ${a.b}\n");
        let node = node.unwrap();
        let value = node.get("v").unwrap();
        let mut diags = Vec::new();
        match Expr::from_yaml(value, &mut diags) {
            Expr::Symbol { access, .. } => {
                // `${` starts at column 4; the body starts after it.
                assert_eq!(access.range.start.column, 6);
                assert_eq!(access.accessors[0].range().start.column, 6);
                assert_eq!(access.accessors[1].range().start.column, 8);
            }
            other => panic!("expected symbol, got {other:?}"),
        }
    }
}
