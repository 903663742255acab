//! Source-located YAML tree.
//!
//! A thin layer over `yaml-rust2`'s event parser. Every node keeps the range
//! it was parsed from; scalars additionally keep their style so later passes
//! can account for quoting when computing sub-ranges inside a scalar.
//!
//! Container end ranges come from the end-event markers, which for block
//! collections point at the first token after the collection. That is close
//! enough for diagnostics and hover; exact per-character ranges only matter
//! inside scalars, where we compute them ourselves.

use yaml_rust2::parser::{Event, MarkedEventReceiver, Parser};
use yaml_rust2::scanner::{Marker, TScalarStyle};

use crate::syntax::{Diagnostic, Pos, Range};

/// How a scalar was written in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarStyle {
    Plain,
    SingleQuoted,
    DoubleQuoted,
    /// Literal (`|`) or folded (`>`) block scalar.
    Block,
}

impl ScalarStyle {
    /// Byte/character offset from the node start to the first content
    /// character. Quoted scalars start after the opening quote.
    pub fn content_offset(self) -> usize {
        match self {
            ScalarStyle::SingleQuoted | ScalarStyle::DoubleQuoted => 1,
            _ => 0,
        }
    }
}

/// One node of the located YAML tree.
#[derive(Debug, Clone, PartialEq)]
pub struct YamlNode {
    pub value: YamlValue,
    pub range: Range,
}

#[derive(Debug, Clone, PartialEq)]
pub enum YamlValue {
    Scalar { value: String, style: ScalarStyle },
    Sequence(Vec<YamlNode>),
    Mapping(Vec<MappingEntry>),
}

/// A key/value pair of a mapping, in document order.
#[derive(Debug, Clone, PartialEq)]
pub struct MappingEntry {
    pub key: YamlNode,
    pub value: YamlNode,
}

impl YamlNode {
    /// The scalar string value, if this node is a scalar.
    pub fn as_scalar(&self) -> Option<&str> {
        match &self.value {
            YamlValue::Scalar { value, .. } => Some(value),
            _ => None,
        }
    }

    /// The mapping entries, if this node is a mapping.
    pub fn as_mapping(&self) -> Option<&[MappingEntry]> {
        match &self.value {
            YamlValue::Mapping(entries) => Some(entries),
            _ => None,
        }
    }

    /// Look up a mapping value by exact key.
    pub fn get(&self, key: &str) -> Option<&YamlNode> {
        self.as_mapping()?
            .iter()
            .find(|e| e.key.as_scalar() == Some(key))
            .map(|e| &e.value)
    }
}

/// Parse a single YAML document into a located tree.
///
/// Returns `(None, diagnostics)` when the scanner rejects the input, and
/// `(None, [])` for an empty stream.
pub fn parse_yaml(source: &str) -> (Option<YamlNode>, Vec<Diagnostic>) {
    let mut parser = Parser::new_from_str(source);
    let mut builder = TreeBuilder::default();
    match parser.load(&mut builder, false) {
        Ok(()) => (builder.root, Vec::new()),
        Err(err) => {
            let pos = pos_from_marker(*err.marker());
            let subject = Range::new(pos, pos);
            let diag = Diagnostic::error("Syntax error", err.to_string(), Some(subject));
            (None, vec![diag])
        }
    }
}

fn pos_from_marker(marker: Marker) -> Pos {
    // yaml-rust2 markers are 0-based.
    Pos::new(marker.line() + 1, marker.col() + 1, marker.index())
}

#[derive(Default)]
struct TreeBuilder {
    stack: Vec<Container>,
    root: Option<YamlNode>,
}

enum Container {
    Sequence {
        start: Pos,
        items: Vec<YamlNode>,
    },
    Mapping {
        start: Pos,
        entries: Vec<(YamlNode, Option<YamlNode>)>,
    },
}

impl TreeBuilder {
    fn push_complete(&mut self, node: YamlNode) {
        match self.stack.last_mut() {
            None => self.root = Some(node),
            Some(Container::Sequence { items, .. }) => items.push(node),
            Some(Container::Mapping { entries, .. }) => match entries.last_mut() {
                Some((_, value @ None)) => *value = Some(node),
                _ => entries.push((node, None)),
            },
        }
    }
}

impl MarkedEventReceiver for TreeBuilder {
    fn on_event(&mut self, ev: Event, marker: Marker) {
        let pos = pos_from_marker(marker);
        match ev {
            Event::Nothing
            | Event::StreamStart
            | Event::StreamEnd
            | Event::DocumentStart
            | Event::DocumentEnd => {}

            Event::Scalar(value, style, _anchor_id, _tag) => {
                let style = match style {
                    TScalarStyle::SingleQuoted => ScalarStyle::SingleQuoted,
                    TScalarStyle::DoubleQuoted => ScalarStyle::DoubleQuoted,
                    TScalarStyle::Literal | TScalarStyle::Folded => ScalarStyle::Block,
                    _ => ScalarStyle::Plain,
                };
                // The marker points at the first source character of the
                // scalar (the opening quote, for quoted styles). The end is
                // the start advanced over the value, exact for plain scalars
                // and a close approximation for quoted ones.
                let start = Pos::new(pos.line, pos.column, pos.byte);
                let end = start.advance(&value);
                self.push_complete(YamlNode {
                    value: YamlValue::Scalar { value, style },
                    range: Range::new(start, end),
                });
            }

            Event::SequenceStart(_anchor_id, _tag) => {
                self.stack.push(Container::Sequence {
                    start: pos,
                    items: Vec::new(),
                });
            }

            Event::SequenceEnd => {
                let Some(Container::Sequence { start, items }) = self.stack.pop() else {
                    return;
                };
                let end = items.last().map(|n| n.range.end).unwrap_or(pos);
                self.push_complete(YamlNode {
                    value: YamlValue::Sequence(items),
                    range: Range::new(start, end),
                });
            }

            Event::MappingStart(_anchor_id, _tag) => {
                self.stack.push(Container::Mapping {
                    start: pos,
                    entries: Vec::new(),
                });
            }

            Event::MappingEnd => {
                let Some(Container::Mapping { start, entries }) = self.stack.pop() else {
                    return;
                };
                let entries: Vec<MappingEntry> = entries
                    .into_iter()
                    .map(|(key, value)| {
                        // A dangling key (`foo:` with nothing after) still
                        // produces a null scalar event, so `value` is always
                        // present in practice; recover with an empty scalar
                        // at the key's end if not.
                        let value = value.unwrap_or(YamlNode {
                            value: YamlValue::Scalar {
                                value: String::new(),
                                style: ScalarStyle::Plain,
                            },
                            range: Range::new(key.range.end, key.range.end),
                        });
                        MappingEntry { key, value }
                    })
                    .collect();
                let end = entries.last().map(|e| e.value.range.end).unwrap_or(pos);
                let start = entries.first().map(|e| e.key.range.start).unwrap_or(start);
                self.push_complete(YamlNode {
                    value: YamlValue::Mapping(entries),
                    range: Range::new(start, end),
                });
            }

            Event::Alias(_anchor_id) => {
                // Anchors/aliases are not part of the template language;
                // stand in a null so the tree stays well formed.
                self.push_complete(YamlNode {
                    value: YamlValue::Scalar {
                        value: String::new(),
                        style: ScalarStyle::Plain,
                    },
                    range: Range::new(pos, pos),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_ranges_are_one_based() {
        let (node, diags) = parse_yaml("key: value\n");
        assert!(diags.is_empty());
        let node = node.unwrap();
        let entries = node.as_mapping().unwrap();
        assert_eq!(entries.len(), 1);
        let key = &entries[0].key;
        assert_eq!(key.as_scalar(), Some("key"));
        assert_eq!(key.range.start, Pos::new(1, 1, 0));
        assert_eq!(key.range.end, Pos::new(1, 4, 3));
        let value = &entries[0].value;
        assert_eq!(value.range.start, Pos::new(1, 6, 5));
    }

    #[test]
    fn nested_mappings_keep_document_order() {
        let src = "resources:\n  a:\n    type: t\n  b:\n    type: u\n";
        let (node, diags) = parse_yaml(src);
        assert!(diags.is_empty());
        let node = node.unwrap();
        let resources = node.get("resources").unwrap();
        let keys: Vec<_> = resources
            .as_mapping()
            .unwrap()
            .iter()
            .map(|e| e.key.as_scalar().unwrap())
            .collect();
        assert_eq!(keys, ["a", "b"]);
    }

    #[test]
    fn syntax_error_produces_diagnostic() {
        let (node, diags) = parse_yaml("a: [1, 2\n");
        assert!(node.is_none());
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].severity, crate::syntax::Severity::Error);
    }

    #[test]
    fn quoted_scalar_keeps_style() {
        let (node, _) = parse_yaml("key: \"hi\"\n");
        let node = node.unwrap();
        let value = &node.as_mapping().unwrap()[0].value;
        match &value.value {
            YamlValue::Scalar { style, .. } => assert_eq!(*style, ScalarStyle::DoubleQuoted),
            other => panic!("expected scalar, got {other:?}"),
        }
    }

    #[test]
    fn empty_document_yields_nothing() {
        let (node, diags) = parse_yaml("");
        assert!(node.is_none());
        assert!(diags.is_empty());
    }
}
