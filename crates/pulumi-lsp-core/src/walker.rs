//! A line-indentation walker over the text buffer.
//!
//! Completion has to work while the document is mid-edit, when the formal
//! parse usually fails (a dangling `:` is already a syntax error). This
//! walker recovers the block structure from indentation alone: it never
//! fails on malformed YAML, it just reports what it can see. Block-style
//! YAML with space indentation is assumed.

use crate::position::Position;
use crate::text::Document;

/// A key and the position of its first character.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPos {
    pub position: Position,
    pub key: String,
}

/// The number of leading spaces, and whether the line is blank.
pub fn indentation_level(line: &str) -> (usize, bool) {
    let spaces = line.chars().take_while(|c| *c == ' ').count();
    (spaces, line.trim().is_empty())
}

/// Scan upward from `pos` to the first non-blank line with smaller
/// indentation that ends in `:`. Returns the position of that key.
pub fn enclosing_key(doc: &Document, pos: Position) -> Option<Position> {
    let line = doc.line(pos.line as usize).ok()?;
    let (indentation, _) = indentation_level(&line);
    let mut line_num = pos.line as usize;
    while line_num > 0 {
        line_num -= 1;
        let Ok(line) = doc.line(line_num) else {
            return None;
        };
        let (ind, blank) = indentation_level(&line);
        if !blank && ind < indentation && line.trim_end().ends_with(':') {
            return Some(Position::new(line_num as u32, ind as u32));
        }
    }
    None
}

/// The chain of enclosing keys, immediate parent first.
pub fn parent_keys(doc: &Document, pos: Position) -> Vec<KeyPos> {
    let mut parents = Vec::new();
    let mut cursor = pos;
    while let Some(parent) = enclosing_key(doc, cursor) {
        let Ok(line) = doc.line(parent.line as usize) else {
            break;
        };
        let key = line.trim().trim_end_matches(':').to_string();
        parents.push(KeyPos {
            position: parent,
            key,
        });
        cursor = parent;
    }
    parents
}

/// The keys nested one level under the key at `pos`, with their positions.
/// The first sub-indented line fixes the child indentation level; deeper
/// lines are skipped.
pub fn child_keys(doc: &Document, pos: Position) -> Vec<KeyPos> {
    let Ok(line) = doc.line(pos.line as usize) else {
        return Vec::new();
    };
    let (top_level, blank) = indentation_level(&line);
    if blank {
        return Vec::new();
    }
    let mut level: Option<usize> = None;
    let mut keys = Vec::new();
    for i in pos.line as usize + 1..doc.line_count() {
        let Ok(line) = doc.line(i) else { break };
        let (ind, blank) = indentation_level(&line);
        if blank {
            continue;
        }
        if ind <= top_level {
            break;
        }
        let level = *level.get_or_insert(ind);
        if ind == level {
            let Some(key) = line.split(':').next() else {
                continue;
            };
            keys.push(KeyPos {
                position: Position::new(i as u32, ind as u32),
                key: key.trim().to_string(),
            });
        }
    }
    keys
}

/// The keys at the same level as the block containing `pos`.
pub fn sibling_keys(doc: &Document, pos: Position) -> Vec<KeyPos> {
    match enclosing_key(doc, pos) {
        Some(parent) => child_keys(doc, parent),
        None => Vec::new(),
    }
}

/// The document's top-level keys.
pub fn top_level_keys(doc: &Document) -> Vec<KeyPos> {
    let mut keys = Vec::new();
    for i in 0..doc.line_count() {
        let Ok(line) = doc.line(i) else { break };
        let (ind, blank) = indentation_level(&line);
        if blank || ind != 0 {
            continue;
        }
        if let Some(key) = line.split(':').next() {
            let key = key.trim();
            if !key.is_empty() && line.contains(':') {
                keys.push(KeyPos {
                    position: Position::new(i as u32, 0),
                    key: key.to_string(),
                });
            }
        }
    }
    keys
}

/// Walk a path of nested keys starting below `pos`, returning the position
/// of the final key.
pub fn nested_key(doc: &Document, pos: Position, path: &[&str]) -> Option<Position> {
    let mut current = pos;
    for segment in path {
        let children = child_keys(doc, current);
        current = children
            .into_iter()
            .find(|k| k.key.eq_ignore_ascii_case(segment))?
            .position;
    }
    Some(current)
}

/// The value text of a `key: value` line, e.g. a version hint. Empty when
/// the line has a key and no value.
pub fn value_at_line(doc: &Document, line: u32) -> Option<String> {
    let line = doc.line(line as usize).ok()?;
    let (_, value) = line.split_once(':')?;
    Some(value.trim().to_string())
}

/// The token on a `type: <token>` style line; `None` when the line does not
/// have that shape.
pub fn token_at_line(doc: &Document, line: u32) -> Option<String> {
    value_at_line(doc, line).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str) -> Document {
        Document::new("file:///test.yaml", "yaml", text, 1)
    }

    const DOC: &str = "\
resources:
  my:
    type: ex:index:Bucket
    properties:
      name: hello

    options:
      version: 1.2.3
outputs:
  o: 1
";

    #[test]
    fn enclosing_key_scans_past_blank_lines() {
        let d = doc(DOC);
        // `version:` on line 7 is enclosed by `options:` on line 6.
        assert_eq!(
            enclosing_key(&d, Position::new(7, 6)),
            Some(Position::new(6, 4))
        );
        // `my:` is enclosed by the top-level `resources:`.
        assert_eq!(
            enclosing_key(&d, Position::new(1, 2)),
            Some(Position::new(0, 0))
        );
    }

    #[test]
    fn parent_keys_chain_immediate_first() {
        let d = doc(DOC);
        let parents = parent_keys(&d, Position::new(4, 6));
        let names: Vec<_> = parents.iter().map(|k| k.key.as_str()).collect();
        assert_eq!(names, ["properties", "my", "resources"]);
    }

    #[test]
    fn child_keys_collects_first_sublevel_only() {
        let d = doc(DOC);
        let children = child_keys(&d, Position::new(1, 2));
        let names: Vec<_> = children.iter().map(|k| k.key.as_str()).collect();
        assert_eq!(names, ["type", "properties", "options"]);
    }

    #[test]
    fn sibling_keys_look_through_the_parent() {
        let d = doc(DOC);
        let siblings = sibling_keys(&d, Position::new(2, 4));
        let names: Vec<_> = siblings.iter().map(|k| k.key.as_str()).collect();
        assert_eq!(names, ["type", "properties", "options"]);
    }

    #[test]
    fn top_level_keys_of_the_document() {
        let d = doc(DOC);
        let names: Vec<_> = top_level_keys(&d).iter().map(|k| k.key.clone()).collect();
        assert_eq!(names, ["resources", "outputs"]);
    }

    #[test]
    fn nested_key_walks_a_path() {
        let d = doc(DOC);
        let version = nested_key(&d, Position::new(1, 2), &["options", "version"]).unwrap();
        assert_eq!(version, Position::new(7, 6));
        assert_eq!(value_at_line(&d, version.line).as_deref(), Some("1.2.3"));
    }

    #[test]
    fn token_extraction_from_a_type_line() {
        let d = doc(DOC);
        assert_eq!(token_at_line(&d, 2).as_deref(), Some("ex:index:Bucket"));
        assert_eq!(token_at_line(&d, 0), None);
    }

    #[test]
    fn malformed_yaml_never_fails() {
        let d = doc("resources:\n  my:\n    type:\n  dangling\n");
        assert!(!parent_keys(&d, Position::new(2, 4)).is_empty());
        let _ = child_keys(&d, Position::new(0, 0));
        let _ = top_level_keys(&d);
    }
}
