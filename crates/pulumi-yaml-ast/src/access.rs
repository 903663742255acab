//! Property-access chains inside interpolations.
//!
//! `${cluster.endpoints[0]["name"]}` parses into a root accessor plus a list
//! of named and subscripted accessors. Every accessor carries its own
//! sub-range, derived by walking the textual form character by character, so
//! hover and completion can target one segment of a chain.

use crate::syntax::{Diagnostic, Pos, Range};

/// One step in a property path.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyAccessor {
    /// A named segment: the root identifier or `.name`.
    Name { name: String, range: Range },
    /// An integer subscript: `[0]`.
    IntIndex { index: i64, range: Range },
    /// A string subscript: `["key"]`.
    StringIndex { key: String, range: Range },
}

impl PropertyAccessor {
    pub fn range(&self) -> Range {
        match self {
            PropertyAccessor::Name { range, .. }
            | PropertyAccessor::IntIndex { range, .. }
            | PropertyAccessor::StringIndex { range, .. } => *range,
        }
    }

    /// The display name of this segment, as used in diagnostics.
    pub fn describe(&self) -> String {
        match self {
            PropertyAccessor::Name { name, .. } => name.clone(),
            PropertyAccessor::IntIndex { index, .. } => format!("[{index}]"),
            PropertyAccessor::StringIndex { key, .. } => format!("[\"{key}\"]"),
        }
    }
}

/// A parsed property access: the accessor list (the first entry is the root
/// when the access is well formed) plus the overall range and textual form.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyAccess {
    pub accessors: Vec<PropertyAccessor>,
    pub range: Range,
    /// The text as written, for display.
    pub text: String,
}

/// Parse the body of an interpolation (the text between `${` and `}`).
///
/// `start` is the position of the first body character. Malformed input
/// produces a best-effort access plus a diagnostic; the access is still
/// recorded so downstream queries keep working mid-edit.
pub fn parse_property_access(text: &str, start: Pos) -> (PropertyAccess, Option<Diagnostic>) {
    let mut accessors = Vec::new();
    let mut diag = None;
    let mut pos = start;
    let mut rest = text;

    // `${}`: leave the accessor list empty; the binder reports it.
    if rest.trim().is_empty() {
        let end = start.advance(text);
        return (
            PropertyAccess {
                accessors,
                range: Range::new(start, end),
                text: text.to_string(),
            },
            None,
        );
    }

    // Root identifier, if the access does not begin with a subscript.
    if !rest.starts_with('[') {
        let name_len = ident_len(rest);
        let name = &rest[..name_len];
        let end = pos.advance(name);
        accessors.push(PropertyAccessor::Name {
            name: name.to_string(),
            range: Range::new(pos, end),
        });
        pos = end;
        rest = &rest[name_len..];
    }

    while !rest.is_empty() {
        if let Some(tail) = rest.strip_prefix('.') {
            let seg_start = pos;
            let dot_end = pos.advance(".");
            let name_len = ident_len(tail);
            let name = &tail[..name_len];
            let end = dot_end.advance(name);
            accessors.push(PropertyAccessor::Name {
                name: name.to_string(),
                // The sub-range covers the name, not the dot, so completion
                // lands on the segment being typed.
                range: Range::new(dot_end, end),
            });
            if name.is_empty() && diag.is_none() {
                diag = Some(Diagnostic::error(
                    "Empty property segment",
                    format!("expected a property name after '.' in '{text}'"),
                    Some(Range::new(seg_start, dot_end)),
                ));
            }
            pos = end;
            rest = &tail[name_len..];
        } else if rest.starts_with('[') {
            match parse_subscript(rest, pos) {
                Ok((accessor, consumed)) => {
                    pos = pos.advance(&rest[..consumed]);
                    rest = &rest[consumed..];
                    accessors.push(accessor);
                }
                Err(d) => {
                    if diag.is_none() {
                        diag = Some(d);
                    }
                    break;
                }
            }
        } else {
            if diag.is_none() {
                diag = Some(Diagnostic::error(
                    "Invalid property access",
                    format!("unexpected character in '{text}'"),
                    Some(Range::new(pos, pos.advance(rest))),
                ));
            }
            break;
        }
    }

    let end = start.advance(text);
    (
        PropertyAccess {
            accessors,
            range: Range::new(start, end),
            text: text.to_string(),
        },
        diag,
    )
}

fn ident_len(s: &str) -> usize {
    s.char_indices()
        .find(|(_, c)| matches!(c, '.' | '[' | ']'))
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

/// Parse one `[...]` subscript at the head of `rest`. Returns the accessor
/// and the number of bytes consumed, including both brackets.
fn parse_subscript(rest: &str, pos: Pos) -> Result<(PropertyAccessor, usize), Diagnostic> {
    debug_assert!(rest.starts_with('['));
    let close = rest.find(']').ok_or_else(|| {
        Diagnostic::error(
            "Invalid property access",
            format!("missing ']' in '{rest}'"),
            Some(Range::new(pos, pos.advance(rest))),
        )
    })?;
    let body = &rest[1..close];
    let consumed = close + 1;
    let range = Range::new(pos, pos.advance(&rest[..consumed]));

    if let Some(quoted) = body
        .strip_prefix('"')
        .and_then(|b| b.strip_suffix('"'))
        .or_else(|| body.strip_prefix('\'').and_then(|b| b.strip_suffix('\'')))
    {
        return Ok((
            PropertyAccessor::StringIndex {
                key: quoted.to_string(),
                range,
            },
            consumed,
        ));
    }
    match body.trim().parse::<i64>() {
        Ok(index) => Ok((PropertyAccessor::IntIndex { index, range }, consumed)),
        Err(_) => Err(Diagnostic::error(
            "Invalid property access",
            format!("subscript '{body}' is neither an integer nor a quoted string"),
            Some(range),
        )),
    }
}
