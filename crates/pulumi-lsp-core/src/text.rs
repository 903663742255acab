//! A thread-safe text document designed to handle incremental updates.
//!
//! The document is an ordered list of logical lines split on LF. Edits arrive
//! as LSP content changes whose positions count UTF-16 code units; the buffer
//! converts to byte offsets per line before splicing. Readers take a shared
//! lock; the URI and language id are immutable and read lock-free.

use std::sync::RwLock;

use thiserror::Error;

use crate::position::Range;

/// An incremental content change. `range: None` replaces the whole buffer.
#[derive(Debug, Clone)]
pub struct ContentChange {
    pub range: Option<Range>,
    pub text: String,
}

impl ContentChange {
    pub fn full(text: impl Into<String>) -> Self {
        Self {
            range: None,
            text: text.into(),
        }
    }

    pub fn edit(range: Range, text: impl Into<String>) -> Self {
        Self {
            range: Some(range),
            text: text.into(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TextError {
    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error("line index {index} out of bounds ({count} lines)")]
    LineOutOfBounds { index: usize, count: usize },
}

/// A line-indexed document buffer.
#[derive(Debug)]
pub struct Document {
    uri: String,
    language_id: String,
    state: RwLock<State>,
}

#[derive(Debug)]
struct State {
    lines: Vec<String>,
    version: i32,
}

impl Document {
    pub fn new(
        uri: impl Into<String>,
        language_id: impl Into<String>,
        text: &str,
        version: i32,
    ) -> Self {
        Self {
            uri: uri.into(),
            language_id: language_id.into(),
            state: RwLock::new(State {
                lines: split_lines(text),
                version,
            }),
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn language_id(&self) -> &str {
        &self.language_id
    }

    pub fn version(&self) -> i32 {
        self.state.read().unwrap().version
    }

    /// Apply changes in order, bumping the version. Fails on the first
    /// invalid range, leaving earlier changes applied.
    pub fn apply(&self, changes: &[ContentChange], version: i32) -> Result<(), TextError> {
        let mut state = self.state.write().unwrap();
        for change in changes {
            apply_change(&mut state.lines, change)?;
        }
        state.version = version;
        Ok(())
    }

    /// An immutable snapshot of the full text, usable by analysis steps
    /// without holding the lock.
    pub fn snapshot(&self) -> String {
        self.state.read().unwrap().lines.join("\n")
    }

    /// Alias for [`Document::snapshot`].
    pub fn text(&self) -> String {
        self.snapshot()
    }

    pub fn line_count(&self) -> usize {
        self.state.read().unwrap().lines.len()
    }

    pub fn line(&self, index: usize) -> Result<String, TextError> {
        let state = self.state.read().unwrap();
        state
            .lines
            .get(index)
            .cloned()
            .ok_or(TextError::LineOutOfBounds {
                index,
                count: state.lines.len(),
            })
    }

    /// The substring covered by `range`; multi-line windows join with LF.
    pub fn window(&self, range: Range) -> Result<String, TextError> {
        if range.end < range.start {
            return Err(TextError::InvalidRange(format!(
                "start {:?} is past end {:?}",
                range.start, range.end
            )));
        }
        let state = self.state.read().unwrap();
        let lines = &state.lines;
        let start_line = line_at(lines, range.start.line)?;
        let end_line = line_at(lines, range.end.line)?;
        let start_byte = utf16_to_byte(start_line, range.start.character)?;
        let end_byte = utf16_to_byte(end_line, range.end.character)?;
        if range.start.line == range.end.line {
            return Ok(start_line[start_byte..end_byte].to_string());
        }
        let mut out = String::from(&start_line[start_byte..]);
        for line in &lines[range.start.line as usize + 1..range.end.line as usize] {
            out.push('\n');
            out.push_str(line);
        }
        out.push('\n');
        out.push_str(&end_line[..end_byte]);
        Ok(out)
    }
}

fn split_lines(text: &str) -> Vec<String> {
    // `str::split` keeps a trailing empty segment, preserving the invariant
    // that a document always has at least one line.
    text.split('\n').map(str::to_string).collect()
}

fn line_at(lines: &[String], index: u32) -> Result<&String, TextError> {
    lines.get(index as usize).ok_or(TextError::LineOutOfBounds {
        index: index as usize,
        count: lines.len(),
    })
}

/// Convert a UTF-16 column to a byte offset within `line`. A column equal to
/// the line's UTF-16 length maps to the end of the line.
fn utf16_to_byte(line: &str, character: u32) -> Result<usize, TextError> {
    let mut units = 0u32;
    if character == 0 {
        return Ok(0);
    }
    for (byte, c) in line.char_indices() {
        if units == character {
            return Ok(byte);
        }
        units += c.len_utf16() as u32;
        if units > character {
            return Err(TextError::InvalidRange(format!(
                "character {character} splits a surrogate pair"
            )));
        }
    }
    if units == character {
        return Ok(line.len());
    }
    Err(TextError::InvalidRange(format!(
        "character {character} out of bounds on a line of {units} UTF-16 units"
    )))
}

fn apply_change(lines: &mut Vec<String>, change: &ContentChange) -> Result<(), TextError> {
    let Some(range) = change.range else {
        *lines = split_lines(&change.text);
        return Ok(());
    };
    if range.end < range.start {
        return Err(TextError::InvalidRange(format!(
            "start {:?} is past end {:?}",
            range.start, range.end
        )));
    }

    let start_line = line_at(lines, range.start.line)?.clone();
    let end_line = line_at(lines, range.end.line)?.clone();
    let start_byte = utf16_to_byte(&start_line, range.start.character)?;
    let end_byte = utf16_to_byte(&end_line, range.end.character)?;

    let replacement: Vec<&str> = change.text.split('\n').collect();
    let s = range.start.line as usize;
    let e = range.end.line as usize;

    if s == e {
        let line = &start_line;
        if replacement.len() == 1 {
            // Replacing within a single line.
            lines[s] = format!("{}{}{}", &line[..start_byte], change.text, &line[end_byte..]);
            return Ok(());
        }
        // A single-line range replaced by multiple lines.
        let mut new_lines = Vec::with_capacity(lines.len() + replacement.len() - 1);
        new_lines.extend_from_slice(&lines[..s]);
        new_lines.push(format!("{}{}", &line[..start_byte], replacement[0]));
        new_lines.extend(replacement[1..replacement.len() - 1].iter().map(|l| l.to_string()));
        new_lines.push(format!(
            "{}{}",
            replacement[replacement.len() - 1],
            &line[end_byte..]
        ));
        new_lines.extend_from_slice(&lines[e + 1..]);
        *lines = new_lines;
        return Ok(());
    }

    if replacement.len() == 1 {
        // Joining a multi-line range into one line.
        let join = format!("{}{}{}", &start_line[..start_byte], change.text, &end_line[end_byte..]);
        let mut new_lines = Vec::with_capacity(lines.len() - (e - s));
        new_lines.extend_from_slice(&lines[..s]);
        new_lines.push(join);
        new_lines.extend_from_slice(&lines[e + 1..]);
        *lines = new_lines;
        return Ok(());
    }

    // Multiple replacement lines across a multi-line range.
    let mut new_lines = Vec::with_capacity(lines.len() - (e - s) + replacement.len() - 1);
    new_lines.extend_from_slice(&lines[..s]);
    new_lines.push(format!("{}{}", &start_line[..start_byte], replacement[0]));
    new_lines.extend(replacement[1..replacement.len() - 1].iter().map(|l| l.to_string()));
    new_lines.push(format!(
        "{}{}",
        replacement[replacement.len() - 1],
        &end_line[end_byte..]
    ));
    new_lines.extend_from_slice(&lines[e + 1..]);
    *lines = new_lines;
    Ok(())
}
