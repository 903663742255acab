//! Diagnostics in LSP coordinates.
//!
//! Parser diagnostics carry 1-based ranges; [`Diagnostic::from_syntax`]
//! promotes them once at the parse boundary. Everything the binder and schema
//! resolver produce is built in this form directly.

use pulumi_yaml_ast as ast;
pub use pulumi_yaml_ast::Severity;

use crate::position::{promote_range, Range};

/// A publishable diagnostic.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub summary: String,
    pub detail: String,
    pub range: Option<Range>,
    /// A related range, e.g. the previous definition of a duplicated name.
    pub related: Option<Range>,
}

impl Diagnostic {
    pub fn error(summary: impl Into<String>, detail: impl Into<String>, range: Option<Range>) -> Self {
        Self {
            severity: Severity::Error,
            summary: summary.into(),
            detail: detail.into(),
            range,
            related: None,
        }
    }

    pub fn warning(
        summary: impl Into<String>,
        detail: impl Into<String>,
        range: Option<Range>,
    ) -> Self {
        Self {
            severity: Severity::Warning,
            summary: summary.into(),
            detail: detail.into(),
            range,
            related: None,
        }
    }

    pub fn with_related(mut self, related: Option<Range>) -> Self {
        self.related = related;
        self
    }

    /// The full message text, as published to the client.
    pub fn message(&self) -> String {
        if self.detail.is_empty() {
            self.summary.clone()
        } else {
            format!("{}\n{}", self.summary, self.detail)
        }
    }

    /// Promote a parser diagnostic into LSP coordinates.
    pub fn from_syntax(diag: &ast::Diagnostic) -> Self {
        Self {
            severity: diag.severity,
            summary: diag.summary.clone(),
            detail: diag.detail.clone(),
            range: diag.subject.map(promote_range),
            related: diag.context.map(promote_range),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::Position;

    #[test]
    fn syntax_promotion_keeps_severity_and_text() {
        let d = ast::Diagnostic::warning(
            "Something",
            "detail",
            Some(ast::Range::new(ast::Pos::new(1, 1, 0), ast::Pos::new(1, 3, 2))),
        );
        let promoted = Diagnostic::from_syntax(&d);
        assert_eq!(promoted.severity, Severity::Warning);
        assert_eq!(
            promoted.range,
            Some(Range::new(Position::new(0, 0), Position::new(0, 2)))
        );
        assert_eq!(promoted.message(), "Something\ndetail");
    }
}
