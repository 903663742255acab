//! Conversions between core types and `lsp_types`.

use pulumi_lsp_core::completion::{CompletionItem, CompletionItemKind};
use pulumi_lsp_core::diagnostic::Severity;
use pulumi_lsp_core::text::ContentChange;
use pulumi_lsp_core::{Diagnostic, Position, Range};
use tower_lsp::lsp_types;

pub fn position_from_lsp(pos: lsp_types::Position) -> Position {
    Position::new(pos.line, pos.character)
}

pub fn position_to_lsp(pos: Position) -> lsp_types::Position {
    lsp_types::Position::new(pos.line, pos.character)
}

pub fn range_from_lsp(range: lsp_types::Range) -> Range {
    Range::new(position_from_lsp(range.start), position_from_lsp(range.end))
}

pub fn range_to_lsp(range: Range) -> lsp_types::Range {
    lsp_types::Range::new(position_to_lsp(range.start), position_to_lsp(range.end))
}

pub fn change_from_lsp(change: lsp_types::TextDocumentContentChangeEvent) -> ContentChange {
    ContentChange {
        range: change.range.map(range_from_lsp),
        text: change.text,
    }
}

pub fn severity_to_lsp(severity: Severity) -> lsp_types::DiagnosticSeverity {
    match severity {
        Severity::Error => lsp_types::DiagnosticSeverity::ERROR,
        Severity::Warning => lsp_types::DiagnosticSeverity::WARNING,
        Severity::Information => lsp_types::DiagnosticSeverity::INFORMATION,
    }
}

pub fn diagnostic_to_lsp(diag: &Diagnostic) -> lsp_types::Diagnostic {
    lsp_types::Diagnostic {
        range: diag.range.map(range_to_lsp).unwrap_or_default(),
        severity: Some(severity_to_lsp(diag.severity)),
        source: Some("pulumi-yaml".to_string()),
        message: diag.message(),
        ..lsp_types::Diagnostic::default()
    }
}

pub fn completion_kind_to_lsp(kind: CompletionItemKind) -> lsp_types::CompletionItemKind {
    use lsp_types::CompletionItemKind as Lsp;
    match kind {
        CompletionItemKind::Text => Lsp::TEXT,
        CompletionItemKind::Value => Lsp::VALUE,
        CompletionItemKind::Class => Lsp::CLASS,
        CompletionItemKind::Interface => Lsp::INTERFACE,
        CompletionItemKind::Module => Lsp::MODULE,
        CompletionItemKind::Function => Lsp::FUNCTION,
        CompletionItemKind::Enum => Lsp::ENUM,
        CompletionItemKind::Variable => Lsp::VARIABLE,
        CompletionItemKind::File => Lsp::FILE,
        CompletionItemKind::Field => Lsp::FIELD,
        CompletionItemKind::Keyword => Lsp::KEYWORD,
    }
}

pub fn completion_item_to_lsp(item: CompletionItem) -> lsp_types::CompletionItem {
    lsp_types::CompletionItem {
        label: item.label,
        kind: item.kind.map(completion_kind_to_lsp),
        detail: item.detail,
        documentation: item.documentation.map(lsp_types::Documentation::String),
        insert_text: item.insert_text,
        insert_text_format: Some(lsp_types::InsertTextFormat::PLAIN_TEXT),
        insert_text_mode: Some(lsp_types::InsertTextMode::AS_IS),
        filter_text: item.filter_text,
        sort_text: item.sort_text,
        commit_characters: if item.commit_characters.is_empty() {
            None
        } else {
            Some(item.commit_characters)
        },
        deprecated: item.deprecated.then_some(true),
        ..lsp_types::CompletionItem::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges_round_trip() {
        let lsp = lsp_types::Range::new(
            lsp_types::Position::new(1, 2),
            lsp_types::Position::new(3, 4),
        );
        assert_eq!(range_to_lsp(range_from_lsp(lsp)), lsp);
    }

    #[test]
    fn diagnostics_join_summary_and_detail() {
        let diag = Diagnostic::error("Summary", "Detail", None);
        let lsp = diagnostic_to_lsp(&diag);
        assert_eq!(lsp.message, "Summary\nDetail");
        assert_eq!(lsp.severity, Some(lsp_types::DiagnosticSeverity::ERROR));
        assert_eq!(lsp.source.as_deref(), Some("pulumi-yaml"));
    }
}
