//! # pulumi-lsp-core
//!
//! The document analysis engine behind the Pulumi YAML language server.
//!
//! Transport-agnostic: nothing in here knows about JSON-RPC. The `pulumi-lsp`
//! crate wires these pieces to tower-lsp.
//!
//! ## Architecture
//!
//! ```text
//! didChange ──▶ Document (text buffer) ──▶ AnalysisPipeline
//!                                            parse ──▶ bind ──▶ schematize
//!                                              │         │          │
//!                                              └────── publish diagnostics
//!
//! hover/completion ──▶ try_get latest stage ──▶ object_at_point / completion
//!                                               (structural walker fallback)
//! ```
//!
//! Each edit cancels the previous pipeline and starts a new one; stages are
//! [`step::Step`] futures rooted in a per-document cancellation scope. The
//! process-wide [`cache::SchemaCache`] mediates slow package-schema loads.

pub mod analysis;
pub mod bind;
pub mod cache;
pub mod completion;
pub mod describe;
pub mod diagnostic;
pub mod position;
pub mod query;
pub mod step;
pub mod text;
pub mod walker;

#[cfg(test)]
pub(crate) mod testutil;

pub use analysis::{AnalysisPipeline, DiagnosticsSink};
pub use bind::{BinderOptions, Decl, DeclHandle};
pub use cache::SchemaCache;
pub use diagnostic::Diagnostic;
pub use position::{Position, Range};
pub use text::{ContentChange, Document};
