//! The per-document analysis pipeline: parse → bind → schematize.
//!
//! Stages are [`Step`]s chained under one cancellation scope. Each stage
//! publishes the cumulative diagnostic set for the document through a
//! [`DiagnosticsSink`]; every publish supersedes the previous one, so an
//! empty set clears stale diagnostics. Starting a new pipeline for a
//! document requires cancelling the old one first; queries then read
//! whichever stage results are still available.
//!
//! A panicking stage is downgraded to a single internal-error diagnostic;
//! the document stays queryable against the last successful stage.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

use pulumi_yaml_ast::{load_template, Template};

use crate::bind::{diags, BinderOptions, Decl, DeclHandle};
use crate::cache::SchemaCache;
use crate::diagnostic::Diagnostic;
use crate::step::{CancelScope, Step, StepResult};
use crate::text::Document;

/// Receives diagnostic publications. The LSP layer forwards these to the
/// client; tests record them.
pub trait DiagnosticsSink: Send + Sync {
    fn publish(&self, uri: &str, diagnostics: Vec<Diagnostic>);
}

/// The parse stage's result: the template (absent on unreadable input) plus
/// the promoted syntax diagnostics.
pub type ParseResult = (Option<Arc<Template>>, Arc<Vec<Diagnostic>>);

/// Collects the cumulative diagnostic set and hands it to the sink. The
/// collect-and-send is serialized so publications for the document stay
/// totally ordered even though stages resolve on different threads.
struct Publisher {
    uri: String,
    parsed: Step<ParseResult>,
    sink: Arc<dyn DiagnosticsSink>,
    order: std::sync::Mutex<()>,
}

impl Publisher {
    fn publish(&self, decl: Option<&DeclHandle>, extra: Option<Diagnostic>) {
        let _ordered = self.order.lock().unwrap();
        let mut all = Vec::new();
        if let StepResult::Ready((_, parse_diags)) = self.parsed.try_get() {
            all.extend(parse_diags.iter().cloned());
        }
        if let Some(decl) = decl {
            // A panicking schematize stage poisons the lock; the bound data
            // underneath is still publishable.
            let decl = decl.read().unwrap_or_else(|poisoned| poisoned.into_inner());
            all.extend(decl.diags().iter().cloned());
        }
        all.extend(extra);
        tracing::debug!(uri = %self.uri, count = all.len(), "publishing diagnostics");
        self.sink.publish(&self.uri, all);
    }
}

/// A handle to one document version's analysis.
pub struct AnalysisPipeline {
    scope: CancelScope,
    parsed: Step<ParseResult>,
    bound: Step<DeclHandle>,
}

impl AnalysisPipeline {
    /// Start analyzing a snapshot of `document`. The pipeline owns a fresh
    /// cancellation scope; cancel it before starting a successor.
    pub fn new(
        document: &Document,
        cache: Arc<SchemaCache>,
        sink: Arc<dyn DiagnosticsSink>,
        options: BinderOptions,
    ) -> AnalysisPipeline {
        let uri = document.uri().to_string();
        let text = document.text();
        let scope = CancelScope::new();
        tracing::debug!(uri = %uri, "starting analysis pipeline");

        let parse_uri = uri.clone();
        let parsed: Step<ParseResult> = Step::spawn(&scope, move |_| {
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                let (template, syntax_diags) = load_template(&parse_uri, &text);
                let promoted: Vec<Diagnostic> =
                    syntax_diags.iter().map(Diagnostic::from_syntax).collect();
                (template.map(Arc::new), Arc::new(promoted))
            }));
            match outcome {
                Ok(result) => Some(result),
                Err(_) => Some((
                    None,
                    Arc::new(vec![diags::internal_error("the parser panicked")]),
                )),
            }
        });

        let publisher = Arc::new(Publisher {
            uri,
            parsed: parsed.clone(),
            sink,
            order: std::sync::Mutex::new(()),
        });

        {
            let publisher = publisher.clone();
            parsed.after(move |_| publisher.publish(None, None));
        }

        let bound: Step<DeclHandle> = {
            let publisher = publisher.clone();
            parsed.then(move |(template, _)| {
                let template = template?;
                match catch_unwind(AssertUnwindSafe(|| Decl::new(&template, options))) {
                    Ok(decl) => Some(Arc::new(RwLock::new(decl))),
                    Err(_) => {
                        publisher.publish(None, Some(diags::internal_error("the binder panicked")));
                        None
                    }
                }
            })
        };

        {
            let publisher = publisher.clone();
            bound.after(move |decl| publisher.publish(Some(&decl), None));
        }

        let schematized: Step<DeclHandle> = {
            let publisher = publisher.clone();
            bound.then(move |decl| {
                let outcome = catch_unwind(AssertUnwindSafe(|| {
                    decl.write().unwrap().load_schema(&cache);
                }));
                match outcome {
                    Ok(()) => Some(decl),
                    Err(_) => {
                        publisher.publish(
                            Some(&decl),
                            Some(diags::internal_error("schema resolution panicked")),
                        );
                        None
                    }
                }
            })
        };

        schematized.after(move |decl| publisher.publish(Some(&decl), None));

        AnalysisPipeline {
            scope,
            parsed,
            bound,
        }
    }

    /// Cancel this pipeline. Pending stages and publishes are abandoned.
    pub fn cancel(&self) {
        self.scope.cancel();
    }

    /// The parse stage, for positional queries.
    pub fn parsed(&self) -> &Step<ParseResult> {
        &self.parsed
    }

    /// The bind stage. The handle's contents gain schema attachments when
    /// the schematize stage completes.
    pub fn bound(&self) -> &Step<DeclHandle> {
        &self.bound
    }
}
