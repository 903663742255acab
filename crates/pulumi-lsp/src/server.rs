//! The tower-lsp server: per-URI document registry and request handlers.
//!
//! Handlers never block on analysis: hover and completion poll the latest
//! pipeline stages and return no answer when analysis has not caught up.
//! Diagnostics flow the other way, from pipeline worker threads back onto
//! the runtime through [`ClientSink`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;
use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer, LspService, Server};

use pulumi_lsp_core::analysis::{AnalysisPipeline, DiagnosticsSink};
use pulumi_lsp_core::bind::BinderOptions;
use pulumi_lsp_core::completion::{completions, CompletionContext};
use pulumi_lsp_core::query::object_at_point;
use pulumi_lsp_core::text::Document;
use pulumi_lsp_core::SchemaCache;
use pulumi_yaml_schema::FileSchemaLoader;

use crate::capabilities::server_capabilities;
use crate::convert;

/// Forwards pipeline diagnostics to the client. Publishes arrive on worker
/// threads; a channel with a single consumer task keeps them in order on
/// their way back onto the runtime.
struct ClientSink {
    tx: tokio::sync::mpsc::UnboundedSender<(Url, Vec<Diagnostic>)>,
}

impl ClientSink {
    fn new(client: Client) -> ClientSink {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<(Url, Vec<Diagnostic>)>();
        tokio::spawn(async move {
            while let Some((uri, diagnostics)) = rx.recv().await {
                client.publish_diagnostics(uri, diagnostics, None).await;
            }
        });
        ClientSink { tx }
    }
}

impl DiagnosticsSink for ClientSink {
    fn publish(&self, uri: &str, diagnostics: Vec<pulumi_lsp_core::Diagnostic>) {
        let Ok(uri) = Url::parse(uri) else {
            tracing::warn!(uri, "cannot publish diagnostics for unparsable uri");
            return;
        };
        let diagnostics: Vec<Diagnostic> =
            diagnostics.iter().map(convert::diagnostic_to_lsp).collect();
        if self.tx.send((uri, diagnostics)).is_err() {
            tracing::warn!("diagnostics consumer is gone");
        }
    }
}

/// One open document: its text buffer and the pipeline for its latest
/// version.
struct DocumentState {
    doc: Arc<Document>,
    pipeline: AnalysisPipeline,
}

/// The Pulumi YAML language server.
pub struct PulumiYamlServer {
    client: Client,
    documents: Mutex<HashMap<Url, DocumentState>>,
    cache: Arc<SchemaCache>,
    sink: Arc<dyn DiagnosticsSink>,
}

impl PulumiYamlServer {
    pub fn new(client: Client, cache: Arc<SchemaCache>) -> Self {
        let sink = Arc::new(ClientSink::new(client.clone()));
        Self {
            client,
            documents: Mutex::new(HashMap::new()),
            cache,
            sink,
        }
    }

    fn start_pipeline(&self, doc: &Document) -> AnalysisPipeline {
        AnalysisPipeline::new(
            doc,
            self.cache.clone(),
            self.sink.clone(),
            BinderOptions::default(),
        )
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for PulumiYamlServer {
    async fn initialize(&self, _params: InitializeParams) -> Result<InitializeResult> {
        Ok(InitializeResult {
            capabilities: server_capabilities(),
            server_info: Some(ServerInfo {
                name: "pulumi-yaml-lsp".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _params: InitializedParams) {
        self.client
            .log_message(MessageType::INFO, "Pulumi YAML language server initialized")
            .await;
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let item = params.text_document;
        tracing::debug!(uri = %item.uri, "opened document");
        let doc = Arc::new(Document::new(
            item.uri.as_str(),
            item.language_id,
            &item.text,
            item.version,
        ));
        let pipeline = self.start_pipeline(&doc);
        self.documents
            .lock()
            .await
            .insert(item.uri, DocumentState { doc, pipeline });
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;
        let version = params.text_document.version;
        let mut documents = self.documents.lock().await;
        let Some(state) = documents.get_mut(&uri) else {
            tracing::warn!(uri = %uri, "change for unopened document");
            return;
        };
        let changes: Vec<_> = params
            .content_changes
            .into_iter()
            .map(convert::change_from_lsp)
            .collect();
        if let Err(err) = state.doc.apply(&changes, version) {
            // The buffer is our only copy of the document; a failed edit
            // means it may be out of sync with the editor.
            tracing::error!(uri = %uri, error = %err, "failed to apply edit");
            self.client
                .log_message(MessageType::ERROR, format!("failed to apply edit: {err}"))
                .await;
            return;
        }
        state.pipeline.cancel();
        state.pipeline = self.start_pipeline(&state.doc);
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        tracing::debug!(uri = %uri, "closed document");
        if let Some(state) = self.documents.lock().await.remove(&uri) {
            state.pipeline.cancel();
        }
        // Diagnostics outlive the pipeline until superseded; clear them.
        self.client.publish_diagnostics(uri, Vec::new(), None).await;
    }

    async fn hover(&self, params: HoverParams) -> Result<Option<Hover>> {
        let uri = params.text_document_position_params.text_document.uri;
        let pos = convert::position_from_lsp(params.text_document_position_params.position);
        let documents = self.documents.lock().await;
        let Some(state) = documents.get(&uri) else {
            return Ok(None);
        };
        let object = match object_at_point(&state.pipeline, pos) {
            Ok(Some(object)) => object,
            // Not ready or nothing there: no answer, the client may re-ask.
            Ok(None) | Err(_) => return Ok(None),
        };
        let Some(markdown) = object.describe() else {
            return Ok(None);
        };
        Ok(Some(Hover {
            contents: HoverContents::Markup(MarkupContent {
                kind: MarkupKind::Markdown,
                value: markdown,
            }),
            range: Some(convert::range_to_lsp(object.range())),
        }))
    }

    async fn completion(&self, params: CompletionParams) -> Result<Option<CompletionResponse>> {
        let uri = params.text_document_position.text_document.uri;
        let pos = convert::position_from_lsp(params.text_document_position.position);
        let documents = self.documents.lock().await;
        let Some(state) = documents.get(&uri) else {
            return Ok(None);
        };
        let ctx = CompletionContext {
            doc: &state.doc,
            pipeline: &state.pipeline,
            cache: &self.cache,
        };
        let items = completions(&ctx, pos);
        if items.is_empty() {
            return Ok(None);
        }
        Ok(Some(CompletionResponse::Array(
            items.into_iter().map(convert::completion_item_to_lsp).collect(),
        )))
    }
}

/// Run the server over stdio until the client disconnects.
pub async fn run_server(schema_paths: Vec<PathBuf>) {
    let loader = Arc::new(FileSchemaLoader::new(schema_paths));
    let cache = Arc::new(SchemaCache::new(loader));

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = LspService::new(move |client| PulumiYamlServer::new(client, cache));
    Server::new(stdin, stdout, socket).serve(service).await;
}
