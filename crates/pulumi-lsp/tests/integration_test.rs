//! Integration tests for the Pulumi YAML language server.
//!
//! These tests spawn the server binary and speak framed JSON-RPC over its
//! stdio, the way an editor would. Package schemas come from
//! `tests/testdata`.

use std::io::{BufRead, BufReader, Read, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::time::{Duration, Instant};

fn make_request(id: i64, method: &str, params: serde_json::Value) -> String {
    let request = serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
        "params": params
    });
    let content = serde_json::to_string(&request).unwrap();
    format!("Content-Length: {}\r\n\r\n{}", content.len(), content)
}

fn make_notification(method: &str, params: serde_json::Value) -> String {
    let request = serde_json::json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params
    });
    let content = serde_json::to_string(&request).unwrap();
    format!("Content-Length: {}\r\n\r\n{}", content.len(), content)
}

fn read_message(reader: &mut BufReader<std::process::ChildStdout>) -> serde_json::Value {
    let mut header_line = String::new();
    reader
        .read_line(&mut header_line)
        .expect("failed to read response header");

    let content_length: usize = header_line
        .trim()
        .strip_prefix("Content-Length: ")
        .expect("missing Content-Length header")
        .parse()
        .expect("invalid Content-Length");

    let mut empty_line = String::new();
    reader
        .read_line(&mut empty_line)
        .expect("failed to read header terminator");

    let mut content = vec![0u8; content_length];
    reader
        .read_exact(&mut content)
        .expect("failed to read message body");
    serde_json::from_str(&String::from_utf8(content).expect("invalid UTF-8"))
        .expect("invalid JSON body")
}

struct LspTestHarness {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<std::process::ChildStdout>,
    next_request_id: i64,
}

impl LspTestHarness {
    fn new() -> Self {
        let binary = Self::build_and_get_binary_path();
        let testdata = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/testdata");

        let mut child = Command::new(&binary)
            .arg("--schemas")
            .arg(&testdata)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("failed to spawn pulumi-yaml-lsp");

        let stdin = child.stdin.take().expect("failed to take stdin");
        let stdout = child.stdout.take().expect("failed to take stdout");
        Self {
            child,
            stdin,
            reader: BufReader::new(stdout),
            next_request_id: 1,
        }
    }

    fn build_and_get_binary_path() -> PathBuf {
        let manifest_dir = env!("CARGO_MANIFEST_DIR");
        let workspace_root = std::path::Path::new(manifest_dir)
            .parent()
            .unwrap()
            .parent()
            .unwrap();

        let status = Command::new("cargo")
            .args(["build", "-p", "pulumi-lsp"])
            .current_dir(workspace_root)
            .status()
            .expect("failed to run cargo build");
        assert!(status.success(), "failed to build pulumi-lsp");

        let binary = workspace_root
            .join("target")
            .join("debug")
            .join("pulumi-yaml-lsp");
        assert!(binary.exists(), "binary not found at {binary:?}");
        binary
    }

    fn request(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        let id = self.next_request_id;
        self.next_request_id += 1;

        let request = make_request(id, method, params);
        self.stdin
            .write_all(request.as_bytes())
            .expect("failed to write request");
        self.stdin.flush().expect("failed to flush stdin");

        loop {
            let response = read_message(&mut self.reader);
            if response.get("id").and_then(|i| i.as_i64()) == Some(id) {
                return response;
            }
            // Skip interleaved notifications.
        }
    }

    fn notify(&mut self, method: &str, params: serde_json::Value) {
        let notification = make_notification(method, params);
        self.stdin
            .write_all(notification.as_bytes())
            .expect("failed to write notification");
        self.stdin.flush().expect("failed to flush stdin");
    }

    fn initialize(&mut self) -> serde_json::Value {
        let response = self.request(
            "initialize",
            serde_json::json!({
                "processId": std::process::id(),
                "capabilities": {},
                "rootUri": null
            }),
        );
        self.notify("initialized", serde_json::json!({}));
        response
    }

    fn open_document(&mut self, uri: &str, content: &str, version: i64) {
        self.notify(
            "textDocument/didOpen",
            serde_json::json!({
                "textDocument": {
                    "uri": uri,
                    "languageId": "yaml",
                    "version": version,
                    "text": content
                }
            }),
        );
    }

    /// Wait for a publishDiagnostics notification for `uri` whose
    /// diagnostics satisfy `pred`.
    fn wait_for_diagnostics(
        &mut self,
        expected_uri: &str,
        timeout: Duration,
        pred: impl Fn(&[serde_json::Value]) -> bool,
    ) -> Vec<serde_json::Value> {
        let start = Instant::now();
        while start.elapsed() < timeout {
            let msg = read_message(&mut self.reader);
            if msg.get("method").and_then(|m| m.as_str())
                != Some("textDocument/publishDiagnostics")
            {
                continue;
            }
            let Some(params) = msg.get("params") else { continue };
            if params.get("uri").and_then(|u| u.as_str()) != Some(expected_uri) {
                continue;
            }
            let diagnostics: Vec<serde_json::Value> = params
                .get("diagnostics")
                .and_then(|d| d.as_array())
                .cloned()
                .unwrap_or_default();
            if pred(&diagnostics) {
                return diagnostics;
            }
        }
        panic!("timed out waiting for matching diagnostics for {expected_uri}");
    }

    /// Poll hover until the server has analysis to answer with.
    fn hover_until_some(
        &mut self,
        uri: &str,
        line: u32,
        character: u32,
        timeout: Duration,
    ) -> serde_json::Value {
        let start = Instant::now();
        while start.elapsed() < timeout {
            let response = self.request(
                "textDocument/hover",
                serde_json::json!({
                    "textDocument": {"uri": uri},
                    "position": {"line": line, "character": character}
                }),
            );
            let result = &response["result"];
            if !result.is_null() {
                return result.clone();
            }
            std::thread::sleep(Duration::from_millis(25));
        }
        panic!("timed out waiting for hover at {line}:{character}");
    }

    fn completion_until_some(
        &mut self,
        uri: &str,
        line: u32,
        character: u32,
        timeout: Duration,
    ) -> Vec<serde_json::Value> {
        let start = Instant::now();
        while start.elapsed() < timeout {
            let response = self.request(
                "textDocument/completion",
                serde_json::json!({
                    "textDocument": {"uri": uri},
                    "position": {"line": line, "character": character}
                }),
            );
            if let Some(items) = response["result"].as_array() {
                if !items.is_empty() {
                    return items.clone();
                }
            }
            std::thread::sleep(Duration::from_millis(25));
        }
        panic!("timed out waiting for completion at {line}:{character}");
    }
}

impl Drop for LspTestHarness {
    fn drop(&mut self) {
        let _ = self.child.kill();
    }
}

fn messages(diagnostics: &[serde_json::Value]) -> Vec<String> {
    diagnostics
        .iter()
        .filter_map(|d| d.get("message").and_then(|m| m.as_str()))
        .map(str::to_string)
        .collect()
}

const TIMEOUT: Duration = Duration::from_secs(20);

// =============================================================================
// Initialization
// =============================================================================

#[test]
fn initialize_advertises_capabilities() {
    let mut harness = LspTestHarness::new();
    let response = harness.initialize();

    let result = &response["result"];
    assert_eq!(result["serverInfo"]["name"], "pulumi-yaml-lsp");
    let caps = &result["capabilities"];
    // Incremental sync.
    assert_eq!(caps["textDocumentSync"]["change"], 2);
    assert_eq!(caps["hoverProvider"], true);
    let triggers = caps["completionProvider"]["triggerCharacters"]
        .as_array()
        .expect("expected trigger characters");
    assert!(triggers.contains(&serde_json::json!(".")));
    assert!(triggers.contains(&serde_json::json!(":")));
}

// =============================================================================
// Diagnostics
// =============================================================================

#[test]
fn unknown_property_is_diagnosed_with_suggestions() {
    let mut harness = LspTestHarness::new();
    harness.initialize();

    let uri = "file:///test/unknown.yaml";
    harness.open_document(
        uri,
        "resources:\n  my:\n    type: ex:index:Bucket\n    properties:\n      nam: hello\n",
        1,
    );

    let diagnostics = harness.wait_for_diagnostics(uri, TIMEOUT, |diags| {
        messages(diags)
            .iter()
            .any(|m| m.contains("Property 'nam' does not exist on ex:index:Bucket"))
    });
    let unknown = diagnostics
        .iter()
        .find(|d| d["message"].as_str().unwrap().contains("'nam'"))
        .unwrap();
    assert_eq!(unknown["severity"], 1);
    assert!(unknown["message"].as_str().unwrap().contains("name"));
}

#[test]
fn unused_variable_warns() {
    let mut harness = LspTestHarness::new();
    harness.initialize();

    let uri = "file:///test/unused.yaml";
    harness.open_document(uri, "variables:\n  foo: bar\n", 1);

    let diagnostics = harness.wait_for_diagnostics(uri, TIMEOUT, |diags| {
        messages(diags).iter().any(|m| m.contains("Variable 'foo' is unused"))
    });
    let unused = diagnostics
        .iter()
        .find(|d| d["message"].as_str().unwrap().contains("unused"))
        .unwrap();
    assert_eq!(unused["severity"], 2);
    // The warning points at the `foo` key.
    assert_eq!(unused["range"]["start"]["line"], 1);
}

#[test]
fn failed_package_load_warns_once_at_the_type() {
    let mut harness = LspTestHarness::new();
    harness.initialize();

    let uri = "file:///test/nope.yaml";
    harness.open_document(uri, "resources:\n  my:\n    type: nope:index:X\n", 1);

    let diagnostics = harness.wait_for_diagnostics(uri, TIMEOUT, |diags| {
        messages(diags)
            .iter()
            .any(|m| m.contains("Failed to load package 'nope'"))
    });
    let failed = diagnostics
        .iter()
        .find(|d| d["message"].as_str().unwrap().contains("Failed to load"))
        .unwrap();
    assert_eq!(failed["severity"], 2);
    assert_eq!(failed["range"]["start"]["line"], 2);
}

#[test]
fn incremental_edit_supersedes_stale_diagnostics() {
    let mut harness = LspTestHarness::new();
    harness.initialize();

    let uri = "file:///test/edit.yaml";
    harness.open_document(
        uri,
        "resources:\n  my:\n    type: ex:index:Bucket\n    properties:\n      x: 1\n",
    1,
    );
    harness.wait_for_diagnostics(uri, TIMEOUT, |diags| {
        messages(diags)
            .iter()
            .any(|m| m.contains("Missing required property 'name'"))
    });

    // Replace `x: 1` with `name: hi` via a range edit.
    harness.notify(
        "textDocument/didChange",
        serde_json::json!({
            "textDocument": {"uri": uri, "version": 2},
            "contentChanges": [{
                "range": {
                    "start": {"line": 4, "character": 6},
                    "end": {"line": 4, "character": 10}
                },
                "text": "name: hi"
            }]
        }),
    );

    // Every subsequent publish replaces the previous set; wait for one
    // without the stale message.
    harness.wait_for_diagnostics(uri, TIMEOUT, |diags| {
        !messages(diags)
            .iter()
            .any(|m| m.contains("Missing required property 'name'"))
    });
}

// =============================================================================
// Hover and completion
// =============================================================================

#[test]
fn hover_on_a_resource_type_describes_it() {
    let mut harness = LspTestHarness::new();
    harness.initialize();

    let uri = "file:///test/hover.yaml";
    harness.open_document(
        uri,
        "resources:\n  my:\n    type: ex:index:Bucket\n    properties:\n      name: hello\n",
        1,
    );

    // Line 2 is `    type: ex:index:Bucket`.
    let hover = harness.hover_until_some(uri, 2, 12, TIMEOUT);
    let value = hover["contents"]["value"].as_str().unwrap();
    assert!(value.contains("# Resource: ex:index:Bucket"), "{value}");
    assert!(value.contains("name"), "{value}");
}

#[test]
fn reference_completion_after_a_dot() {
    let mut harness = LspTestHarness::new();
    harness.initialize();

    let uri = "file:///test/complete.yaml";
    harness.open_document(
        uri,
        "resources:\n  my:\n    type: ex:index:Bucket\n    properties:\n      name: hello\noutputs:\n  o: ${my.}\n",
        1,
    );

    // Line 6 is `  o: ${my.}`; the cursor sits after the dot.
    let items = harness.completion_until_some(uri, 6, 10, TIMEOUT);
    let labels: Vec<&str> = items
        .iter()
        .filter_map(|i| i["label"].as_str())
        .collect();
    for expected in ["arn", "id", "urn", "name"] {
        assert!(labels.contains(&expected), "missing {expected} in {labels:?}");
    }
}
