//! Language server for Pulumi YAML templates.
//!
//! This crate wraps the transport-agnostic analysis engine in
//! `pulumi-lsp-core` with the tower-lsp framework:
//!
//! - `server.rs`: the `LanguageServer` implementation and per-URI
//!   document registry
//! - `capabilities.rs`: capability negotiation
//! - `convert.rs`: core to `lsp_types` conversions
//!
//! The server speaks framed JSON-RPC over stdin/stdout; run it with
//! [`run_server`].

pub mod capabilities;
pub mod convert;
pub mod server;

pub use server::run_server;
