//! # openref-core
//!
//! A Rust library for resolving OpenAPI/AsyncAPI reference pointers into
//! cycle-safe, queryable documents.
//!
//! ## Overview
//!
//! openref-core ingests schema documents — JSON or YAML, spread across files
//! and URLs, with internal (`#/...`) and external `$ref` pointers that may be
//! self-referential — and produces a fully resolved representation plus three
//! consumers of it:
//!
//! - **[`resolve`]**: depth-first `$ref` resolution through a chain of
//!   pluggable resolvers, a file resolver, and a local-pointer resolver,
//!   memoized per document identity, degrading gracefully on broken refs
//! - **[`encode`]**: circular-reference-safe encoding for serialization
//!   boundaries (cycles become sentinel strings, shared refs stay expanded)
//! - **[`codegen`]**: identity-preserving source generation (slot table of
//!   placeholder objects filled in place, so cyclic structures reconstruct
//!   with true shared object identity)
//! - **[`transport`]**: a uniform query client over remote HTTP, a shared
//!   worker with id-correlated multiplexing, or direct in-process execution
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use openref_core::{document::Document, encode::encode, resolve::Resolver};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), openref_core::OpenRefError> {
//!     let doc = Document::from_path("./openapi.yaml").await?;
//!     let resolver = Resolver::new();
//!
//!     // Resolve all $ref pointers (memoized per document).
//!     let resolved = resolver.resolve(&doc).await?;
//!
//!     // Serialize safely even if the document is cyclic.
//!     let safe = encode(&resolved);
//!     println!("{}", serde_json::to_string_pretty(&safe).unwrap());
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **default**: resolution, encoding, code generation, query client
//! - **service**: HTTP query endpoint (axum), the server half of remote mode

pub mod codegen;
pub mod config;
pub mod document;
pub mod encode;
pub mod error;
pub mod pointer;
pub mod resolve;
#[cfg(feature = "service")]
pub mod service;
pub mod transport;

pub use error::*;
