//! Shared test utilities for integration tests.
//!
//! Import from integration test files as:
//! ```ignore
//! mod common;
//! ```

use std::path::PathBuf;
use tempfile::TempDir;

/// Initialize tracing for tests, respecting RUST_LOG env var.
///
/// Safe to call multiple times — subsequent calls are no-ops.
#[allow(dead_code)]
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// Create a spec directory with a root document and a referenced sibling file.
///
/// Returns the path to the root document (`<temp_dir>/specs/api.yaml`). The
/// root references `./user.yaml#/User`; user.yaml holds a small User schema.
#[allow(dead_code)]
pub fn create_spec_dir(temp_dir: &TempDir) -> PathBuf {
    let spec_dir = temp_dir.path().join("specs");
    std::fs::create_dir(&spec_dir).unwrap();

    let api = r#"openapi: 3.1.0
info:
  title: Test API
components:
  schemas:
    Account:
      type: object
      properties:
        owner:
          $ref: "./user.yaml#/User"
"#;
    std::fs::write(spec_dir.join("api.yaml"), api).unwrap();

    let user = r#"User:
  type: object
  properties:
    name:
      type: string
"#;
    std::fs::write(spec_dir.join("user.yaml"), user).unwrap();

    spec_dir.join("api.yaml")
}
