//! Integration tests for reference resolution against real files on disk:
//! sibling file refs, nested external refs, broken auxiliary files, and the
//! per-document resolution cache.

mod common;

use openref_core::{
    config::ClientConfig,
    document::Document,
    resolve::{Resolver, REF_PATH_KEY, UNRESOLVED_KEY},
};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test]
async fn file_reference_inlines_sibling_yaml() {
    common::init_logging();
    let temp_dir = TempDir::new().unwrap();
    let api_path = common::create_spec_dir(&temp_dir);

    let doc = Document::from_path(&api_path).await.unwrap();
    let resolved = Resolver::new().resolve(&doc).await.unwrap();

    let owner = &resolved["components"]["schemas"]["Account"]["properties"]["owner"];
    assert_eq!(owner["type"], "object");
    assert_eq!(owner["properties"]["name"]["type"], "string");
    // The marker carries the file-qualified form of the ref.
    let marker = owner[REF_PATH_KEY].as_str().unwrap();
    assert!(marker.ends_with("user.yaml#/User"), "got marker '{marker}'");
}

#[tokio::test]
async fn external_file_with_nested_local_ref_resolves_against_its_own_root() {
    common::init_logging();
    let temp_dir = TempDir::new().unwrap();
    let spec_dir = temp_dir.path().join("specs");
    std::fs::create_dir(&spec_dir).unwrap();

    std::fs::write(
        spec_dir.join("api.yaml"),
        "openapi: 3.1.0\npaths:\n  thing:\n    $ref: \"./lib.yaml#/Thing\"\n",
    )
    .unwrap();
    // Thing references Part locally; Part only exists in lib.yaml.
    std::fs::write(
        spec_dir.join("lib.yaml"),
        "Thing:\n  properties:\n    part:\n      $ref: \"#/Part\"\nPart:\n  type: integer\n",
    )
    .unwrap();

    let doc = Document::from_path(spec_dir.join("api.yaml")).await.unwrap();
    let resolved = Resolver::new().resolve(&doc).await.unwrap();
    assert_eq!(
        resolved["paths"]["thing"]["properties"]["part"]["type"],
        "integer"
    );
}

#[tokio::test]
async fn same_named_pointers_in_different_files_stay_distinct() {
    common::init_logging();
    let temp_dir = TempDir::new().unwrap();
    let spec_dir = temp_dir.path().join("specs");
    std::fs::create_dir(&spec_dir).unwrap();

    // a.yaml and b.yaml each define their own `P`. While a.yaml's P is being
    // expanded, b.yaml's `#/P` must resolve to b.yaml's integer schema, not
    // get mistaken for a cycle back into a.yaml's P.
    std::fs::write(
        spec_dir.join("api.yaml"),
        "openapi: 3.1.0\na:\n  $ref: \"./a.yaml#/X\"\n",
    )
    .unwrap();
    std::fs::write(
        spec_dir.join("a.yaml"),
        "X:\n  p:\n    $ref: \"#/P\"\nP:\n  q:\n    $ref: \"./b.yaml#/Y\"\n",
    )
    .unwrap();
    std::fs::write(
        spec_dir.join("b.yaml"),
        "Y:\n  r:\n    $ref: \"#/P\"\nP:\n  type: integer\n",
    )
    .unwrap();

    let doc = Document::from_path(spec_dir.join("api.yaml")).await.unwrap();
    let resolved = Resolver::new().resolve(&doc).await.unwrap();

    assert_eq!(resolved["a"]["p"]["q"]["r"]["type"], "integer");
    // The two same-spelled pointers carry distinct qualified markers.
    assert_ne!(
        resolved["a"]["p"][REF_PATH_KEY],
        resolved["a"]["p"]["q"]["r"][REF_PATH_KEY]
    );
}

#[tokio::test]
async fn config_base_dir_feeds_file_resolution() {
    common::init_logging();
    let temp_dir = TempDir::new().unwrap();
    let api_path = common::create_spec_dir(&temp_dir);

    let config = ClientConfig {
        base_dir: api_path.parent().map(|p| p.to_path_buf()),
        ..ClientConfig::default()
    };
    // An inline document has no directory of its own; the configured base
    // directory is what makes the file ref resolvable.
    let doc = Document::from_value(json!({"owner": {"$ref": "./user.yaml#/User"}}));
    let resolved = Resolver::from_config(&config).resolve(&doc).await.unwrap();
    assert_eq!(resolved["owner"]["type"], "object");
    assert_eq!(resolved["owner"]["properties"]["name"]["type"], "string");
}

#[tokio::test]
async fn json_sibling_files_are_sniffed_as_json() {
    common::init_logging();
    let temp_dir = TempDir::new().unwrap();
    let spec_dir = temp_dir.path().join("specs");
    std::fs::create_dir(&spec_dir).unwrap();

    std::fs::write(
        spec_dir.join("api.yaml"),
        "openapi: 3.1.0\nx:\n  $ref: \"./common.json#/Shared\"\n",
    )
    .unwrap();
    std::fs::write(
        spec_dir.join("common.json"),
        r#"{"Shared": {"type": "boolean"}}"#,
    )
    .unwrap();

    let doc = Document::from_path(spec_dir.join("api.yaml")).await.unwrap();
    let resolved = Resolver::new().resolve(&doc).await.unwrap();
    assert_eq!(resolved["x"]["type"], "boolean");
}

#[tokio::test]
async fn malformed_auxiliary_file_degrades_one_subtree() {
    common::init_logging();
    let temp_dir = TempDir::new().unwrap();
    let spec_dir = temp_dir.path().join("specs");
    std::fs::create_dir(&spec_dir).unwrap();

    std::fs::write(
        spec_dir.join("api.yaml"),
        "openapi: 3.1.0\ngood:\n  type: string\nbad:\n  $ref: \"./broken.yaml#/X\"\n",
    )
    .unwrap();
    std::fs::write(spec_dir.join("broken.yaml"), ":\n  - [not yaml").unwrap();

    let doc = Document::from_path(spec_dir.join("api.yaml")).await.unwrap();
    let resolved = Resolver::new().resolve(&doc).await.unwrap();

    // The broken subtree carries an explicit unresolved marker...
    assert_eq!(resolved["bad"][UNRESOLVED_KEY], "./broken.yaml#/X");
    // ...while the rest of the document resolved normally.
    assert_eq!(resolved["good"]["type"], "string");
}

#[tokio::test]
async fn missing_referenced_file_degrades_one_subtree() {
    common::init_logging();
    let temp_dir = TempDir::new().unwrap();
    let spec_dir = temp_dir.path().join("specs");
    std::fs::create_dir(&spec_dir).unwrap();
    std::fs::write(
        spec_dir.join("api.yaml"),
        "openapi: 3.1.0\nx:\n  $ref: \"./absent.yaml#/X\"\n",
    )
    .unwrap();

    let doc = Document::from_path(spec_dir.join("api.yaml")).await.unwrap();
    let resolved = Resolver::new().resolve(&doc).await.unwrap();
    assert_eq!(resolved["x"][UNRESOLVED_KEY], "./absent.yaml#/X");
}

#[tokio::test]
async fn cache_is_shared_under_concurrent_first_access() {
    common::init_logging();
    let temp_dir = TempDir::new().unwrap();
    let api_path = common::create_spec_dir(&temp_dir);

    let doc = Arc::new(Document::from_path(&api_path).await.unwrap());
    let resolver = Arc::new(Resolver::new());

    // Many concurrent first callers must share one resolution pass and all
    // end up holding the same cached instance.
    let mut handles = Vec::new();
    for _ in 0..8 {
        let resolver = resolver.clone();
        let doc = doc.clone();
        handles.push(tokio::spawn(
            async move { resolver.resolve(&doc).await.unwrap() },
        ));
    }
    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }
    for pair in results.windows(2) {
        assert!(Arc::ptr_eq(&pair[0], &pair[1]));
    }
}

#[tokio::test]
async fn resolved_documents_carry_no_remaining_refs() {
    common::init_logging();
    let temp_dir = TempDir::new().unwrap();
    let api_path = common::create_spec_dir(&temp_dir);

    let doc = Document::from_path(&api_path).await.unwrap();
    let resolved = Resolver::new().resolve(&doc).await.unwrap();
    let text = serde_json::to_string(&*resolved).unwrap();
    assert!(!text.contains("\"$ref\""));
}
