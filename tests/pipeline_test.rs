//! End-to-end pipeline tests: load a document from disk, resolve its
//! references, encode it for a serialization boundary, and generate
//! identity-preserving source from the raw document.

mod common;

use openref_core::{
    codegen::generate,
    document::Document,
    encode::{encode, CIRCULAR_REF_PREFIX},
    resolve::Resolver,
    transport::{DocumentExecutor, QueryExecutor},
};
use serde_json::json;
use tempfile::TempDir;

#[tokio::test]
async fn resolved_cyclic_document_encodes_and_queries() {
    common::init_logging();
    let temp_dir = TempDir::new().unwrap();
    let spec_dir = temp_dir.path().join("specs");
    std::fs::create_dir(&spec_dir).unwrap();

    std::fs::write(
        spec_dir.join("api.yaml"),
        r##"openapi: 3.1.0
components:
  schemas:
    Tree:
      type: object
      properties:
        label:
          type: string
        left:
          $ref: "#/components/schemas/Tree"
        right:
          $ref: "#/components/schemas/Tree"
"##,
    )
    .unwrap();

    let doc = Document::from_path(spec_dir.join("api.yaml")).await.unwrap();
    let resolved = Resolver::new().resolve(&doc).await.unwrap();

    // The cyclic document still serializes finitely after encoding.
    let safe = encode(&resolved);
    let text = serde_json::to_string(&safe).unwrap();
    assert!(text.contains(&format!("{CIRCULAR_REF_PREFIX}Tree")));

    // And the resolved form answers pointer queries through the executor.
    let executor = DocumentExecutor::new(resolved);
    let result = executor
        .execute("/components/schemas/Tree/type", None)
        .await
        .unwrap();
    assert_eq!(result.data, Some(json!("object")));
}

#[tokio::test]
async fn generated_module_covers_every_ref_site() {
    common::init_logging();
    let temp_dir = TempDir::new().unwrap();
    let api_path = common::create_spec_dir(&temp_dir);

    let doc = Document::from_path(&api_path).await.unwrap();
    let source = generate(&doc.value).unwrap();

    // The sibling-file ref gets a slot even though its target lives outside
    // this document, and the document routes through it.
    assert!(source.contains("// ./user.yaml#/User"));
    assert!(source.contains("\"owner\": slots[0]"));
    assert!(source.contains("export { document as default, slots };"));
}
