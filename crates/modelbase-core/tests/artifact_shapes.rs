//! Packaged artifact shapes and the build-write-read cycle.

use std::sync::Arc;

use modelbase_core::{
    load_artifact, read_artifact, write_artifact, BuildPipeline, Catalog, CatalogError,
    JsonFileSource, LayerSource, LoadConfig, StaticSource, SCHEMA_VERSION,
};
use serde_json::json;

#[test]
fn flattened_and_nested_shapes_agree() {
    let nested = load_artifact(json!({
        "schema_version": 1,
        "generated_at": "2024-06-01T00:00:00Z",
        "source_digest": "abc",
        "providers": [
            {"id": "openai", "name": "OpenAI", "models": [
                {"model_id": "gpt-4o", "aliases": ["4o"]},
                {"model_id": "gpt-4"}
            ]},
            {"id": "anthropic", "name": "Anthropic", "models": [{"model_id": "claude-3-opus"}]}
        ]
    }))
    .expect("nested");

    let flat = load_artifact(json!({
        "schema_version": 1,
        "generated_at": "2024-06-01T00:00:00Z",
        "source_digest": "abc",
        "providers": [
            {"id": "openai", "name": "OpenAI"},
            {"id": "anthropic", "name": "Anthropic"}
        ],
        "models": [
            {"provider_id": "openai", "model_id": "gpt-4"},
            {"provider_id": "anthropic", "model_id": "claude-3-opus"},
            {"provider_id": "openai", "model_id": "gpt-4o", "aliases": ["4o"]}
        ]
    }))
    .expect("flat");

    assert_eq!(nested, flat);
    let providers: Vec<_> = flat.providers.iter().map(|p| p.provider.id.as_str()).collect();
    assert_eq!(providers, vec!["anthropic", "openai"]);
}

#[test]
fn flattened_models_create_missing_providers() {
    let dataset = load_artifact(json!({
        "generated_at": "2024-06-01T00:00:00Z",
        "models": [{"provider_id": "groq", "model_id": "llama-3-70b"}]
    }))
    .expect("flat");
    let entry = dataset.provider("groq").expect("groq");
    assert_eq!(entry.provider.name, "groq");
    assert_eq!(entry.models.len(), 1);
}

#[test]
fn malformed_artifacts_are_rejected() {
    let cases = vec![
        json!([]),
        json!({"generated_at": "2024-06-01T00:00:00Z"}),
        json!({"generated_at": "2024-06-01T00:00:00Z", "providers": {}}),
        json!({"generated_at": "2024-06-01T00:00:00Z", "providers": [], "models": [{"model_id": "x"}]}),
        json!({"schema_version": "one", "generated_at": "2024-06-01T00:00:00Z", "providers": []}),
        json!({"schema_version": SCHEMA_VERSION + 1, "generated_at": "2024-06-01T00:00:00Z", "providers": []}),
    ];
    for case in cases {
        let err = load_artifact(case.clone()).expect_err("should be rejected");
        assert!(matches!(err, CatalogError::Artifact(_)), "{case}: {err:?}");
    }
}

#[tokio::test]
async fn built_artifact_reloads_identically() {
    let dir = tempfile::tempdir().expect("tempdir");
    let base_path = dir.path().join("models-dev.json");
    std::fs::write(
        &base_path,
        serde_json::to_string(&json!({"providers": [{"id": "openai", "models": [
            {"id": "gpt-4", "aliases": ["gpt-4-0314"], "tags": ["general"]}
        ]}]}))
        .expect("encode"),
    )
    .expect("write layer");

    let sources: Vec<Box<dyn LayerSource>> = vec![
        Box::new(JsonFileSource::new(&base_path)),
        Box::new(StaticSource::new(
            "overrides",
            json!({"models": [{"provider_id": "openai", "model_id": "gpt-4", "aliases": ["gpt-4-turbo"], "tags": ["fast"]}]}),
        )),
    ];
    let built = BuildPipeline::new()
        .build_from_sources(&sources)
        .await
        .expect("build");
    let names: Vec<_> = built.report.layers.iter().map(|l| l.name.as_str()).collect();
    assert_eq!(names, vec!["models-dev", "overrides"]);

    let artifact = dir.path().join("dist/catalog.json");
    write_artifact(&built.dataset, &artifact).expect("write artifact");
    let reread = read_artifact(&artifact).expect("read artifact");
    assert_eq!(reread, built.dataset);

    let catalog = Catalog::new();
    catalog
        .load(Some(Arc::new(reread)), &LoadConfig::default())
        .expect("load");
    let model = catalog.lookup_spec("openai:gpt-4-turbo").expect("alias");
    assert_eq!(model.aliases, vec!["gpt-4-0314", "gpt-4-turbo"]);
    assert_eq!(model.tags, vec!["general", "fast"]);
}
