//! Load-time behaviour: filtering, lookup, selection and publication.

use std::sync::Arc;

use modelbase_core::{
    BuildPipeline, CanonicalDataset, Catalog, CatalogError, FilterConfig, LoadConfig, LoadOutcome,
    LookupError, ModelKey, ProviderRules, RawLayer, Rules, SelectQuery, Snapshot,
};
use serde_json::json;
use std::collections::BTreeMap;

fn openai_dataset() -> Arc<CanonicalDataset> {
    let output = BuildPipeline::new().build(&[RawLayer::new(
        "base",
        json!({"providers": [
            {"id": "openai", "name": "OpenAI", "models": [
                {"id": "gpt-4", "aliases": ["gpt-4-0314"], "capabilities": {"tools": true}},
                {"id": "gpt-4-0613"},
                {"id": "gpt-4o", "capabilities": {"tools": {"enabled": true, "parallel": true}, "json": {"native": true}}},
                {"id": "dall-e-3", "modalities": {"output": ["image"]}}
            ]},
            {"id": "anthropic", "models": [
                {"id": "claude-3-opus", "capabilities": {"tools": true, "reasoning": true}}
            ]}
        ]}),
    )]);
    Arc::new(output.dataset)
}

fn two_providers() -> Arc<CanonicalDataset> {
    let output = BuildPipeline::new().build(&[RawLayer::new(
        "base",
        json!({"models": [
            {"provider_id": "a", "model_id": "m1"},
            {"provider_id": "b", "model_id": "m2"}
        ]}),
    )]);
    Arc::new(output.dataset)
}

fn per_provider(provider: &str, rules: ProviderRules) -> Rules {
    let mut map = BTreeMap::new();
    map.insert(provider.to_string(), rules);
    Rules::PerProvider(map)
}

// ── Filter precedence ───────────────────────────────────────────────────

#[test]
fn deny_overrides_allow() {
    let config = FilterConfig::default()
        .allow(Rules::provider_patterns("openai", ["gpt-4*"]))
        .deny(Rules::provider_patterns("openai", ["gpt-4-0613"]));
    let snapshot = Snapshot::build(openai_dataset(), &config).expect("snapshot");

    assert!(!snapshot.is_allowed("openai:gpt-4-0613"));
    assert!(snapshot.is_allowed("openai:gpt-4"));
    assert!(snapshot.is_allowed("openai:gpt-4o"));
    assert!(!snapshot.is_allowed("openai:dall-e-3"));
    assert!(!snapshot.is_allowed("anthropic:claude-3-opus"));
}

#[test]
fn regex_patterns_are_anchored() {
    let config = FilterConfig::default().allow(Rules::provider_patterns("openai", ["/gpt-4o?/"]));
    let snapshot = Snapshot::build(openai_dataset(), &config).expect("snapshot");
    assert!(snapshot.is_allowed("openai:gpt-4"));
    assert!(snapshot.is_allowed("openai:gpt-4o"));
    assert!(!snapshot.is_allowed("openai:gpt-4-0613"));
}

// ── Empty allow list ────────────────────────────────────────────────────

#[test]
fn empty_allow_list_admits_whole_provider() {
    let config = FilterConfig::default().allow(per_provider("openai", ProviderRules::Patterns(Vec::new())));
    let snapshot = Snapshot::build(openai_dataset(), &config).expect("snapshot");
    let openai = snapshot.ids().resolve("openai").expect("openai");
    assert_eq!(snapshot.models_of(&openai).len(), 4);
    assert!(!snapshot.is_allowed("anthropic:claude-3-opus"));
}

#[test]
fn all_keyword_matches_empty_list() {
    let from_list = Snapshot::build(
        openai_dataset(),
        &FilterConfig::default().allow(per_provider("openai", ProviderRules::Patterns(Vec::new()))),
    )
    .expect("list");
    let from_keyword = Snapshot::build(
        openai_dataset(),
        &FilterConfig::default().allow(per_provider("openai", ProviderRules::All)),
    )
    .expect("keyword");
    assert_eq!(from_list.digest(), from_keyword.digest());
}

// ── Fail-fast ───────────────────────────────────────────────────────────

#[test]
fn filter_that_matches_nothing_fails_load() {
    let catalog = Catalog::new();
    let config = LoadConfig::default().with_filter(
        FilterConfig::default()
            .allow(Rules::provider_patterns("openai", ["o9*"]))
            .prefer(["openai"]),
    );
    let err = catalog.load(Some(openai_dataset()), &config).expect_err("must fail");
    match err {
        CatalogError::FilterEliminatedAll { summary } => {
            assert!(summary.contains("allow={openai: [o9*]}"), "summary: {summary}");
            assert!(summary.contains("prefer=[openai]"), "summary: {summary}");
        }
        other => panic!("expected FilterEliminatedAll, got {other:?}"),
    }
    assert!(catalog.current().is_none());
}

#[test]
fn unknown_provider_in_allow_is_only_a_warning() {
    let config = FilterConfig::default().allow(Rules::Providers(vec!["openai".into(), "opnai".into()]));
    let snapshot = Snapshot::build(openai_dataset(), &config).expect("snapshot");
    assert_eq!(snapshot.filter().warnings().len(), 1);
    assert!(snapshot.is_allowed("openai:gpt-4"));
}

// ── Alias resolution ────────────────────────────────────────────────────

#[test]
fn alias_and_canonical_lookup_agree() {
    let snapshot = Snapshot::build(openai_dataset(), &FilterConfig::default()).expect("snapshot");
    let by_alias = snapshot.lookup("openai", "gpt-4-0314").expect("alias");
    let by_id = snapshot.lookup("openai", "gpt-4").expect("canonical");
    assert!(Arc::ptr_eq(&by_alias, &by_id));
    assert_eq!(snapshot.lookup_spec("OpenAI:gpt-4-0314").expect("spec").model_id, "gpt-4");
}

#[test]
fn lookup_failures_are_typed() {
    let snapshot = Snapshot::build(openai_dataset(), &FilterConfig::default()).expect("snapshot");
    assert_eq!(
        snapshot.lookup_spec("gpt-4").unwrap_err(),
        LookupError::InvalidSpec("gpt-4".to_string())
    );
    assert_eq!(
        snapshot.lookup("mistral", "large").unwrap_err(),
        LookupError::UnknownProvider("mistral".to_string())
    );
    assert!(matches!(
        snapshot.lookup("openai", "gpt-9").unwrap_err(),
        LookupError::UnknownModel { .. }
    ));
    // Unknown strings are never interned by queries.
    assert!(!snapshot.ids().contains("mistral"));
}

#[test]
fn capability_projection() {
    let snapshot = Snapshot::build(openai_dataset(), &FilterConfig::default()).expect("snapshot");
    let caps = snapshot.capabilities("openai:gpt-4o").expect("gpt-4o");
    assert!(caps.chat);
    assert!(caps.tools.parallel);
    assert!(caps.json.native);
    assert!(!snapshot.capabilities("openai:dall-e-3").expect("dall-e").chat);
    assert!(snapshot.capabilities("openai:nothing").is_none());
}

// ── Selection ───────────────────────────────────────────────────────────

#[test]
fn prefer_order_beats_canonical_order() {
    let snapshot = Snapshot::build(two_providers(), &FilterConfig::default()).expect("snapshot");
    let query = SelectQuery::new().require("chat:true").prefer(["b", "a"]);
    assert_eq!(
        snapshot.select(&query).map(|k| k.to_string()),
        Some("b:m2".to_string())
    );
    let unpreferred = SelectQuery::new().require("chat:true");
    assert_eq!(
        snapshot.select(&unpreferred).map(|k| k.to_string()),
        Some("a:m1".to_string())
    );
}

#[test]
fn compiled_prefer_applies_without_override() {
    let snapshot = Snapshot::build(two_providers(), &FilterConfig::default().prefer(["b"])).expect("snapshot");
    let all: Vec<String> = snapshot
        .candidates(&SelectQuery::new().require("chat"))
        .iter()
        .map(ModelKey::to_string)
        .collect();
    assert_eq!(all, vec!["b:m2", "a:m1"]);
}

#[test]
fn require_and_forbid_combine() {
    let snapshot = Snapshot::build(openai_dataset(), &FilterConfig::default()).expect("snapshot");
    let tools: Vec<String> = snapshot
        .candidates(&SelectQuery::new().require("tools"))
        .iter()
        .map(ModelKey::to_string)
        .collect();
    assert_eq!(tools, vec!["anthropic:claude-3-opus", "openai:gpt-4", "openai:gpt-4o"]);

    let no_reasoning = SelectQuery::new().require("tools").forbid("reasoning");
    assert_eq!(
        snapshot.select(&no_reasoning).map(|k| k.to_string()),
        Some("openai:gpt-4".to_string())
    );

    let scoped = SelectQuery::new().require("tools_parallel").scope("openai");
    assert_eq!(snapshot.candidates(&scoped).len(), 1);
}

#[test]
fn unknown_predicate_never_matches() {
    let snapshot = Snapshot::build(openai_dataset(), &FilterConfig::default()).expect("snapshot");
    assert!(snapshot.select(&SelectQuery::new().require("teleport")).is_none());
    // As a forbid it excludes nothing.
    assert_eq!(
        snapshot.candidates(&SelectQuery::new().forbid("teleport")).len(),
        5
    );
}

// ── Publication ─────────────────────────────────────────────────────────

#[test]
fn identical_reload_keeps_version() {
    let catalog = Catalog::new();
    let dataset = openai_dataset();
    let config = LoadConfig::default().with_filter(FilterConfig::default().prefer(["anthropic"]));

    let first = catalog.load(Some(Arc::clone(&dataset)), &config).expect("first");
    let second = catalog.load(Some(Arc::clone(&dataset)), &config).expect("second");

    assert!(matches!(first, LoadOutcome::Published { version: 1, .. }));
    assert_eq!(second, LoadOutcome::Unchanged { version: 1 });
    assert_eq!(catalog.version(), 1);
}

#[test]
fn readers_keep_their_snapshot_across_reloads() {
    let catalog = Catalog::new();
    catalog.load(Some(openai_dataset()), &LoadConfig::default()).expect("load");
    let held = catalog.snapshot().expect("snapshot");

    let narrowed = LoadConfig::default().with_filter(
        FilterConfig::default().allow(Rules::Providers(vec!["anthropic".into()])),
    );
    catalog.load(Some(openai_dataset()), &narrowed).expect("reload");

    assert!(held.is_allowed("openai:gpt-4"));
    assert!(!catalog.is_allowed("openai:gpt-4"));
    assert_eq!(catalog.version(), 2);
}

#[test]
fn missing_artifact_serves_empty_snapshot() {
    let catalog = Catalog::new();
    let outcome = catalog.load(None, &LoadConfig::default()).expect("fallback");
    assert_eq!(outcome, LoadOutcome::Fallback { version: 1 });
    let snapshot = catalog.snapshot().expect("published");
    assert!(snapshot.is_empty());
    assert!(catalog.select(&SelectQuery::new()).is_none());
    assert_eq!(
        catalog.lookup_spec("openai:gpt-4").unwrap_err(),
        LookupError::UnknownProvider("openai".to_string())
    );
}

#[test]
fn custom_layer_is_highest_precedence() {
    let catalog = Catalog::new();
    let config = LoadConfig::default().with_custom(json!({
        "providers": [{"id": "internal", "name": "Internal", "models": [{"id": "llm-1"}]}],
        "models": [{"provider_id": "openai", "model_id": "gpt-4", "aliases": ["house-gpt"], "name": "House GPT-4"}]
    }));
    catalog.load(Some(openai_dataset()), &config).expect("load");

    let gpt4 = catalog.lookup_spec("openai:house-gpt").expect("custom alias");
    assert_eq!(gpt4.name, "House GPT-4");
    assert_eq!(gpt4.aliases, vec!["gpt-4-0314", "house-gpt"]);
    assert!(gpt4.capabilities.tools.enabled);
    assert!(catalog.is_allowed("internal:llm-1"));
}

#[test]
fn custom_layer_rederives_chat_from_merged_modalities() {
    let base = openai_dataset();
    assert!(!base.model("openai", "dall-e-3").expect("dall-e-3").capabilities.chat);

    let catalog = Catalog::new();
    let config = LoadConfig::default().with_custom(json!({
        "models": [{"provider_id": "openai", "model_id": "dall-e-3", "modalities": {"output": ["text"]}}]
    }));
    catalog.load(Some(base), &config).expect("load");

    let caps = catalog.capabilities("openai:dall-e-3").expect("dall-e-3");
    assert!(caps.chat);
    let model = catalog.lookup_spec("openai:dall-e-3").expect("dall-e-3");
    assert_eq!(model.modalities.output, vec!["image", "text"]);
    assert_eq!(model.name, "dall-e-3");
}

#[test]
fn custom_layer_without_artifact() {
    let catalog = Catalog::new();
    let config = LoadConfig::default().with_custom(json!({
        "providers": [{"id": "local", "models": [{"id": "llama-3-8b"}]}]
    }));
    let outcome = catalog.load(None, &config).expect("load");
    assert!(matches!(outcome, LoadOutcome::Fallback { .. }));
    assert!(catalog.is_allowed("local:llama-3-8b"));
}
