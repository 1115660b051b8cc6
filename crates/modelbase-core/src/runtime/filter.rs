//! Filter compiler: allow / deny / prefer governance over the catalog.
//!
//! Evaluation is deny-overrides-allow: a model is visible iff some allow
//! rule admits it and no deny rule matches it.
//!
//! Rule shapes (both axes):
//!
//! | Shape                           | Allow                    | Deny                     |
//! |---------------------------------|--------------------------|--------------------------|
//! | `"all"` / `"*"` / `true`        | everything               | everything               |
//! | `"none"` / `false`              | nothing                  | nothing                  |
//! | `["openai", "anthropic"]`       | those providers, all ids | those providers, all ids |
//! | `{openai = "all"}`              | whole provider           | whole provider           |
//! | `{openai = ["gpt-4*"]}`         | matching ids             | matching ids             |
//! | `{openai = []}`                 | **whole provider**       | nothing                  |
//!
//! Rules that name a provider unknown to the dataset never fail
//! compilation; they produce a [`FilterWarning`] and match nothing.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::ids::{IdSpace, ProviderId};
use crate::obs;
use crate::pattern::ModelPattern;

/// Per-provider rule inside a map-shaped [`Rules`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawProviderRules", into = "RawProviderRules")]
pub enum ProviderRules {
    All,
    Patterns(Vec<String>),
}

/// One governance axis as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRules", into = "RawRules")]
pub enum Rules {
    All,
    None,
    Providers(Vec<String>),
    PerProvider(BTreeMap<String, ProviderRules>),
}

impl Rules {
    pub fn all() -> Self {
        Rules::All
    }

    pub fn none() -> Self {
        Rules::None
    }

    /// Convenience for `{provider = [patterns...]}` with one provider.
    pub fn provider_patterns<I, S>(provider: &str, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut map = BTreeMap::new();
        map.insert(
            provider.to_string(),
            ProviderRules::Patterns(patterns.into_iter().map(Into::into).collect()),
        );
        Rules::PerProvider(map)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawProviderRules {
    Flag(bool),
    Keyword(String),
    Patterns(Vec<String>),
}

impl TryFrom<RawProviderRules> for ProviderRules {
    type Error = String;

    fn try_from(raw: RawProviderRules) -> Result<Self, Self::Error> {
        match raw {
            RawProviderRules::Flag(true) => Ok(ProviderRules::All),
            RawProviderRules::Flag(false) => {
                Err("per-provider rule `false` is not supported; omit the provider instead".into())
            }
            RawProviderRules::Keyword(k) if is_all_keyword(&k) => Ok(ProviderRules::All),
            RawProviderRules::Keyword(k) => Ok(ProviderRules::Patterns(vec![k])),
            RawProviderRules::Patterns(p) => Ok(ProviderRules::Patterns(p)),
        }
    }
}

impl From<ProviderRules> for RawProviderRules {
    fn from(rules: ProviderRules) -> Self {
        match rules {
            ProviderRules::All => RawProviderRules::Keyword("all".into()),
            ProviderRules::Patterns(p) => RawProviderRules::Patterns(p),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawRules {
    Flag(bool),
    Keyword(String),
    Providers(Vec<String>),
    PerProvider(BTreeMap<String, ProviderRules>),
}

impl TryFrom<RawRules> for Rules {
    type Error = String;

    fn try_from(raw: RawRules) -> Result<Self, Self::Error> {
        match raw {
            RawRules::Flag(true) => Ok(Rules::All),
            RawRules::Flag(false) => Ok(Rules::None),
            RawRules::Keyword(k) if is_all_keyword(&k) => Ok(Rules::All),
            RawRules::Keyword(k) if k.trim().eq_ignore_ascii_case("none") => Ok(Rules::None),
            RawRules::Keyword(k) => Err(format!(
                "unrecognized rule keyword '{k}' (expected \"all\", \"none\", a list, or a table)"
            )),
            RawRules::Providers(p) => Ok(Rules::Providers(p)),
            RawRules::PerProvider(m) => Ok(Rules::PerProvider(m)),
        }
    }
}

impl From<Rules> for RawRules {
    fn from(rules: Rules) -> Self {
        match rules {
            Rules::All => RawRules::Keyword("all".into()),
            Rules::None => RawRules::Keyword("none".into()),
            Rules::Providers(p) => RawRules::Providers(p),
            Rules::PerProvider(m) => RawRules::PerProvider(m),
        }
    }
}

fn is_all_keyword(k: &str) -> bool {
    let k = k.trim();
    k == "*" || k.eq_ignore_ascii_case("all")
}

impl fmt::Display for Rules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rules::All => f.write_str("all"),
            Rules::None => f.write_str("none"),
            Rules::Providers(p) => write!(f, "[{}]", p.join(", ")),
            Rules::PerProvider(m) => {
                let parts: Vec<String> = m
                    .iter()
                    .map(|(provider, rules)| match rules {
                        ProviderRules::All => format!("{provider}: all"),
                        ProviderRules::Patterns(p) => format!("{provider}: [{}]", p.join(", ")),
                    })
                    .collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
        }
    }
}

/// Runtime governance configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(default = "Rules::all")]
    pub allow: Rules,
    #[serde(default = "Rules::none")]
    pub deny: Rules,
    /// Provider scan priority for selection.
    #[serde(default)]
    pub prefer: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            allow: Rules::All,
            deny: Rules::None,
            prefer: Vec::new(),
        }
    }
}

impl FilterConfig {
    pub fn allow(mut self, rules: Rules) -> Self {
        self.allow = rules;
        self
    }

    pub fn deny(mut self, rules: Rules) -> Self {
        self.deny = rules;
        self
    }

    pub fn prefer<I, S>(mut self, providers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prefer = providers.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Allow,
    Deny,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::Allow => f.write_str("allow"),
            Axis::Deny => f.write_str("deny"),
        }
    }
}

/// Non-fatal problems found while compiling a [`FilterConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterWarning {
    UnknownProvider {
        axis: Axis,
        provider: String,
        suggestions: Vec<String>,
    },
    InvalidPattern {
        axis: Axis,
        provider: String,
        pattern: String,
        error: String,
    },
    UnknownPreferred {
        provider: String,
        suggestions: Vec<String>,
    },
}

impl fmt::Display for FilterWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hint = |suggestions: &[String]| {
            if suggestions.is_empty() {
                String::new()
            } else {
                format!(" (did you mean: {}?)", suggestions.join(", "))
            }
        };
        match self {
            FilterWarning::UnknownProvider {
                axis,
                provider,
                suggestions,
            } => write!(
                f,
                "{axis} references unknown provider '{provider}'; rule matches nothing{}",
                hint(suggestions)
            ),
            FilterWarning::InvalidPattern {
                axis,
                provider,
                pattern,
                error,
            } => write!(
                f,
                "{axis} pattern '{pattern}' for '{provider}' is invalid and matches nothing: {error}"
            ),
            FilterWarning::UnknownPreferred {
                provider,
                suggestions,
            } => write!(
                f,
                "prefer references unknown provider '{provider}'; ignored{}",
                hint(suggestions)
            ),
        }
    }
}

#[derive(Debug, Clone)]
enum Matcher {
    Any,
    Patterns(Vec<ModelPattern>),
}

impl Matcher {
    fn matches(&self, model_id: &str) -> bool {
        match self {
            Matcher::Any => true,
            Matcher::Patterns(patterns) => patterns.iter().any(|p| p.is_match(model_id)),
        }
    }
}

#[derive(Debug, Clone)]
enum CompiledRules {
    Everything,
    Nothing,
    Providers(HashSet<ProviderId>),
    PerProvider(HashMap<ProviderId, Matcher>),
}

impl CompiledRules {
    fn matches(&self, provider: &str, model_id: &str) -> bool {
        match self {
            CompiledRules::Everything => true,
            CompiledRules::Nothing => false,
            CompiledRules::Providers(set) => set.contains(provider),
            CompiledRules::PerProvider(map) => map
                .get(provider)
                .map(|m| m.matches(model_id))
                .unwrap_or(false),
        }
    }
}

/// A validated, provider-aware predicate plus the resolved prefer order.
#[derive(Debug, Clone)]
pub struct CompiledFilter {
    allow: CompiledRules,
    deny: CompiledRules,
    prefer: Vec<ProviderId>,
    config: FilterConfig,
    warnings: Vec<FilterWarning>,
}

impl CompiledFilter {
    /// Compile `config` against the providers in `known`. Each warning is
    /// logged and kept on the result.
    pub fn compile(config: &FilterConfig, known: &IdSpace) -> Self {
        let mut warnings = Vec::new();
        let allow = compile_rules(Axis::Allow, &config.allow, known, &mut warnings);
        let deny = compile_rules(Axis::Deny, &config.deny, known, &mut warnings);

        let mut prefer = Vec::new();
        for raw in &config.prefer {
            match known.resolve(raw) {
                Some(id) if !prefer.contains(&id) => prefer.push(id),
                Some(_) => {}
                None => warnings.push(FilterWarning::UnknownPreferred {
                    provider: raw.clone(),
                    suggestions: suggest(raw, known),
                }),
            }
        }

        for warning in &warnings {
            obs::emit_filter_warning(warning);
        }

        Self {
            allow,
            deny,
            prefer,
            config: config.clone(),
            warnings,
        }
    }

    /// A filter that admits everything with no preference.
    pub fn permissive() -> Self {
        Self::compile(&FilterConfig::default(), &IdSpace::new())
    }

    pub fn is_allowed(&self, provider: &str, model_id: &str) -> bool {
        self.allow.matches(provider, model_id) && !self.deny.matches(provider, model_id)
    }

    pub fn prefer(&self) -> &[ProviderId] {
        &self.prefer
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    pub fn warnings(&self) -> &[FilterWarning] {
        &self.warnings
    }

    /// Human-readable summary of the active configuration.
    pub fn summary(&self) -> String {
        let prefer: Vec<&str> = self.config.prefer.iter().map(String::as_str).collect();
        format!(
            "allow={} deny={} prefer=[{}]",
            self.config.allow,
            self.config.deny,
            prefer.join(", ")
        )
    }
}

fn compile_rules(
    axis: Axis,
    rules: &Rules,
    known: &IdSpace,
    warnings: &mut Vec<FilterWarning>,
) -> CompiledRules {
    let resolve = |raw: &str, warnings: &mut Vec<FilterWarning>| {
        let id = known.resolve(raw);
        if id.is_none() {
            warnings.push(FilterWarning::UnknownProvider {
                axis,
                provider: raw.to_string(),
                suggestions: suggest(raw, known),
            });
        }
        id
    };

    match rules {
        Rules::All => CompiledRules::Everything,
        Rules::None => CompiledRules::Nothing,
        Rules::Providers(list) => CompiledRules::Providers(
            list.iter()
                .filter_map(|raw| resolve(raw, warnings))
                .collect(),
        ),
        Rules::PerProvider(map) => {
            let mut compiled = HashMap::new();
            for (raw, provider_rules) in map {
                let Some(id) = resolve(raw, warnings) else {
                    continue;
                };
                let matcher = match provider_rules {
                    ProviderRules::All => Matcher::Any,
                    // An empty allow list admits the whole provider; an empty
                    // deny list excludes nothing.
                    ProviderRules::Patterns(list) if list.is_empty() => match axis {
                        Axis::Allow => Matcher::Any,
                        Axis::Deny => Matcher::Patterns(Vec::new()),
                    },
                    ProviderRules::Patterns(list) => {
                        Matcher::Patterns(compile_patterns(axis, raw, list, warnings))
                    }
                };
                compiled.insert(id, matcher);
            }
            CompiledRules::PerProvider(compiled)
        }
    }
}

fn compile_patterns(
    axis: Axis,
    provider: &str,
    list: &[String],
    warnings: &mut Vec<FilterWarning>,
) -> Vec<ModelPattern> {
    list.iter()
        .filter_map(|raw| match ModelPattern::compile(raw) {
            Ok(pattern) => Some(pattern),
            Err(e) => {
                warnings.push(FilterWarning::InvalidPattern {
                    axis,
                    provider: provider.to_string(),
                    pattern: raw.clone(),
                    error: e.to_string(),
                });
                None
            }
        })
        .collect()
}

/// Up to three known ids close to `raw` by edit distance.
fn suggest(raw: &str, known: &IdSpace) -> Vec<String> {
    let needle = raw.trim().to_ascii_lowercase();
    let mut scored: Vec<(usize, String)> = known
        .sorted()
        .into_iter()
        .map(|id| (strsim::levenshtein(&needle, id.as_str()), id.to_string()))
        .filter(|(distance, id)| {
            *distance <= 3 || strsim::jaro_winkler(&needle, id) >= 0.85
        })
        .collect();
    scored.sort();
    scored.into_iter().take(3).map(|(_, id)| id).collect()
}
