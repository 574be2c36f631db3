//! # Model Catalog
//!
//! Cross-provider model capability lookup: which model identifiers support
//! supplementary web grounding, and which model to substitute when a
//! search-capable model fails with a quota-class error.
//!
//! Capability is detected by identifier prefix (e.g. `"gemini"` →
//! Google-served, search-capable). Unknown identifiers are treated as plain
//! models with no search support.

use serde::{Deserialize, Serialize};

/// Model identifier prefixes whose backends support web grounding.
const WEB_SEARCH_PREFIXES: &[&str] = &["gemini", "google/"];

/// Default substitution target when a search-capable model is quota-blocked.
const DEFAULT_FALLBACK_MODEL: &str = "gpt-4o-mini";

/// Capability catalog injected into the orchestrator.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelCatalog {
    /// Identifier prefixes that mark a model as web-search capable.
    pub web_search_prefixes: Vec<String>,
    /// The designated fallback model (never search-capable itself).
    pub fallback_model: String,
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self {
            web_search_prefixes: WEB_SEARCH_PREFIXES.iter().map(ToString::to_string).collect(),
            fallback_model: DEFAULT_FALLBACK_MODEL.to_owned(),
        }
    }
}

impl ModelCatalog {
    /// Whether a model identifier indicates web-grounding support.
    #[must_use]
    pub fn supports_web_search(&self, model_id: &str) -> bool {
        self.web_search_prefixes
            .iter()
            .any(|prefix| model_id.starts_with(prefix.as_str()))
    }

    /// The substitution target for quota-blocked search-capable models.
    #[must_use]
    pub fn fallback_model(&self) -> &str {
        &self.fallback_model
    }
}
