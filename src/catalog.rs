//! Action catalog configuration and the action-metadata cache.
//!
//! The catalog is static configuration: which action names belong to which
//! category, and which names are gated behind human confirmation. The cache
//! holds the provider's action metadata, populated lazily on first use and
//! invalidated explicitly when the underlying action set changes; no
//! automatic expiry.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::collaborators::{ActionDescriptor, ActionProvider, ProviderFault};

/// Pseudo-action the execution step always offers so the agent can ask the
/// human a disambiguating question instead of guessing.
pub const CLARIFICATION_ACTION: &str = "request_clarification";

/// Descriptor for the clarification pseudo-action. Never sent to the
/// provider; clarification invocations suspend the turn instead.
pub fn clarification_descriptor() -> ActionDescriptor {
    ActionDescriptor {
        name: CLARIFICATION_ACTION.to_string(),
        description: "Ask the user a clarifying question when the request is ambiguous. \
                      Arguments: question (required), context (optional)."
            .to_string(),
        parameters: Some(serde_json::json!({
            "type": "object",
            "properties": {
                "question": { "type": "string" },
                "context": { "type": "string" }
            },
            "required": ["question"]
        })),
    }
}

/// Static action catalog: category tags, their action names, and the gated
/// set requiring human confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Category tag -> action names in that category.
    pub categories: BTreeMap<String, Vec<String>>,
    /// Action names that require human confirmation before execution.
    #[serde(default)]
    pub gated: Vec<String>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        let mut categories = BTreeMap::new();
        categories.insert(
            "calendar".to_string(),
            vec![
                "list_calendars".to_string(),
                "list_events".to_string(),
                "create_event".to_string(),
                "update_event".to_string(),
            ],
        );
        Self {
            categories,
            gated: vec!["create_event".to_string(), "update_event".to_string()],
        }
    }
}

impl CatalogConfig {
    /// Load a catalog from a YAML file.
    pub fn from_file(path: &PathBuf) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let catalog: CatalogConfig = serde_yaml::from_str(&content)?;
        Ok(catalog)
    }

    /// Load a catalog, falling back to the default if no file is given.
    pub fn load_or_default(path: Option<&PathBuf>) -> anyhow::Result<Self> {
        match path {
            Some(p) if p.exists() => Self::from_file(p),
            _ => Ok(Self::default()),
        }
    }

    /// All known category tags, in stable order.
    pub fn category_names(&self) -> Vec<String> {
        self.categories.keys().cloned().collect()
    }

    /// Action names permitted by the given category set.
    pub fn allowed_names(&self, allowed_categories: &[String]) -> HashSet<String> {
        allowed_categories
            .iter()
            .filter_map(|c| self.categories.get(c))
            .flatten()
            .cloned()
            .collect()
    }

    /// Whether an action name requires human confirmation.
    pub fn is_gated(&self, name: &str) -> bool {
        self.gated.iter().any(|g| g == name)
    }

    /// Drop category tags the catalog does not know about.
    pub fn clamp_categories(&self, requested: Vec<String>) -> Vec<String> {
        let (known, unknown): (Vec<_>, Vec<_>) = requested
            .into_iter()
            .partition(|c| self.categories.contains_key(c));
        if !unknown.is_empty() {
            debug!(?unknown, "dropping unknown categories from gate decision");
        }
        known
    }
}

/// Lazily populated cache of the provider's action metadata.
///
/// Shared read-mostly across threads. Only non-empty successful fetches are
/// stored; a fault during fetch (authorization included, since it reflects a
/// transient, correctable condition) is never cached.
#[derive(Debug, Default)]
pub struct ActionCache {
    descriptors: RwLock<Option<Vec<ActionDescriptor>>>,
}

impl ActionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return cached metadata, fetching from the provider on first use.
    pub async fn fetch(
        &self,
        provider: &dyn ActionProvider,
    ) -> Result<Vec<ActionDescriptor>, ProviderFault> {
        if let Some(cached) = self.descriptors.read().await.as_ref() {
            return Ok(cached.clone());
        }

        let fetched = provider.list_actions().await?;
        if !fetched.is_empty() {
            debug!(count = fetched.len(), "caching action metadata");
            *self.descriptors.write().await = Some(fetched.clone());
        }
        Ok(fetched)
    }

    /// Drop cached metadata so the next fetch hits the provider again.
    /// Collaborators call this when the underlying action set changes.
    pub async fn invalidate(&self) {
        *self.descriptors.write().await = None;
    }
}
