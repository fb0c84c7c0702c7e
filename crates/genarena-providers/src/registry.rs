//! Provider registry: slot ids mapped to adapters and advertised models.

use std::collections::HashSet;
use std::sync::Arc;

use genarena_core::{AspectRatio, Error, GenerationRequest, Result, SlotConfig};
use serde::{Deserialize, Serialize};

use crate::adapter::ProviderAdapter;

/// One provider slot the presentation layer can show.
#[derive(Clone)]
pub struct ProviderEntry {
    pub id: String,
    pub label: String,
    pub models: Vec<String>,
    pub default_model: String,
    pub adapter: Arc<dyn ProviderAdapter>,
}

impl ProviderEntry {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        models: Vec<String>,
        adapter: Arc<dyn ProviderAdapter>,
    ) -> Result<Self> {
        let id = id.into();
        let default_model = models
            .first()
            .cloned()
            .ok_or_else(|| Error::Config(format!("provider '{}' advertises no models", id)))?;
        Ok(Self {
            id,
            label: label.into(),
            models,
            default_model,
            adapter,
        })
    }

    /// Use `model` as the default instead of the first advertised one.
    pub fn with_default_model(mut self, model: &str) -> Result<Self> {
        if !self.offers(model) {
            return Err(Error::UnknownModel {
                provider: self.id.clone(),
                model: model.to_string(),
            });
        }
        self.default_model = model.to_string();
        Ok(self)
    }

    pub fn offers(&self, model: &str) -> bool {
        self.models.iter().any(|m| m == model)
    }

    pub fn info(&self) -> ProviderInfo {
        ProviderInfo {
            id: self.id.clone(),
            label: self.label.clone(),
            backend: self.adapter.backend().to_string(),
            models: self.models.clone(),
            default_model: self.default_model.clone(),
        }
    }
}

impl std::fmt::Debug for ProviderEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderEntry")
            .field("id", &self.id)
            .field("backend", &self.adapter.backend())
            .field("models", &self.models)
            .field("default_model", &self.default_model)
            .finish()
    }
}

/// Serializable provider description.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderInfo {
    pub id: String,
    pub label: String,
    pub backend: String,
    pub models: Vec<String>,
    pub default_model: String,
}

/// A slot as the presentation layer sends it: anything omitted takes the
/// provider default.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct SlotSelection {
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
}

/// Ordered set of providers.
#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    providers: Vec<ProviderEntry>,
}

impl ProviderRegistry {
    pub fn new(providers: Vec<ProviderEntry>) -> Result<Self> {
        let mut seen = HashSet::new();
        for p in &providers {
            if !seen.insert(p.id.clone()) {
                return Err(Error::Config(format!("provider '{}' registered twice", p.id)));
            }
        }
        Ok(Self { providers })
    }

    pub fn get(&self, id: &str) -> Option<&ProviderEntry> {
        self.providers.iter().find(|p| p.id == id)
    }

    pub fn providers(&self) -> &[ProviderEntry] {
        &self.providers
    }

    pub fn list(&self) -> Vec<ProviderInfo> {
        self.providers.iter().map(ProviderEntry::info).collect()
    }

    /// Check that a slot names a registered provider and one of its models.
    pub fn validate_slot(&self, slot: &SlotConfig) -> Result<&ProviderEntry> {
        let entry = self
            .get(&slot.provider)
            .ok_or_else(|| Error::UnknownProvider(slot.provider.clone()))?;
        if !entry.offers(&slot.model) {
            return Err(Error::UnknownModel {
                provider: slot.provider.clone(),
                model: slot.model.clone(),
            });
        }
        Ok(entry)
    }

    /// Build a full request from partial selections.
    ///
    /// Every registered provider gets a slot, in registry order. Providers the
    /// caller did not mention are enabled with their default model.
    pub fn build_request(
        &self,
        prompt: &str,
        aspect_ratio: AspectRatio,
        selections: &[SlotSelection],
    ) -> Result<GenerationRequest> {
        let mut seen = HashSet::new();
        for sel in selections {
            if self.get(&sel.provider).is_none() {
                return Err(Error::UnknownProvider(sel.provider.clone()));
            }
            if !seen.insert(sel.provider.as_str()) {
                return Err(Error::Validation(format!(
                    "provider '{}' appears more than once",
                    sel.provider
                )));
            }
        }

        let mut slots = Vec::with_capacity(self.providers.len());
        for entry in &self.providers {
            let sel = selections.iter().find(|s| s.provider == entry.id);
            let model = sel
                .and_then(|s| s.model.clone())
                .unwrap_or_else(|| entry.default_model.clone());
            let enabled = sel.and_then(|s| s.enabled).unwrap_or(true);
            let slot = SlotConfig::new(entry.id.clone(), model, enabled);
            self.validate_slot(&slot)?;
            slots.push(slot);
        }

        GenerationRequest::new(prompt, aspect_ratio, slots)
    }
}
