//! Provider settings (loaded from providers.json) and registry construction.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use genarena_core::{Error, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::adapter::ProviderAdapter;
use crate::fal::{FalAdapter, DEFAULT_FAL_QUEUE_URL};
use crate::fireworks::{FireworksAdapter, DEFAULT_FIREWORKS_URL};
use crate::registry::{ProviderEntry, ProviderRegistry};
use crate::scripted::ScriptedAdapter;

/// Per-request bound on a single HTTP call to a provider.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Polls a dry-run job stays pending before it succeeds.
const DRY_RUN_PENDING_POLLS: usize = 2;

/// Which queue API a slot talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Fal,
    Fireworks,
    DryRun,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Fal => write!(f, "fal"),
            Backend::Fireworks => write!(f, "fireworks"),
            Backend::DryRun => write!(f, "dryrun"),
        }
    }
}

/// One configured provider slot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SlotSettings {
    pub id: String,
    pub label: String,
    pub backend: Backend,
    pub models: Vec<String>,
    #[serde(default)]
    pub default_model: Option<String>,
}

/// Stored provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default)]
    pub fal_api_key: Option<String>,
    #[serde(default)]
    pub fireworks_api_key: Option<String>,
    #[serde(default = "default_fal_url")]
    pub fal_base_url: String,
    #[serde(default = "default_fireworks_url")]
    pub fireworks_base_url: String,
    #[serde(default = "default_slots")]
    pub slots: Vec<SlotSettings>,
}

fn default_fal_url() -> String {
    DEFAULT_FAL_QUEUE_URL.into()
}
fn default_fireworks_url() -> String {
    DEFAULT_FIREWORKS_URL.into()
}

fn slot(id: &str, label: &str, backend: Backend, models: &[&str]) -> SlotSettings {
    SlotSettings {
        id: id.into(),
        label: label.into(),
        backend,
        models: models.iter().map(|m| m.to_string()).collect(),
        default_model: None,
    }
}

fn default_slots() -> Vec<SlotSettings> {
    vec![
        slot(
            "fireworks1",
            "Fireworks",
            Backend::Fireworks,
            &["flux-1-schnell-fp8", "flux-1-dev-fp8"],
        ),
        slot(
            "fireworks2",
            "Flux",
            Backend::Fireworks,
            &["flux-kontext-pro", "flux-kontext-max"],
        ),
        slot(
            "fireworks3",
            "Stability",
            Backend::Fireworks,
            &[
                "stable-diffusion-xl-1024-v1-0",
                "playground-v2-5-1024px-aesthetic",
            ],
        ),
        slot(
            "fal",
            "fal",
            Backend::Fal,
            &["fal-ai/flux/schnell", "fal-ai/flux/dev", "fal-ai/recraft-v3"],
        ),
    ]
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            fal_api_key: None,
            fireworks_api_key: None,
            fal_base_url: default_fal_url(),
            fireworks_base_url: default_fireworks_url(),
            slots: default_slots(),
        }
    }
}

impl ProviderSettings {
    /// Load settings from file, falling back to env vars and defaults.
    pub fn load(path: &Path) -> Self {
        let mut settings: ProviderSettings = match std::fs::read_to_string(path) {
            Ok(s) => serde_json::from_str(&s).unwrap_or_else(|e| {
                warn!("Ignoring invalid {}: {}", path.display(), e);
                ProviderSettings::default()
            }),
            Err(_) => ProviderSettings::default(),
        };

        if settings.fal_api_key.is_none() {
            settings.fal_api_key = std::env::var("FAL_KEY").ok();
        }
        if settings.fireworks_api_key.is_none() {
            settings.fireworks_api_key = std::env::var("FIREWORKS_API_KEY").ok();
        }

        settings
    }

    fn api_key(&self, backend: Backend) -> Option<&str> {
        let key = match backend {
            Backend::Fal => self.fal_api_key.as_deref(),
            Backend::Fireworks => self.fireworks_api_key.as_deref(),
            Backend::DryRun => None,
        };
        key.filter(|k| !k.trim().is_empty())
    }
}

/// Build the registry for `settings`.
///
/// A slot whose backend has no API key is served by the dry-run adapter so
/// the service stays usable without credentials.
pub fn create_registry(settings: &ProviderSettings) -> Result<ProviderRegistry> {
    let client = Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| Error::Http(format!("failed to build HTTP client: {}", e)))?;

    let dry_run: Arc<dyn ProviderAdapter> = Arc::new(ScriptedAdapter::dry_run(DRY_RUN_PENDING_POLLS));
    let mut entries = Vec::with_capacity(settings.slots.len());

    for slot in &settings.slots {
        let adapter: Arc<dyn ProviderAdapter> = match (slot.backend, settings.api_key(slot.backend)) {
            (Backend::Fal, Some(key)) => Arc::new(FalAdapter::new(
                client.clone(),
                settings.fal_base_url.clone(),
                key,
            )),
            (Backend::Fireworks, Some(key)) => Arc::new(FireworksAdapter::new(
                client.clone(),
                settings.fireworks_base_url.clone(),
                key,
            )),
            (Backend::DryRun, _) => dry_run.clone(),
            (backend, None) => {
                warn!(
                    "No API key for {} backend; slot '{}' runs in dry-run mode",
                    backend, slot.id
                );
                dry_run.clone()
            }
        };

        let mut entry = ProviderEntry::new(&slot.id, &slot.label, slot.models.clone(), adapter)?;
        if let Some(model) = &slot.default_model {
            entry = entry.with_default_model(model)?;
        }
        entries.push(entry);
    }

    let registry = ProviderRegistry::new(entries)?;
    info!("Provider registry: {} slots", registry.providers().len());
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_slots() {
        let settings = ProviderSettings::default();
        let ids: Vec<&str> = settings.slots.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["fireworks1", "fireworks2", "fireworks3", "fal"]);
    }

    #[test]
    fn test_load_from_file_with_partial_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("providers.json");
        std::fs::write(
            &path,
            r#"{
                "fireworks_api_key": "fw-test",
                "slots": [
                    {"id": "fireworks1", "label": "Fireworks", "backend": "fireworks",
                     "models": ["flux-1-dev-fp8", "flux-1-schnell-fp8"],
                     "default_model": "flux-1-schnell-fp8"}
                ]
            }"#,
        )
        .unwrap();

        let settings = ProviderSettings::load(&path);
        assert_eq!(settings.fireworks_api_key.as_deref(), Some("fw-test"));
        assert_eq!(settings.fal_base_url, DEFAULT_FAL_QUEUE_URL);
        assert_eq!(settings.slots.len(), 1);

        let registry = create_registry(&settings).unwrap();
        let entry = registry.get("fireworks1").unwrap();
        assert_eq!(entry.default_model, "flux-1-schnell-fp8");
        assert_eq!(entry.adapter.backend(), "fireworks");
    }

    #[test]
    fn test_invalid_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("providers.json");
        std::fs::write(&path, "{ not json").unwrap();
        let settings = ProviderSettings::load(&path);
        assert_eq!(settings.slots.len(), 4);
    }

    #[test]
    fn test_missing_keys_use_dry_run() {
        let settings = ProviderSettings {
            fal_api_key: None,
            fireworks_api_key: Some("  ".into()),
            ..ProviderSettings::default()
        };
        let registry = create_registry(&settings).unwrap();
        assert!(registry
            .providers()
            .iter()
            .all(|p| p.adapter.backend() == "dryrun"));
    }

    #[test]
    fn test_bad_default_model_is_config_error() {
        let mut settings = ProviderSettings::default();
        settings.slots[0].default_model = Some("not-offered".into());
        assert!(create_registry(&settings).is_err());
    }
}
