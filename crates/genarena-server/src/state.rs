//! Shared application state.

use genarena_core::GenArenaConfig;
use genarena_providers::ProviderRegistry;
use genarena_runtime::RunController;

/// Shared application state accessible from all route handlers.
pub struct AppState {
    pub config: GenArenaConfig,
    pub controller: RunController,
}

impl AppState {
    pub fn new(config: GenArenaConfig, controller: RunController) -> Self {
        Self { config, controller }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        self.controller.registry()
    }
}
