//! Everything a process of the application family needs, built once.

use std::sync::Arc;

use crate::{
    backend::{BackendLoader, default_loaders},
    bulk::BulkApply,
    config::{Config, ConfigManager},
    effects::EffectFileManager,
    middleman::Middleman,
    process::ProcessCoordinator,
    state::SoftwareStateStore,
};

/// Components wired from one configuration snapshot.
///
/// There is no ambient global state: whoever needs paths or process
/// settings gets them from here.
pub struct AppContext {
    /// Configuration manager for reloads
    pub config_manager: ConfigManager,
    /// Snapshot the components were built from
    pub config: Arc<Config>,
    pub coordinator: Arc<ProcessCoordinator>,
    pub middleman: Middleman,
    pub effects: EffectFileManager,
}

impl AppContext {
    /// Builds the context and loads every enabled backend.
    pub async fn new(config_manager: ConfigManager) -> Self {
        let config = config_manager.clone_config().await;
        let loaders = default_loaders(&config);
        Self::with_loaders(config_manager, &loaders).await
    }

    pub async fn with_loaders(
        config_manager: ConfigManager,
        loaders: &[Box<dyn BackendLoader>],
    ) -> Self {
        let config = Arc::new(config_manager.clone_config().await);
        let coordinator = Arc::new(ProcessCoordinator::new(&config));
        let middleman = Middleman::init(&config, coordinator.clone(), loaders).await;
        let effects = EffectFileManager::new(config.paths.effects_dir.clone());

        Self {
            config_manager,
            config,
            coordinator,
            middleman,
            effects,
        }
    }

    pub fn states(&self) -> &SoftwareStateStore {
        self.middleman.states()
    }

    pub fn bulk(&self) -> BulkApply<'_> {
        BulkApply::new(&self.middleman)
    }
}
