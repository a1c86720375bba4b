//! Builder for RequestRouter, caller should provide a ModelLoader
use crate::{
    agent::ModelLoader,
    config::Config,
    error::{Error, Result},
    query_log::QueryLogger,
    registry::ModelRegistry,
    router::RequestRouter,
    supervisor::{Launcher, ProcessLauncher, TrainingJobSupervisor},
};
use emulators::{Emulator, EmulatorKind};
use std::{path::PathBuf, sync::Arc};

/// Builder for the router service
#[derive(Default)]
pub struct Builder {
    config: Config,
    loader: Option<Arc<dyn ModelLoader>>,
    launcher: Option<Arc<dyn Launcher>>,
    emulator: Option<Box<dyn Emulator>>,
}

macro_rules! config {
    ($name:ident, $t: ty, $comment: literal) => {
        #[doc=$comment]
        pub fn $name(mut self, $name: $t) -> Self {
            self.config.$name = $name;
            self
        }
    };
}

impl Builder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Builder::default()
    }

    config!(path, PathBuf, "Durable storage root of the agents");
    config!(response_log, Option<PathBuf>, "Query log directory");
    config!(emulate, Option<String>, "Emulation mode");
    config!(token, Option<String>, "Shared secret of the transport");
    config!(trainer, PathBuf, "Training executable");

    /// Replace the whole configuration
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// How model directories are turned into models
    pub fn model_loader(mut self, loader: Arc<dyn ModelLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// How training jobs are started, a `trainer` process by default
    pub fn launcher(mut self, launcher: Arc<dyn Launcher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    /// Emulator overriding the `emulate` tag
    pub fn emulator(mut self, emulator: Box<dyn Emulator>) -> Self {
        self.emulator = Some(emulator);
        self
    }

    /// Build the router and load what durable storage holds
    pub fn build(self) -> Result<RequestRouter> {
        let config = self.config;
        let loader = self
            .loader
            .ok_or_else(|| Error::Config("no model loader configured".to_string()))?;
        let emulator = match self.emulator {
            Some(emulator) => emulator,
            None => EmulatorKind::from_tag(config.emulate.as_deref())?.build(),
        };
        let launcher: Arc<dyn Launcher> = match self.launcher {
            Some(launcher) => launcher,
            None => Arc::new(ProcessLauncher::new(&config.trainer)),
        };

        let query_log = match &config.response_log {
            Some(dir) => match QueryLogger::create(dir) {
                Ok(query_log) => Some(query_log),
                Err(err) => {
                    log::warn!("Query logging disabled, cannot open {:?}: {}", dir, err);
                    None
                }
            },
            None => {
                log::info!("Query logging disabled");
                None
            }
        };

        let registry = ModelRegistry::new(&config.path, loader);
        registry.ensure_default();
        let supervisor = TrainingJobSupervisor::new(config.clone(), launcher);
        log::info!(
            "Serving agents from {:?} with emulator '{}'",
            config.path,
            emulator.name()
        );
        Ok(RequestRouter::new(
            config, registry, supervisor, emulator, query_log,
        ))
    }
}
