use std::collections::HashMap;
use std::sync::Arc;

use crate::{
    Backend, Distributor, EngineModel, Error, InferenceModel, ModelConfig, Result, SingleProcess,
};

type Constructor = Box<
    dyn Fn(ModelConfig, Arc<dyn Distributor>) -> Result<Box<dyn InferenceModel>> + Send + Sync,
>;

/// Maps configuration `type` tags to engine constructors.
#[derive(Default)]
pub struct ModelFactory {
    constructors: HashMap<String, Constructor>,
}

fn normalize(tag: &str) -> String {
    tag.trim().to_ascii_lowercase()
}

impl ModelFactory {
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Registers `ctor` under `tag`, replacing any previous registration.
    pub fn register<F>(&mut self, tag: &str, ctor: F)
    where
        F: Fn(ModelConfig, Arc<dyn Distributor>) -> Result<Box<dyn InferenceModel>>
            + Send
            + Sync
            + 'static,
    {
        self.constructors.insert(normalize(tag), Box::new(ctor));
    }

    /// Registers `backend` wrapped in an [`EngineModel`].
    pub fn register_backend<B: Backend + Clone>(&mut self, tag: &str, backend: B) {
        self.register(tag, move |config, distributor| {
            let model = EngineModel::with_distributor(backend.clone(), config, distributor)?;
            Ok(Box::new(model) as Box<dyn InferenceModel>)
        });
    }

    pub fn is_registered(&self, tag: &str) -> bool {
        self.constructors.contains_key(&normalize(tag))
    }

    pub fn registered(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }

    pub fn create(&self, tag: &str, config: ModelConfig) -> Result<Box<dyn InferenceModel>> {
        self.create_with(tag, config, Arc::new(SingleProcess))
    }

    /// Builds the model for `tag`; fails before any I/O on an unknown tag or
    /// an incomplete configuration.
    pub fn create_with(
        &self,
        tag: &str,
        config: ModelConfig,
        distributor: Arc<dyn Distributor>,
    ) -> Result<Box<dyn InferenceModel>> {
        let ctor = self
            .constructors
            .get(&normalize(tag))
            .ok_or_else(|| Error::UnknownModelType {
                tag: tag.to_string(),
                known: self.registered().join(", "),
            })?;
        config.validate()?;
        ctor(config, distributor)
    }

    /// Builds the model named by the configuration's own `type`.
    pub fn build(
        &self,
        config: ModelConfig,
        distributor: Arc<dyn Distributor>,
    ) -> Result<Box<dyn InferenceModel>> {
        let tag = config.model_type.clone();
        self.create_with(&tag, config, distributor)
    }
}
