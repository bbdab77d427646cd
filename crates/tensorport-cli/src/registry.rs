use std::sync::Arc;

use anyhow::{Context, Result};
use tensorport_core::{Distributor, InferenceModel, ModelConfig, ModelFactory};

/// Factory with every engine compiled into this binary.
pub fn default_factory() -> ModelFactory {
    let mut factory = ModelFactory::new();
    tensorport_backend_ort::register(&mut factory);
    factory
}

/// Builds the model named by `config` without opening it.
pub fn build_model(
    factory: &ModelFactory,
    config: ModelConfig,
    distributor: Arc<dyn Distributor>,
) -> Result<Box<dyn InferenceModel>> {
    let tag = config.model_type.clone();
    factory
        .build(config, distributor)
        .with_context(|| format!("cannot build `{tag}` model"))
}
