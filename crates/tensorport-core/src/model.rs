use std::sync::Arc;

use tracing::info;

use crate::{
    mimo, Backend, Distributor, Engine, Error, InferenceStats, ModelConfig, ModelSpec, Result,
    SingleProcess, Tensor, Timings,
};

/// Engine-agnostic inference lifecycle.
///
/// `Closed --open()--> Open --infer()*--> Open --close()--> Closed`.
/// Calls on one instance must be serialized by the caller; run independent
/// instances for concurrency.
pub trait InferenceModel: Send {
    /// Acquires the model bytes and builds the engine session.
    /// Fails on an already-open model.
    fn open(&mut self) -> Result<()>;

    /// Single-input, single-output inference into a caller-owned tensor.
    fn infer(&mut self, input: &Tensor<'_>, output: &mut Tensor<'_>) -> Result<()>;

    /// Multi-input, multi-output inference. Every binding names a declared
    /// slot; caller tensors are never modified by input layout conversion.
    fn infer_mimo(
        &mut self,
        inputs: &[(&str, &Tensor<'_>)],
        outputs: &mut [(&str, &mut Tensor<'_>)],
    ) -> Result<()>;

    /// Releases the engine. A no-op when already closed.
    fn close(&mut self) -> Result<()>;

    fn is_open(&self) -> bool;

    /// Declared slots of the loaded model, if open.
    fn spec(&self) -> Option<&ModelSpec>;

    fn config(&self) -> &ModelConfig;

    fn statistics(&self) -> &InferenceStats;

    /// Human-readable summary: engine, path and declared slots.
    fn describe(&self) -> String;
}

/// [`InferenceModel`] over any [`Backend`].
pub struct EngineModel<B: Backend> {
    backend: B,
    config: ModelConfig,
    distributor: Arc<dyn Distributor>,
    engine: Option<B::Engine>,
    stats: InferenceStats,
}

impl<B: Backend> EngineModel<B> {
    pub fn new(backend: B, config: ModelConfig) -> Result<Self> {
        Self::with_distributor(backend, config, Arc::new(SingleProcess))
    }

    /// Validates `config` up front; no I/O happens until [`InferenceModel::open`].
    pub fn with_distributor(
        backend: B,
        config: ModelConfig,
        distributor: Arc<dyn Distributor>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            backend,
            config,
            distributor,
            engine: None,
            stats: InferenceStats::default(),
        })
    }

    fn record(&mut self, outcome: Result<Timings>) -> Result<()> {
        match outcome {
            Ok(timings) => {
                self.stats.record(timings);
                Ok(())
            }
            Err(err) => {
                self.stats.record_failure();
                Err(err)
            }
        }
    }
}

impl<B: Backend> InferenceModel for EngineModel<B> {
    fn open(&mut self) -> Result<()> {
        if self.engine.is_some() {
            return Err(Error::AlreadyOpen);
        }

        let buffer = self.distributor.acquire(&self.config.path)?;
        let engine = self
            .backend
            .load(&buffer, &self.config)
            .map_err(|e| Error::engine(self.backend.name(), e))?;
        info!(
            engine = self.backend.name(),
            path = %self.config.path.display(),
            rank = self.distributor.rank(),
            bytes = buffer.size(),
            inputs = engine.spec().inputs.len(),
            outputs = engine.spec().outputs.len(),
            "model opened"
        );

        self.engine = Some(engine);
        Ok(())
    }

    fn infer(&mut self, input: &Tensor<'_>, output: &mut Tensor<'_>) -> Result<()> {
        let name = self.backend.name();
        let native = self.backend.capabilities().native_layout;
        let engine = self.engine.as_mut().ok_or(Error::NotOpen("infer"))?;
        let outcome = mimo::infer_single(engine, name, native, input, output);
        self.record(outcome)
    }

    fn infer_mimo(
        &mut self,
        inputs: &[(&str, &Tensor<'_>)],
        outputs: &mut [(&str, &mut Tensor<'_>)],
    ) -> Result<()> {
        let name = self.backend.name();
        let native = self.backend.capabilities().native_layout;
        let engine = self.engine.as_mut().ok_or(Error::NotOpen("infer_mimo"))?;
        let outcome = mimo::infer_mimo(engine, name, native, inputs, outputs);
        self.record(outcome)
    }

    fn close(&mut self) -> Result<()> {
        if self.engine.take().is_some() {
            info!(
                engine = self.backend.name(),
                path = %self.config.path.display(),
                "model closed"
            );
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.engine.is_some()
    }

    fn spec(&self) -> Option<&ModelSpec> {
        self.engine.as_ref().map(|engine| engine.spec())
    }

    fn config(&self) -> &ModelConfig {
        &self.config
    }

    fn statistics(&self) -> &InferenceStats {
        &self.stats
    }

    fn describe(&self) -> String {
        let header = format!(
            "{} model at {}",
            self.backend.name(),
            self.config.path.display()
        );
        match &self.engine {
            Some(engine) => format!("{header}\n{}", engine.spec()),
            None => format!("{header} (closed)"),
        }
    }
}
