use anyhow::Result;

use crate::{Layout, ModelBuffer, ModelConfig, ModelSpec};

#[derive(Clone, Copy, Debug)]
pub struct BackendCapabilities {
    /// Layout every tensor must be in when handed to [`Engine::run`].
    pub native_layout: Layout,
}

/// An inference runtime that can turn model bytes into a live engine.
///
/// Register backends with [`crate::ModelFactory`]; the lifecycle, tensor
/// marshalling and layout bridging around them live in [`crate::EngineModel`].
pub trait Backend: Send + Sync + 'static {
    type Engine: Engine;

    fn name(&self) -> &'static str;
    fn capabilities(&self) -> BackendCapabilities;

    /// `config` carries backend-specific options untouched.
    fn load(&self, model: &ModelBuffer, config: &ModelConfig) -> Result<Self::Engine>;
}

/// One input handed to the engine, already in its native layout.
#[derive(Clone, Copy, Debug)]
pub struct EngineInput<'a> {
    pub name: &'a str,
    pub dims: &'a [i64],
    pub data: &'a [f32],
}

/// One output produced by the engine, in its native layout.
#[derive(Clone, Debug)]
pub struct EngineOutput {
    pub dims: Vec<i64>,
    pub data: Vec<f32>,
}

/// A loaded session. Dropping it releases the runtime's resources.
pub trait Engine: Send + 'static {
    fn spec(&self) -> &ModelSpec;

    /// Inputs arrive in declared order; outputs must come back in declared order.
    fn run(&mut self, inputs: &[EngineInput<'_>]) -> Result<Vec<EngineOutput>>;
}
