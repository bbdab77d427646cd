#![allow(dead_code)]

use std::io::Write;
use std::sync::{Arc, Mutex};

use anyhow::{bail, ensure, Result};
use tempfile::NamedTempFile;
use tensorport_core::{
    Backend, BackendCapabilities, Engine, EngineInput, EngineModel, EngineOutput, Layout,
    ModelBuffer, ModelConfig, ModelSpec, TensorSpec,
};

pub const MODEL_BYTES: &[u8] = b"scripted model v1";

#[derive(Clone, Debug)]
pub enum Script {
    /// Output `i` echoes input `i`.
    Identity,
    /// Two inputs `a`, `b`; outputs `a + b` then `a - b`.
    SumDiff,
    /// One output of the given dims, filled with ones.
    Produce(Vec<i64>),
    Fail,
}

#[derive(Clone, Debug)]
pub struct Received {
    pub name: String,
    pub dims: Vec<i64>,
    pub data: Vec<f32>,
}

/// In-memory backend whose engine follows a fixed script and records what
/// it was handed.
#[derive(Clone)]
pub struct ScriptedBackend {
    spec: ModelSpec,
    native: Layout,
    script: Script,
    pub received: Arc<Mutex<Vec<Received>>>,
    pub runs: Arc<Mutex<usize>>,
    pub loaded: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl ScriptedBackend {
    pub fn new(spec: ModelSpec, native: Layout, script: Script) -> Self {
        Self {
            spec,
            native,
            script,
            received: Arc::default(),
            runs: Arc::default(),
            loaded: Arc::default(),
        }
    }

    /// `x -> y` identity with static dims.
    pub fn identity(dims: &[usize], native: Layout) -> Self {
        let dims: Vec<Option<usize>> = dims.iter().copied().map(Some).collect();
        Self::new(
            ModelSpec {
                inputs: vec![TensorSpec::new("x", dims.clone())],
                outputs: vec![TensorSpec::new("y", dims)],
            },
            native,
            Script::Identity,
        )
    }

    /// Inputs `a`, `b` and outputs `sum`, `diff`, all of the given dims.
    pub fn sum_diff(dims: &[usize], native: Layout) -> Self {
        let dims: Vec<Option<usize>> = dims.iter().copied().map(Some).collect();
        Self::new(
            ModelSpec {
                inputs: vec![
                    TensorSpec::new("a", dims.clone()),
                    TensorSpec::new("b", dims.clone()),
                ],
                outputs: vec![
                    TensorSpec::new("sum", dims.clone()),
                    TensorSpec::new("diff", dims),
                ],
            },
            native,
            Script::SumDiff,
        )
    }

    pub fn received(&self) -> Vec<Received> {
        self.received.lock().unwrap().clone()
    }

    pub fn runs(&self) -> usize {
        *self.runs.lock().unwrap()
    }
}

pub struct ScriptedEngine {
    spec: ModelSpec,
    script: Script,
    received: Arc<Mutex<Vec<Received>>>,
    runs: Arc<Mutex<usize>>,
}

impl Backend for ScriptedBackend {
    type Engine = ScriptedEngine;

    fn name(&self) -> &'static str {
        "scripted"
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            native_layout: self.native,
        }
    }

    fn load(&self, model: &ModelBuffer, _config: &ModelConfig) -> Result<ScriptedEngine> {
        ensure!(model.size() > 0, "scripted backend got an empty model");
        self.loaded.lock().unwrap().push(model.data().to_vec());
        Ok(ScriptedEngine {
            spec: self.spec.clone(),
            script: self.script.clone(),
            received: self.received.clone(),
            runs: self.runs.clone(),
        })
    }
}

impl Engine for ScriptedEngine {
    fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    fn run(&mut self, inputs: &[EngineInput<'_>]) -> Result<Vec<EngineOutput>> {
        *self.runs.lock().unwrap() += 1;
        *self.received.lock().unwrap() = inputs
            .iter()
            .map(|i| Received {
                name: i.name.to_string(),
                dims: i.dims.to_vec(),
                data: i.data.to_vec(),
            })
            .collect();

        match &self.script {
            Script::Identity => Ok(inputs
                .iter()
                .take(self.spec.outputs.len())
                .map(|i| EngineOutput {
                    dims: i.dims.to_vec(),
                    data: i.data.to_vec(),
                })
                .collect()),
            Script::SumDiff => {
                ensure!(inputs.len() == 2, "sum/diff needs two inputs");
                let (a, b) = (&inputs[0], &inputs[1]);
                ensure!(a.dims == b.dims, "sum/diff inputs differ in shape");
                Ok(vec![
                    EngineOutput {
                        dims: a.dims.to_vec(),
                        data: a.data.iter().zip(b.data).map(|(x, y)| x + y).collect(),
                    },
                    EngineOutput {
                        dims: a.dims.to_vec(),
                        data: a.data.iter().zip(b.data).map(|(x, y)| x - y).collect(),
                    },
                ])
            }
            Script::Produce(dims) => {
                let n = dims.iter().product::<i64>() as usize;
                Ok(vec![EngineOutput {
                    dims: dims.clone(),
                    data: vec![1.0; n],
                }])
            }
            Script::Fail => bail!("scripted engine failure"),
        }
    }
}

pub fn model_file() -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create model file");
    file.write_all(MODEL_BYTES).expect("write model file");
    file.flush().expect("flush model file");
    file
}

/// An opened model over `backend`, plus the temp file backing it.
pub fn open_model(backend: ScriptedBackend) -> (NamedTempFile, EngineModel<ScriptedBackend>) {
    use tensorport_core::InferenceModel;

    let file = model_file();
    let config = ModelConfig::new("scripted", file.path());
    let mut model = EngineModel::new(backend, config).expect("valid config");
    model.open().expect("open scripted model");
    (file, model)
}
