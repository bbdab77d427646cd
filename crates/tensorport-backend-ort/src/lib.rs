use anyhow::{bail, ensure, Context, Result};
use ort::{
    session::{
        builder::{GraphOptimizationLevel, SessionBuilder},
        Session, SessionInputValue,
    },
    tensor::TensorElementType,
    value::{ValueRef, ValueType},
};
use tensorport_core::{
    Backend, BackendCapabilities, Engine, EngineInput, EngineOutput, Layout, ModelBuffer,
    ModelConfig, ModelFactory, ModelSpec, TensorSpec,
};
use tracing::{debug, info};

/// Factory tags this backend answers to.
pub const TAGS: [&str; 2] = ["onnx", "onnxruntime"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Cuda { device_id: u32 },
}

pub fn parse_device(raw: &str) -> Result<Device> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("cpu") {
        return Ok(Device::Cpu);
    }

    if let Some(rest) = raw.strip_prefix("cuda:") {
        let device_id: u32 = rest.parse().context("invalid cuda device id")?;
        return Ok(Device::Cuda { device_id });
    }

    bail!("unsupported device: {raw} (expected cpu or cuda:N)");
}

/// Session options read from the model configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionOptions {
    pub intra_threads: usize,
    pub optimization_level: u8,
    pub device: Device,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            intra_threads: 1,
            optimization_level: 3,
            device: Device::Cpu,
        }
    }
}

impl SessionOptions {
    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        let mut options = Self::default();
        if let Some(threads) = config.option_usize("intra_threads")? {
            ensure!(threads > 0, "intra_threads must be at least 1");
            options.intra_threads = threads;
        }
        if let Some(level) = config.option_usize("optimization_level")? {
            ensure!(level <= 3, "optimization_level must be 0-3, got {level}");
            options.optimization_level = level as u8;
        }
        if let Some(device) = config.option_str("device")? {
            options.device = parse_device(device)?;
        }
        Ok(options)
    }

    fn graph_optimization(&self) -> GraphOptimizationLevel {
        match self.optimization_level {
            0 => GraphOptimizationLevel::Disable,
            1 => GraphOptimizationLevel::Level1,
            2 => GraphOptimizationLevel::Level2,
            _ => GraphOptimizationLevel::Level3,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct OrtBackend;

impl OrtBackend {
    pub fn new() -> Self {
        Self
    }
}

/// Registers the ONNX Runtime backend under every tag in [`TAGS`].
pub fn register(factory: &mut ModelFactory) {
    for tag in TAGS {
        factory.register_backend(tag, OrtBackend::new());
    }
}

pub struct OrtEngine {
    spec: ModelSpec,
    session: Session,
}

impl Backend for OrtBackend {
    type Engine = OrtEngine;

    fn name(&self) -> &'static str {
        "onnxruntime"
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            native_layout: Layout::RowMajor,
        }
    }

    fn load(&self, model: &ModelBuffer, config: &ModelConfig) -> Result<Self::Engine> {
        let options = SessionOptions::from_config(config)?;

        // The first builder in the process creates the shared ORT environment.
        let builder = Session::builder()
            .context("failed to create ORT session builder")?
            .with_optimization_level(options.graph_optimization())
            .context("failed to configure ORT session builder")?
            .with_intra_threads(options.intra_threads)
            .context("failed to configure ORT intra-op threads")?;

        let builder = configure_session_builder(builder, &options.device)?;

        let session = builder
            .commit_from_memory(model.data())
            .context("failed to load ONNX model")?;

        let spec = build_model_spec(&session)?;
        info!(
            bytes = model.size(),
            inputs = spec.inputs.len(),
            outputs = spec.outputs.len(),
            threads = options.intra_threads,
            device = ?options.device,
            "onnxruntime session ready"
        );

        Ok(OrtEngine { spec, session })
    }
}

impl Engine for OrtEngine {
    fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    fn run(&mut self, inputs: &[EngineInput<'_>]) -> Result<Vec<EngineOutput>> {
        ensure!(
            inputs.len() == self.spec.inputs.len(),
            "expected {} inputs, got {}",
            self.spec.inputs.len(),
            inputs.len()
        );

        let mut ort_inputs = Vec::with_capacity(inputs.len());
        for input in inputs {
            let shape = input
                .dims
                .iter()
                .map(|d| usize::try_from(*d))
                .collect::<std::result::Result<Vec<_>, _>>()
                .with_context(|| format!("negative dimension in input `{}`", input.name))?;
            let value = ort::value::Tensor::from_array((shape, input.data.to_vec()))?.into_dyn();
            ort_inputs.push((input.name.to_string(), SessionInputValue::from(value)));
        }

        let outputs = self.session.run(ort_inputs)?;
        let mut results = Vec::with_capacity(outputs.len());
        for (name, value) in outputs.iter() {
            debug!(output = name, "extracting output");
            results.push(ort_value_to_output(&value).with_context(|| format!("output `{name}`"))?);
        }
        Ok(results)
    }
}

fn build_model_spec(session: &Session) -> Result<ModelSpec> {
    let inputs = session
        .inputs
        .iter()
        .map(|input| tensor_spec_from_value_type(&input.name, &input.input_type))
        .collect::<Result<Vec<_>>>()?;

    let outputs = session
        .outputs
        .iter()
        .map(|output| tensor_spec_from_value_type(&output.name, &output.output_type))
        .collect::<Result<Vec<_>>>()?;

    Ok(ModelSpec { inputs, outputs })
}

fn configure_session_builder(builder: SessionBuilder, device: &Device) -> Result<SessionBuilder> {
    match device {
        Device::Cpu => Ok(builder),
        Device::Cuda { device_id } => configure_cuda(builder, *device_id),
    }
}

fn configure_cuda(builder: SessionBuilder, device_id: u32) -> Result<SessionBuilder> {
    #[cfg(feature = "cuda")]
    {
        use ort::execution_providers::cuda::CUDAExecutionProvider;
        let ep = CUDAExecutionProvider::default()
            .with_device_id(device_id as i32)
            .build();
        builder
            .with_execution_providers([ep])
            .context("failed to enable ORT CUDA execution provider")
    }
    #[cfg(not(feature = "cuda"))]
    {
        let _ = (builder, device_id);
        bail!("CUDA requested but tensorport-backend-ort was built without the `cuda` feature")
    }
}

fn tensor_spec_from_value_type(name: &str, value_type: &ValueType) -> Result<TensorSpec> {
    let ValueType::Tensor { ty, shape, .. } = value_type else {
        bail!("slot `{name}`: unsupported non-tensor IO value type");
    };
    ensure!(
        *ty == TensorElementType::Float32,
        "slot `{name}`: only f32 tensors are supported, model declares {ty}"
    );

    let dims = shape
        .iter()
        .map(|d| usize::try_from(*d).ok())
        .collect::<Vec<_>>();

    Ok(TensorSpec::new(name, dims))
}

fn ort_value_to_output(value: &ValueRef<'_>) -> Result<EngineOutput> {
    let array = value.try_extract_array::<f32>()?;
    let dims = array
        .shape()
        .iter()
        .map(|d| i64::try_from(*d))
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("output dimension does not fit in i64")?;
    let data = match array.as_slice() {
        Some(slice) => slice.to_vec(),
        None => array.iter().copied().collect(),
    };
    Ok(EngineOutput { dims, data })
}
