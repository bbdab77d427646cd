use std::path::Path;
use std::sync::Arc;
use std::thread;

use anyhow::{anyhow, bail, ensure, Context, Result};
use tensorport_core::exchange::{load_tensor, mean_squared_error, save_tensor};
use tensorport_core::{
    Distributor, GroupMember, InferenceModel, InferenceStats, Layout, ModelConfig, ModelFactory,
    Shape, Tensor, ThreadGroup,
};
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::registry;

/// A command-line value, optionally bound to a slot as `NAME=VALUE`.
#[derive(Debug, PartialEq)]
struct Binding<T> {
    name: Option<String>,
    value: T,
}

fn split_binding(raw: &str) -> Binding<&str> {
    match raw.split_once('=') {
        Some((name, value)) if !name.is_empty() => Binding {
            name: Some(name.to_string()),
            value,
        },
        _ => Binding {
            name: None,
            value: raw,
        },
    }
}

fn parse_shape(raw: &str) -> Result<Shape> {
    raw.split(',')
        .map(|d| {
            d.trim()
                .parse::<usize>()
                .with_context(|| format!("bad dimension `{d}` in shape `{raw}`"))
        })
        .collect::<Result<Vec<_>>>()
        .map(Shape::from)
}

/// Input tensors and output templates shared by every worker.
#[derive(Debug)]
struct Job {
    /// Single-IO when no binding carries a name.
    named: bool,
    inputs: Vec<Binding<Tensor<'static>>>,
    outputs: Vec<Binding<Shape>>,
    layout: Layout,
    repetitions: usize,
}

impl Job {
    fn from_args(args: &RunArgs) -> Result<Self> {
        let inputs = args
            .inputs
            .iter()
            .map(|raw| {
                let b = split_binding(raw);
                let tensor = load_tensor(b.value)
                    .with_context(|| format!("cannot load input {}", b.value))?;
                Ok(Binding {
                    name: b.name,
                    value: tensor,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let outputs = args
            .output_shapes
            .iter()
            .map(|raw| {
                let b = split_binding(raw);
                Ok(Binding {
                    name: b.name,
                    value: parse_shape(b.value)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let named_count = inputs.iter().filter(|b| b.name.is_some()).count()
            + outputs.iter().filter(|b| b.name.is_some()).count();
        let named = named_count > 0;
        if named {
            ensure!(
                named_count == inputs.len() + outputs.len(),
                "either name every input and output binding (NAME=...) or none"
            );
        } else {
            ensure!(
                inputs.len() == 1 && outputs.len() == 1,
                "multi-input or multi-output runs must name every binding (NAME=...)"
            );
        }

        ensure!(args.repetitions > 0, "--repetitions must be at least 1");
        Ok(Self {
            named,
            inputs,
            outputs,
            layout: args.output_layout.parse()?,
            repetitions: args.repetitions,
        })
    }

    fn allocate_outputs(&self) -> Result<Vec<Binding<Tensor<'static>>>> {
        self.outputs
            .iter()
            .map(|b| {
                Ok(Binding {
                    name: b.name.clone(),
                    value: Tensor::zeros(&b.value, self.layout)?,
                })
            })
            .collect()
    }

    fn infer(
        &self,
        model: &mut dyn InferenceModel,
        outputs: &mut [Binding<Tensor<'static>>],
    ) -> Result<()> {
        if !self.named {
            let ([input], [output]) = (self.inputs.as_slice(), &mut *outputs) else {
                bail!("single-IO run needs exactly one input and one output");
            };
            return Ok(model.infer(&input.value, &mut output.value)?);
        }

        let inputs: Vec<(&str, &Tensor<'_>)> = self
            .inputs
            .iter()
            .map(|b| (b.name.as_deref().unwrap_or_default(), &b.value))
            .collect();
        let mut outputs: Vec<(&str, &mut Tensor<'_>)> = outputs
            .iter_mut()
            .map(|b| (b.name.as_deref().unwrap_or_default(), &mut b.value))
            .collect();
        Ok(model.infer_mimo(&inputs, &mut outputs)?)
    }
}

/// Finds the output a `NAME=...` (or bare, for single-IO) binding refers to.
fn find_output<'a>(
    outputs: &'a [Binding<Tensor<'static>>],
    name: Option<&str>,
) -> Result<&'a Tensor<'static>> {
    match name {
        None if outputs.len() == 1 => Ok(&outputs[0].value),
        None => bail!("name the output (NAME=PATH) when the model has several"),
        Some(name) => outputs
            .iter()
            .find(|b| b.name.as_deref() == Some(name))
            .map(|b| &b.value)
            .ok_or_else(|| anyhow!("no output bound as `{name}`")),
    }
}

struct WorkerReport {
    rank: usize,
    outputs: Vec<Binding<Tensor<'static>>>,
    stats: InferenceStats,
}

fn run_worker(
    factory: &ModelFactory,
    config: ModelConfig,
    member: GroupMember,
    job: &Job,
) -> Result<WorkerReport> {
    let rank = member.rank();
    let mut model = registry::build_model(factory, config, Arc::new(member))?;
    model
        .open()
        .with_context(|| format!("worker {rank}: cannot open model"))?;

    let mut outputs = job.allocate_outputs()?;
    for i in 0..job.repetitions {
        job.infer(model.as_mut(), &mut outputs)
            .with_context(|| format!("worker {rank}: inference {i} failed"))?;
    }

    let stats = model.statistics().clone();
    model.close()?;
    Ok(WorkerReport {
        rank,
        outputs,
        stats,
    })
}

pub fn run(args: RunArgs) -> Result<()> {
    let config = ModelConfig::from_file(&args.config)
        .with_context(|| format!("cannot load config {}", args.config.display()))?;
    let job = Job::from_args(&args)?;
    ensure!(args.workers > 0, "--workers must be at least 1");

    println!("{config}");
    let factory = registry::default_factory();
    let members = ThreadGroup::new(args.workers);
    info!(
        workers = members.len(),
        repetitions = job.repetitions,
        "starting inference"
    );

    let reports = thread::scope(|s| {
        let handles: Vec<_> = members
            .into_iter()
            .map(|member| {
                let config = config.clone();
                let (factory, job) = (&factory, &job);
                s.spawn(move || run_worker(factory, config, member, job))
            })
            .collect();
        handles
            .into_iter()
            .map(|h| {
                h.join()
                    .map_err(|_| anyhow!("worker thread panicked"))
                    .and_then(|report| report)
            })
            .collect::<Result<Vec<_>>>()
    })?;

    for report in &reports {
        println!("worker {}:\n{}", report.rank, report.stats);
    }

    let Some((first, rest)) = reports.split_first() else {
        bail!("no workers ran");
    };
    for report in rest {
        for (a, b) in first.outputs.iter().zip(&report.outputs) {
            let mse = mean_squared_error(&a.value, &b.value)?;
            if mse != 0.0 {
                warn!(rank = report.rank, mse, "worker output differs from worker 0");
            }
        }
    }

    for raw in &args.outputs {
        let b = split_binding(raw);
        let tensor = find_output(&first.outputs, b.name.as_deref())?;
        save_tensor(tensor, b.value).with_context(|| format!("cannot save {}", b.value))?;
        info!(path = b.value, "saved output");
    }

    check_references(&first.outputs, &args.references, args.tolerance)
}

fn check_references(
    outputs: &[Binding<Tensor<'static>>],
    references: &[String],
    tolerance: f32,
) -> Result<()> {
    let mut failed = Vec::new();
    for raw in references {
        let b = split_binding(raw);
        let output = find_output(outputs, b.name.as_deref())?;
        let reference = load_tensor(Path::new(b.value))
            .with_context(|| format!("cannot load reference {}", b.value))?;
        let mse = mean_squared_error(output, &reference)
            .with_context(|| format!("cannot compare against {}", b.value))?;

        let label = b.name.as_deref().unwrap_or("output");
        let verdict = if mse <= tolerance { "ok" } else { "FAILED" };
        println!("{label}: mse {mse:e} vs {} (tolerance {tolerance:e}) {verdict}", b.value);
        if mse > tolerance {
            failed.push(label.to_string());
        }
    }

    ensure!(
        failed.is_empty(),
        "reference check failed for {}",
        failed.join(", ")
    );
    Ok(())
}
