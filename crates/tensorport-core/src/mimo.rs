//! Tensor marshalling between callers and engines.
//!
//! Both single-IO and multi-input/multi-output calls go through
//! [`execute`]: inputs are staged in the engine's native layout, the engine
//! runs once, and every output is validated before any caller buffer is
//! written, so a call either fully succeeds or leaves outputs untouched.

use std::time::Instant;

use tracing::debug;

use crate::{
    convert_layout_into, Engine, EngineInput, Error, Layout, Result, Shape, Tensor, TensorSpec,
    Timings,
};

fn declared_names(declared: &[TensorSpec]) -> String {
    declared
        .iter()
        .map(|s| s.name.0.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Maps each caller binding to the position of the declared slot it names.
fn resolve<'n>(
    direction: &'static str,
    declared: &[TensorSpec],
    names: impl ExactSizeIterator<Item = &'n str>,
) -> Result<Vec<usize>> {
    if names.len() != declared.len() {
        return Err(Error::BindingCount {
            context: format!("{direction} bindings"),
            expected: declared.len(),
            actual: names.len(),
        });
    }

    let mut taken = vec![false; declared.len()];
    let mut slots = Vec::with_capacity(declared.len());
    for name in names {
        let slot = declared
            .iter()
            .position(|s| s.name.0 == name)
            .ok_or_else(|| Error::UnknownSlot {
                direction,
                name: name.to_string(),
                declared: declared_names(declared),
            })?;
        if std::mem::replace(&mut taken[slot], true) {
            return Err(Error::DuplicateSlot {
                direction,
                name: name.to_string(),
            });
        }
        slots.push(slot);
    }
    Ok(slots)
}

/// Puts `input` into the engine's layout.
///
/// With `working_copy` every input is copied first, so conversion never
/// touches caller storage; otherwise matching inputs are passed as views.
fn stage_input<'t>(
    input: &'t Tensor<'_>,
    slot: &TensorSpec,
    native: Layout,
    working_copy: bool,
) -> Result<Tensor<'t>> {
    if input.layout() != native {
        debug!(
            slot = %slot.name,
            from = %input.layout(),
            to = %native,
            "converting input to engine layout"
        );
    }
    if working_copy {
        return Ok(input.to_layout(native));
    }
    if input.layout() == native {
        Tensor::wrap(input.shape(), native, input.data())
    } else {
        Ok(input.to_opposite_layout())
    }
}

/// Rejects a caller shape that breaks the slot's rank or a static axis.
fn check_declared(slot: &TensorSpec, shape: &Shape, direction: &str) -> Result<()> {
    if slot.accepts(shape) {
        return Ok(());
    }
    Err(Error::ShapeMismatch {
        context: format!("{direction} `{}`", slot.name),
        expected: slot.resolved_against(shape),
        actual: shape.clone(),
    })
}

/// Runs `engine` once with inputs and outputs already in declared slot order.
pub(crate) fn execute<E: Engine + ?Sized>(
    engine: &mut E,
    engine_name: &'static str,
    native: Layout,
    inputs: &[&Tensor<'_>],
    outputs: &mut [&mut Tensor<'_>],
    working_copies: bool,
) -> Result<Timings> {
    let spec = engine.spec();
    if inputs.len() != spec.inputs.len() {
        return Err(Error::BindingCount {
            context: "model inputs".to_string(),
            expected: spec.inputs.len(),
            actual: inputs.len(),
        });
    }
    if outputs.len() != spec.outputs.len() {
        return Err(Error::BindingCount {
            context: "model outputs".to_string(),
            expected: spec.outputs.len(),
            actual: outputs.len(),
        });
    }

    for (slot, input) in spec.inputs.iter().zip(inputs) {
        check_declared(slot, input.shape(), "input")?;
    }
    for (slot, output) in spec.outputs.iter().zip(outputs.iter()) {
        if !output.is_writable() {
            return Err(Error::ReadOnlyTensor(format!("output `{}`", slot.name)));
        }
        check_declared(slot, output.shape(), "output")?;
    }

    let started = Instant::now();
    let staged = spec
        .inputs
        .iter()
        .zip(inputs)
        .map(|(slot, input)| stage_input(input, slot, native, working_copies))
        .collect::<Result<Vec<_>>>()?;
    let dims = staged
        .iter()
        .map(|t| t.shape().to_engine_dims())
        .collect::<Result<Vec<_>>>()?;
    let names: Vec<String> = spec.inputs.iter().map(|s| s.name.0.clone()).collect();
    let engine_inputs: Vec<EngineInput<'_>> = names
        .iter()
        .zip(&staged)
        .zip(&dims)
        .map(|((name, tensor), dims)| EngineInput {
            name: name.as_str(),
            dims,
            data: tensor.data(),
        })
        .collect();
    let marshal_us = started.elapsed().as_micros() as u64;

    let started = Instant::now();
    let results = engine
        .run(&engine_inputs)
        .map_err(|e| Error::engine(engine_name, e))?;
    let engine_us = started.elapsed().as_micros() as u64;

    let started = Instant::now();
    if results.len() != outputs.len() {
        return Err(Error::BindingCount {
            context: format!("outputs returned by engine `{engine_name}`"),
            expected: outputs.len(),
            actual: results.len(),
        });
    }

    let spec = engine.spec();
    let mut shapes: Vec<Shape> = Vec::with_capacity(results.len());
    for ((slot, result), output) in spec.outputs.iter().zip(&results).zip(outputs.iter()) {
        let produced = Shape::from_engine_dims(&result.dims)?;
        let expected = produced.numel()?;
        if result.data.len() != expected {
            return Err(Error::DataLength {
                shape: produced,
                len: result.data.len(),
                expected,
            });
        }
        if produced != *output.shape() {
            return Err(Error::ShapeMismatch {
                context: format!("output `{}`", slot.name),
                expected: produced,
                actual: output.shape().clone(),
            });
        }
        shapes.push(produced);
    }

    for ((result, output), shape) in results.iter().zip(outputs.iter_mut()).zip(&shapes) {
        let layout = output.layout();
        let dst = output.data_mut()?;
        if layout == native {
            dst.copy_from_slice(&result.data);
        } else {
            convert_layout_into(&result.data, shape.dims(), native, dst);
        }
    }
    let unmarshal_us = started.elapsed().as_micros() as u64;

    Ok(Timings {
        marshal_us,
        engine_us,
        unmarshal_us,
    })
}

pub(crate) fn infer_single<E: Engine + ?Sized>(
    engine: &mut E,
    engine_name: &'static str,
    native: Layout,
    input: &Tensor<'_>,
    output: &mut Tensor<'_>,
) -> Result<Timings> {
    let spec = engine.spec();
    if spec.inputs.len() != 1 || spec.outputs.len() != 1 {
        return Err(Error::BindingCount {
            context: format!(
                "single-IO inference on a model with {} inputs and {} outputs (use infer_mimo)",
                spec.inputs.len(),
                spec.outputs.len()
            ),
            expected: 1,
            actual: spec.inputs.len().max(spec.outputs.len()),
        });
    }
    execute(engine, engine_name, native, &[input], &mut [output], false)
}

/// Binds caller tensors to declared slots by name, then runs once.
pub(crate) fn infer_mimo<E: Engine + ?Sized>(
    engine: &mut E,
    engine_name: &'static str,
    native: Layout,
    inputs: &[(&str, &Tensor<'_>)],
    outputs: &mut [(&str, &mut Tensor<'_>)],
) -> Result<Timings> {
    let spec = engine.spec();
    let input_slots = resolve("input", &spec.inputs, inputs.iter().map(|(name, _)| *name))?;
    let output_slots = resolve("output", &spec.outputs, outputs.iter().map(|(name, _)| *name))?;

    let mut ordered_inputs: Vec<Option<&Tensor<'_>>> = vec![None; input_slots.len()];
    for ((_, tensor), slot) in inputs.iter().zip(&input_slots) {
        ordered_inputs[*slot] = Some(*tensor);
    }
    let ordered_inputs: Vec<&Tensor<'_>> = ordered_inputs.into_iter().flatten().collect();

    let mut ordered_outputs: Vec<Option<&mut Tensor<'_>>> =
        (0..output_slots.len()).map(|_| None).collect();
    for (binding, slot) in outputs.iter_mut().zip(&output_slots) {
        ordered_outputs[*slot] = Some(&mut *binding.1);
    }
    let mut ordered_outputs: Vec<&mut Tensor<'_>> = ordered_outputs.into_iter().flatten().collect();

    execute(
        engine,
        engine_name,
        native,
        &ordered_inputs,
        &mut ordered_outputs,
        true,
    )
}
