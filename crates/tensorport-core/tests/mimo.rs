mod common;

use anyhow::Result;
use common::{Script, ScriptedBackend};
use tensorport_core::{Error, InferenceModel, Layout, ModelSpec, Tensor, TensorSpec};

const SENTINEL: f32 = -7.0;

#[test]
fn single_io_identity_end_to_end() -> Result<()> {
    let backend = ScriptedBackend::identity(&[1, 4], Layout::RowMajor);
    let (_file, mut model) = common::open_model(backend.clone());

    let input = Tensor::from_vec([1, 4], Layout::RowMajor, vec![0.1, 0.2, 0.3, 0.4])?;
    let mut output = Tensor::zeros([1, 4], Layout::RowMajor)?;
    model.infer(&input, &mut output)?;

    assert_eq!(output.data(), &[0.1, 0.2, 0.3, 0.4]);
    let received = backend.received();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].name, "x");
    assert_eq!(received[0].dims, vec![1, 4]);
    Ok(())
}

#[test]
fn static_output_mismatch_fails_before_the_engine_runs() -> Result<()> {
    let backend = ScriptedBackend::identity(&[3, 5], Layout::RowMajor);
    let (_file, mut model) = common::open_model(backend.clone());

    let input = Tensor::zeros([3, 5], Layout::RowMajor)?;
    let mut buffer = vec![SENTINEL; 12];
    let mut output = Tensor::wrap_mut([3, 4], Layout::RowMajor, &mut buffer)?;

    match model.infer(&input, &mut output) {
        Err(Error::ShapeMismatch {
            expected, actual, ..
        }) => {
            assert_eq!(expected.dims(), &[3, 5]);
            assert_eq!(actual.dims(), &[3, 4]);
        }
        other => panic!("expected ShapeMismatch, got {other:?}"),
    }
    drop(output);
    assert!(buffer.iter().all(|v| *v == SENTINEL));
    assert_eq!(backend.runs(), 0);
    Ok(())
}

#[test]
fn dynamic_output_mismatch_leaves_buffer_unwritten() -> Result<()> {
    let spec = ModelSpec {
        inputs: vec![TensorSpec::new("x", vec![None, None])],
        outputs: vec![TensorSpec::new("y", vec![None, None])],
    };
    let backend = ScriptedBackend::new(spec, Layout::RowMajor, Script::Produce(vec![3, 5]));
    let (_file, mut model) = common::open_model(backend.clone());

    let input = Tensor::zeros([3, 5], Layout::RowMajor)?;
    let mut buffer = vec![SENTINEL; 12];
    let mut output = Tensor::wrap_mut([3, 4], Layout::RowMajor, &mut buffer)?;

    assert!(matches!(
        model.infer(&input, &mut output),
        Err(Error::ShapeMismatch { .. })
    ));
    drop(output);
    assert_eq!(backend.runs(), 1);
    assert!(buffer.iter().all(|v| *v == SENTINEL));
    assert_eq!(model.statistics().failures, 1);
    Ok(())
}

#[test]
fn partly_dynamic_slot_still_checks_static_axes() -> Result<()> {
    let spec = ModelSpec {
        inputs: vec![TensorSpec::new("x", vec![None, Some(4)])],
        outputs: vec![TensorSpec::new("y", vec![None, Some(4)])],
    };
    let backend = ScriptedBackend::new(spec, Layout::RowMajor, Script::Identity);
    let (_file, mut model) = common::open_model(backend.clone());

    let input = Tensor::zeros([2, 5], Layout::RowMajor)?;
    let mut buffer = vec![SENTINEL; 10];
    let mut output = Tensor::wrap_mut([2, 5], Layout::RowMajor, &mut buffer)?;

    match model.infer(&input, &mut output) {
        Err(Error::ShapeMismatch {
            context,
            expected,
            actual,
        }) => {
            assert_eq!(context, "input `x`");
            assert_eq!(expected.dims(), &[2, 4]);
            assert_eq!(actual.dims(), &[2, 5]);
        }
        other => panic!("expected ShapeMismatch, got {other:?}"),
    }
    drop(output);
    assert_eq!(backend.runs(), 0);
    assert!(buffer.iter().all(|v| *v == SENTINEL));

    // A rank the slot does not declare is rejected as well.
    let input = Tensor::zeros([8], Layout::RowMajor)?;
    let mut output = Tensor::zeros([2, 4], Layout::RowMajor)?;
    assert!(matches!(
        model.infer(&input, &mut output),
        Err(Error::ShapeMismatch { .. })
    ));

    let input = Tensor::zeros([3, 4], Layout::RowMajor)?;
    let mut output = Tensor::zeros([3, 4], Layout::RowMajor)?;
    model.infer(&input, &mut output)?;
    assert_eq!(backend.runs(), 1);
    Ok(())
}

#[test]
fn single_io_requires_a_single_io_model() -> Result<()> {
    let backend = ScriptedBackend::sum_diff(&[1, 3], Layout::RowMajor);
    let (_file, mut model) = common::open_model(backend);

    let input = Tensor::zeros([1, 3], Layout::RowMajor)?;
    let mut output = Tensor::zeros([1, 3], Layout::RowMajor)?;
    assert!(matches!(
        model.infer(&input, &mut output),
        Err(Error::BindingCount { .. })
    ));
    Ok(())
}

#[test]
fn output_is_converted_to_caller_layout() -> Result<()> {
    let backend = ScriptedBackend::identity(&[2, 3], Layout::RowMajor);
    let (_file, mut model) = common::open_model(backend);

    let input = Tensor::from_vec([2, 3], Layout::RowMajor, vec![1., 2., 3., 4., 5., 6.])?;
    let mut output = Tensor::zeros([2, 3], Layout::ColumnMajor)?;
    model.infer(&input, &mut output)?;

    assert!(output.is_column_major());
    assert_eq!(output.data(), &[1., 4., 2., 5., 3., 6.]);
    Ok(())
}

#[test]
fn column_major_engine_sees_converted_inputs() -> Result<()> {
    let backend = ScriptedBackend::identity(&[2, 3], Layout::ColumnMajor);
    let (_file, mut model) = common::open_model(backend.clone());

    let values = [1., 2., 3., 4., 5., 6.];
    let input = Tensor::wrap([2, 3], Layout::RowMajor, &values)?;
    let mut output = Tensor::zeros([2, 3], Layout::RowMajor)?;
    model.infer(&input, &mut output)?;

    assert_eq!(backend.received()[0].data, vec![1., 4., 2., 5., 3., 6.]);
    assert_eq!(output.data(), &values);
    assert_eq!(values, [1., 2., 3., 4., 5., 6.]);
    Ok(())
}

#[test]
fn mimo_inputs_are_copied_not_converted_in_place() -> Result<()> {
    let backend = ScriptedBackend::sum_diff(&[2, 2], Layout::RowMajor);
    let (_file, mut model) = common::open_model(backend.clone());

    // a = [[1, 2], [3, 4]], b = [[10, 20], [30, 40]], both column-major.
    let mut a_data = vec![1., 3., 2., 4.];
    let mut b_data = vec![10., 30., 20., 40.];
    let a = Tensor::wrap_mut([2, 2], Layout::ColumnMajor, &mut a_data)?;
    let b = Tensor::wrap_mut([2, 2], Layout::ColumnMajor, &mut b_data)?;
    let mut sum = Tensor::zeros([2, 2], Layout::RowMajor)?;
    let mut diff = Tensor::zeros([2, 2], Layout::RowMajor)?;

    model.infer_mimo(
        &[("a", &a), ("b", &b)],
        &mut [("sum", &mut sum), ("diff", &mut diff)],
    )?;

    assert!(a.is_column_major() && b.is_column_major());
    drop((a, b));
    assert_eq!(a_data, vec![1., 3., 2., 4.]);
    assert_eq!(b_data, vec![10., 30., 20., 40.]);

    let received = backend.received();
    assert_eq!(received[0].data, vec![1., 2., 3., 4.]);
    assert_eq!(received[1].data, vec![10., 20., 30., 40.]);
    assert_eq!(sum.data(), &[11., 22., 33., 44.]);
    assert_eq!(diff.data(), &[-9., -18., -27., -36.]);
    Ok(())
}

#[test]
fn mimo_binds_by_name_in_any_order() -> Result<()> {
    let backend = ScriptedBackend::sum_diff(&[1, 3], Layout::RowMajor);
    let (_file, mut model) = common::open_model(backend.clone());

    let a = Tensor::from_vec([1, 3], Layout::RowMajor, vec![5., 6., 7.])?;
    let b = Tensor::from_vec([1, 3], Layout::RowMajor, vec![1., 2., 3.])?;
    let mut sum = Tensor::zeros([1, 3], Layout::RowMajor)?;
    let mut diff = Tensor::zeros([1, 3], Layout::RowMajor)?;

    model.infer_mimo(
        &[("b", &b), ("a", &a)],
        &mut [("diff", &mut diff), ("sum", &mut sum)],
    )?;

    let names: Vec<String> = backend.received().into_iter().map(|r| r.name).collect();
    assert_eq!(names, vec!["a", "b"]);
    assert_eq!(sum.data(), &[6., 8., 10.]);
    assert_eq!(diff.data(), &[4., 4., 4.]);
    Ok(())
}

#[test]
fn mimo_rejects_bad_bindings() -> Result<()> {
    let backend = ScriptedBackend::sum_diff(&[1, 3], Layout::RowMajor);
    let (_file, mut model) = common::open_model(backend.clone());

    let a = Tensor::zeros([1, 3], Layout::RowMajor)?;
    let b = Tensor::zeros([1, 3], Layout::RowMajor)?;
    let mut sum = Tensor::zeros([1, 3], Layout::RowMajor)?;
    let mut diff = Tensor::zeros([1, 3], Layout::RowMajor)?;

    let unknown = model.infer_mimo(
        &[("a", &a), ("c", &b)],
        &mut [("sum", &mut sum), ("diff", &mut diff)],
    );
    match unknown {
        Err(Error::UnknownSlot {
            direction, name, ..
        }) => {
            assert_eq!(direction, "input");
            assert_eq!(name, "c");
        }
        other => panic!("expected UnknownSlot, got {other:?}"),
    }

    let duplicate = model.infer_mimo(
        &[("a", &a), ("b", &b)],
        &mut [("sum", &mut sum), ("sum", &mut diff)],
    );
    assert!(matches!(
        duplicate,
        Err(Error::DuplicateSlot {
            direction: "output",
            ..
        })
    ));

    let short = model.infer_mimo(&[("a", &a)], &mut [("sum", &mut sum), ("diff", &mut diff)]);
    assert!(matches!(
        short,
        Err(Error::BindingCount {
            expected: 2,
            actual: 1,
            ..
        })
    ));

    assert_eq!(backend.runs(), 0);
    assert_eq!(model.statistics().failures, 3);
    Ok(())
}

#[test]
fn read_only_output_is_rejected() -> Result<()> {
    let backend = ScriptedBackend::identity(&[1, 4], Layout::RowMajor);
    let (_file, mut model) = common::open_model(backend);

    let input = Tensor::zeros([1, 4], Layout::RowMajor)?;
    let storage = [0.0f32; 4];
    let mut output = Tensor::wrap([1, 4], Layout::RowMajor, &storage)?;
    assert!(matches!(
        model.infer(&input, &mut output),
        Err(Error::ReadOnlyTensor(_))
    ));
    Ok(())
}
