//! Tensor files for fixtures and debugging.
//!
//! Two formats are supported, chosen by file extension:
//!
//! - `.csv` / `.txt`: optional `# shape: 2,3` and `# layout: column-major`
//!   header lines, then values in storage order separated by commas or
//!   whitespace. Without a shape header the values form a 1-D tensor.
//! - `.npy`: NumPy arrays of `f32`; `fortran_order` maps to column-major.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use ndarray::{ArrayD, IxDyn, ShapeBuilder};
use ndarray_npy::{ReadNpyExt, WriteNpyExt};

use crate::{Error, Layout, Result, Shape, Tensor};

enum Format {
    Text,
    Npy,
}

fn format_of(path: &Path) -> Result<Format> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("csv") | Some("txt") => Ok(Format::Text),
        Some("npy") => Ok(Format::Npy),
        _ => Err(Error::tensor_format(
            path,
            "unsupported extension (expected .csv, .txt or .npy)",
        )),
    }
}

pub fn load_tensor(path: impl AsRef<Path>) -> Result<Tensor<'static>> {
    let path = path.as_ref();
    match format_of(path)? {
        Format::Text => load_text(path),
        Format::Npy => load_npy(path),
    }
}

pub fn save_tensor(tensor: &Tensor<'_>, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    match format_of(path)? {
        Format::Text => save_text(tensor, path),
        Format::Npy => save_npy(tensor, path),
    }
}

fn parse_shape(path: &Path, raw: &str) -> Result<Shape> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(Shape::default());
    }
    raw.split(',')
        .map(|d| {
            d.trim()
                .parse::<usize>()
                .map_err(|e| Error::tensor_format(path, format!("bad shape entry `{d}`: {e}")))
        })
        .collect::<Result<Vec<_>>>()
        .map(Shape::from)
}

pub fn load_text(path: impl AsRef<Path>) -> Result<Tensor<'static>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| Error::tensor_format(path, e.to_string()))?;

    let mut shape = None;
    let mut layout = Layout::RowMajor;
    let mut values = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if let Some(header) = line.strip_prefix('#') {
            if let Some((key, value)) = header.split_once(':') {
                match key.trim() {
                    "shape" => shape = Some(parse_shape(path, value)?),
                    "layout" => layout = value.parse()?,
                    _ => {}
                }
            }
            continue;
        }
        for token in line
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|t| !t.is_empty())
        {
            let value = token.parse::<f32>().map_err(|e| {
                Error::tensor_format(path, format!("bad value `{token}`: {e}"))
            })?;
            values.push(value);
        }
    }

    let shape = shape.unwrap_or_else(|| Shape::from_slice(&[values.len()]));
    Tensor::from_vec(shape, layout, values)
}

pub fn save_text(tensor: &Tensor<'_>, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let io_err = |e: std::io::Error| Error::tensor_format(path, e.to_string());

    let file = File::create(path).map_err(io_err)?;
    let mut out = BufWriter::new(file);
    let dims = tensor
        .dims()
        .iter()
        .map(usize::to_string)
        .collect::<Vec<_>>()
        .join(",");
    writeln!(out, "# shape: {dims}").map_err(io_err)?;
    writeln!(out, "# layout: {}", tensor.layout()).map_err(io_err)?;

    let row = match tensor.layout() {
        Layout::RowMajor => tensor.dims().last(),
        Layout::ColumnMajor => tensor.dims().first(),
    }
    .copied()
    .filter(|n| *n > 0)
    .unwrap_or(1);
    for chunk in tensor.data().chunks(row) {
        let line = chunk
            .iter()
            .map(f32::to_string)
            .collect::<Vec<_>>()
            .join(",");
        writeln!(out, "{line}").map_err(io_err)?;
    }
    out.flush().map_err(io_err)
}

pub fn load_npy(path: impl AsRef<Path>) -> Result<Tensor<'static>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| Error::tensor_format(path, e.to_string()))?;
    let array = ArrayD::<f32>::read_npy(BufReader::new(file))
        .map_err(|e| Error::tensor_format(path, e.to_string()))?;

    let shape = Shape::from_slice(array.shape());
    if array.is_standard_layout() {
        Tensor::from_vec(shape, Layout::RowMajor, array.iter().copied().collect())
    } else if array.t().is_standard_layout() {
        Tensor::from_vec(shape, Layout::ColumnMajor, array.t().iter().copied().collect())
    } else {
        Tensor::from_vec(shape, Layout::RowMajor, array.iter().copied().collect())
    }
}

pub fn save_npy(tensor: &Tensor<'_>, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let dims = IxDyn(tensor.dims());
    let data = tensor.data().to_vec();
    let array = match tensor.layout() {
        Layout::RowMajor => ArrayD::from_shape_vec(dims, data),
        Layout::ColumnMajor => ArrayD::from_shape_vec(dims.f(), data),
    }
    .map_err(|e| Error::tensor_format(path, e.to_string()))?;

    let file = File::create(path).map_err(|e| Error::tensor_format(path, e.to_string()))?;
    array
        .write_npy(BufWriter::new(file))
        .map_err(|e| Error::tensor_format(path, e.to_string()))
}

/// Mean squared error over logical values; layouts may differ.
pub fn mean_squared_error(a: &Tensor<'_>, b: &Tensor<'_>) -> Result<f32> {
    if a.shape() != b.shape() {
        return Err(Error::ShapeMismatch {
            context: "tensor comparison".to_string(),
            expected: a.shape().clone(),
            actual: b.shape().clone(),
        });
    }
    if a.size() == 0 {
        return Ok(0.0);
    }
    let (x, y) = (a.row_major_values(), b.row_major_values());
    let sum: f64 = x
        .iter()
        .zip(y.iter())
        .map(|(x, y)| {
            let d = f64::from(*x) - f64::from(*y);
            d * d
        })
        .sum();
    Ok((sum / a.size() as f64) as f32)
}
