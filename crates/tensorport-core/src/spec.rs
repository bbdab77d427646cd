use std::fmt;

use crate::Shape;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct IOName(pub String);

impl fmt::Display for IOName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A declared input or output slot of a loaded model.
#[derive(Clone, Debug)]
pub struct TensorSpec {
    pub name: IOName,
    pub dims: Vec<Option<usize>>, // None = dynamic
}

impl TensorSpec {
    pub fn new(name: impl Into<String>, dims: Vec<Option<usize>>) -> Self {
        Self {
            name: IOName(name.into()),
            dims,
        }
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// True when `shape` agrees with every statically declared axis.
    pub fn accepts(&self, shape: &Shape) -> bool {
        shape.rank() == self.rank()
            && self
                .dims
                .iter()
                .zip(shape.dims())
                .all(|(declared, actual)| declared.map_or(true, |d| d == *actual))
    }

    /// The declared shape with dynamic axes filled in from `actual`.
    ///
    /// Axes `actual` lacks are reported as 0; used to describe a rejected shape.
    pub fn resolved_against(&self, actual: &Shape) -> Shape {
        self.dims
            .iter()
            .enumerate()
            .map(|(i, d)| d.or_else(|| actual.dims().get(i).copied()).unwrap_or(0))
            .collect::<Vec<_>>()
            .into()
    }
}

impl fmt::Display for TensorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: rank {}, dims [", self.name, self.rank())?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match d {
                Some(d) => write!(f, "{d}")?,
                None => write!(f, "any")?,
            }
        }
        write!(f, "]")
    }
}

#[derive(Clone, Debug, Default)]
pub struct ModelSpec {
    pub inputs: Vec<TensorSpec>,
    pub outputs: Vec<TensorSpec>,
}

impl ModelSpec {
    pub fn input_names(&self) -> Vec<&str> {
        self.inputs.iter().map(|s| s.name.0.as_str()).collect()
    }

    pub fn output_names(&self) -> Vec<&str> {
        self.outputs.iter().map(|s| s.name.0.as_str()).collect()
    }
}

impl fmt::Display for ModelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} input(s)", self.inputs.len())?;
        for (i, spec) in self.inputs.iter().enumerate() {
            writeln!(f, "  input[{i}] {spec}")?;
        }
        writeln!(f, "{} output(s)", self.outputs.len())?;
        for (i, spec) in self.outputs.iter().enumerate() {
            writeln!(f, "  output[{i}] {spec}")?;
        }
        Ok(())
    }
}
