use std::path::PathBuf;

use thiserror::Error;

use crate::Shape;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("unknown model type `{tag}` (registered: {known})")]
    UnknownModelType { tag: String, known: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to read model file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("model file {} is empty", path.display())]
    EmptyModel { path: PathBuf },

    #[error("model distribution failed on rank {rank}: {reason}")]
    Distribution { rank: usize, reason: String },

    #[error("shape mismatch for {context}: expected {expected}, got {actual}")]
    ShapeMismatch {
        context: String,
        expected: Shape,
        actual: Shape,
    },

    #[error("{context}: expected {expected} tensors, got {actual}")]
    BindingCount {
        context: String,
        expected: usize,
        actual: usize,
    },

    #[error("no {direction} slot named `{name}` (declared: {declared})")]
    UnknownSlot {
        direction: &'static str,
        name: String,
        declared: String,
    },

    #[error("{direction} slot `{name}` is bound more than once")]
    DuplicateSlot {
        direction: &'static str,
        name: String,
    },

    #[error("shape {dims} does not fit in {target}")]
    ShapeOverflow { dims: String, target: &'static str },

    #[error("dimension {axis} of engine shape {dims:?} is negative")]
    NegativeDimension { axis: usize, dims: Vec<i64> },

    #[error("tensor data has {len} elements but shape {shape} needs {expected}")]
    DataLength {
        shape: Shape,
        len: usize,
        expected: usize,
    },

    #[error("{0} tensor wraps read-only storage and cannot be written")]
    ReadOnlyTensor(String),

    #[error("{0}: model is not open")]
    NotOpen(&'static str),

    #[error("model is already open")]
    AlreadyOpen,

    #[error("engine `{engine}` failed")]
    Engine {
        engine: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("tensor file {}: {reason}", path.display())]
    TensorFormat { path: PathBuf, reason: String },
}

impl Error {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    pub fn engine(engine: &'static str, source: anyhow::Error) -> Self {
        Error::Engine { engine, source }
    }

    pub(crate) fn tensor_format<S: Into<String>>(path: impl Into<PathBuf>, reason: S) -> Self {
        Error::TensorFormat {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
