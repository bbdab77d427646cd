//! Engine-agnostic inference: tensors with explicit layout and ownership,
//! model buffers and their distribution, and the [`InferenceModel`]
//! lifecycle that bridges callers to interchangeable engines.

pub mod backend;
pub mod buffer;
pub mod config;
pub mod distribute;
pub mod error;
pub mod exchange;
pub mod factory;
mod mimo;
pub mod model;
pub mod spec;
pub mod stats;
pub mod tensor;

pub use backend::*;
pub use buffer::*;
pub use config::*;
pub use distribute::*;
pub use error::*;
pub use factory::*;
pub use model::*;
pub use spec::*;
pub use stats::*;
pub use tensor::*;
