use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "tensorport",
    version,
    about = "Run models through interchangeable inference engines"
)]
pub struct Cli {
    /// Log level (RUST_LOG overrides)
    #[arg(long, default_value = "info", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Open a model and print its declared inputs and outputs
    Describe {
        /// TOML model configuration (`type`, `path`, engine options)
        #[arg(long)]
        config: PathBuf,
    },

    /// Run inference on tensors read from files
    Run(RunArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// TOML model configuration (`type`, `path`, engine options)
    #[arg(long)]
    pub config: PathBuf,

    /// Input tensor file (.csv, .txt or .npy), as PATH or NAME=PATH
    #[arg(long = "input", required = true)]
    pub inputs: Vec<String>,

    /// Output shape, as D0,D1,... or NAME=D0,D1,...
    #[arg(long = "output-shape", required = true)]
    pub output_shapes: Vec<String>,

    /// Layout of the output tensors
    #[arg(long, default_value = "row-major")]
    pub output_layout: String,

    /// Where to save an output, as PATH or NAME=PATH
    #[arg(long = "output")]
    pub outputs: Vec<String>,

    /// Reference tensor to check an output against, as PATH or NAME=PATH
    #[arg(long = "reference")]
    pub references: Vec<String>,

    /// Largest mean squared error accepted by the reference check
    #[arg(long, default_value_t = 1e-6)]
    pub tolerance: f32,

    /// Inference calls per worker
    #[arg(long, default_value_t = 1)]
    pub repetitions: usize,

    /// In-process workers, each with its own model; only worker 0 reads the model file
    #[arg(long, default_value_t = 1)]
    pub workers: usize,
}
