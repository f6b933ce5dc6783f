#![recursion_limit = "256"]

pub mod metrics;
pub mod model;
pub mod util;

pub use metrics::{EvalAccumulator, EvalSummary};
pub use model::{ClassifierHead, ClassifierHeadConfig};
pub use util::{evaluate, run_train, run_train_with, TrainArgs};

/// Backend used for training and evaluation.
pub type TrainBackend = burn_ndarray::NdArray<f32>;
