pub mod data;
pub mod error;
pub mod latent;
pub mod loss;
pub mod model;
pub mod training;
pub mod utils;
#[cfg(feature = "wasm")]
pub mod wasm;

pub use error::{InfoGanError, Result};
pub use model::{InfoGan, ModelConfig};
pub use training::{train, StepLosses, TrainingConfig, TrainingSession};

#[cfg(test)]
pub(crate) type TestBackend = burn::backend::NdArray<f32>;
#[cfg(test)]
pub(crate) type TestAutodiffBackend = burn::backend::Autodiff<TestBackend>;
