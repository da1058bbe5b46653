pub mod categorical; // default component sampler
pub mod density; // stabilized log-density
pub mod error;
pub mod estimate; // Monte Carlo and finite-difference gradients
pub mod mixture; // the public distribution
pub mod ndarray_util;
pub mod pathwise; // implicit reparameterization backward pass
pub mod rsample; // forward draw and its saved context
pub mod shape; // parameter shape resolution
pub mod traits;

pub use categorical::WeightedIndexSampler;
pub use error::{MixtureError, ShapeError};
pub use mixture::MixtureOfDiagNormalsSharedScale;
pub use pathwise::MixtureGradient;
pub use rsample::{PathwiseSample, SavedContext};
pub use traits::{ComponentSampler, Distribution, Reparameterized};
