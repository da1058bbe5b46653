use crate::error::ShapeError;
use ndarray::{Array2, ArrayD, ArrayView2};
use rand::Rng;

/// Shape bookkeeping and density evaluation shared by distributions
/// over `batch_shape x event_shape`
pub trait Distribution {
    fn batch_shape(&self) -> &[usize];

    fn event_shape(&self) -> &[usize];

    /// `sample_shape + batch_shape + event_shape`
    fn extended_shape(&self, sample_shape: &[usize]) -> Vec<usize> {
        [sample_shape, self.batch_shape(), self.event_shape()].concat()
    }

    /// Log-density of `value`, an array broadcastable against
    /// `batch_shape + event_shape` with extra leading axes.
    ///
    /// # Returns
    /// Log-density, shape `leading_axes + batch_shape`
    fn log_prob(&self, value: &ArrayD<f64>) -> Result<ArrayD<f64>, ShapeError>;

    /// Draw `sample_shape + batch_shape + event_shape` values without
    /// keeping anything for differentiation
    fn sample<R>(&self, sample_shape: &[usize], rng: &mut R) -> anyhow::Result<ArrayD<f64>>
    where
        R: Rng + ?Sized;
}

/// Distributions that can draw samples together with a single-use
/// handle that maps an upstream gradient to parameter gradients
pub trait Reparameterized: Distribution {
    type Sample;

    fn rsample<R>(&self, sample_shape: &[usize], rng: &mut R) -> anyhow::Result<Self::Sample>
    where
        R: Rng + ?Sized;
}

/// Discrete component draws, treated as a black box by the sampler
pub trait ComponentSampler {
    /// Draw component indices.
    ///
    /// # Arguments
    /// * `weights` - mixture weights, `B x K`, each row sums to one
    /// * `num_draws` - number of independent draws `L` per row
    /// * `rng` - random number generator
    ///
    /// # Returns
    /// `L x B` matrix of indices in `[0, K)`, where index `k` of row
    /// `b` has marginal probability `weights[b, k]`
    fn sample_components<R>(
        &self,
        weights: ArrayView2<f64>,
        num_draws: usize,
        rng: &mut R,
    ) -> anyhow::Result<Array2<usize>>
    where
        R: Rng + ?Sized;
}
