use crate::categorical::WeightedIndexSampler;
use crate::density::log_prob_flat;
use crate::error::{MixtureError, ShapeError};
use crate::ndarray_util::*;
use crate::rsample::{rsample_flat, ForwardInput, PathwiseSample};
use crate::shape::MixtureShape;
use crate::traits::*;

use log::debug;
use ndarray::prelude::*;
use rand::Rng;

/// Mixture of diagonal normals whose components share one scale vector
///
/// ```text
/// p(x) = sum_k w[k] N(x | locs[k,:], diag(scale^2)),  w = softmax(logits)
/// ```
///
/// The parameters keep their caller-facing shapes (`batch_shape x K x D`,
/// `batch_shape x D`, `batch_shape x K`) next to flattened copies over
/// `B = prod(batch_shape)` rows used by every kernel.
#[derive(Debug, Clone)]
pub struct MixtureOfDiagNormalsSharedScale {
    locs: ArrayD<f64>,
    scale: ArrayD<f64>,
    logits: ArrayD<f64>,
    weights: ArrayD<f64>,
    shape: MixtureShape,
    flat_locs: Array3<f64>,    // B x K x D
    flat_scale: Array2<f64>,   // B x D
    flat_logits: Array2<f64>,  // B x K
    flat_weights: Array2<f64>, // B x K
}

impl MixtureOfDiagNormalsSharedScale {
    /// Build a mixture after checking shapes and parameter values
    ///
    /// # Arguments
    /// * `locs` - component means `(..., K, D)`
    /// * `scale` - shared positive scale `(..., D)`
    /// * `logits` - unnormalized mixture weights `(..., K)`
    ///
    pub fn new<L, S, G>(
        locs: Array<f64, L>,
        scale: Array<f64, S>,
        logits: Array<f64, G>,
    ) -> Result<Self, MixtureError>
    where
        L: Dimension,
        S: Dimension,
        G: Dimension,
    {
        let ret = Self::new_unvalidated(locs, scale, logits)?;

        if let Some((index, &value)) = ret.scale.indexed_iter().find(|(_, x)| !(**x > 0.0)) {
            return Err(MixtureError::NonPositiveScale {
                index: index.slice().to_vec(),
                value,
            });
        }

        if let Some((index, &value)) = ret.logits.indexed_iter().find(|(_, x)| !x.is_finite()) {
            return Err(MixtureError::NonFiniteLogit {
                index: index.slice().to_vec(),
                value,
            });
        }

        if let Some((index, &value)) = ret.locs.indexed_iter().find(|(_, x)| !x.is_finite()) {
            return Err(MixtureError::NonFiniteLoc {
                index: index.slice().to_vec(),
                value,
            });
        }

        Ok(ret)
    }

    /// Build a mixture checking shapes only. Non-positive scale or
    /// non-finite parameters show up as `NaN`/`Inf` in the results.
    pub fn new_unvalidated<L, S, G>(
        locs: Array<f64, L>,
        scale: Array<f64, S>,
        logits: Array<f64, G>,
    ) -> Result<Self, ShapeError>
    where
        L: Dimension,
        S: Dimension,
        G: Dimension,
    {
        let locs = locs.into_dyn();
        let scale = scale.into_dyn();
        let logits = logits.into_dyn();

        let shape = MixtureShape::resolve(locs.shape(), scale.shape(), logits.shape())?;

        let nb = shape.batch_size();
        let kk = shape.num_components();
        let dd = shape.dim();

        let flat_locs = to_array3(&locs, (nb, kk, dd))?;
        let flat_scale = to_array2(&scale, (nb, dd))?;
        let flat_logits = to_array2(&logits, (nb, kk))?;
        let flat_weights = softmax_rows(&flat_logits);
        let weights = into_shape_dyn(flat_weights.clone(), &shape.logits_shape())?;

        debug!(
            "mixture of {} diagonal normals in {} dimension(s), batch shape {:?}",
            kk,
            dd,
            shape.batch_shape()
        );

        Ok(Self {
            locs,
            scale,
            logits,
            weights,
            shape,
            flat_locs,
            flat_scale,
            flat_logits,
            flat_weights,
        })
    }

    pub fn locs(&self) -> &ArrayD<f64> {
        &self.locs
    }

    pub fn scale(&self) -> &ArrayD<f64> {
        &self.scale
    }

    pub fn logits(&self) -> &ArrayD<f64> {
        &self.logits
    }

    /// softmax of the logits along the component axis
    pub fn weights(&self) -> &ArrayD<f64> {
        &self.weights
    }

    pub fn shape(&self) -> &MixtureShape {
        &self.shape
    }

    pub fn num_components(&self) -> usize {
        self.shape.num_components()
    }

    pub fn dim(&self) -> usize {
        self.shape.dim()
    }

    /// `sum_k w[k] locs[k,:]`, shape `batch_shape + (D,)`
    pub fn mean(&self) -> Result<ArrayD<f64>, ShapeError> {
        let mean = self.flat_mean();
        into_shape_dyn(mean, &self.shape.scale_shape())
    }

    /// `scale^2 + sum_k w[k] locs[k,:]^2 - mean^2`, shape `batch_shape + (D,)`
    pub fn variance(&self) -> Result<ArrayD<f64>, ShapeError> {
        let mean = self.flat_mean();
        let mut var = self.flat_scale.mapv(|s| s * s);

        for (b, mut var_b) in var.rows_mut().into_iter().enumerate() {
            let sq_locs = self.flat_locs.index_axis(Axis(0), b).mapv(|x| x * x);
            let second = self.flat_weights.row(b).dot(&sq_locs);
            var_b += &second;
            var_b -= &mean.row(b).mapv(|m| m * m);
        }

        into_shape_dyn(var, &self.shape.scale_shape())
    }

    fn flat_mean(&self) -> Array2<f64> {
        let (nb, _, dd) = self.flat_locs.dim();
        let mut mean = Array2::<f64>::zeros((nb, dd));
        for (b, mut mean_b) in mean.rows_mut().into_iter().enumerate() {
            mean_b.assign(
                &self
                    .flat_weights
                    .row(b)
                    .dot(&self.flat_locs.index_axis(Axis(0), b)),
            );
        }
        mean
    }

    /// Reparameterized draw with an injected component sampler
    ///
    /// # Arguments
    /// * `sample_shape` - leading axes of the draw
    /// * `sampler` - discrete component choice
    /// * `rng` - random number generator shared by the component
    ///   choice and the Gaussian noise
    ///
    /// # Returns
    /// The draw of shape `sample_shape + batch_shape + (D,)` and its
    /// single-use backward handle
    pub fn rsample_with<C, R>(
        &self,
        sample_shape: &[usize],
        sampler: &C,
        rng: &mut R,
    ) -> anyhow::Result<PathwiseSample>
    where
        C: ComponentSampler,
        R: Rng + ?Sized,
    {
        let nl: usize = sample_shape.iter().product();
        let which = sampler.sample_components(self.flat_weights.view(), nl, rng)?;

        let input = ForwardInput {
            locs: &self.flat_locs,
            scale: &self.flat_scale,
            logits: &self.flat_logits,
            weights: &self.flat_weights,
            shape: &self.shape,
        };

        Ok(rsample_flat(input, &which, sample_shape, rng)?)
    }
}

impl Distribution for MixtureOfDiagNormalsSharedScale {
    fn batch_shape(&self) -> &[usize] {
        self.shape.batch_shape()
    }

    fn event_shape(&self) -> &[usize] {
        self.shape.event_shape()
    }

    fn log_prob(&self, value: &ArrayD<f64>) -> Result<ArrayD<f64>, ShapeError> {
        let (lead, flat_value) = flatten_value(value, &self.shape)?;

        let llik = log_prob_flat(
            self.flat_locs.view(),
            self.flat_scale.view(),
            self.flat_weights.view(),
            flat_value.view(),
        );

        into_shape_dyn(llik, &[lead.as_slice(), self.batch_shape()].concat())
    }

    fn sample<R>(&self, sample_shape: &[usize], rng: &mut R) -> anyhow::Result<ArrayD<f64>>
    where
        R: Rng + ?Sized,
    {
        let (value, _) = self.rsample(sample_shape, rng)?.into_parts();
        Ok(value)
    }
}

impl Reparameterized for MixtureOfDiagNormalsSharedScale {
    type Sample = PathwiseSample;

    fn rsample<R>(&self, sample_shape: &[usize], rng: &mut R) -> anyhow::Result<PathwiseSample>
    where
        R: Rng + ?Sized,
    {
        self.rsample_with(sample_shape, &WeightedIndexSampler, rng)
    }
}
