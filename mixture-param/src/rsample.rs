use crate::error::ShapeError;
use crate::ndarray_util::*;
use crate::shape::MixtureShape;

use ndarray::prelude::*;
use ndarray::Zip;
use rand::Rng;

/// Everything the backward pass needs from one forward draw.
///
/// It is neither `Clone` nor `Copy`: the only way to use it is
/// [`SavedContext::backward`], which takes it by value.
#[derive(Debug)]
pub struct SavedContext {
    pub(crate) sample: Array3<f64>,  // L x B x D
    pub(crate) scale: Array2<f64>,   // B x D
    pub(crate) locs: Array3<f64>,    // B x K x D
    pub(crate) logits: Array2<f64>,  // B x K
    pub(crate) weights: Array2<f64>, // B x K
    pub(crate) sample_shape: Vec<usize>,
    pub(crate) shape: MixtureShape,
}

impl SavedContext {
    /// shape of the sample this context was saved for
    pub fn sample_shape(&self) -> Vec<usize> {
        self.shape.extended_shape(&self.sample_shape)
    }

    pub fn num_draws(&self) -> usize {
        self.sample.dim().0
    }
}

/// A reparameterized draw and its single-use backward handle
#[derive(Debug)]
pub struct PathwiseSample {
    value: ArrayD<f64>,
    context: SavedContext,
}

impl PathwiseSample {
    pub fn value(&self) -> &ArrayD<f64> {
        &self.value
    }

    pub fn into_parts(self) -> (ArrayD<f64>, SavedContext) {
        (self.value, self.context)
    }

    /// Consume the draw and map `grad_output`, shaped like the value,
    /// to parameter gradients
    pub fn backward(
        self,
        grad_output: &ArrayD<f64>,
    ) -> Result<crate::pathwise::MixtureGradient, ShapeError> {
        self.context.backward(grad_output)
    }
}

/// Parameters of one forward draw, already flattened over the batch
pub struct ForwardInput<'a> {
    pub locs: &'a Array3<f64>,
    pub scale: &'a Array2<f64>,
    pub logits: &'a Array2<f64>,
    pub weights: &'a Array2<f64>,
    pub shape: &'a MixtureShape,
}

/// Forward half of the pathwise sampler
///
/// ```text
/// white ~ N(0, I)                        L x B x D
/// z[l,b,:] = locs[b, which[l,b], :] + scale[b,:] * white[l,b,:]
/// ```
///
/// The component choice `which` is a constant here; the gradient with
/// respect to the mixture weights comes from the backward pass only.
///
/// # Arguments
/// * `input` - flattened parameters
/// * `which` - component indices, `L x B`
/// * `sample_shape` - leading axes of the draw, `prod = L`
/// * `rng` - random number generator for the noise
///
pub fn rsample_flat<R>(
    input: ForwardInput<'_>,
    which: &Array2<usize>,
    sample_shape: &[usize],
    rng: &mut R,
) -> Result<PathwiseSample, ShapeError>
where
    R: Rng + ?Sized,
{
    let shape = input.shape;
    let nl: usize = sample_shape.iter().product();
    let nb = shape.batch_size();
    let kk = shape.num_components();
    let dd = shape.dim();

    if which.dim() != (nl, nb) {
        return Err(ShapeError::SampleShape {
            expected: vec![nl, nb],
            found: which.shape().to_vec(),
        });
    }

    if let Some(&index) = which.iter().find(|&&k| k >= kk) {
        return Err(ShapeError::SampleIndex {
            index,
            num_components: kk,
        });
    }

    let white = rnorm3((nl, nb, dd), rng);

    let mut z = Array3::<f64>::zeros((nl, nb, dd));
    Zip::indexed(&mut z)
        .and(&white)
        .for_each(|(l, b, d), z_lbd, &w_lbd| {
            let k = which[(l, b)];
            *z_lbd = input.locs[(b, k, d)] + input.scale[(b, d)] * w_lbd;
        });

    let value = into_shape_dyn(z.clone(), &shape.extended_shape(sample_shape))?;

    let context = SavedContext {
        sample: z,
        scale: input.scale.clone(),
        locs: input.locs.clone(),
        logits: input.logits.clone(),
        weights: input.weights.clone(),
        sample_shape: sample_shape.to_vec(),
        shape: shape.clone(),
    };

    Ok(PathwiseSample { value, context })
}
