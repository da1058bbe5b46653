use crate::error::ShapeError;
use crate::shape::MixtureShape;

use ndarray::prelude::*;
use ndarray::IxDyn;
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

/// `0.5 * ln(2π)`
pub const HALF_LN_2PI: f64 = 0.918_938_533_204_672_8_f64;

/// `sqrt(π/2)`
pub const SQRT_HALF_PI: f64 = 1.253_314_137_315_500_3_f64;

/// Row-wise softmax of a `B x K` logit matrix
pub fn softmax_rows(logits: &Array2<f64>) -> Array2<f64> {
    let mut ret = logits.clone();
    for mut row in ret.rows_mut() {
        let max_logit = row.fold(f64::NEG_INFINITY, |a, &x| a.max(x));
        row.mapv_inplace(|x| (x - max_logit).exp());
        let tot = row.sum();
        row.mapv_inplace(|x| x / tot);
    }
    ret
}

/// Sample an `L x B x D` array from `N(0,1)`
pub fn rnorm3<R>(dim: (usize, usize, usize), rng: &mut R) -> Array3<f64>
where
    R: Rng + ?Sized,
{
    Array3::from_shape_simple_fn(dim, || StandardNormal.sample(&mut *rng))
}

/// Copy an arbitrary-rank array into a `rows x cols` matrix
pub fn to_array2(xx: &ArrayD<f64>, dim: (usize, usize)) -> Result<Array2<f64>, ShapeError> {
    xx.to_shape(dim)
        .map(|x| x.into_owned())
        .map_err(|_| ShapeError::Reshape {
            from: xx.shape().to_vec(),
            to: vec![dim.0, dim.1],
        })
}

/// Copy an arbitrary-rank array into a three-way array
pub fn to_array3(
    xx: &ArrayD<f64>,
    dim: (usize, usize, usize),
) -> Result<Array3<f64>, ShapeError> {
    xx.to_shape(dim)
        .map(|x| x.into_owned())
        .map_err(|_| ShapeError::Reshape {
            from: xx.shape().to_vec(),
            to: vec![dim.0, dim.1, dim.2],
        })
}

/// Unflatten an owned array back into `shape`
pub fn into_shape_dyn<S>(xx: Array<f64, S>, shape: &[usize]) -> Result<ArrayD<f64>, ShapeError>
where
    S: Dimension,
{
    let from = xx.shape().to_vec();
    xx.as_standard_layout()
        .into_owned()
        .into_shape_with_order(shape.to_vec())
        .map_err(|_| ShapeError::Reshape {
            from,
            to: shape.to_vec(),
        })
}

/// Broadcast a value against `batch_shape + (D,)` and flatten it into
/// `L x B x D`, where `L` is the product of the value's extra leading
/// axes.
///
/// # Returns
/// `(leading_shape, flat_value)`
pub fn flatten_value(
    value: &ArrayD<f64>,
    shape: &MixtureShape,
) -> Result<(Vec<usize>, Array3<f64>), ShapeError> {
    let lead = shape.leading_shape(value.shape())?;
    let full = shape.extended_shape(&lead);

    let value_error = || ShapeError::Value {
        target: shape.extended_shape(&[]),
        found: value.shape().to_vec(),
    };

    let nlead: usize = lead.iter().product();
    let flat = value
        .broadcast(IxDyn(&full))
        .ok_or_else(value_error)?
        .to_shape((nlead, shape.batch_size(), shape.dim()))
        .map_err(|_| value_error())?
        .into_owned();

    Ok((lead, flat))
}
