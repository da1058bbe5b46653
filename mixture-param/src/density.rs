use crate::ndarray_util::HALF_LN_2PI;

use ndarray::prelude::*;
use ndarray::Zip;

/// Log-density of a mixture of diagonal normals sharing one scale
/// vector across components
///
/// ```text
/// eps[l,b,k] = 0.5 * sum_d ((x[l,b,d] - locs[b,k,d]) / scale[b,d])^2
/// m[l,b]     = min_k eps[l,b,k]
/// log p      = log sum_k w[b,k] exp(m[l,b] - eps[l,b,k])
///              - 0.5 D log(2π) - sum_d log scale[b,d] - m[l,b]
/// ```
///
/// Subtracting the per-point minimum keeps the exponentials bounded
/// for arbitrarily distant points.
///
/// # Arguments
/// * `locs` - component means `B x K x D`
/// * `scale` - shared scale `B x D`
/// * `weights` - mixture weights `B x K`
/// * `value` - points `L x B x D`
///
/// # Returns
/// `L x B` log-density
pub fn log_prob_flat(
    locs: ArrayView3<f64>,
    scale: ArrayView2<f64>,
    weights: ArrayView2<f64>,
    value: ArrayView3<f64>,
) -> Array2<f64> {
    let (nl, nb, dd) = value.dim();

    let log_norm: Array1<f64> = scale
        .rows()
        .into_iter()
        .map(|s_b| HALF_LN_2PI * dd as f64 + s_b.mapv(f64::ln).sum())
        .collect();

    let mut ret = Array2::<f64>::zeros((nl, nb));

    Zip::indexed(&mut ret).par_for_each(|(l, b), llik| {
        let x = value.slice(s![l, b, ..]);
        let s_b = scale.row(b);

        let eps_sqr: Vec<f64> = locs
            .index_axis(Axis(0), b)
            .rows()
            .into_iter()
            .map(|mu_k| {
                Zip::from(&x)
                    .and(&mu_k)
                    .and(&s_b)
                    .fold(0.0, |acc, &x_d, &mu_d, &s_d| {
                        let e = (x_d - mu_d) / s_d;
                        acc + e * e
                    })
                    * 0.5
            })
            .collect();

        let eps_min = eps_sqr.iter().copied().fold(f64::INFINITY, f64::min);

        let tot: f64 = weights
            .row(b)
            .iter()
            .zip(eps_sqr.iter())
            .map(|(&w_k, &e_k)| w_k * (eps_min - e_k).exp())
            .sum();

        *llik = tot.ln() - log_norm[b] - eps_min;
    });

    ret
}
