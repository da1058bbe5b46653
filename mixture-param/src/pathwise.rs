use crate::error::ShapeError;
use crate::ndarray_util::*;
use crate::rsample::SavedContext;

use log::{debug, warn};
use ndarray::prelude::*;
use rayon::prelude::*;
use special::Error;
use std::f64::consts::FRAC_1_SQRT_2;

/// Gradients with respect to the differentiable inputs of a draw,
/// each shaped like the parameter it belongs to
#[derive(Debug, Clone)]
pub struct MixtureGradient {
    pub locs: ArrayD<f64>,
    pub scale: ArrayD<f64>,
    pub logits: ArrayD<f64>,
}

impl MixtureGradient {
    /// Gradients aligned with the forward inputs
    /// `(locs, scale, logits, weights, which, noise_shape)`.
    /// The last three are not differentiable.
    pub fn into_positional(self) -> [Option<ArrayD<f64>>; 6] {
        [
            Some(self.locs),
            Some(self.scale),
            Some(self.logits),
            None,
            None,
            None,
        ]
    }
}

impl SavedContext {
    /// Implicit reparameterization gradient of the saved draw.
    ///
    /// Gradients are summed over every leading sample axis: each draw
    /// is normalized by its own mixture responsibility first, then the
    /// draws are added up.
    ///
    /// # Arguments
    /// * `grad_output` - upstream gradient, shaped like the sample
    ///
    pub fn backward(self, grad_output: &ArrayD<f64>) -> Result<MixtureGradient, ShapeError> {
        let expected = self.sample_shape();
        if grad_output.shape() != expected.as_slice() {
            return Err(ShapeError::Gradient {
                expected,
                found: grad_output.shape().to_vec(),
            });
        }

        let (nl, nb, dd) = self.sample.dim();
        let g = to_array3(grad_output, (nl, nb, dd))?;

        let rows: Vec<RowGradient> = (0..nb)
            .into_par_iter()
            .map(|b| {
                row_gradient(RowInput {
                    z: self.sample.index_axis(Axis(1), b),
                    g: g.index_axis(Axis(1), b),
                    locs: self.locs.index_axis(Axis(0), b),
                    scale: self.scale.row(b),
                    weights: self.weights.row(b),
                })
            })
            .collect();

        let mut grad_locs = Array3::<f64>::zeros(self.locs.raw_dim());
        let mut grad_scale = Array2::<f64>::zeros(self.scale.raw_dim());
        let mut grad_logits = Array2::<f64>::zeros(self.logits.raw_dim());
        let mut num_degenerate = 0;

        for (b, row) in rows.into_iter().enumerate() {
            grad_locs.index_axis_mut(Axis(0), b).assign(&row.locs);
            grad_scale.row_mut(b).assign(&row.scale);
            grad_logits.row_mut(b).assign(&row.logits);
            num_degenerate += row.num_degenerate;
        }

        if num_degenerate > 0 {
            warn!(
                "{} pair(s) of coincident component means contribute no logits gradient",
                num_degenerate
            );
        }
        debug!("pathwise gradient over {} draws x {} batch rows", nl, nb);

        Ok(MixtureGradient {
            locs: into_shape_dyn(grad_locs, &self.shape.locs_shape())?,
            scale: into_shape_dyn(grad_scale, &self.shape.scale_shape())?,
            logits: into_shape_dyn(grad_logits, &self.shape.logits_shape())?,
        })
    }
}

/// One batch row of a saved draw
struct RowInput<'a> {
    z: ArrayView2<'a, f64>,       // L x D
    g: ArrayView2<'a, f64>,       // L x D
    locs: ArrayView2<'a, f64>,    // K x D
    scale: ArrayView1<'a, f64>,   // D
    weights: ArrayView1<'a, f64>, // K
}

struct RowGradient {
    locs: Array2<f64>,
    scale: Array1<f64>,
    logits: Array1<f64>,
    num_degenerate: usize,
}

/// Separating directions between every ordered pair of whitened means
///
/// ```text
/// mu[p,q,:]  = (locs~[p,:] - locs~[q,:]) / |locs~[p,:] - locs~[q,:]|
/// mu_ll[p,q] = <locs~[p,:], mu[p,q,:]>
/// ```
///
/// Pairs with `p == q` or coincident means have no direction and are
/// flagged as degenerate.
struct PairGeometry {
    directions: Array3<f64>, // K x K x D
    projected: Array2<f64>,  // K x K
    degenerate: Array2<bool>,
}

impl PairGeometry {
    fn new(locs_tilde: ArrayView2<f64>) -> Self {
        let (kk, dd) = locs_tilde.dim();
        let mut directions = Array3::<f64>::zeros((kk, kk, dd));
        let mut projected = Array2::<f64>::zeros((kk, kk));
        let mut degenerate = Array2::from_elem((kk, kk), true);

        for p in 0..kk {
            for q in 0..kk {
                if p == q {
                    continue;
                }
                let diff = &locs_tilde.row(p) - &locs_tilde.row(q);
                let norm = diff.dot(&diff).sqrt();
                if !(norm > 0.0 && norm.is_finite()) {
                    continue;
                }
                let mu_pq = diff / norm;
                projected[(p, q)] = locs_tilde.row(p).dot(&mu_pq);
                directions.slice_mut(s![p, q, ..]).assign(&mu_pq);
                degenerate[(p, q)] = false;
            }
        }

        Self {
            directions,
            projected,
            degenerate,
        }
    }

    fn direction(&self, p: usize, q: usize) -> ArrayView1<'_, f64> {
        self.directions.slice(s![p, q, ..])
    }

    fn is_degenerate(&self, p: usize, q: usize) -> bool {
        self.degenerate[(p, q)]
    }

    /// unordered pairs of distinct components without a direction
    fn num_degenerate_pairs(&self) -> usize {
        let kk = self.degenerate.nrows();
        let flagged = self.degenerate.iter().filter(|&&x| x).count();
        (flagged - kk) / 2
    }
}

fn row_gradient(input: RowInput<'_>) -> RowGradient {
    let (kk, dd) = input.locs.dim();
    let scale = &input.scale;
    let weights = &input.weights;

    let locs_tilde = &input.locs / scale;
    let geometry = PairGeometry::new(locs_tilde.view());

    let mut grad_locs = Array2::<f64>::zeros((kk, dd));
    let mut grad_scale = Array1::<f64>::zeros(dd);
    let mut logits_stat = Array1::<f64>::zeros(kk);

    for (z_l, g_l) in input.z.rows().into_iter().zip(input.g.rows()) {
        let z_tilde = &z_l / scale;

        // epsilon[j,:] = z~ - locs~[j,:]
        let epsilon = &z_tilde - &locs_tilde;
        let log_q = epsilon.map_axis(Axis(1), |e_j| -0.5 * e_j.dot(&e_j));
        let log_q_max = log_q.fold(f64::NEG_INFINITY, |a, &x| a.max(x));
        let q_prime = log_q.mapv(|x| (x - log_q_max).exp());
        let q_tot_prime = weights.dot(&q_prime);

        let scale_g = scale * &g_l;

        /////////////////////////////////////////////
        // logits: pairwise separating hyperplanes //
        /////////////////////////////////////////////

        for p in 0..kk {
            let mut acc = 0.0;
            for q in 0..kk {
                if geometry.is_degenerate(p, q) {
                    continue;
                }
                let mu_pq = geometry.direction(p, q);
                let z_ll = z_tilde.dot(&mu_pq);
                let lower = z_ll - geometry.projected[(p, q)];
                let upper = z_ll + geometry.projected[(q, p)];

                // residual from the pair's shared offset, orthogonal to mu_pq
                let z_perp_sqr: f64 = epsilon
                    .row(p)
                    .iter()
                    .zip(mu_pq.iter())
                    .map(|(&e_d, &mu_d)| {
                        let r = e_d - lower * mu_d;
                        r * r
                    })
                    .sum();

                let mass = scaled_erf_diff(lower, upper, -0.5 * z_perp_sqr - log_q_max);
                acc -= mass * scale_g.dot(&mu_pq) * weights[q];
            }
            logits_stat[p] += acc / q_tot_prime;
        }

        ////////////////////////////////////////
        // locs and scale: importance weights //
        ////////////////////////////////////////

        for j in 0..kk {
            let resp_j = weights[j] * q_prime[j] / q_tot_prime;
            let prefactor = &g_l * resp_j;
            grad_locs.row_mut(j).scaled_add(1.0, &prefactor);
            grad_scale.scaled_add(1.0, &(&prefactor * &epsilon.row(j)));
        }
    }

    let grad_logits = weights * &logits_stat * SQRT_HALF_PI;

    RowGradient {
        locs: grad_locs,
        scale: grad_scale,
        logits: grad_logits,
        num_degenerate: geometry.num_degenerate_pairs(),
    }
}

/// `(erf(lower/√2) - erf(upper/√2)) * exp(log_scale)`
///
/// Same-signed arguments go through `erfc` to keep the tails, and the
/// product is formed in the log domain so a vanishing difference never
/// meets an overflowing exponential.
fn scaled_erf_diff(lower: f64, upper: f64, log_scale: f64) -> f64 {
    let a = lower * FRAC_1_SQRT_2;
    let b = upper * FRAC_1_SQRT_2;

    let diff = if a > 0.0 && b > 0.0 {
        b.compl_error() - a.compl_error()
    } else if a < 0.0 && b < 0.0 {
        (-a).compl_error() - (-b).compl_error()
    } else {
        a.error() - b.error()
    };

    if diff == 0.0 {
        return 0.0;
    }
    diff.signum() * (diff.abs().ln() + log_scale).exp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::MixtureShape;
    use approx::assert_abs_diff_eq;

    fn context(
        locs: Array3<f64>,
        scale: Array2<f64>,
        logits: Array2<f64>,
        sample: Array3<f64>,
    ) -> SavedContext {
        let (_, kk, dd) = locs.dim();
        let shape = MixtureShape::resolve(&[kk, dd], &[dd], &[kk]).unwrap();
        let weights = softmax_rows(&logits);
        let nl = sample.dim().0;
        SavedContext {
            sample,
            scale,
            locs,
            logits,
            weights,
            sample_shape: vec![nl],
            shape,
        }
    }

    #[test]
    fn coincident_means_have_no_direction() {
        let locs_tilde = array![[1.0, 2.0], [1.0, 2.0], [-1.0, 0.5]];
        let geometry = PairGeometry::new(locs_tilde.view());

        assert!(geometry.is_degenerate(0, 1));
        assert!(geometry.is_degenerate(1, 0));
        assert!(geometry.is_degenerate(2, 2));
        assert_eq!(geometry.num_degenerate_pairs(), 1);
        assert!(geometry.direction(0, 1).iter().all(|&x| x == 0.0));

        // the remaining pairs look exactly like they do without the duplicate
        let reduced = array![[1.0, 2.0], [-1.0, 0.5]];
        let reference = PairGeometry::new(reduced.view());
        for (p, q, rp, rq) in [(0, 2, 0, 1), (2, 0, 1, 0), (1, 2, 0, 1)] {
            assert!(!geometry.is_degenerate(p, q));
            assert_eq!(geometry.direction(p, q), reference.direction(rp, rq));
            assert_abs_diff_eq!(
                geometry.projected[(p, q)],
                reference.projected[(rp, rq)],
                epsilon = 1e-15
            );
        }
    }

    #[test]
    fn directions_are_unit_and_antisymmetric() {
        let locs_tilde = array![[0.0, 0.0, 1.0], [3.0, -1.0, 2.0], [0.5, 0.5, 0.5]];
        let geometry = PairGeometry::new(locs_tilde.view());
        for p in 0..3 {
            for q in 0..3 {
                if p == q {
                    continue;
                }
                let mu_pq = geometry.direction(p, q);
                assert_abs_diff_eq!(mu_pq.dot(&mu_pq), 1.0, epsilon = 1e-12);
                let mu_qp = geometry.direction(q, p);
                assert_abs_diff_eq!(mu_pq.dot(&mu_qp), -1.0, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn single_component_is_the_gaussian_reparameterization() -> anyhow::Result<()> {
        let locs = array![[[0.5, -2.0]]];
        let scale = array![[0.3, 2.0]];
        let sample = array![[[0.8, -1.0]], [[0.1, -5.0]], [[0.5, 3.0]]];
        let g = array![[[1.0, 2.0]], [[-0.5, 0.3]], [[2.0, -1.0]]];

        let white = (&sample - &locs.index_axis(Axis(0), 0)) / &scale;
        let ctx = context(locs, scale, array![[0.7]], sample);
        let grad = ctx.backward(&g.clone().into_dyn().into_shape_with_order(vec![3, 2])?)?;

        let g2 = g.index_axis(Axis(1), 0);
        let w2 = white.index_axis(Axis(1), 0);
        let expected_locs = g2.sum_axis(Axis(0));
        let expected_scale = (&g2 * &w2).sum_axis(Axis(0));

        for d in 0..2 {
            assert_abs_diff_eq!(grad.locs[[0, d]], expected_locs[d], epsilon = 1e-12);
            assert_abs_diff_eq!(grad.scale[[d]], expected_scale[d], epsilon = 1e-12);
        }
        assert_eq!(grad.logits[[0]], 0.0);
        Ok(())
    }

    #[test]
    fn logits_gradient_is_shift_invariant() -> anyhow::Result<()> {
        // softmax is invariant to adding a constant to every logit, so
        // each draw's logits gradient sums to zero
        let locs = array![[[1.5, 2.0], [-0.5, 2.5], [0.7, -1.0]]];
        let scale = array![[0.8, 1.3]];
        let logits = array![[0.2, -0.4, 0.5]];
        let sample = array![[[0.3, 1.0]], [[-2.0, 4.0]], [[1.0, -1.5]]];
        let g = ArrayD::from_shape_vec(vec![3, 2], vec![1.0, -0.5, 0.2, 0.7, -1.3, 2.0])?;

        let grad = context(locs, scale, logits, sample).backward(&g)?;
        assert_abs_diff_eq!(grad.logits.sum(), 0.0, epsilon = 1e-12);
        assert!(grad.logits.iter().any(|x| x.abs() > 1e-6));
        Ok(())
    }

    #[test]
    fn distant_draws_stay_finite() -> anyhow::Result<()> {
        let locs = array![[[-1.0, 0.0], [1.0, 0.0], [0.0, 2.0]]];
        let scale = array![[0.5, 0.5]];
        let logits = array![[0.0, 0.0, 0.0]];
        let sample = array![[[1e3, -4e2]], [[-60.0, 60.0]], [[0.0, 1e5]]];
        let g = ArrayD::from_elem(vec![3, 2], 1.0);

        let grad = context(locs, scale, logits, sample).backward(&g)?;
        assert!(grad.locs.iter().all(|x| x.is_finite()));
        assert!(grad.scale.iter().all(|x| x.is_finite()));
        assert!(grad.logits.iter().all(|x| x.is_finite()));
        Ok(())
    }

    #[test]
    fn coincident_components_do_not_raise() -> anyhow::Result<()> {
        let locs = array![[[0.5, 0.5], [0.5, 0.5], [-1.0, 1.0]]];
        let scale = array![[1.0, 1.0]];
        let logits = array![[0.1, 0.2, -0.3]];
        let sample = array![[[0.0, 0.7]], [[-0.8, 1.2]]];
        let g = ArrayD::from_elem(vec![2, 2], 0.5);

        let grad = context(locs, scale, logits, sample).backward(&g)?;
        assert!(grad.logits.iter().all(|x| x.is_finite()));
        assert!(grad.locs.iter().all(|x| x.is_finite()));
        assert_abs_diff_eq!(grad.logits.sum(), 0.0, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn rejects_misshaped_upstream_gradient() {
        let ctx = context(
            array![[[0.0], [1.0]]],
            array![[1.0]],
            array![[0.0, 0.0]],
            array![[[0.2]], [[0.4]]],
        );
        let g = ArrayD::from_elem(vec![3, 1], 1.0);
        assert!(matches!(
            ctx.backward(&g),
            Err(ShapeError::Gradient { .. })
        ));
    }

    #[test]
    fn erf_difference_in_the_tails() {
        let direct = |a: f64, b: f64| (a * FRAC_1_SQRT_2).error() - (b * FRAC_1_SQRT_2).error();
        for (a, b) in [(0.3, 1.2), (-2.0, 0.5), (-1.0, -0.2), (2.0, 3.0)] {
            assert_abs_diff_eq!(scaled_erf_diff(a, b, 0.0), direct(a, b), epsilon = 1e-12);
        }
        // the direct difference cancels to zero out here
        let tail = scaled_erf_diff(12.0, 13.0, 0.0);
        assert!(tail < 0.0 && tail.abs() < 1e-30);
        // a vanishing tail against a huge scale stays finite
        let far = scaled_erf_diff(60.0, 61.0, 1500.0);
        assert!(far.is_finite());
    }
}
