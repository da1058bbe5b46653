use crate::mixture::MixtureOfDiagNormalsSharedScale;
use crate::pathwise::MixtureGradient;
use crate::traits::*;

use ndarray::prelude::*;
use rand::Rng;

/// Monte Carlo estimate of `d/d(locs, scale, logits) E[f(z)]`
///
/// Draws `num_draws` reparameterized samples, feeds `grad_fn(z) = df/dz`
/// of every event vector to the backward pass and divides the summed
/// gradients by the number of draws. In batch mode `f` is applied to
/// each batch row separately.
///
/// # Arguments
/// * `mixture` - the distribution
/// * `num_draws` - number of Monte Carlo draws
/// * `grad_fn` - gradient of the test function at one event vector
/// * `rng` - random number generator
///
pub fn pathwise_mean_gradient<F, R>(
    mixture: &MixtureOfDiagNormalsSharedScale,
    num_draws: usize,
    grad_fn: F,
    rng: &mut R,
) -> anyhow::Result<MixtureGradient>
where
    F: Fn(ArrayView1<f64>) -> Array1<f64>,
    R: Rng + ?Sized,
{
    if num_draws == 0 {
        anyhow::bail!("need at least one draw");
    }

    let draw = mixture.rsample(&[num_draws], rng)?;
    let z = draw.value();
    let event_axis = Axis(z.ndim() - 1);

    let mut g = ArrayD::<f64>::zeros(z.raw_dim());
    for (z_i, mut g_i) in z.lanes(event_axis).into_iter().zip(g.lanes_mut(event_axis)) {
        let df_dz = grad_fn(z_i);
        if df_dz.len() != mixture.dim() {
            anyhow::bail!(
                "gradient of the test function has {} entries, expected {}",
                df_dz.len(),
                mixture.dim()
            );
        }
        g_i.assign(&df_dz);
    }

    let grad = draw.backward(&g)?;
    let denom = num_draws as f64;

    Ok(MixtureGradient {
        locs: grad.locs / denom,
        scale: grad.scale / denom,
        logits: grad.logits / denom,
    })
}

/// Central finite differences of a deterministic objective with respect
/// to every entry of `locs`, `scale` and `logits`
///
/// # Arguments
/// * `mixture` - expansion point
/// * `objective` - scalar function of the distribution
/// * `step` - perturbation size `h`; each entry costs two evaluations
///
pub fn finite_difference_gradient<F>(
    mixture: &MixtureOfDiagNormalsSharedScale,
    objective: F,
    step: f64,
) -> anyhow::Result<MixtureGradient>
where
    F: Fn(&MixtureOfDiagNormalsSharedScale) -> f64,
{
    if !(step > 0.0) {
        anyhow::bail!("finite difference step must be positive, found {}", step);
    }

    let central = |perturb: &dyn Fn(f64) -> anyhow::Result<MixtureOfDiagNormalsSharedScale>| {
        let upper = objective(&perturb(step)?);
        let lower = objective(&perturb(-step)?);
        Ok::<f64, anyhow::Error>((upper - lower) / (2.0 * step))
    };

    let mut grad_locs = ArrayD::<f64>::zeros(mixture.locs().raw_dim());
    for (ix, g) in grad_locs.indexed_iter_mut() {
        *g = central(&|h: f64| {
            let mut locs = mixture.locs().clone();
            locs[&ix] += h;
            rebuild(locs, mixture.scale().clone(), mixture.logits().clone())
        })?;
    }

    let mut grad_scale = ArrayD::<f64>::zeros(mixture.scale().raw_dim());
    for (ix, g) in grad_scale.indexed_iter_mut() {
        *g = central(&|h: f64| {
            let mut scale = mixture.scale().clone();
            scale[&ix] += h;
            rebuild(mixture.locs().clone(), scale, mixture.logits().clone())
        })?;
    }

    let mut grad_logits = ArrayD::<f64>::zeros(mixture.logits().raw_dim());
    for (ix, g) in grad_logits.indexed_iter_mut() {
        *g = central(&|h: f64| {
            let mut logits = mixture.logits().clone();
            logits[&ix] += h;
            rebuild(mixture.locs().clone(), mixture.scale().clone(), logits)
        })?;
    }

    Ok(MixtureGradient {
        locs: grad_locs,
        scale: grad_scale,
        logits: grad_logits,
    })
}

fn rebuild(
    locs: ArrayD<f64>,
    scale: ArrayD<f64>,
    logits: ArrayD<f64>,
) -> anyhow::Result<MixtureOfDiagNormalsSharedScale> {
    Ok(MixtureOfDiagNormalsSharedScale::new_unvalidated(
        locs, scale, logits,
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::SeedableRng;

    #[test]
    fn finite_differences_of_the_mean() -> anyhow::Result<()> {
        let mixture = MixtureOfDiagNormalsSharedScale::new(
            array![[1.0, -2.0], [3.0, 0.5]],
            array![0.5, 2.0],
            array![0.3, -0.1],
        )?;

        // E[z_0] = sum_k w_k locs[k,0]
        let grad = finite_difference_gradient(
            &mixture,
            |m| m.mean().map(|mu| mu[[0]]).unwrap_or(f64::NAN),
            1e-5,
        )?;

        let w = mixture.weights();
        assert_abs_diff_eq!(grad.locs[[0, 0]], w[[0]], epsilon = 1e-8);
        assert_abs_diff_eq!(grad.locs[[1, 0]], w[[1]], epsilon = 1e-8);
        assert_abs_diff_eq!(grad.locs[[0, 1]], 0.0, epsilon = 1e-8);
        assert!(grad.scale.iter().all(|x| x.abs() < 1e-8));

        // dE/dlogit_0 = w_0 w_1 (locs[0,0] - locs[1,0])
        let expected = w[[0]] * w[[1]] * (1.0 - 3.0);
        assert_abs_diff_eq!(grad.logits[[0]], expected, epsilon = 1e-8);
        assert_abs_diff_eq!(grad.logits[[1]], -expected, epsilon = 1e-8);
        Ok(())
    }

    #[test]
    fn single_component_mean_gradient() -> anyhow::Result<()> {
        // f(z) = sum_d z_d: the gradient wrt locs is exactly one per draw
        let mixture = MixtureOfDiagNormalsSharedScale::new(
            array![[0.4, -1.2, 3.0]],
            array![1.0, 0.1, 2.0],
            array![0.0],
        )?;
        let mut rng = rand::rngs::StdRng::seed_from_u64(17);

        let grad = pathwise_mean_gradient(&mixture, 500, |z| Array1::ones(z.len()), &mut rng)?;
        for d in 0..3 {
            assert_abs_diff_eq!(grad.locs[[0, d]], 1.0, epsilon = 1e-12);
            // mean of the white noise
            assert!(grad.scale[[d]].abs() < 0.2);
        }
        Ok(())
    }

    #[test]
    fn rejects_bad_arguments() -> anyhow::Result<()> {
        let mixture =
            MixtureOfDiagNormalsSharedScale::new(array![[0.0]], array![1.0], array![0.0])?;
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);

        assert!(pathwise_mean_gradient(&mixture, 0, |z| z.to_owned(), &mut rng).is_err());
        assert!(pathwise_mean_gradient(&mixture, 3, |_| Array1::zeros(2), &mut rng).is_err());
        assert!(finite_difference_gradient(&mixture, |_| 0.0, 0.0).is_err());
        Ok(())
    }
}
