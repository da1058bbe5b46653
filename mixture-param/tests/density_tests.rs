use approx::{assert_abs_diff_eq, assert_relative_eq};
use mixture_param::*;
use ndarray::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::f64::consts::PI;

fn three_components() -> anyhow::Result<MixtureOfDiagNormalsSharedScale> {
    Ok(MixtureOfDiagNormalsSharedScale::new(
        array![[-1.0, 0.0], [1.0, 0.0], [0.0, 2.0]],
        array![0.5, 0.5],
        array![0.1, -0.3, 0.2],
    )?)
}

/// log sum_k w_k N(x | locs_k, diag(scale^2)) without any stabilization
fn brute_force(mixture: &MixtureOfDiagNormalsSharedScale, x: &[f64]) -> f64 {
    let locs = mixture.locs();
    let scale = mixture.scale();
    let w = mixture.weights();
    let dens: f64 = (0..mixture.num_components())
        .map(|k| {
            let pdf: f64 = (0..mixture.dim())
                .map(|d| {
                    let s = scale[[d]];
                    let e = (x[d] - locs[[k, d]]) / s;
                    (-0.5 * e * e).exp() / ((2.0 * PI).sqrt() * s)
                })
                .product();
            w[[k]] * pdf
        })
        .sum();
    dens.ln()
}

#[test]
fn symmetric_pair_at_zero() -> anyhow::Result<()> {
    let mixture =
        MixtureOfDiagNormalsSharedScale::new(array![[-1.0], [1.0]], array![1.0], array![0.0, 0.0])?;
    let llik = mixture.log_prob(&array![[0.0]].into_dyn())?;
    assert_eq!(llik.shape(), &[1]);
    assert_abs_diff_eq!(llik[[0]], -1.4189, epsilon = 1e-4);
    Ok(())
}

#[test]
fn single_component_matches_diagonal_normal() -> anyhow::Result<()> {
    let locs = array![[0.3, -2.0, 5.0]];
    let scale = array![0.2, 1.7, 3.0];
    let mixture = MixtureOfDiagNormalsSharedScale::new(locs.clone(), scale.clone(), array![4.0])?;

    let mut rng = StdRng::seed_from_u64(21);
    let points = mixture.sample(&[50], &mut rng)?;
    let llik = mixture.log_prob(&points)?;
    assert_eq!(llik.shape(), &[50]);
    let points = points.into_dimensionality::<Ix2>()?;

    for (x, &lp) in points.rows().into_iter().zip(llik.iter()) {
        let expected: f64 = (0..3)
            .map(|d| {
                let e = (x[d] - locs[[0, d]]) / scale[d];
                -0.5 * e * e - scale[d].ln() - 0.5 * (2.0 * PI).ln()
            })
            .sum();
        assert_relative_eq!(lp, expected, max_relative = 1e-12);
    }
    Ok(())
}

#[test]
fn stabilized_density_matches_brute_force() -> anyhow::Result<()> {
    let mixture = three_components()?;

    // squared normalized distances up to several hundred
    let points = array![[0.0, 0.0], [3.0, -4.0], [-7.0, 6.0], [10.0, 9.0], [0.5, 1.0]];
    let llik = mixture.log_prob(&points.clone().into_dyn())?;

    for (x, &lp) in points.rows().into_iter().zip(llik.iter()) {
        let x = x.to_vec();
        let expected = brute_force(&mixture, &x);
        assert!(expected.is_finite());
        assert_relative_eq!(lp, expected, max_relative = 1e-10);
    }
    Ok(())
}

#[test]
fn distant_points_stay_finite() -> anyhow::Result<()> {
    let mixture = three_components()?;

    // squared normalized distances of 1e4 and far beyond
    let points = array![[60.0, 0.0], [1e3, -4e2], [-3e4, 5e4]];
    let llik = mixture.log_prob(&points.clone().into_dyn())?;

    let locs = mixture.locs();
    let w = mixture.weights();
    let log_norm = 2.0 * (0.5_f64).ln() + (2.0 * PI).ln();

    for (x, &lp) in points.rows().into_iter().zip(llik.iter()) {
        assert!(lp.is_finite());
        assert!(brute_force(&mixture, &x.to_vec()).is_infinite());

        // only the nearest component matters out here
        let (k, eps_min) = (0..3)
            .map(|k| {
                let eps: f64 = (0..2)
                    .map(|d| {
                        let e = (x[d] - locs[[k, d]]) / 0.5;
                        0.5 * e * e
                    })
                    .sum();
                (k, eps)
            })
            .fold((0, f64::INFINITY), |a, b| if b.1 < a.1 { b } else { a });

        let expected = w[[k]].ln() - log_norm - eps_min;
        assert_relative_eq!(lp, expected, max_relative = 1e-9);
    }
    Ok(())
}

#[test]
fn value_must_broadcast() -> anyhow::Result<()> {
    let mixture = three_components()?;
    let result = mixture.log_prob(&array![[0.0, 0.0, 0.0]].into_dyn());
    assert!(matches!(result, Err(ShapeError::Value { .. })));
    Ok(())
}

/// CDF of the one-dimensional mixture by trapezoidal integration of
/// `exp(log_prob)` on a fine grid
fn integrated_cdf(
    mixture: &MixtureOfDiagNormalsSharedScale,
    lb: f64,
    ub: f64,
    ngrid: usize,
) -> anyhow::Result<(Array1<f64>, Array1<f64>)> {
    let grid = Array1::linspace(lb, ub, ngrid);
    let dens = mixture
        .log_prob(&grid.clone().insert_axis(Axis(1)).into_dyn())?
        .mapv(f64::exp);
    let dx = (ub - lb) / (ngrid - 1) as f64;

    let mut cdf = Array1::<f64>::zeros(ngrid);
    for i in 1..ngrid {
        cdf[i] = cdf[i - 1] + 0.5 * dx * (dens[[i - 1]] + dens[[i]]);
    }
    Ok((grid, cdf))
}

#[test]
fn draws_follow_the_density() -> anyhow::Result<()> {
    let mixture = MixtureOfDiagNormalsSharedScale::new(
        array![[-2.0], [1.5]],
        array![0.7],
        array![0.3, -0.2],
    )?;

    let nn = 20_000;
    let mut rng = StdRng::seed_from_u64(123);
    let draw = mixture.rsample(&[nn], &mut rng)?;
    let mut zz = draw.value().iter().copied().collect::<Vec<_>>();
    zz.sort_by(|a, b| a.total_cmp(b));

    let (grid, cdf) = integrated_cdf(&mixture, -10.0, 10.0, 20_001)?;
    assert_abs_diff_eq!(cdf[cdf.len() - 1], 1.0, epsilon = 1e-6);

    // Kolmogorov-Smirnov distance on the grid
    let mut ks = 0.0_f64;
    let mut below = 0;
    for (&t, &f) in grid.iter().zip(cdf.iter()).step_by(10) {
        while below < nn && zz[below] <= t {
            below += 1;
        }
        ks = ks.max((below as f64 / nn as f64 - f).abs());
    }
    assert!(ks < 0.02, "KS distance {}", ks);

    // first two moments
    let zz = Array1::from(zz);
    let mean = zz.mean().unwrap_or(f64::NAN);
    let var = zz.var(0.0);
    assert_abs_diff_eq!(mean, mixture.mean()?[[0]], epsilon = 0.06);
    assert_abs_diff_eq!(var, mixture.variance()?[[0]], epsilon = 0.1);
    Ok(())
}
