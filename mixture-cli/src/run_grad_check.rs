use crate::common::*;

use clap::Parser;
use indicatif::ParallelProgressIterator;
use mixture_param::estimate::{finite_difference_gradient, pathwise_mean_gradient};
use ndarray::prelude::*;
use rand::SeedableRng;
use rayon::prelude::*;

#[derive(Parser, Debug, Clone)]
pub struct GradCheckArgs {
    /// mixture parameters, a JSON file with `locs`, `scale` and `logits`
    #[arg(long, short, required = true)]
    params: Box<str>,

    /// linear coefficients `a` of `f(z) = sum_d a[d] z[d] + c[d] z[d]^2`
    /// (comma-separated, zeros by default)
    #[arg(long, short = 'a', value_delimiter = ',')]
    linear: Option<Vec<f64>>,

    /// quadratic coefficients `c` (comma-separated, 0.5 by default)
    #[arg(long, short = 'c', value_delimiter = ',')]
    quadratic: Option<Vec<f64>>,

    /// Monte Carlo draws per seed
    #[arg(short = 'n', long, default_value_t = 10000)]
    num_draws: usize,

    /// random seeds (comma-separated), one independent estimate each
    #[arg(long, value_delimiter = ',', default_value = "1,2,3")]
    seeds: Vec<u64>,

    /// finite difference step
    #[arg(long, default_value_t = 1e-5)]
    step: f64,

    /// output file: seed, parameter, index, pathwise, finite difference,
    /// absolute error
    #[arg(long, short, default_value = "stdout")]
    out: Box<str>,

    /// verbosity
    #[arg(long, short)]
    verbose: bool,
}

/// `f(z) = sum_d a[d] z[d] + c[d] z[d]^2`
struct QuadraticTest {
    linear: Vec<f64>,
    quadratic: Vec<f64>,
}

impl QuadraticTest {
    fn new(dim: usize, linear: Option<Vec<f64>>, quadratic: Option<Vec<f64>>) -> anyhow::Result<Self> {
        let linear = linear.unwrap_or_else(|| vec![0.0; dim]);
        let quadratic = quadratic.unwrap_or_else(|| vec![0.5; dim]);
        if linear.len() != dim || quadratic.len() != dim {
            return Err(anyhow::anyhow!(
                "need {} linear and quadratic coefficients, found {} and {}",
                dim,
                linear.len(),
                quadratic.len()
            ));
        }
        Ok(Self { linear, quadratic })
    }

    /// `df/dz`
    fn gradient(&self, z: ArrayView1<f64>) -> Array1<f64> {
        Array1::from_shape_fn(z.len(), |d| self.linear[d] + 2.0 * self.quadratic[d] * z[d])
    }

    /// `E[f(z)] = sum_k w[k] sum_d a[d] m[k,d] + c[d] (m[k,d]^2 + s[d]^2)`
    fn expectation(&self, mixture: &MixtureOfDiagNormalsSharedScale) -> f64 {
        let locs = mixture.locs();
        let scale = mixture.scale();
        let weights = mixture.weights();

        (0..mixture.num_components())
            .map(|k| {
                let e_k: f64 = (0..mixture.dim())
                    .map(|d| {
                        let m = locs[[k, d]];
                        let s = scale[[d]];
                        self.linear[d] * m + self.quadratic[d] * (m * m + s * s)
                    })
                    .sum();
                weights[[k]] * e_k
            })
            .sum()
    }
}

pub fn run_grad_check(args: GradCheckArgs) -> anyhow::Result<()> {
    init_logger(args.verbose);

    let mixture = MixtureParams::from_json_file(&args.params)?.to_mixture()?;
    let test_fn = QuadraticTest::new(mixture.dim(), args.linear.clone(), args.quadratic.clone())?;

    let exact = finite_difference_gradient(&mixture, |m| test_fn.expectation(m), args.step)?;

    info!(
        "Pathwise estimates over {} seed(s) x {} draws",
        args.seeds.len(),
        args.num_draws
    );

    let estimates = args
        .seeds
        .par_iter()
        .progress_count(args.seeds.len() as u64)
        .map(|&seed| {
            let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
            let grad =
                pathwise_mean_gradient(&mixture, args.num_draws, |z| test_fn.gradient(z), &mut rng)?;
            Ok((seed, grad))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let mut lines = vec!["seed\tparam\tindex\tpathwise\tfinite_diff\tabs_err".to_string()];

    for (seed, grad) in estimates.iter() {
        let mut max_err = 0_f64;
        for (name, est, ext) in [
            ("locs", &grad.locs, &exact.locs),
            ("scale", &grad.scale, &exact.scale),
            ("logits", &grad.logits, &exact.logits),
        ] {
            for ((ix, &a), &b) in est.indexed_iter().zip(ext.iter()) {
                let err = (a - b).abs();
                max_err = max_err.max(err);
                lines.push(format!(
                    "{}\t{}\t{:?}\t{}\t{}\t{}",
                    seed,
                    name,
                    ix.slice(),
                    a,
                    b,
                    err
                ));
            }
        }
        info!("seed {}: max absolute error {:.4}", seed, max_err);
    }

    write_types(&lines, &args.out)?;

    info!("Done");
    Ok(())
}
