use crate::common::*;

use clap::Parser;
use ndarray::Ix2;
use rand::SeedableRng;

#[derive(Parser, Debug, Clone)]
pub struct SampleArgs {
    /// mixture parameters, a JSON file with `locs`, `scale` and `logits`
    #[arg(long, short, required = true)]
    params: Box<str>,

    /// number of draws
    #[arg(short = 'n', long, default_value_t = 1000)]
    num_draws: usize,

    /// random seed
    #[arg(long, default_value_t = 42)]
    rseed: u64,

    /// output file, one tab-separated draw per line
    #[arg(long, short, default_value = "stdout")]
    out: Box<str>,

    /// verbosity
    #[arg(long, short)]
    verbose: bool,
}

pub fn run_sample(args: SampleArgs) -> anyhow::Result<()> {
    init_logger(args.verbose);

    let mixture = MixtureParams::from_json_file(&args.params)?.to_mixture()?;
    let mut rng = rand::rngs::StdRng::seed_from_u64(args.rseed);

    info!(
        "Sampling {} draws from {} components",
        args.num_draws,
        mixture.num_components()
    );

    let zz = mixture
        .sample(&[args.num_draws], &mut rng)?
        .into_dimensionality::<Ix2>()?;

    let lines = zz.rows().into_iter().map(format_row).collect::<Vec<_>>();
    write_types(&lines, &args.out)?;

    info!("Done");
    Ok(())
}
