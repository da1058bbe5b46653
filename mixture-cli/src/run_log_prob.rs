use crate::common::*;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
pub struct LogProbArgs {
    /// mixture parameters, a JSON file with `locs`, `scale` and `logits`
    #[arg(long, short, required = true)]
    params: Box<str>,

    /// points, one row of `D` numbers per line (`.gz` is fine)
    #[arg(required = true)]
    input: Box<str>,

    /// output file, one log-density per line
    #[arg(long, short, default_value = "stdout")]
    out: Box<str>,

    /// verbosity
    #[arg(long, short)]
    verbose: bool,
}

pub fn run_log_prob(args: LogProbArgs) -> anyhow::Result<()> {
    init_logger(args.verbose);

    let mixture = MixtureParams::from_json_file(&args.params)?.to_mixture()?;
    let points = read_points(&args.input, mixture.dim())?;
    info!("Read {} points of dimension {}", points.nrows(), mixture.dim());

    let llik = mixture.log_prob(&points.into_dyn())?;
    let lines = llik.iter().map(|x| x.to_string()).collect::<Vec<_>>();
    write_types(&lines, &args.out)?;

    info!("Done");
    Ok(())
}
