use crate::common::*;

use clap::Parser;
use ndarray::ArrayD;
use serde::Serialize;
use std::io::Write;

#[derive(Parser, Debug, Clone)]
pub struct SummaryArgs {
    /// mixture parameters, a JSON file with `locs`, `scale` and `logits`
    #[arg(long, short, required = true)]
    params: Box<str>,

    /// output JSON file
    #[arg(long, short, default_value = "stdout")]
    out: Box<str>,

    /// verbosity
    #[arg(long, short)]
    verbose: bool,
}

#[derive(Serialize)]
struct MixtureSummary {
    num_components: usize,
    dim: usize,
    weights: ArrayD<f64>,
    mean: ArrayD<f64>,
    variance: ArrayD<f64>,
}

pub fn run_summary(args: SummaryArgs) -> anyhow::Result<()> {
    init_logger(args.verbose);

    let mixture = MixtureParams::from_json_file(&args.params)?.to_mixture()?;

    let summary = MixtureSummary {
        num_components: mixture.num_components(),
        dim: mixture.dim(),
        weights: mixture.weights().clone(),
        mean: mixture.mean()?,
        variance: mixture.variance()?,
    };

    let mut buf = open_buf_writer(&args.out)?;
    serde_json::to_writer_pretty(&mut buf, &summary)?;
    writeln!(buf)?;
    buf.flush()?;

    info!("Done");
    Ok(())
}
