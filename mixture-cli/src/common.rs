pub use log::info;
pub use mixture_param::*;

use flate2::read::GzDecoder;
use ndarray::prelude::*;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// `--verbose` sets `RUST_LOG=info` before the logger starts
pub fn init_logger(verbose: bool) {
    if verbose {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();
}

/// Non-batch mixture parameters as they appear in a JSON file
///
/// ```text
/// {"locs": [[..], ..], "scale": [..], "logits": [..]}
/// ```
#[derive(Deserialize, Debug, Clone)]
pub struct MixtureParams {
    pub locs: Vec<Vec<f64>>,
    pub scale: Vec<f64>,
    pub logits: Vec<f64>,
}

impl MixtureParams {
    pub fn from_json_file(file: &str) -> anyhow::Result<Self> {
        let buf = open_buf_reader(file)?;
        Ok(serde_json::from_reader(buf)?)
    }

    pub fn to_mixture(&self) -> anyhow::Result<MixtureOfDiagNormalsSharedScale> {
        let kk = self.locs.len();
        let dd = self.scale.len();

        if let Some((k, row)) = self.locs.iter().enumerate().find(|(_, r)| r.len() != dd) {
            return Err(anyhow::anyhow!(
                "locs[{}] has {} entries but scale has {}",
                k,
                row.len(),
                dd
            ));
        }

        let locs = Array2::from_shape_vec((kk, dd), self.locs.concat())?;
        let scale = Array1::from(self.scale.clone());
        let logits = Array1::from(self.logits.clone());

        Ok(MixtureOfDiagNormalsSharedScale::new(locs, scale, logits)?)
    }
}

///
/// Read points, one whitespace-separated row of `dim` numbers per
/// line. Empty lines and lines starting with `#` are skipped.
///
pub fn read_points(input_file: &str, dim: usize) -> anyhow::Result<Array2<f64>> {
    let buf = open_buf_reader(input_file)?;
    let mut data = vec![];
    let mut nrows = 0;

    for (i, line) in buf.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let row = line
            .split_whitespace()
            .map(|x| x.parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| anyhow::anyhow!("line {}: {}", i + 1, e))?;

        if row.len() != dim {
            return Err(anyhow::anyhow!(
                "line {}: expected {} columns, found {}",
                i + 1,
                dim,
                row.len()
            ));
        }

        data.extend(row);
        nrows += 1;
    }

    Ok(Array2::from_shape_vec((nrows, dim), data)?)
}

///
/// Write every line into the output_file
///
/// * `lines` - anything printable, one per line
/// * `output_file` - file name--either gzipped or not, or `stdout`
///
pub fn write_types<T>(lines: &[T], output_file: &str) -> anyhow::Result<()>
where
    T: std::fmt::Display,
{
    let mut buf = open_buf_writer(output_file)?;
    for line in lines {
        if let Err(e) = writeln!(buf, "{}", line) {
            if e.kind() == std::io::ErrorKind::BrokenPipe {
                return Ok(());
            } else {
                return Err(anyhow::anyhow!("unexpected error: {}", e));
            }
        }
    }
    buf.flush()?;
    Ok(())
}

/// tab-separated row
pub fn format_row<'a, I>(row: I) -> String
where
    I: IntoIterator<Item = &'a f64>,
{
    row.into_iter()
        .map(|x| x.to_string())
        .collect::<Vec<_>>()
        .join("\t")
}

///
/// Open a file for reading, and return a buffered reader
/// * `input_file` - file name--either gzipped or not
///
pub fn open_buf_reader(input_file: &str) -> anyhow::Result<Box<dyn BufRead>> {
    let ext = Path::new(input_file).extension().and_then(|x| x.to_str());
    let file = File::open(input_file)
        .map_err(|e| anyhow::anyhow!("failed to open {}: {}", input_file, e))?;
    match ext {
        Some("gz") => Ok(Box::new(BufReader::new(GzDecoder::new(file)))),
        _ => Ok(Box::new(BufReader::new(file))),
    }
}

///
/// Open a file for writing, and return a buffered writer
/// * `output_file` - file name--either gzipped or not
///
pub fn open_buf_writer(output_file: &str) -> anyhow::Result<Box<dyn Write>> {
    // we can simply override with stdout
    if output_file.eq_ignore_ascii_case("stdout") {
        return Ok(Box::new(BufWriter::new(std::io::stdout())));
    }

    let ext = Path::new(output_file).extension().and_then(|x| x.to_str());
    match ext {
        Some("gz") => {
            let output_file = File::create(output_file)?;
            let encoder =
                flate2::write::GzEncoder::new(output_file, flate2::Compression::default());
            Ok(Box::new(BufWriter::new(encoder)))
        }
        _ => {
            let output_file = File::create(output_file)?;
            Ok(Box::new(BufWriter::new(output_file)))
        }
    }
}
