use anyhow::Result;
use clap::Parser;
use qeval::params::Params;
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "qeval")]
#[command(about = "Evaluate structured queries against a search index", long_about = None)]
struct Args {
    /// Parameter file, one key=value per line
    param_file: PathBuf,
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();
    let start = Instant::now();
    let params = Params::from_file(&args.param_file)?;
    qeval::run(&params)?;
    tracing::info!(took_s = start.elapsed().as_secs_f64(), "run finished");
    Ok(())
}
