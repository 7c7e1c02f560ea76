pub mod params;
pub mod pipeline;

use anyhow::Result;
use params::Params;
use qeval_core::persist::{load_index, IndexPaths};

/// Load the index named by `params` and perform the configured run.
pub fn run(params: &Params) -> Result<()> {
    let index = load_index(&IndexPaths::new(&params.index_path))?;
    pipeline::run(&index, params)
}
