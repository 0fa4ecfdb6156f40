use std::path::Path;

use log::{info, warn};
use tbi_cohort::pipeline;
use tbi_cohort::{PipelineConfig, Result};

#[cfg(feature = "snmalloc")]
#[global_allocator]
static ALLOC: snmalloc_rs::SnMalloc = snmalloc_rs::SnMalloc;

fn main() -> Result<()> {
    // Setup logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Size the worker pool for the header-extraction walk, keeping one
    // core free for the progress display.
    let workers = num_cpus::get().saturating_sub(1).max(1);
    if let Err(err) = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build_global()
    {
        warn!("Failed to configure worker pool: {err}");
    }

    // An optional config file path is the only argument; everything else
    // defaults to the study's data layout.
    let config = match std::env::args().nth(1) {
        Some(path) => {
            info!("Loading pipeline config from {path}");
            PipelineConfig::from_json_file(Path::new(&path))?
        }
        None => {
            info!("No config file given, using the default data layout");
            PipelineConfig::default()
        }
    };

    if !config.image_index_path.exists() {
        warn!(
            "Image index not found: {}",
            config.image_index_path.display()
        );
        return Ok(());
    }

    pipeline::run(&config)
}
