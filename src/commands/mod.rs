pub mod compile;
pub mod config;
pub mod evaluate;

use anyhow::Result;
use rowscript::config::RowscriptConfig;
use tracing::{debug, info};

use crate::cli::CommonConfigArgs;

/// Load the config named by `--config`, or defaults when none is given
pub fn load_config(args: &CommonConfigArgs) -> Result<RowscriptConfig> {
    match &args.config {
        Some(path) => {
            info!("Using config: {}", path);
            RowscriptConfig::from_file(path)
        }
        None => {
            debug!("No configuration file given, using defaults");
            Ok(RowscriptConfig::default())
        }
    }
}
