use anyhow::Result;
use rowscript::config::RowscriptConfig;
use tracing::info;

use crate::cli::ConfigCommands;

pub fn run(command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Validate { path } => validate(&path),
        ConfigCommands::Generate => generate(),
        ConfigCommands::Show { config } => show(config),
    }
}

fn validate(path: &str) -> Result<()> {
    info!("Validating config file: {}", path);

    let config = RowscriptConfig::from_file(path)?;
    config.validate()?;

    println!("✓ Configuration file is valid: {}", path);
    println!("\nSummary:");
    println!("  - Language version: {}", config.compiler.language_version);
    println!("  - Warm-up on start: {}", config.compiler.initialize);
    println!(
        "  - Evaluation timeout: {:?}",
        config.evaluation.resolve_timeout()
    );
    match config.cache.ttl()? {
        Some(ttl) => println!(
            "  - Module cache TTL: {:?} (sweep every {:?})",
            ttl,
            config.cache.sweep_interval()?.unwrap_or(ttl)
        ),
        None => println!("  - Module cache: disabled"),
    }

    Ok(())
}

fn generate() -> Result<()> {
    info!("Generating example config");
    println!("{}", RowscriptConfig::example()?);
    Ok(())
}

fn show(config_path: Option<String>) -> Result<()> {
    info!("Showing effective configuration");

    let config = if let Some(path) = config_path {
        RowscriptConfig::from_file(path)?
    } else {
        RowscriptConfig::default()
    };

    println!("Effective Configuration:\n");
    println!("{}", toml::to_string_pretty(&config)?);

    Ok(())
}
