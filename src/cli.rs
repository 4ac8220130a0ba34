use clap::{Parser, Subcommand};

/// rowscript - compile and evaluate user scripts over record datasets
///
/// Scripts are JavaScript statement bodies spliced into a per-record-type
/// template, compiled to bytecode and run once per record under a deadline.
#[derive(Parser, Debug)]
#[command(name = "rowscript")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Compile and evaluate user scripts over record datasets", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Configuration arguments shared across commands
#[derive(Parser, Debug, Clone)]
pub struct CommonConfigArgs {
    /// Config file path
    #[arg(short = 'c', long, env = "ROWSCRIPT_CONFIG")]
    pub config: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compile a script and report its content hash
    Compile(CompileArgs),

    /// Evaluate a script against a JSON file of stock quotes
    Evaluate(EvaluateArgs),

    /// Configuration management utilities
    Config(ConfigArgs),
}

#[derive(Parser, Debug)]
pub struct CompileArgs {
    /// Path to the script file
    pub script: String,

    #[command(flatten)]
    pub common: CommonConfigArgs,
}

#[derive(Parser, Debug)]
pub struct EvaluateArgs {
    /// Path to the script file
    pub script: String,

    /// JSON array of stock quotes to evaluate against
    #[arg(short, long)]
    pub records: String,

    /// Per-record deadline, overriding the configured timeout (e.g., "500ms", "10s")
    #[arg(long)]
    pub timeout: Option<String>,

    #[command(flatten)]
    pub common: CommonConfigArgs,
}

#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Validate configuration file
    Validate {
        /// Path to config file
        path: String,
    },
    /// Generate example config file
    Generate,
    /// Show effective configuration
    Show {
        /// Config file path
        #[arg(short = 'c', long, env = "ROWSCRIPT_CONFIG")]
        config: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_evaluate() {
        let cli = Cli::try_parse_from([
            "rowscript",
            "evaluate",
            "spread.js",
            "--records",
            "quotes.json",
            "--timeout",
            "2s",
            "-c",
            "rowscript.toml",
        ])
        .unwrap();

        match cli.command {
            Commands::Evaluate(args) => {
                assert_eq!(args.script, "spread.js");
                assert_eq!(args.records, "quotes.json");
                assert_eq!(args.timeout.as_deref(), Some("2s"));
                assert_eq!(args.common.config.as_deref(), Some("rowscript.toml"));
            }
            other => panic!("expected evaluate, got {:?}", other),
        }
    }

    #[test]
    fn test_evaluate_requires_records() {
        assert!(Cli::try_parse_from(["rowscript", "evaluate", "spread.js"]).is_err());
    }

    #[test]
    fn test_parse_config_generate() {
        let cli = Cli::try_parse_from(["rowscript", "config", "generate"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config(ConfigArgs {
                command: ConfigCommands::Generate
            })
        ));
    }
}
