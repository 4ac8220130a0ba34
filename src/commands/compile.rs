use anyhow::{Context, Result};
use rowscript::error::CompileError;
use rowscript::model::StockQuote;
use rowscript::TemplateCompiler;
use std::fs;

use super::load_config;
use crate::cli::CompileArgs;

pub fn run(args: CompileArgs) -> Result<()> {
    let config = load_config(&args.common)?;
    let source = fs::read_to_string(&args.script)
        .with_context(|| format!("Failed to read script: {}", args.script))?;

    let compiler = TemplateCompiler::new(config.compiler.language_version);
    match compiler.compile::<StockQuote>(&source) {
        Ok(compiled) => {
            println!("✓ Compiled {}", args.script);
            println!("  - Script hash: {}", compiled.hash);
            println!("  - Binary size: {} bytes", compiled.binary.len());
            Ok(())
        }
        Err(CompileError::Diagnostics(diagnostics)) => {
            for diagnostic in &diagnostics {
                eprintln!("{}", diagnostic);
            }
            anyhow::bail!(
                "{} failed to compile with {} diagnostic(s)",
                args.script,
                diagnostics.len()
            )
        }
        Err(e) => Err(e).with_context(|| format!("Failed to compile {}", args.script)),
    }
}
