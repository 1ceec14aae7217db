use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use log::debug;

use crate::workspace::Workspace;

#[derive(Args, Debug, Default)]
#[command(about = "Load units, symbols and library entries")]
pub struct RunArgs {
    /// Library entries to load, relative to the root prefix when one is set
    #[arg(long = "source", value_name = "PATH")]
    pub sources: Vec<PathBuf>,

    /// Units to require, written LIBRARY/UNIT
    #[arg(long = "unit", value_name = "LIBRARY/UNIT")]
    pub units: Vec<String>,

    /// Symbols to reference
    #[arg(long = "use", value_name = "SYMBOL")]
    pub symbols: Vec<String>,
}

fn split_unit(spec: &str) -> Result<(&str, &str)> {
    spec.split_once('/')
        .filter(|(library, unit)| !library.is_empty() && !unit.is_empty())
        .with_context(|| format!("Invalid unit `{spec}`, expected LIBRARY/UNIT"))
}

pub fn execute(workspace: &Workspace, args: RunArgs) -> Result<()> {
    let loader = &workspace.loader;

    for path in &args.sources {
        debug!("Loading library {}", path.display());
        loader.load_library(path)?;
    }

    for spec in &args.units {
        let (library, unit) = split_unit(spec)?;
        loader.require_unit(library, unit)?;
    }

    for symbol in &args.symbols {
        workspace
            .executor
            .use_symbol(loader, symbol)
            .with_context(|| format!("Failed to load `{symbol}`"))?;
    }

    let included = loader.included_files();
    if included.is_empty() {
        eprintln!("{}", "Nothing was included".yellow());
    }
    for path in included {
        println!("{} {}", "✓".green(), workspace.display_path(&path));
    }
    Ok(())
}
