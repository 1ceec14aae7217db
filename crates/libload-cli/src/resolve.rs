use anyhow::Result;
use clap::Args;
use colored::Colorize;
use itertools::Itertools;

use crate::workspace::Workspace;

#[derive(Args, Debug)]
#[command(about = "Resolve symbols to the files defining them")]
pub struct ResolveArgs {
    /// Symbols to look up
    #[arg(value_name = "SYMBOL", required = true)]
    pub symbols: Vec<String>,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn execute(workspace: &Workspace, args: ResolveArgs) -> Result<()> {
    let loader = &workspace.loader;

    let mut resolved = Vec::new();
    let mut missing = Vec::new();
    for symbol in args.symbols.iter().unique() {
        match loader.resolve_symbol(symbol)? {
            Some(found) => resolved.push(found),
            None => missing.push(symbol.clone()),
        }
    }

    if args.json {
        let output = serde_json::json!({
            "resolved": resolved,
            "missing": missing,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        for found in &resolved {
            let file = loader.library_root(&found.library)?.join(&found.path);
            println!(
                "{} {} {} {}",
                "✓".green(),
                found.symbol.bold(),
                format!("({} in {})", found.kind, found.library).dimmed(),
                workspace.display_path(&file)
            );
        }
        for symbol in &missing {
            println!("{} {} {}", "✗".red(), symbol.bold(), "not declared".red());
        }
    }

    if !missing.is_empty() {
        anyhow::bail!("{} symbol(s) could not be resolved", missing.len());
    }
    Ok(())
}
