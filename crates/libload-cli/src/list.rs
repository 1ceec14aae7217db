use anyhow::Result;
use clap::Args;
use colored::Colorize;

use crate::workspace::Workspace;

#[derive(Args, Debug)]
#[command(about = "List registered libraries")]
pub struct ListArgs {
    /// Also list the units of each library
    #[arg(short, long)]
    pub units: bool,
}

pub fn execute(workspace: &Workspace, args: ListArgs) -> Result<()> {
    let loader = &workspace.loader;
    let libraries = loader.libraries();

    if let Some(prefix) = &loader.config().root_prefix {
        println!("{} {}", "root prefix".dimmed(), workspace.display_path(prefix));
    }

    if libraries.is_empty() {
        eprintln!("{}", "No libraries registered".yellow());
        return Ok(());
    }

    for name in libraries {
        let root = loader.library_root(&name)?;
        println!("{} {}", name.bold(), workspace.display_path(&root).dimmed());

        if args.units {
            for unit in loader.units(&name)? {
                println!("  {unit}");
            }
        }
    }
    Ok(())
}
