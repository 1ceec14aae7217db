use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod list;
mod resolve;
mod run;
mod workspace;

#[derive(Parser)]
#[command(name = "libload")]
#[command(about = "Inspect and load libraries declared in a libload.toml manifest", long_about = None)]
struct Cli {
    /// Directory holding libload.toml. Searched upwards from the current
    /// directory when omitted.
    #[arg(long, global = true, value_name = "DIR", value_hint = clap::ValueHint::DirPath)]
    manifest: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered libraries and their units
    #[command(alias = "ls")]
    List(list::ListArgs),

    /// Show which library and file define the given symbols
    #[command(alias = "r")]
    Resolve(resolve::ResolveArgs),

    /// Load units, symbols or library entries and print the files included
    Run(run::RunArgs),
}

fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init();

    let cli = Cli::parse();
    let workspace = workspace::Workspace::open(cli.manifest.as_deref())?;

    match cli.command {
        Commands::List(args) => list::execute(&workspace, args),
        Commands::Resolve(args) => resolve::execute(&workspace, args),
        Commands::Run(args) => run::execute(&workspace, args),
    }
}
