use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "steward")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Converge a server to a declared recipe, safely and repeatably", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Converge this machine to a recipe
    Apply(ApplyArgs),

    /// Preview what apply would change (dry run)
    Diff(RunArgs),

    /// Query inventory records
    Inventory(InventoryArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Runs
// ============================================================================

#[derive(Args)]
pub struct RunArgs {
    /// Recipe file (TOML)
    pub recipe: PathBuf,

    /// Inventory file (JSON)
    #[arg(short, long, env = "STEWARD_INVENTORY")]
    pub inventory: Option<PathBuf>,

    /// Settings file (defaults to ~/.config/steward/config.toml)
    #[arg(short, long, env = "STEWARD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Only converge matching resources: a kind, or kind.name
    #[arg(short, long)]
    pub target: Option<String>,

    /// Print the run report as JSON instead of the diff display
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub run: RunArgs,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

// ============================================================================
// Inventory
// ============================================================================

#[derive(Args)]
pub struct InventoryArgs {
    /// Record kind (e.g. aws_opsworks_app)
    pub kind: String,

    /// Filter as attr:value terms joined by AND, e.g. "deploy:true"
    pub filter: Option<String>,

    /// Inventory file (JSON)
    #[arg(short, long, env = "STEWARD_INVENTORY")]
    pub inventory: PathBuf,
}
