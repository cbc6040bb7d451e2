// src/cli/mod.rs — CLI definition (clap derive)

pub mod migrate;
pub mod play;
pub mod stats;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "goodquestion",
    about = "Root-cause interview training game",
    version
)]
pub struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Keep the database in memory (nothing is saved)
    #[arg(long, global = true)]
    pub ephemeral: bool,

    /// Debug logging to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Play a session (default when no subcommand is given)
    Play(PlayArgs),
    /// Show level, XP, streak and skill averages
    Stats,
    /// List recent sessions
    History {
        /// Number of sessions to show
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
    },
    /// Show saved knowledge notes
    Notes,
    /// Delete all stats and archived sessions
    Reset {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Show migration status or roll back
    Migrate {
        #[arg(long)]
        status: bool,
        #[arg(long)]
        rollback: bool,
    },
}

#[derive(Args, Clone, Debug, Default)]
pub struct PlayArgs {
    /// Difficulty (Easy, Medium, Hard)
    #[arg(short, long)]
    pub difficulty: Option<String>,

    /// Client industry
    #[arg(short, long)]
    pub industry: Option<String>,

    /// Consultation theme
    #[arg(short, long)]
    pub theme: Option<String>,

    /// Let the mentor build a scenario around your weak points
    #[arg(long)]
    pub briefed: bool,

    /// Continue the last unfinished session
    #[arg(long, conflicts_with = "briefed")]
    pub resume: bool,

    /// Pick difficulty, industry and theme interactively
    #[arg(long)]
    pub pick: bool,
}
