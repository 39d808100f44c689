//! CLI argument definitions using clap

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueHint};

/// Course progression engine: per-profile course maps, positions and lesson units
#[derive(Parser, Debug)]
#[command(name = "coursemap")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Debug level, repeat for more (-d info, -dd debug, -ddd trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub debug: u8,

    /// Directory searched for .coursemap.toml (default: cwd)
    #[arg(short = 'C', long, global = true, value_hint = ValueHint::DirPath)]
    pub project_dir: Option<PathBuf>,

    /// Catalog file or directory (overrides config)
    #[arg(long, global = true, value_hint = ValueHint::AnyPath)]
    pub catalog: Option<PathBuf>,

    /// Progress snapshot file (overrides config)
    #[arg(long, global = true, value_hint = ValueHint::FilePath)]
    pub progress: Option<PathBuf>,

    /// Emit JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Profile and course a command works on.
#[derive(Args, Debug, Clone)]
pub struct Target {
    /// Profile identity
    #[arg(short, long)]
    pub profile: String,

    /// Course identity (default: `default_course` from config)
    #[arg(short, long)]
    pub course: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the profile's map of visible content
    Map {
        #[command(flatten)]
        target: Target,
    },

    /// Show the profile's active index in its map
    Active {
        #[command(flatten)]
        target: Target,
    },

    /// Show the structural maximum depth of a course
    Depth {
        /// Course identity (default: `default_course` from config)
        #[arg(short, long)]
        course: Option<String>,
    },

    /// Show lesson and quest numbers of a lesson
    Number {
        #[command(flatten)]
        target: Target,
        /// Lesson identity
        lesson: String,
    },

    /// Record a choice at a branching
    Choose {
        #[command(flatten)]
        target: Target,
        /// Branching identity
        branching: String,
        /// Chosen identities, in order
        #[arg(required = true, num_args = 1.., value_delimiter = ',')]
        identities: Vec<String>,
    },

    /// Mark a lesson as completed
    Complete {
        #[command(flatten)]
        target: Target,
        /// Lesson identity
        lesson: String,
    },

    /// Show the next chunk of a lesson's units
    Units {
        /// Lesson identity
        lesson: String,
        /// Continue after this unit
        #[arg(long)]
        from: Option<String>,
    },

    /// Count the tasks along the longest path of a lesson
    Tasks {
        /// Lesson identity
        lesson: String,
    },

    /// Print the content graph of a course
    Tree {
        /// Course identity (default: `default_course` from config)
        #[arg(short, long)]
        course: Option<String>,
    },

    /// Summarize a profile's progress in a course
    Status {
        #[command(flatten)]
        target: Target,
    },

    /// Manage settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Generate shell completions
    Completion {
        /// Shell type
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show merged config
    Show,

    /// Create config template
    Init {
        /// Create global config
        #[arg(short, long)]
        global: bool,
    },

    /// Show config paths
    Path,
}
