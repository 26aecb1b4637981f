//! gsat CLI: the user-facing command-line interface.

use std::path::PathBuf;
use std::process;

use clap::{Args, Parser, Subcommand, ValueEnum};

mod commands;

#[derive(Parser)]
#[command(name = "gsat", version, about = "GSAT English practice exams: scoring and progress")]
struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Which answer key to use: a file, or a year looked up under `keys_dir`.
#[derive(Args, Clone, Debug)]
pub struct KeyArgs {
    /// Answer-key TOML file
    #[arg(long, conflicts_with = "year", required_unless_present = "year")]
    pub key: Option<PathBuf>,

    /// Exam year, loaded from `<keys_dir>/<year>.toml`
    #[arg(long)]
    pub year: Option<String>,
}

/// Output format for results.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Text,
    Json,
    Markdown,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate answer-key TOML files
    Validate {
        /// Path to answer-key file or directory [default: keys_dir from config]
        #[arg(long)]
        key: Option<PathBuf>,
    },

    /// Score a set of answers against a key
    Score {
        #[command(flatten)]
        key: KeyArgs,

        /// JSON answers: an object of question → answer, or a list of submitted answers
        #[arg(long)]
        answers: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Take an exam one answer at a time
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Inspect or discard saved progress
    Progress {
        #[command(subcommand)]
        action: ProgressAction,
    },

    /// Show past results and statistics
    History {
        /// Only this exam year
        #[arg(long)]
        year: Option<String>,

        /// Output format: text or json
        #[arg(long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Create starter config and example answer key
    Init,
}

#[derive(Subcommand)]
pub enum SessionAction {
    /// Record an answer; several values make a multi-select answer
    Answer {
        #[command(flatten)]
        key: KeyArgs,

        /// Question number
        question: u32,

        /// Answer value(s); omit to clear the question
        values: Vec<String>,
    },

    /// Toggle the bookmark on a question
    Bookmark {
        #[command(flatten)]
        key: KeyArgs,

        /// Question number
        question: u32,
    },

    /// Score and close the session
    Submit {
        #[command(flatten)]
        key: KeyArgs,

        /// Submit even if nothing has been answered yet
        #[arg(long)]
        allow_empty: bool,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Discard all answers and start over
    Reset {
        #[command(flatten)]
        key: KeyArgs,
    },

    /// Show progress through the exam
    Status {
        #[command(flatten)]
        key: KeyArgs,
    },
}

#[derive(Subcommand)]
pub enum ProgressAction {
    /// Print the saved snapshot for a year
    Show {
        #[arg(long)]
        year: String,
    },

    /// Delete the saved snapshot for a year
    Clear {
        #[arg(long)]
        year: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("gsatprep=info".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.config;

    let result = match cli.command {
        Commands::Validate { key } => commands::validate::execute(key, config),
        Commands::Score {
            key,
            answers,
            format,
        } => commands::score::execute(key, answers, format, config),
        Commands::Session { action } => commands::session::execute(action, config).await,
        Commands::Progress { action } => commands::progress::execute(action, config),
        Commands::History { year, format } => commands::history::execute(year, format, config),
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
