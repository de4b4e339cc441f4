use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the fenceline binary.
#[derive(Debug, Parser)]
#[command(
    name = "fenceline",
    version,
    about = "Render markdown with remotely highlighted code blocks"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "FENCELINE_CONFIG_FILE",
        value_name = "PATH",
        global = true
    )]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: Overrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Render a markdown file to HTML on stdout.
    Render(InputArgs),
    /// Print the code blocks collected from a markdown file as JSON.
    Blocks(InputArgs),
}

impl Command {
    pub fn input(&self) -> &PathBuf {
        match self {
            Command::Render(args) | Command::Blocks(args) => &args.file,
        }
    }
}

#[derive(Debug, Args, Clone)]
pub struct InputArgs {
    /// Markdown file to read.
    #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub file: PathBuf,
}

#[derive(Debug, Args, Default, Clone)]
pub struct Overrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,

    /// Override the highlighting service token.
    #[arg(long = "token", env = "FENCELINE_TOKEN", value_name = "TOKEN", global = true)]
    pub token: Option<String>,

    /// Override the highlighting service endpoint.
    #[arg(long = "endpoint", value_name = "URL", global = true)]
    pub endpoint: Option<String>,

    /// Theme used for code blocks that do not name one.
    #[arg(long = "theme", value_name = "THEME", global = true)]
    pub theme: Option<String>,

    /// Snippet directory searched for `<<< path` references; repeatable.
    #[arg(
        long = "snippet-dir",
        value_name = "PATH",
        value_hint = ValueHint::DirPath,
        global = true
    )]
    pub snippet_dirs: Vec<PathBuf>,
}
