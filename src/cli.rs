use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "trailgate",
    version,
    about = "Evaluate compliance trails against Rego policies"
)]
pub struct Cli {
    #[arg(
        long,
        short = 'H',
        global = true,
        help = "API host (default https://app.kosli.com)"
    )]
    pub host: Option<String>,
    #[arg(long, global = true, help = "Organization that owns the flow")]
    pub org: Option<String>,
    #[arg(long, global = true, help = "API token")]
    pub api_token: Option<String>,
    #[arg(
        long,
        short = 'c',
        global = true,
        help = "Config file (default ~/.config/trailgate/config.toml)"
    )]
    pub config_file: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        default_value = "warn",
        help = "Log level or filter directive, written to stderr"
    )]
    pub log_level: String,
    #[arg(long, global = true, help = "Shorthand for --log-level debug")]
    pub debug: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Evaluate trails against a policy
    Evaluate {
        #[command(subcommand)]
        command: EvaluateCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum EvaluateCommands {
    /// Evaluate one trail
    Trail {
        trail: String,
        #[command(flatten)]
        args: EvalArgs,
    },
    /// Evaluate several trails as one policy input
    Trails {
        #[arg(required = true)]
        trails: Vec<String>,
        #[command(flatten)]
        args: EvalArgs,
    },
}

#[derive(Args, Debug, Clone)]
pub struct EvalArgs {
    #[arg(long, short = 'f', help = "Flow the trails belong to")]
    pub flow: String,
    #[arg(long, short = 'p', help = "Path to a Rego policy declaring `package policy`")]
    pub policy: PathBuf,
    #[arg(long, short = 'o', default_value = "table", help = "Output format: table or json")]
    pub output: String,
    #[arg(long, help = "Include the policy input in JSON output")]
    pub show_input: bool,
    #[arg(
        long,
        value_delimiter = ',',
        help = "Limit input to these attestations: NAME or ARTIFACT.NAME"
    )]
    pub attestations: Vec<String>,
}
