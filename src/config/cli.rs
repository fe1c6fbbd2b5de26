use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the arbor binary.
#[derive(Debug, Parser)]
#[command(name = "arbor", version, about = "Published-content cache operator tool")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "ARBOR_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: SettingsOverrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Resolve a published node through the cache and print it.
    Resolve(NodeArgs),
    /// Publish an item and its descendants.
    #[command(name = "publish-branch")]
    PublishBranch(PublishBranchArgs),
    /// Report whether an item's ancestors allow it to be published.
    #[command(name = "path-check")]
    PathCheck(NodeArgs),
    /// Run one scheduled publish sweep against the seed data.
    Sweep(SeedArgs),
}

#[derive(Debug, Args, Clone)]
pub struct SeedArgs {
    /// TOML file describing content types and items.
    #[arg(long, value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub seed: PathBuf,
}

#[derive(Debug, Args, Clone)]
pub struct NodeArgs {
    #[command(flatten)]
    pub seed: SeedArgs,

    /// Content item identifier.
    #[arg(long, value_name = "ID", allow_negative_numbers = true)]
    pub id: i32,
}

#[derive(Debug, Args, Clone)]
pub struct PublishBranchArgs {
    #[command(flatten)]
    pub node: NodeArgs,

    /// Also publish descendants that have never been published.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub force: bool,
}

#[derive(Debug, Args, Default, Clone)]
pub struct SettingsOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Emit logs as JSON.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,

    /// Override the memoizer lifetime; zero or less disables it.
    #[arg(
        long = "cache-ttl-seconds",
        value_name = "SECONDS",
        allow_negative_numbers = true,
        global = true
    )]
    pub cache_ttl_seconds: Option<i64>,

    /// Override the memoizer capacity.
    #[arg(long = "cache-max-entries", value_name = "COUNT", global = true)]
    pub cache_max_entries: Option<u64>,
}
