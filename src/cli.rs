use crate::config::DEFAULT_DEFINITION;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "maskdump",
    author,
    version,
    about = "Masked, replayable SQL dumps of MySQL databases",
    long_about = "Dump a MySQL/MariaDB database to replayable SQL while masking or replacing\n\
                  sensitive columns.\n\n\
                  Tables can be dumped in full, schema only, or as data for existing tables."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file path
    #[arg(short, long, global = true, env = "MASKDUMP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a masked SQL dump
    Dump(DumpArgs),

    /// Show the tables a definition would dump
    Tables(TablesArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

#[derive(Parser)]
pub struct DumpArgs {
    /// Output file (".gz" is appended with --gzip)
    pub output: PathBuf,

    /// Dump definition to use
    #[arg(short, long, default_value = DEFAULT_DEFINITION)]
    pub definition: String,

    /// Compress output with gzip
    #[arg(long, default_value = "false")]
    pub gzip: bool,

    /// Source database URL (overrides connection.url)
    #[arg(long, env = "MASKDUMP_DATABASE_URL")]
    pub database_url: Option<String>,

    /// Rows per INSERT statement (overrides dump.batch_size)
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Overwrite the output file if it exists
    #[arg(short, long, default_value = "false")]
    pub force: bool,
}

#[derive(Parser)]
pub struct TablesArgs {
    /// Dump definition to use
    #[arg(short, long, default_value = DEFAULT_DEFINITION)]
    pub definition: String,

    /// Source database URL (overrides connection.url)
    #[arg(long, env = "MASKDUMP_DATABASE_URL")]
    pub database_url: Option<String>,
}

#[derive(Parser)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Initialize a new config file
    Init {
        /// Output path
        #[arg(short, long, default_value = "./maskdump.toml")]
        output: PathBuf,
    },

    /// Show current config
    Show,
}
