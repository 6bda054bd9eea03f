use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "livepref")]
#[command(about = "Inspect and edit a livepref preference store")]
pub struct Cli {
    /// Path to a livepref.toml config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the configured application id
    #[arg(long, global = true)]
    pub app_id: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Value type used to read or write a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ValueKind {
    Int,
    Long,
    Float,
    Double,
    Bool,
    String,
    /// Comma-separated list of strings
    StringSet,
    /// Arbitrary JSON object
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the value of a key
    Get {
        /// Preference key
        key: String,
        /// Type the key is stored as
        #[arg(short, long, value_enum, default_value = "string")]
        kind: ValueKind,
    },
    /// Store a value under a key
    Set {
        /// Preference key
        key: String,
        /// Value to store
        value: String,
        /// Type to store the value as
        #[arg(short, long, value_enum, default_value = "string")]
        kind: ValueKind,
    },
    /// Delete a key
    Delete {
        /// Preference key
        key: String,
    },
    /// Check whether a key exists
    Has {
        /// Preference key
        key: String,
    },
    /// List all stored keys
    Keys,
    /// Toggle the sample "logged in before" flag and watch both observers fire
    Demo,
}
