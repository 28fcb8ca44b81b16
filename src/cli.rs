//! Command-line interface for permafrost

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "permafrost")]
#[command(about = "Cold-data archiving with versioned history for tabular files")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Override workspace location
    #[arg(long, global = true)]
    pub workspace: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the permafrost workspace
    Init {
        /// Reset an existing workspace, deleting all archives
        #[arg(long)]
        force: bool,
    },

    /// Compress a file and record it as the next version of its path
    Archive {
        /// File to archive
        path: PathBuf,

        /// Skip round-trip verification of the compressed blob
        #[arg(long)]
        no_verify: bool,
    },

    /// Restore an archived version to its original path
    Restore {
        /// Path spec: path, path@N, archive filename, or partial name
        spec: String,

        /// Version to restore (defaults to the latest)
        #[arg(long, value_parser = validate_version)]
        version: Option<u32>,
    },

    /// List archived files and versions
    Ls {
        /// Limit the listing to one path (or partial name)
        path: Option<String>,

        /// Show every version of every path
        #[arg(long)]
        all: bool,

        /// Output format: "pretty", "json"
        #[arg(long, default_value = "pretty")]
        format: String,
    },

    /// Show statistics about archived files
    Stats {
        /// Limit statistics to one path (or partial name)
        path: Option<String>,

        /// Output format: "pretty", "json"
        #[arg(long, default_value = "pretty")]
        format: String,
    },

    /// Structurally compare two archived snapshots
    Diff {
        /// Baseline spec
        spec_a: String,

        /// Candidate spec
        spec_b: String,

        /// Comma-separated key columns for row matching
        #[arg(long, value_delimiter = ',')]
        keys: Option<Vec<String>>,

        /// Output format: "pretty", "json"
        #[arg(long, default_value = "pretty")]
        format: String,

        /// Write the JSON report to a file
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Remove one archived version, or every version of a path
    Purge {
        /// Path (or partial name) to purge
        path: String,

        /// Remove only this version instead of every version
        #[arg(long, value_parser = validate_version)]
        version: Option<u32>,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

/// Parse output format string
#[derive(Debug, Clone)]
pub enum OutputFormat {
    Pretty,
    Json,
}

impl OutputFormat {
    pub fn parse(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(format!(
                "Invalid output format: {}. Use 'pretty' or 'json'",
                s
            )),
        }
    }
}

/// Validate that a version is a positive integer
fn validate_version(s: &str) -> Result<u32, String> {
    let version: u32 = s
        .parse()
        .map_err(|_| format!("Invalid version: '{}'. Must be a positive integer.", s))?;

    if version == 0 {
        return Err("Version numbers start at 1".to_string());
    }

    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_parse() {
        assert!(matches!(OutputFormat::parse("pretty"), Ok(OutputFormat::Pretty)));
        assert!(matches!(OutputFormat::parse("JSON"), Ok(OutputFormat::Json)));
        assert!(OutputFormat::parse("yaml").is_err());
    }

    #[test]
    fn test_validate_version() {
        assert_eq!(validate_version("3"), Ok(3));
        assert!(validate_version("0").is_err());
        assert!(validate_version("two").is_err());
    }

    #[test]
    fn test_cli_parses_diff_keys() {
        let cli = Cli::parse_from([
            "permafrost", "diff", "a.csv", "b.csv", "--keys", "id,region",
        ]);
        match cli.command {
            Commands::Diff { keys, .. } => {
                assert_eq!(keys, Some(vec!["id".to_string(), "region".to_string()]));
            }
            _ => panic!("expected diff command"),
        }
    }
}
