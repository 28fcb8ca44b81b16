//! Command implementations for the permafrost CLI

use crate::archive::ArchiveManager;
use crate::catalog::VersionCatalog;
use crate::cli::{Commands, OutputFormat};
use crate::error::{PermafrostError, Result};
use crate::output::{JsonFormatter, PrettyPrinter};
use crate::workspace::PermafrostWorkspace;
use std::path::Path;

/// Execute a command
pub fn execute_command(command: Commands, workspace_path: Option<&Path>) -> Result<()> {
    match command {
        Commands::Init { force } => init_command(workspace_path, force),
        Commands::Archive { path, no_verify } => {
            archive_command(workspace_path, &path, !no_verify)
        }
        Commands::Restore { spec, version } => restore_command(workspace_path, &spec, version),
        Commands::Ls { path, all, format } => {
            ls_command(workspace_path, path.as_deref(), all, &format)
        }
        Commands::Stats { path, format } => {
            stats_command(workspace_path, path.as_deref(), &format)
        }
        Commands::Diff {
            spec_a,
            spec_b,
            keys,
            format,
            output,
        } => diff_command(
            workspace_path,
            &spec_a,
            &spec_b,
            keys.as_deref(),
            &format,
            output.as_deref(),
        ),
        Commands::Purge {
            path,
            version,
            yes,
        } => purge_command(workspace_path, &path, version, yes),
    }
}

/// Initialize (or force-reset) the workspace
fn init_command(workspace_path: Option<&Path>, force: bool) -> Result<()> {
    let current_dir = std::env::current_dir()?;
    let root = workspace_path.unwrap_or(&current_dir);

    let workspace = PermafrostWorkspace::from_root(root.to_path_buf())?;

    if workspace.is_initialized() && !force {
        return Err(PermafrostError::workspace(format!(
            "Already initialized at {}. Use --force to reset it.",
            workspace.permafrost_dir.display()
        )));
    }

    if force {
        workspace.reset()?;
    }

    let workspace = PermafrostWorkspace::create_new(root.to_path_buf())?;
    workspace.create_config_with_force(force)?;

    // Materialize the catalog schema so the workspace is ready to use
    let _catalog = VersionCatalog::open(&workspace)?;

    println!(
        "✅ Initialized permafrost workspace at: {}",
        workspace.root.display()
    );
    println!("└─ Archives directory: {}", workspace.archives_dir.display());

    Ok(())
}

/// Archive a file as a new version
fn archive_command(workspace_path: Option<&Path>, path: &Path, verify: bool) -> Result<()> {
    let workspace = PermafrostWorkspace::find_or_create(workspace_path)?;
    let mut manager = ArchiveManager::open(workspace)?;

    let record = manager.archive(path, verify)?;
    PrettyPrinter::print_archive_result(&record);

    Ok(())
}

/// Restore an archived version to its original path
fn restore_command(workspace_path: Option<&Path>, spec: &str, version: Option<u32>) -> Result<()> {
    let workspace = PermafrostWorkspace::find_or_create(workspace_path)?;
    let manager = ArchiveManager::open(workspace)?;

    let outcome = manager.restore(spec, version)?;
    PrettyPrinter::print_restore_result(&outcome);

    Ok(())
}

/// List archived files and versions
fn ls_command(
    workspace_path: Option<&Path>,
    path: Option<&str>,
    all: bool,
    format: &str,
) -> Result<()> {
    let workspace = PermafrostWorkspace::find_or_create(workspace_path)?;
    let manager = ArchiveManager::open(workspace)?;

    let output_format = OutputFormat::parse(format).map_err(PermafrostError::invalid_input)?;

    match (path, all) {
        (Some(spec), _) => {
            let records = manager.list_versions(spec)?;
            match output_format {
                OutputFormat::Pretty => PrettyPrinter::print_version_listing(&records),
                OutputFormat::Json => println!("{}", JsonFormatter::format(&records)?),
            }
        }
        (None, true) => {
            let records = manager.list_all()?;
            match output_format {
                OutputFormat::Pretty => PrettyPrinter::print_version_listing(&records),
                OutputFormat::Json => println!("{}", JsonFormatter::format(&records)?),
            }
        }
        (None, false) => {
            let summaries = manager.summaries()?;
            match output_format {
                OutputFormat::Pretty => PrettyPrinter::print_summary_listing(&summaries),
                OutputFormat::Json => println!("{}", JsonFormatter::format(&summaries)?),
            }
        }
    }

    Ok(())
}

/// Show archive statistics
fn stats_command(workspace_path: Option<&Path>, path: Option<&str>, format: &str) -> Result<()> {
    let workspace = PermafrostWorkspace::find_or_create(workspace_path)?;
    let manager = ArchiveManager::open(workspace)?;

    let output_format = OutputFormat::parse(format).map_err(PermafrostError::invalid_input)?;
    let stats = manager.stats(path)?;

    match output_format {
        OutputFormat::Pretty => {
            PrettyPrinter::print_stats(&stats);
            if path.is_none() {
                let usage = manager.workspace().stats()?;
                PrettyPrinter::print_disk_usage(&usage);
            }
        }
        OutputFormat::Json => println!("{}", JsonFormatter::format(&stats)?),
    }

    Ok(())
}

/// Compare two archived snapshots
fn diff_command(
    workspace_path: Option<&Path>,
    spec_a: &str,
    spec_b: &str,
    keys: Option<&[String]>,
    format: &str,
    output_path: Option<&Path>,
) -> Result<()> {
    let workspace = PermafrostWorkspace::find_or_create(workspace_path)?;
    let manager = ArchiveManager::open(workspace)?;

    let output_format = OutputFormat::parse(format).map_err(PermafrostError::invalid_input)?;
    let outcome = manager.diff(spec_a, spec_b, keys)?;

    match output_format {
        OutputFormat::Pretty => PrettyPrinter::print_diff_result(&outcome),
        OutputFormat::Json => println!("{}", JsonFormatter::format(&outcome.report)?),
    }

    if let Some(output_path) = output_path {
        let final_path = if output_path.is_absolute() {
            output_path.to_path_buf()
        } else {
            manager.workspace().root.join(output_path)
        };

        if let Some(parent) = final_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(&final_path, JsonFormatter::format(&outcome.report)?)?;
        println!("\n💾 Diff saved to: {}", final_path.display());
    }

    Ok(())
}

/// Remove archived versions of a path
fn purge_command(
    workspace_path: Option<&Path>,
    path: &str,
    version: Option<u32>,
    yes: bool,
) -> Result<()> {
    let workspace = PermafrostWorkspace::find_or_create(workspace_path)?;
    let mut manager = ArchiveManager::open(workspace)?;

    // Purging every version is destructive enough to warrant a prompt
    if version.is_none() && !yes {
        println!(
            "⚠️  This will remove ALL archived versions of '{}'. Continue? (y/N)",
            path
        );
        let mut user_input = String::new();
        std::io::stdin().read_line(&mut user_input)?;

        if !user_input.trim().to_lowercase().starts_with('y') {
            println!("❌ Purge cancelled.");
            return Ok(());
        }
    }

    let outcome = manager.purge(path, version)?;
    PrettyPrinter::print_purge_result(&outcome);

    Ok(())
}
