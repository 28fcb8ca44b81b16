//! Output formatting utilities

use crate::archive::{DiffOutcome, PurgeOutcome, RestoreOutcome};
use crate::catalog::{CatalogStats, PathSummary, VersionRecord};
use crate::diff::KeyMode;
use crate::error::Result;
use crate::workspace::WorkspaceStats;

/// Pretty printer for permafrost output
pub struct PrettyPrinter;

impl PrettyPrinter {
    /// Print the result of an archive operation
    pub fn print_archive_result(record: &VersionRecord) {
        println!("✅ Archived: {}", record.original_path);
        println!("├─ Version: {}", record.version);
        println!("├─ Archive: {}", record.archive_name);
        println!(
            "├─ Size: {} → {}",
            format_bytes(record.original_size),
            format_bytes(record.compressed_size)
        );
        println!(
            "└─ Compression: {:.1}% saved",
            record.compression_ratio() * 100.0
        );
    }

    /// Print the result of a restore operation
    pub fn print_restore_result(outcome: &RestoreOutcome) {
        println!("✅ Restored: {}", outcome.record.original_path);
        println!("├─ Version: {}", outcome.record.version);
        println!(
            "├─ Archived: {}",
            outcome.record.created_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        println!("└─ Written: {}", format_bytes(outcome.bytes_written));
    }

    /// Print the result of a purge operation
    pub fn print_purge_result(outcome: &PurgeOutcome) {
        match outcome.removed.as_slice() {
            [single] => println!(
                "✅ Removed version {} of {}",
                single.version, outcome.original_path
            ),
            _ => println!(
                "✅ Removed all {} versions of {}",
                outcome.removed.len(),
                outcome.original_path
            ),
        }
    }

    /// Print every record as a detail table (one row per version)
    pub fn print_version_listing(records: &[VersionRecord]) {
        if records.is_empty() {
            println!("No archives found.");
            return;
        }

        let path_width = column_width(records.iter().map(|r| r.original_path.len()), 4);
        let name_width = column_width(records.iter().map(|r| r.archive_name.len()), 8);

        println!(
            "{:<path_width$}  {:>3}  {:<19}  {:>10}  {:>10}  {:>7}  {:<name_width$}",
            "Path", "Ver", "Created", "Orig Size", "Comp Size", "Savings", "Filename"
        );
        for record in records {
            println!(
                "{:<path_width$}  {:>3}  {:<19}  {:>10}  {:>10}  {:>6.1}%  {:<name_width$}",
                record.original_path,
                record.version,
                record.created_at.format("%Y-%m-%d %H:%M:%S"),
                format_bytes(record.original_size),
                format_bytes(record.compressed_size),
                record.compression_ratio() * 100.0,
                record.archive_name,
            );
        }
    }

    /// Print one summary line per distinct path
    pub fn print_summary_listing(summaries: &[PathSummary]) {
        if summaries.is_empty() {
            println!("No archives found.");
            return;
        }

        let path_width = column_width(summaries.iter().map(|s| s.original_path.len()), 4);

        println!(
            "{:<path_width$}  {:>6}  {:>8}  {:<19}  {:>10}  {:>10}  {:>7}",
            "Path", "Latest", "Versions", "Last Archived", "Total Size", "Comp Size", "Savings"
        );
        for summary in summaries {
            println!(
                "{:<path_width$}  {:>6}  {:>8}  {:<19}  {:>10}  {:>10}  {:>6.1}%",
                summary.original_path,
                summary.latest_version,
                summary.version_count,
                summary.last_archived.format("%Y-%m-%d %H:%M:%S"),
                format_bytes(summary.total_original),
                format_bytes(summary.total_compressed),
                summary.avg_compression_ratio() * 100.0,
            );
        }
    }

    /// Print catalog statistics
    pub fn print_stats(stats: &CatalogStats) {
        match &stats.scope {
            Some(path) => println!("📊 Archive statistics for {}", path),
            None => println!("📊 Archive statistics"),
        }

        println!("├─ Archives: {}", stats.archive_count);
        if stats.scope.is_none() {
            println!("├─ Paths: {}", stats.path_count);
        }
        if let Some(latest) = stats.latest_version {
            println!("├─ Latest version: {}", latest);
        }
        if let Some(last) = stats.last_archived {
            println!("├─ Last archived: {}", last.format("%Y-%m-%d %H:%M:%S UTC"));
        }
        println!("├─ Original size: {}", format_bytes(stats.total_original));
        println!(
            "├─ Compressed size: {}",
            format_bytes(stats.total_compressed)
        );
        println!("├─ Space saved: {}", format_bytes(stats.space_saved()));
        println!(
            "└─ Avg compression: {:.1}%",
            stats.avg_compression_ratio() * 100.0
        );
    }

    /// Print workspace disk usage
    pub fn print_disk_usage(usage: &WorkspaceStats) {
        println!("💾 Workspace disk usage");
        println!("├─ Stored blobs: {}", usage.blob_count);
        println!("├─ Blob size: {}", format_bytes(usage.total_blob_size));
        println!("└─ Manifest size: {}", format_bytes(usage.manifest_size));
    }

    /// Print a diff report
    pub fn print_diff_result(outcome: &DiffOutcome) {
        let report = &outcome.report;

        println!(
            "🔍 Diff: {} (v{}) → {} (v{})",
            outcome.base.original_path,
            outcome.base.version,
            outcome.candidate.original_path,
            outcome.candidate.version
        );

        match &report.key_mode {
            KeyMode::Explicit(columns) => println!("├─ Keys: {} (explicit)", columns.join(", ")),
            KeyMode::Detected(columns) => println!("├─ Keys: {} (detected)", columns.join(", ")),
            KeyMode::Positional => println!("├─ Keys: none found, compared by row position"),
        }

        if report.schema.has_changes() {
            println!("├─ ❌ Schema: CHANGED");
            for col in &report.schema.added_columns {
                println!("│  ├─ Added column: {} ({})", col.name, col.data_type);
            }
            for col in &report.schema.removed_columns {
                println!("│  ├─ Removed column: {} ({})", col.name, col.data_type);
            }
            for change in &report.schema.type_changes {
                println!(
                    "│  └─ Type change: {}: {} → {}",
                    change.column, change.from, change.to
                );
            }
        } else {
            println!("├─ ✅ Schema: unchanged");
        }

        let row_changes = report.rows_added + report.rows_removed + report.rows_modified;
        if row_changes > 0 {
            println!(
                "├─ ❌ Rows: {} changed of {} compared",
                row_changes, report.rows_compared
            );
            println!("│  ├─ Added: {}", report.rows_added);
            println!("│  ├─ Removed: {}", report.rows_removed);
            println!("│  ├─ Modified: {}", report.rows_modified);
            println!("│  └─ Unchanged: {}", report.rows_unchanged);
        } else {
            println!(
                "├─ ✅ Rows: unchanged ({} compared)",
                report.rows_compared
            );
        }

        if !report.column_change_counts.is_empty() {
            let hot: Vec<String> = report
                .column_change_counts
                .iter()
                .map(|(name, count)| format!("{} ({})", name, count))
                .collect();
            println!("├─ Hot columns: {}", hot.join(", "));
        }

        Self::print_diff_samples(report);
        println!("└─ Done");
    }

    fn print_diff_samples(report: &crate::diff::DiffReport) {
        for sample in &report.sample_added {
            println!("│  + {}", format_key_values(&sample.key));
        }
        for sample in &report.sample_removed {
            println!("│  - {}", format_key_values(&sample.key));
        }
        for sample in &report.sample_modified {
            let changes: Vec<String> = sample
                .changes
                .iter()
                .map(|c| format!("{}: '{}' → '{}'", c.column, c.old, c.new))
                .collect();
            println!(
                "│  ~ {}: {}",
                format_key_values(&sample.key),
                changes.join(", ")
            );
        }
    }
}

fn format_key_values(key: &[crate::data::ScalarValue]) -> String {
    let parts: Vec<String> = key.iter().map(|v| v.to_string()).collect();
    format!("({})", parts.join(", "))
}

fn column_width(lengths: impl Iterator<Item = usize>, min: usize) -> usize {
    lengths.fold(min, usize::max)
}

/// JSON formatter for machine-readable output
pub struct JsonFormatter;

impl JsonFormatter {
    /// Format any serializable data as pretty JSON
    pub fn format<T: serde::Serialize + ?Sized>(data: &T) -> Result<String> {
        Ok(serde_json::to_string_pretty(data)?)
    }
}

/// Format bytes in human-readable form
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1024), "1.0 KB");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(1048576), "1.0 MB");
    }

    #[test]
    fn test_json_formatter() {
        let data = serde_json::json!({"rows_added": 3});
        let result = JsonFormatter::format(&data).unwrap();
        assert!(result.contains("rows_added"));
        assert!(result.contains('3'));
    }
}
