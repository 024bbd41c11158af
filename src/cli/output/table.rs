//! Table output formatting for CLI commands
//!
//! Bug status and patch ledger tables rendered with comfy-table, colored by
//! phase when the terminal supports it.

use chrono::{DateTime, Utc};
use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use std::env;

use super::truncate;
use crate::domain::models::{LedgerEntry, Phase};
use crate::services::{BugSnapshot, ContextOutcome};

/// Table formatter for CLI output
pub struct TableFormatter {
    /// Whether to use colors in output
    use_colors: bool,
    /// Maximum width for tables (None = auto)
    max_width: Option<u16>,
}

impl TableFormatter {
    pub fn new() -> Self {
        Self {
            use_colors: supports_color(),
            max_width: None,
        }
    }

    pub fn with_config(use_colors: bool, max_width: Option<u16>) -> Self {
        Self {
            use_colors,
            max_width,
        }
    }

    /// One row per bug: phase, timer, attempts and how it ended.
    pub fn format_bugs(&self, bugs: &[BugSnapshot]) -> String {
        let mut table = self.create_base_table();

        table.set_header(vec![
            Cell::new("Bug").add_attribute(Attribute::Bold),
            Cell::new("Phase").add_attribute(Attribute::Bold),
            Cell::new("Timer").add_attribute(Attribute::Bold),
            Cell::new("Attempts").add_attribute(Attribute::Bold),
            Cell::new("Outcome").add_attribute(Attribute::Bold),
            Cell::new("Last Activity").add_attribute(Attribute::Bold),
        ]);

        for bug in bugs {
            let phase = bug.status.phase;
            let phase_cell = if self.use_colors {
                Cell::new(phase.as_str()).fg(phase_color(phase))
            } else {
                Cell::new(format!("{} {}", phase_icon(phase), phase))
            };

            let outcome = match &bug.outcome {
                None => "-".to_string(),
                Some(ContextOutcome::Resolved) => "resolved".to_string(),
                Some(ContextOutcome::Escalated { reason }) => {
                    format!("escalated: {}", truncate(reason, 48))
                }
            };

            let last_activity = bug
                .last_activity
                .as_ref()
                .map_or_else(|| "-".to_string(), format_relative_time);

            table.add_row(vec![
                Cell::new(truncate(bug.bug_id.as_str(), 24)),
                phase_cell,
                Cell::new(bug.status.timer),
                Cell::new(bug.status.attempts),
                Cell::new(outcome),
                Cell::new(last_activity),
            ]);
        }

        table.to_string()
    }

    /// Recorded bundles, one row per bug.
    pub fn format_ledger(&self, entries: &[LedgerEntry]) -> String {
        let mut table = self.create_base_table();

        table.set_header(vec![
            Cell::new("Bug").add_attribute(Attribute::Bold),
            Cell::new("Bundle").add_attribute(Attribute::Bold),
            Cell::new("SHA-256").add_attribute(Attribute::Bold),
            Cell::new("Recorded").add_attribute(Attribute::Bold),
        ]);

        for entry in entries {
            table.add_row(vec![
                Cell::new(truncate(entry.bug_id.as_str(), 24)),
                Cell::new(truncate(&entry.bundle_location, 48)),
                Cell::new(entry.integrity_hash.chars().take(12).collect::<String>()),
                Cell::new(format_relative_time(&entry.recorded_at)),
            ]);
        }

        table.to_string()
    }

    fn create_base_table(&self) -> Table {
        let mut table = Table::new();

        table
            .load_preset(presets::UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);

        if let Some(width) = self.max_width {
            table.set_width(width);
        }

        table
    }
}

impl Default for TableFormatter {
    fn default() -> Self {
        Self::new()
    }
}

fn supports_color() -> bool {
    if env::var("NO_COLOR").is_ok() {
        return false;
    }
    console::colors_enabled()
}

fn phase_color(phase: Phase) -> Color {
    match phase {
        Phase::Wait => Color::White,
        Phase::Reproduce => Color::Yellow,
        Phase::Patch => Color::Cyan,
        Phase::Verify => Color::Blue,
        Phase::Done => Color::Green,
        Phase::Escalate => Color::Red,
    }
}

fn phase_icon(phase: Phase) -> &'static str {
    match phase {
        Phase::Wait => "○",
        Phase::Reproduce | Phase::Patch | Phase::Verify => "⟳",
        Phase::Done => "✓",
        Phase::Escalate => "✗",
    }
}

/// Format relative time (e.g., "2 hours ago")
fn format_relative_time(datetime: &DateTime<Utc>) -> String {
    let duration = Utc::now().signed_duration_since(*datetime);

    if duration.num_seconds() < 60 {
        "just now".to_string()
    } else if duration.num_minutes() < 60 {
        let mins = duration.num_minutes();
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if duration.num_hours() < 24 {
        let hours = duration.num_hours();
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else {
        datetime.format("%Y-%m-%d %H:%M").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{BugId, BugStatus};

    fn snapshot(id: &str, phase: Phase, outcome: Option<ContextOutcome>) -> BugSnapshot {
        BugSnapshot {
            bug_id: BugId::new(id),
            status: BugStatus {
                phase,
                timer: 0,
                attempts: 1,
            },
            outcome,
            last_activity: None,
        }
    }

    #[test]
    fn test_format_bugs_without_colors() {
        let formatter = TableFormatter::with_config(false, Some(120));
        let out = formatter.format_bugs(&[
            snapshot("BUG-1", Phase::Done, Some(ContextOutcome::Resolved)),
            snapshot(
                "BUG-2",
                Phase::Escalate,
                Some(ContextOutcome::Escalated {
                    reason: "verification failed twice".to_string(),
                }),
            ),
            snapshot("BUG-3", Phase::Wait, None),
        ]);

        assert!(out.contains("BUG-1"));
        assert!(out.contains("✓ done"));
        assert!(out.contains("escalated: verification failed twice"));
        assert!(out.contains("○ wait"));
    }

    #[test]
    fn test_format_ledger_shortens_hash() {
        let formatter = TableFormatter::with_config(false, Some(120));
        let entry = LedgerEntry {
            bug_id: BugId::new("BUG-1"),
            bundle_location: "BUG-1/abc.diff".to_string(),
            integrity_hash: "0123456789abcdef0123".to_string(),
            recorded_at: Utc::now(),
        };
        let out = formatter.format_ledger(&[entry]);
        assert!(out.contains("0123456789ab"));
        assert!(!out.contains("0123456789abc"));
        assert!(out.contains("just now"));
    }

    #[test]
    fn test_relative_time() {
        let two_hours = Utc::now() - chrono::Duration::hours(2);
        assert_eq!(format_relative_time(&two_hours), "2 hours ago");
        let one_min = Utc::now() - chrono::Duration::seconds(61);
        assert_eq!(format_relative_time(&one_min), "1 min ago");
    }
}
