//! Manually authored changelog entries and their export formats.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{Result, WorklogError};

const FILES_CELL_MAX: usize = 50;
pub const DEFAULT_QUERY_LIMIT: usize = 50;
pub const LATEST_ENTRIES: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangelogEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub date: String,
    pub time: String,
    pub version: String,
    pub architecture_level: String,
    pub module: String,
    pub property: String,
    pub description: String,
    pub conclusion: String,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl ChangelogEntry {
    /// Checks the fields the store relies on for ordering and identity.
    pub fn validate(&self) -> Result<()> {
        NaiveDate::parse_from_str(&self.date, "%Y-%m-%d").map_err(|_| {
            WorklogError::InvalidInput(format!("Date must be YYYY-MM-DD: {}", self.date))
        })?;
        NaiveTime::parse_from_str(&self.time, "%H:%M")
            .map_err(|_| WorklogError::InvalidInput(format!("Time must be HH:MM: {}", self.time)))?;
        for (name, value) in [
            ("module", &self.module),
            ("property", &self.property),
            ("description", &self.description),
        ] {
            if value.trim().is_empty() {
                return Err(WorklogError::InvalidInput(format!("{name} must not be empty")));
            }
        }
        Ok(())
    }

    /// Natural key used in duplicate-entry messages.
    pub fn key(&self) -> String {
        format!("{} {} {} {}", self.date, self.time, self.module, self.description)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangelogFilter {
    pub module: Option<String>,
    pub property: Option<String>,
    pub level: Option<String>,
    pub version: Option<String>,
    pub since: Option<String>,
    pub until: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangelogStats {
    pub total: i64,
    pub by_module: Vec<(String, i64)>,
    pub by_property: Vec<(String, i64)>,
    pub latest: Vec<ChangelogEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleRegistration {
    pub category: String,
    pub module_name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropertyRegistration {
    pub property_name: String,
    pub color: Option<String>,
    pub priority: i64,
}

/// Default property tags as `(name, color, priority)`.
pub const DEFAULT_PROPERTIES: &[(&str, &str, i64)] = &[
    ("production-freeze", "red", 1),
    ("stage-freeze", "orange", 2),
    ("feature", "green", 3),
    ("fix", "yellow", 4),
    ("refactor", "blue", 5),
    ("perf", "purple", 6),
    ("test", "cyan", 7),
    ("docs", "gray", 8),
];

// ═══════════════════════════════════════════════════════════════════════════════
// Export
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Markdown,
    Csv,
    Json,
}

impl FromStr for ExportFormat {
    type Err = WorklogError;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "markdown" | "md" => Ok(ExportFormat::Markdown),
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            other => Err(WorklogError::InvalidInput(format!(
                "Unknown export format: {other}"
            ))),
        }
    }
}

pub fn export(entries: &[ChangelogEntry], format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Markdown => Ok(render_markdown(entries)),
        ExportFormat::Csv => Ok(render_csv(entries)),
        ExportFormat::Json => render_json(entries),
    }
}

pub fn render_markdown(entries: &[ChangelogEntry]) -> String {
    let mut out = String::from(
        "# Changelog\n\n\
         > Generated change history: versions, architecture levels and module changes.\n\n\
         | Date | Time | Version | Level | Module | Property | Description | Conclusion | Files |\n\
         |------|------|---------|-------|--------|----------|-------------|------------|-------|\n",
    );
    for entry in entries {
        let cells = [
            entry.date.as_str(),
            entry.time.as_str(),
            entry.version.as_str(),
            entry.architecture_level.as_str(),
            entry.module.as_str(),
            entry.property.as_str(),
            entry.description.as_str(),
            entry.conclusion.as_str(),
        ];
        out.push('|');
        for cell in cells {
            out.push(' ');
            out.push_str(&markdown_cell(cell));
            out.push_str(" |");
        }
        out.push(' ');
        out.push_str(&markdown_cell(&files_cell(&entry.files)));
        out.push_str(" |\n");
    }
    out
}

/// Joined file list, cut to fit a table cell.
pub fn files_cell(files: &[String]) -> String {
    if files.is_empty() {
        return "-".to_string();
    }
    let joined = files.join(", ");
    if joined.chars().count() > FILES_CELL_MAX {
        let head: String = joined.chars().take(FILES_CELL_MAX - 3).collect();
        format!("{head}...")
    } else {
        joined
    }
}

fn markdown_cell(value: &str) -> String {
    value.replace('|', "\\|").replace(['\n', '\r'], " ")
}

pub fn render_csv(entries: &[ChangelogEntry]) -> String {
    let mut out = String::from(
        "id,date,time,version,architecture_level,module,property,description,conclusion,files,created_at\n",
    );
    for entry in entries {
        let fields = [
            entry.id.map(|id| id.to_string()).unwrap_or_default(),
            entry.date.clone(),
            entry.time.clone(),
            entry.version.clone(),
            entry.architecture_level.clone(),
            entry.module.clone(),
            entry.property.clone(),
            entry.description.clone(),
            entry.conclusion.clone(),
            entry.files.join(";"),
            entry.created_at.clone().unwrap_or_default(),
        ];
        let row: Vec<String> = fields.iter().map(|field| escape_csv_field(field)).collect();
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

pub fn escape_csv_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

pub fn render_json(entries: &[ChangelogEntry]) -> Result<String> {
    serde_json::to_string_pretty(entries)
        .map_err(|err| WorklogError::json("Failed to serialize changelog", err))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> ChangelogEntry {
        ChangelogEntry {
            id: Some(1),
            date: "2026-02-06".to_string(),
            time: "14:30".to_string(),
            version: "0.5.0".to_string(),
            architecture_level: "L0".to_string(),
            module: "aoem-core".to_string(),
            property: "test".to_string(),
            description: "Fix concurrency control, again".to_string(),
            conclusion: "Verified \"TPS\" +5%".to_string(),
            files: vec![
                "aoem/crates/core/aoem-core/src/lib.rs".to_string(),
                "aoem/crates/core/aoem-core/src/scheduler.rs".to_string(),
            ],
            created_at: None,
        }
    }

    #[test]
    fn validate_rejects_bad_date_and_time() {
        assert!(entry().validate().is_ok());

        let mut bad_date = entry();
        bad_date.date = "06/02/2026".to_string();
        assert!(matches!(bad_date.validate(), Err(WorklogError::InvalidInput(_))));

        let mut bad_time = entry();
        bad_time.time = "2pm".to_string();
        assert!(matches!(bad_time.validate(), Err(WorklogError::InvalidInput(_))));

        let mut empty_module = entry();
        empty_module.module = "  ".to_string();
        assert!(empty_module.validate().is_err());
    }

    #[test]
    fn files_cell_truncates_long_lists() {
        let cell = files_cell(&entry().files);
        assert_eq!(cell.chars().count(), 50);
        assert!(cell.ends_with("..."));
        assert_eq!(files_cell(&["a.rs".to_string()]), "a.rs");
        assert_eq!(files_cell(&[]), "-");
    }

    #[test]
    fn markdown_has_one_row_per_entry() {
        let mut piped = entry();
        piped.description = "a | b".to_string();
        let md = render_markdown(&[entry(), piped]);
        let rows: Vec<_> = md.lines().filter(|line| line.starts_with("| 2026")).collect();
        assert_eq!(rows.len(), 2);
        assert!(rows[1].contains("a \\| b"));
    }

    #[test]
    fn csv_quotes_commas_and_quotes() {
        let csv = render_csv(&[entry()]);
        let row = csv.lines().nth(1).expect("data row");
        assert!(row.contains("\"Fix concurrency control, again\""));
        assert!(row.contains("\"Verified \"\"TPS\"\" +5%\""));
        assert!(row.starts_with("1,2026-02-06,14:30,"));
    }

    #[test]
    fn json_export_is_an_array() {
        let json = render_json(&[entry()]).expect("json");
        let parsed: Vec<ChangelogEntry> = serde_json::from_str(&json).expect("parse");
        assert_eq!(parsed, vec![entry()]);
    }

    #[test]
    fn export_format_parses_aliases() {
        assert_eq!("md".parse::<ExportFormat>().expect("md"), ExportFormat::Markdown);
        assert_eq!("CSV".parse::<ExportFormat>().expect("csv"), ExportFormat::Csv);
        assert!("xml".parse::<ExportFormat>().is_err());
    }
}
