//! Generated tree listing of the repository at `docs/INDEX.md`.
//!
//! Each entry carries a short purpose label and created/modified stamps. The
//! file is rewritten only when something other than the generated-at line
//! changed, so the watcher does not loop on its own output.

use chrono::{DateTime, Local};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

use crate::checkpoint::write_atomic;
use crate::config::{DocsConfig, IndexScope};
use crate::error::{Result, WorklogError};
use crate::ignore::{relative_path, IgnoreSet};

const GENERATED_PREFIX: &str = "Generated: ";
const PURPOSE_MAX_CHARS: usize = 80;
const CONTENT_SCAN_LINES: usize = 200;
const IGNORED_FILE_NAMES: &[&str] = &[".DS_Store", "Thumbs.db"];

/// Port the aggregator calls after a flush touched the docs directory.
pub trait DocsIndexer {
    /// Returns whether the index file was rewritten.
    fn regenerate(&self, repo_root: &Path) -> Result<bool>;
}

impl<T: DocsIndexer + ?Sized> DocsIndexer for Box<T> {
    fn regenerate(&self, repo_root: &Path) -> Result<bool> {
        (**self).regenerate(repo_root)
    }
}

impl<T: DocsIndexer + ?Sized> DocsIndexer for &T {
    fn regenerate(&self, repo_root: &Path) -> Result<bool> {
        (**self).regenerate(repo_root)
    }
}

/// Indexer used when `[docs] enabled = false`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledIndex;

impl DocsIndexer for DisabledIndex {
    fn regenerate(&self, _repo_root: &Path) -> Result<bool> {
        Ok(false)
    }
}

#[derive(Debug, Clone)]
pub struct DocsIndex {
    index_file: String,
    docs_dir: String,
    scope: IndexScope,
    descriptions: BTreeMap<String, String>,
    ignore: IgnoreSet,
}

struct Entry {
    name: String,
    purpose: String,
    created: String,
    modified: String,
}

impl DocsIndex {
    pub fn new(index_file: &str, docs_dir: &str, scope: IndexScope) -> Self {
        Self {
            index_file: index_file.to_string(),
            docs_dir: docs_dir.to_string(),
            scope,
            descriptions: BTreeMap::new(),
            ignore: IgnoreSet::new(Some(index_file), &[]),
        }
    }

    pub fn from_config(config: &DocsConfig, extra_ignore: &[String]) -> Self {
        let mut index = Self::new(&config.index_file, &config.dir, config.scope);
        index.ignore = IgnoreSet::new(Some(&config.index_file), extra_ignore);
        if let Some(path) = &config.descriptions_file {
            index.descriptions = load_descriptions(path);
        }
        index
    }

    pub fn with_descriptions(mut self, descriptions: BTreeMap<String, String>) -> Self {
        self.descriptions = descriptions;
        self
    }

    pub fn index_path(&self, repo_root: &Path) -> PathBuf {
        repo_root.join(&self.index_file)
    }

    /// Renders the index text without touching disk.
    pub fn render(&self, repo_root: &Path) -> Option<String> {
        let scan_root = match self.scope {
            IndexScope::Repo => repo_root.to_path_buf(),
            IndexScope::Docs => repo_root.join(&self.docs_dir),
        };
        if !scan_root.is_dir() {
            return None;
        }

        let (root_name, root_purpose, scope_label) = match self.scope {
            IndexScope::Repo => (
                format!(
                    "{}/",
                    repo_root
                        .file_name()
                        .map(|name| name.to_string_lossy().into_owned())
                        .unwrap_or_default()
                ),
                "Repository root",
                "repository root",
            ),
            IndexScope::Docs => (
                format!("{}/", self.docs_dir.trim_end_matches('/')),
                "Docs root",
                "docs/",
            ),
        };

        let (created, modified) = timestamps(&scan_root);
        let mut entries = vec![Entry {
            name: root_name,
            purpose: root_purpose.to_string(),
            created,
            modified,
        }];
        self.collect(&scan_root, repo_root, "", &mut entries);

        let width = entries
            .iter()
            .map(|entry| entry.name.chars().count())
            .max()
            .unwrap_or(0);

        let mut out = String::new();
        out.push_str("# Docs Index\n\n");
        out.push_str(&format!(
            "{GENERATED_PREFIX}{}\n\n",
            Local::now().format("%Y-%m-%d %H:%M:%S")
        ));
        out.push_str("This file is generated by worklog. Do not edit it by hand.\n");
        out.push_str(&format!("Scope: {scope_label}\n\n"));
        out.push_str("## Tree\n\n");
        for entry in &entries {
            let padding = " ".repeat(width - entry.name.chars().count() + 2);
            out.push_str(&format!(
                "{}{padding}# {} ({}/{})\n",
                entry.name, entry.purpose, entry.created, entry.modified
            ));
        }
        Some(out)
    }

    fn collect(&self, dir: &Path, repo_root: &Path, prefix: &str, out: &mut Vec<Entry>) {
        let children: Vec<_> = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by(|a, b| {
                b.file_type()
                    .is_dir()
                    .cmp(&a.file_type().is_dir())
                    .then_with(|| {
                        a.file_name()
                            .to_string_lossy()
                            .to_lowercase()
                            .cmp(&b.file_name().to_string_lossy().to_lowercase())
                    })
            })
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(err) => {
                    tracing::debug!(error = %err, "Skipping unreadable index entry");
                    None
                }
            })
            .filter(|entry| !self.is_hidden_from_index(entry.path(), repo_root))
            .collect();

        let count = children.len();
        for (idx, child) in children.into_iter().enumerate() {
            let is_last = idx + 1 == count;
            let connector = if is_last { "└── " } else { "├── " };
            let is_dir = child.file_type().is_dir();
            let file_name = child.file_name().to_string_lossy().into_owned();
            let rel = relative_path(repo_root, child.path()).unwrap_or_else(|| file_name.clone());
            let (created, modified) = timestamps(child.path());

            out.push(Entry {
                name: format!("{prefix}{connector}{file_name}{}", if is_dir { "/" } else { "" }),
                purpose: self.purpose_for(child.path(), &rel, is_dir),
                created,
                modified,
            });

            if is_dir {
                let child_prefix = format!("{prefix}{}", if is_last { "    " } else { "│   " });
                self.collect(child.path(), repo_root, &child_prefix, out);
            }
        }
    }

    fn is_hidden_from_index(&self, path: &Path, repo_root: &Path) -> bool {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        if IGNORED_FILE_NAMES.contains(&name.as_str()) {
            return true;
        }
        match relative_path(repo_root, path) {
            Some(rel) => self.ignore.is_ignored(&rel),
            None => true,
        }
    }

    fn purpose_for(&self, path: &Path, rel: &str, is_dir: bool) -> String {
        if is_dir {
            return self
                .descriptions
                .get(&format!("{rel}/"))
                .or_else(|| self.descriptions.get(rel))
                .cloned()
                .unwrap_or_else(|| "Directory".to_string());
        }
        if let Some(description) = self.descriptions.get(rel) {
            return description.clone();
        }
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        if let Some(label) = well_known_label(&name) {
            return label.to_string();
        }
        if let Some(label) = content_purpose(path) {
            return label;
        }
        extension_label(path).to_string()
    }
}

impl DocsIndexer for DocsIndex {
    fn regenerate(&self, repo_root: &Path) -> Result<bool> {
        let Some(content) = self.render(repo_root) else {
            return Ok(false);
        };

        let index_path = self.index_path(repo_root);
        if index_path.exists() {
            let existing = fs_err::read_to_string(&index_path)
                .map_err(|err| WorklogError::io("Failed to read docs index", err))?;
            if without_generated_line(&existing) == without_generated_line(&content) {
                return Ok(false);
            }
        }

        write_atomic(&index_path, content.as_bytes())?;
        tracing::debug!(path = %index_path.display(), "Docs index regenerated");
        Ok(true)
    }
}

fn without_generated_line(content: &str) -> String {
    content
        .lines()
        .filter(|line| !line.starts_with(GENERATED_PREFIX))
        .collect::<Vec<_>>()
        .join("\n")
}

fn load_descriptions(path: &Path) -> BTreeMap<String, String> {
    let parsed = fs_err::read_to_string(path)
        .map_err(|err| err.to_string())
        .and_then(|content| {
            serde_json::from_str::<BTreeMap<String, String>>(&content).map_err(|err| err.to_string())
        });
    match parsed {
        Ok(map) => map,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "Ignoring descriptions file");
            BTreeMap::new()
        }
    }
}

fn timestamps(path: &Path) -> (String, String) {
    let Ok(metadata) = fs_err::metadata(path) else {
        return ("-".to_string(), "-".to_string());
    };
    let modified = metadata.modified().ok();
    let created = metadata.created().ok().or(modified);
    (format_time(created), format_time(modified))
}

fn format_time(time: Option<SystemTime>) -> String {
    time.map(|time| DateTime::<Local>::from(time).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

// ─────────────────────────────────────────────────────────────────────────────
// Purpose Heuristics
// ─────────────────────────────────────────────────────────────────────────────

fn well_known_label(file_name: &str) -> Option<&'static str> {
    let upper = file_name.to_uppercase();
    let stem = upper.split('.').next().unwrap_or(&upper);
    let exact = match stem {
        "README" => Some("Project entry point"),
        "LICENSE" => Some("License"),
        "CONTRIBUTING" => Some("Contribution guide"),
        "ROADMAP" => Some("Roadmap"),
        "CHANGELOG" => Some("Change log"),
        _ => None,
    };
    if exact.is_some() {
        return exact;
    }

    const TOKENS: &[(&str, &str)] = &[
        ("README", "Readme"),
        ("INDEX", "Index"),
        ("ROADMAP", "Roadmap"),
        ("GUIDE", "Guide"),
        ("MANUAL", "Guide"),
        ("CHECKLIST", "Checklist"),
        ("REPORT", "Report"),
        ("SUMMARY", "Summary"),
        ("PLAN", "Plan"),
        ("ARCH", "Architecture"),
        ("DESIGN", "Design"),
        ("REFERENCE", "Reference"),
        ("CHANGELOG", "Change log"),
    ];
    TOKENS
        .iter()
        .find(|(token, _)| upper.contains(token))
        .map(|(_, label)| *label)
}

fn content_purpose(path: &Path) -> Option<String> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())?;
    let style = match extension.as_str() {
        "md" | "markdown" => HeaderStyle::MarkdownHeading,
        "sh" | "ps1" | "py" | "toml" | "yaml" | "yml" => HeaderStyle::Comment("#"),
        "sql" => HeaderStyle::Comment("--"),
        "rs" => HeaderStyle::Comment("//"),
        "txt" => HeaderStyle::FirstLine,
        _ => return None,
    };

    let bytes = fs_err::read(path).ok()?;
    let text = String::from_utf8_lossy(&bytes);
    let lines = text
        .lines()
        .take(CONTENT_SCAN_LINES)
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("#!"));

    let found = match style {
        HeaderStyle::MarkdownHeading => lines
            .filter(|line| line.starts_with('#'))
            .map(|line| line.trim_start_matches('#').trim().to_string())
            .next(),
        HeaderStyle::Comment(marker) => lines
            .take(1)
            .filter(|line| line.starts_with(marker))
            .map(|line| {
                line.trim_start_matches(marker)
                    .trim_start_matches(['!', '/'])
                    .trim()
                    .to_string()
            })
            .next(),
        HeaderStyle::FirstLine => lines.map(str::to_string).next(),
    }?;

    if found.is_empty() {
        return None;
    }
    Some(found.chars().take(PURPOSE_MAX_CHARS).collect())
}

enum HeaderStyle {
    MarkdownHeading,
    Comment(&'static str),
    FirstLine,
}

fn extension_label(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "md" | "markdown" => "Document",
        "json" => "Data",
        "toml" | "yaml" | "yml" => "Config",
        "sql" => "SQL script",
        "png" | "jpg" | "jpeg" | "svg" => "Image",
        "csv" => "Table",
        "txt" => "Text",
        "ps1" | "sh" | "bat" | "py" => "Script",
        "rs" | "c" | "cpp" | "h" | "hpp" => "Source",
        "db" | "sqlite" => "Database",
        _ => "File",
    }
}
