//! Free-text notes attached to the next recorded session.
//!
//! Written by `worklog note` to `work_note_input.json` and consumed by the
//! store writer. The file is deleted only after the session row is stored.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::checkpoint::write_json_atomic;
use crate::error::{Result, WorklogError};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Annotations {
    pub work_summary: Option<String>,
    pub problems: Option<String>,
    pub solutions: Option<String>,
    pub chat_summary: Option<String>,
    pub next_steps: Option<String>,
}

impl Annotations {
    pub fn is_empty(&self) -> bool {
        self.fields().iter().all(|field| field.is_none())
    }

    /// Blank strings become `None`.
    pub fn normalized(self) -> Self {
        Self {
            work_summary: non_blank(self.work_summary),
            problems: non_blank(self.problems),
            solutions: non_blank(self.solutions),
            chat_summary: non_blank(self.chat_summary),
            next_steps: non_blank(self.next_steps),
        }
    }

    /// Overlays `other` on top of `self`, field by field.
    pub fn merged_with(self, other: Annotations) -> Self {
        let other = other.normalized();
        Self {
            work_summary: other.work_summary.or(self.work_summary),
            problems: other.problems.or(self.problems),
            solutions: other.solutions.or(self.solutions),
            chat_summary: other.chat_summary.or(self.chat_summary),
            next_steps: other.next_steps.or(self.next_steps),
        }
        .normalized()
    }

    fn fields(&self) -> [&Option<String>; 5] {
        [
            &self.work_summary,
            &self.problems,
            &self.solutions,
            &self.chat_summary,
            &self.next_steps,
        ]
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

/// Reads pending annotations. A missing file yields empty annotations; a
/// malformed one is logged and ignored.
pub fn load(path: &Path) -> Result<Annotations> {
    if !path.exists() {
        return Ok(Annotations::default());
    }
    let content = fs_err::read_to_string(path)
        .map_err(|err| WorklogError::io("Failed to read annotations", err))?;
    match serde_json::from_str::<Annotations>(&content) {
        Ok(annotations) => Ok(annotations.normalized()),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "Ignoring malformed annotations");
            Ok(Annotations::default())
        }
    }
}

pub fn save(path: &Path, annotations: &Annotations) -> Result<()> {
    write_json_atomic(path, annotations)
}

pub fn consume(path: &Path) -> Result<()> {
    match fs_err::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(WorklogError::io("Failed to remove annotations", err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_fields_normalize_to_none() {
        let annotations = Annotations {
            work_summary: Some("  GPU executor tuning ".to_string()),
            problems: Some("   ".to_string()),
            ..Default::default()
        }
        .normalized();
        assert_eq!(annotations.work_summary.as_deref(), Some("GPU executor tuning"));
        assert!(annotations.problems.is_none());
        assert!(!annotations.is_empty());
    }

    #[test]
    fn merge_prefers_new_non_blank_values() {
        let existing = Annotations {
            work_summary: Some("old".to_string()),
            problems: Some("kept".to_string()),
            ..Default::default()
        };
        let update = Annotations {
            work_summary: Some("new".to_string()),
            problems: Some("".to_string()),
            ..Default::default()
        };
        let merged = existing.merged_with(update);
        assert_eq!(merged.work_summary.as_deref(), Some("new"));
        assert_eq!(merged.problems.as_deref(), Some("kept"));
    }

    #[test]
    fn load_save_consume_cycle() {
        let temp = tempfile::tempdir().expect("temp dir");
        let path = temp.path().join("work_note_input.json");
        assert!(load(&path).expect("missing").is_empty());

        let annotations = Annotations {
            next_steps: Some("wire up metrics".to_string()),
            ..Default::default()
        };
        save(&path, &annotations).expect("save");
        assert_eq!(load(&path).expect("load"), annotations);

        consume(&path).expect("consume");
        assert!(!path.exists());
        consume(&path).expect("consume again");
    }

    #[test]
    fn malformed_file_is_ignored() {
        let temp = tempfile::tempdir().expect("temp dir");
        let path = temp.path().join("work_note_input.json");
        fs_err::write(&path, "not json").expect("write");
        assert!(load(&path).expect("load").is_empty());
    }
}
