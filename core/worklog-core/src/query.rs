//! Read-only projections over recorded sessions.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::db::Db;
use crate::error::Result;
use crate::writer::PersistedSession;

pub const DEFAULT_LIST_LIMIT: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub date: String,
    pub start_time: String,
    pub duration_seconds: i64,
    pub work_summary: Option<String>,
    pub primary_module: Option<String>,
    pub files_changed: i64,
    pub lines_added: i64,
    pub lines_deleted: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleTotals {
    pub module: String,
    pub sessions: i64,
    pub lines_added: i64,
    pub lines_deleted: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionTotals {
    pub total_sessions: i64,
    pub total_seconds: i64,
    pub total_files: i64,
    pub total_added: i64,
    pub total_deleted: i64,
    pub first_session: Option<String>,
    pub last_session: Option<String>,
    pub by_module: Vec<ModuleTotals>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailySummary {
    pub date: String,
    pub sessions: i64,
    pub seconds: i64,
    pub files_changed: i64,
    pub lines_added: i64,
    pub modules: Vec<String>,
}

impl DailySummary {
    pub fn hours(&self) -> f64 {
        self.seconds as f64 / 3600.0
    }
}

/// Named queries over the `work_sessions` table.
pub struct SessionQuery<'a> {
    db: &'a Db,
}

impl<'a> SessionQuery<'a> {
    pub fn new(db: &'a Db) -> Self {
        Self { db }
    }

    pub fn recent(&self, days: u32) -> Result<Vec<SessionSummary>> {
        self.db.sessions_since(&since_date(days, Utc::now()))
    }

    pub fn by_module(&self, module: &str, limit: usize) -> Result<Vec<SessionSummary>> {
        self.db.sessions_by_module(module, limit)
    }

    pub fn search(&self, keyword: &str, limit: usize) -> Result<Vec<SessionSummary>> {
        self.db.search_sessions(keyword, limit)
    }

    pub fn get(&self, session_id: &str) -> Result<Option<PersistedSession>> {
        self.db.get_work_session(session_id)
    }

    pub fn stats(&self) -> Result<SessionTotals> {
        self.db.session_totals()
    }

    pub fn daily(&self, days: u32) -> Result<Vec<DailySummary>> {
        self.db.daily_summary(&since_date(days, Utc::now()))
    }
}

/// `YYYY-MM-DD` of the day `days` before `now`.
pub fn since_date(days: u32, now: DateTime<Utc>) -> String {
    (now - Duration::days(i64::from(days)))
        .format("%Y-%m-%d")
        .to_string()
}

/// `HH:MM`, used in listings.
pub fn format_clock(seconds: i64) -> String {
    let seconds = seconds.max(0);
    format!("{:02}:{:02}", seconds / 3600, (seconds % 3600) / 60)
}

/// `1h 2m 3s`, used in watcher summaries.
pub fn format_duration(seconds: i64) -> String {
    let seconds = seconds.max(0);
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{hours}h {minutes}m {secs}s")
    } else if minutes > 0 {
        format!("{minutes}m {secs}s")
    } else {
        format!("{secs}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_format_pads_hours_and_minutes() {
        assert_eq!(format_clock(0), "00:00");
        assert_eq!(format_clock(3725), "01:02");
        assert_eq!(format_clock(36_000 * 3), "30:00");
        assert_eq!(format_clock(-5), "00:00");
    }

    #[test]
    fn long_format_drops_leading_zero_units() {
        assert_eq!(format_duration(3723), "1h 2m 3s");
        assert_eq!(format_duration(125), "2m 5s");
        assert_eq!(format_duration(9), "9s");
    }

    #[test]
    fn since_date_counts_back_whole_days() {
        let now = DateTime::parse_from_rfc3339("2026-03-10T08:00:00Z")
            .expect("timestamp")
            .with_timezone(&Utc);
        assert_eq!(since_date(7, now), "2026-03-03");
        assert_eq!(since_date(0, now), "2026-03-10");
    }
}
