//! SQLite persistence for worklog.
//!
//! Single-writer store holding recorded sessions, the changelog and the two
//! registries the changelog CLI lists. A connection is opened per operation;
//! the schema is created on first use.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{ffi, params, Connection, ErrorCode, OpenFlags, OptionalExtension, Row};
use std::path::{Path, PathBuf};

use crate::changelog::{
    ChangelogEntry, ChangelogFilter, ChangelogStats, ModuleRegistration, PropertyRegistration,
    DEFAULT_PROPERTIES, DEFAULT_QUERY_LIMIT, LATEST_ENTRIES,
};
use crate::classifier::builtin_rules;
use crate::error::{Result, WorklogError};
use crate::query::{DailySummary, ModuleTotals, SessionSummary, SessionTotals};
use crate::writer::PersistedSession;

pub struct Db {
    path: PathBuf,
}

impl Db {
    /// Opens the store, creating the file and schema when needed.
    pub fn new(path: PathBuf) -> Result<Self> {
        let db = Self { path };
        db.init_schema()?;
        Ok(db)
    }

    /// Deletes the store (and its WAL side files) and recreates it empty.
    pub fn reset(path: PathBuf) -> Result<Self> {
        for suffix in ["", "-wal", "-shm"] {
            let file = PathBuf::from(format!("{}{suffix}", path.display()));
            match fs_err::remove_file(&file) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(WorklogError::io("Failed to remove database", err)),
            }
        }
        Self::new(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Work Sessions
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn insert_work_session(&self, record: &PersistedSession) -> Result<()> {
        let file_details = serde_json::to_string(&record.file_details)
            .map_err(|err| WorklogError::json("Failed to serialize file details", err))?;
        let modules_touched = serde_json::to_string(&record.modules_touched)
            .map_err(|err| WorklogError::json("Failed to serialize modules", err))?;
        let recorded_at = record.recorded_at.unwrap_or_else(Utc::now);

        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO work_sessions (\
                    session_id, repo_path, start_time, end_time, duration_seconds, \
                    work_summary, problems, solutions, chat_summary, next_steps, \
                    files_changed, lines_added, lines_deleted, file_details, \
                    primary_module, modules_touched, recorded_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
                params![
                    record.session_id,
                    record.repo_path,
                    format_timestamp(record.start_time),
                    format_timestamp(record.end_time),
                    record.duration_seconds,
                    record.work_summary,
                    record.problems,
                    record.solutions,
                    record.chat_summary,
                    record.next_steps,
                    record.files_changed,
                    record.lines_added,
                    record.lines_deleted,
                    file_details,
                    record.primary_module,
                    modules_touched,
                    format_timestamp(recorded_at),
                ],
            )
            .map_err(|err| {
                if is_constraint_violation(&err) {
                    WorklogError::AlreadyRecorded {
                        session_id: record.session_id.clone(),
                    }
                } else {
                    WorklogError::database("Failed to insert work session", err)
                }
            })?;
            Ok(())
        })
    }

    pub fn get_work_session(&self, session_id: &str) -> Result<Option<PersistedSession>> {
        self.with_connection(|conn| {
            let raw = conn
                .query_row(
                    "SELECT session_id, repo_path, start_time, end_time, duration_seconds, \
                        work_summary, problems, solutions, chat_summary, next_steps, \
                        files_changed, lines_added, lines_deleted, file_details, \
                        primary_module, modules_touched, recorded_at \
                     FROM work_sessions WHERE session_id = ?1",
                    params![session_id],
                    RawSessionRow::from_row,
                )
                .optional()
                .map_err(|err| WorklogError::database("Failed to query work session", err))?;
            raw.map(RawSessionRow::into_record).transpose()
        })
    }

    pub fn count_work_sessions(&self) -> Result<i64> {
        self.with_connection(|conn| {
            conn.query_row("SELECT COUNT(*) FROM work_sessions", [], |row| row.get(0))
                .map_err(|err| WorklogError::database("Failed to count work sessions", err))
        })
    }

    /// Sessions started on or after `since_date` (`YYYY-MM-DD`), newest first.
    pub fn sessions_since(&self, since_date: &str) -> Result<Vec<SessionSummary>> {
        self.query_summaries(
            "WHERE substr(start_time, 1, 10) >= ?1 ORDER BY start_time DESC",
            params![since_date],
        )
    }

    /// Sessions whose touched modules include `module` exactly.
    pub fn sessions_by_module(&self, module: &str, limit: usize) -> Result<Vec<SessionSummary>> {
        let needle = contains_pattern(&serde_json::Value::String(module.to_string()).to_string());
        self.query_summaries(
            "WHERE modules_touched LIKE ?1 ESCAPE '\\' ORDER BY start_time DESC LIMIT ?2",
            params![needle, limit as i64],
        )
    }

    pub fn search_sessions(&self, keyword: &str, limit: usize) -> Result<Vec<SessionSummary>> {
        let needle = contains_pattern(keyword);
        self.query_summaries(
            "WHERE work_summary LIKE ?1 ESCAPE '\\' OR problems LIKE ?1 ESCAPE '\\' \
                OR solutions LIKE ?1 ESCAPE '\\' OR next_steps LIKE ?1 ESCAPE '\\' \
             ORDER BY start_time DESC LIMIT ?2",
            params![needle, limit as i64],
        )
    }

    pub fn session_totals(&self) -> Result<SessionTotals> {
        self.with_connection(|conn| {
            let mut totals = conn
                .query_row(
                    "SELECT COUNT(*), COALESCE(SUM(duration_seconds), 0), \
                        COALESCE(SUM(files_changed), 0), COALESCE(SUM(lines_added), 0), \
                        COALESCE(SUM(lines_deleted), 0), \
                        MIN(substr(start_time, 1, 10)), MAX(substr(start_time, 1, 10)) \
                     FROM work_sessions",
                    [],
                    |row| {
                        Ok(SessionTotals {
                            total_sessions: row.get(0)?,
                            total_seconds: row.get(1)?,
                            total_files: row.get(2)?,
                            total_added: row.get(3)?,
                            total_deleted: row.get(4)?,
                            first_session: row.get(5)?,
                            last_session: row.get(6)?,
                            by_module: Vec::new(),
                        })
                    },
                )
                .map_err(|err| WorklogError::database("Failed to total work sessions", err))?;

            let mut stmt = conn
                .prepare(
                    "SELECT COALESCE(primary_module, 'uncategorized') AS module, COUNT(*), \
                        COALESCE(SUM(lines_added), 0), COALESCE(SUM(lines_deleted), 0) \
                     FROM work_sessions GROUP BY module ORDER BY COUNT(*) DESC, module ASC",
                )
                .map_err(|err| WorklogError::database("Failed to prepare module totals", err))?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(ModuleTotals {
                        module: row.get(0)?,
                        sessions: row.get(1)?,
                        lines_added: row.get(2)?,
                        lines_deleted: row.get(3)?,
                    })
                })
                .map_err(|err| WorklogError::database("Failed to read module totals", err))?;
            for row in rows {
                totals.by_module.push(
                    row.map_err(|err| WorklogError::database("Failed to decode module totals", err))?,
                );
            }
            Ok(totals)
        })
    }

    pub fn daily_summary(&self, since_date: &str) -> Result<Vec<DailySummary>> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT substr(start_time, 1, 10) AS day, COUNT(*), \
                        COALESCE(SUM(duration_seconds), 0), COALESCE(SUM(files_changed), 0), \
                        COALESCE(SUM(lines_added), 0), GROUP_CONCAT(DISTINCT primary_module) \
                     FROM work_sessions WHERE substr(start_time, 1, 10) >= ?1 \
                     GROUP BY day ORDER BY day DESC",
                )
                .map_err(|err| WorklogError::database("Failed to prepare daily summary", err))?;
            let rows = stmt
                .query_map(params![since_date], |row| {
                    let modules: Option<String> = row.get(5)?;
                    Ok(DailySummary {
                        date: row.get(0)?,
                        sessions: row.get(1)?,
                        seconds: row.get(2)?,
                        files_changed: row.get(3)?,
                        lines_added: row.get(4)?,
                        modules: modules
                            .map(|joined| joined.split(',').map(str::to_string).collect())
                            .unwrap_or_default(),
                    })
                })
                .map_err(|err| WorklogError::database("Failed to read daily summary", err))?;

            let mut days = Vec::new();
            for row in rows {
                days.push(
                    row.map_err(|err| WorklogError::database("Failed to decode daily row", err))?,
                );
            }
            Ok(days)
        })
    }

    fn query_summaries(
        &self,
        clause: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<SessionSummary>> {
        let sql = format!(
            "SELECT session_id, substr(start_time, 1, 10), start_time, duration_seconds, \
                work_summary, primary_module, files_changed, lines_added, lines_deleted \
             FROM work_sessions {clause}"
        );
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|err| WorklogError::database("Failed to prepare session query", err))?;
            let rows = stmt
                .query_map(params, |row| {
                    Ok(SessionSummary {
                        session_id: row.get(0)?,
                        date: row.get(1)?,
                        start_time: row.get(2)?,
                        duration_seconds: row.get(3)?,
                        work_summary: row.get(4)?,
                        primary_module: row.get(5)?,
                        files_changed: row.get(6)?,
                        lines_added: row.get(7)?,
                        lines_deleted: row.get(8)?,
                    })
                })
                .map_err(|err| WorklogError::database("Failed to read session rows", err))?;

            let mut summaries = Vec::new();
            for row in rows {
                summaries.push(
                    row.map_err(|err| WorklogError::database("Failed to decode session row", err))?,
                );
            }
            Ok(summaries)
        })
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Changelog
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn insert_changelog(&self, entry: &ChangelogEntry) -> Result<i64> {
        entry.validate()?;
        let files = serde_json::to_string(&entry.files)
            .map_err(|err| WorklogError::json("Failed to serialize changelog files", err))?;

        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO changelog (date, time, version, architecture_level, module, \
                    property, description, conclusion, files, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    entry.date,
                    entry.time,
                    entry.version,
                    entry.architecture_level,
                    entry.module,
                    entry.property,
                    entry.description,
                    entry.conclusion,
                    files,
                    format_timestamp(Utc::now()),
                ],
            )
            .map_err(|err| {
                if is_constraint_violation(&err) {
                    WorklogError::DuplicateEntry(entry.key())
                } else {
                    WorklogError::database("Failed to insert changelog entry", err)
                }
            })?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn query_changelog(&self, filter: &ChangelogFilter) -> Result<Vec<ChangelogEntry>> {
        let mut clauses = Vec::new();
        let mut values: Vec<String> = Vec::new();
        let columns = [
            ("module = ?", &filter.module),
            ("property = ?", &filter.property),
            ("architecture_level = ?", &filter.level),
            ("version = ?", &filter.version),
            ("date >= ?", &filter.since),
            ("date <= ?", &filter.until),
        ];
        for (clause, value) in columns {
            if let Some(value) = value {
                clauses.push(clause);
                values.push(value.clone());
            }
        }

        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let limit = filter.limit.unwrap_or(DEFAULT_QUERY_LIMIT) as i64;
        let sql = format!(
            "SELECT {CHANGELOG_COLUMNS} FROM changelog {where_clause} \
             ORDER BY date DESC, time DESC, id DESC LIMIT {limit}"
        );
        self.select_changelog(&sql, rusqlite::params_from_iter(values))
    }

    pub fn all_changelog(&self) -> Result<Vec<ChangelogEntry>> {
        let sql =
            format!("SELECT {CHANGELOG_COLUMNS} FROM changelog ORDER BY date DESC, time DESC, id DESC");
        self.select_changelog(&sql, [])
    }

    pub fn changelog_stats(&self) -> Result<ChangelogStats> {
        let (total, by_module, by_property) = self.with_connection(|conn| {
            let total: i64 = conn
                .query_row("SELECT COUNT(*) FROM changelog", [], |row| row.get(0))
                .map_err(|err| WorklogError::database("Failed to count changelog", err))?;
            let by_module = grouped_counts(conn, "module")?;
            let by_property = grouped_counts(conn, "property")?;
            Ok((total, by_module, by_property))
        })?;

        let latest = self.query_changelog(&ChangelogFilter {
            limit: Some(LATEST_ENTRIES),
            ..Default::default()
        })?;

        Ok(ChangelogStats {
            total,
            by_module,
            by_property,
            latest,
        })
    }

    pub fn list_modules(&self) -> Result<Vec<ModuleRegistration>> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT category, module_name, description FROM module_registry \
                     ORDER BY category, module_name",
                )
                .map_err(|err| WorklogError::database("Failed to prepare module registry", err))?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(ModuleRegistration {
                        category: row.get(0)?,
                        module_name: row.get(1)?,
                        description: row.get(2)?,
                    })
                })
                .map_err(|err| WorklogError::database("Failed to read module registry", err))?;
            let mut modules = Vec::new();
            for row in rows {
                modules.push(
                    row.map_err(|err| WorklogError::database("Failed to decode module row", err))?,
                );
            }
            Ok(modules)
        })
    }

    pub fn list_properties(&self) -> Result<Vec<PropertyRegistration>> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT property_name, color, priority FROM property_registry \
                     ORDER BY priority, property_name",
                )
                .map_err(|err| WorklogError::database("Failed to prepare property registry", err))?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(PropertyRegistration {
                        property_name: row.get(0)?,
                        color: row.get(1)?,
                        priority: row.get(2)?,
                    })
                })
                .map_err(|err| WorklogError::database("Failed to read property registry", err))?;
            let mut properties = Vec::new();
            for row in rows {
                properties.push(
                    row.map_err(|err| WorklogError::database("Failed to decode property row", err))?,
                );
            }
            Ok(properties)
        })
    }

    fn select_changelog(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<ChangelogEntry>> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare(sql)
                .map_err(|err| WorklogError::database("Failed to prepare changelog query", err))?;
            let rows = stmt
                .query_map(params, |row| {
                    Ok((
                        ChangelogEntry {
                            id: row.get(0)?,
                            date: row.get(1)?,
                            time: row.get(2)?,
                            version: row.get(3)?,
                            architecture_level: row.get(4)?,
                            module: row.get(5)?,
                            property: row.get(6)?,
                            description: row.get(7)?,
                            conclusion: row.get(8)?,
                            files: Vec::new(),
                            created_at: row.get(10)?,
                        },
                        row.get::<_, String>(9)?,
                    ))
                })
                .map_err(|err| WorklogError::database("Failed to read changelog rows", err))?;

            let mut entries = Vec::new();
            for row in rows {
                let (mut entry, files) = row
                    .map_err(|err| WorklogError::database("Failed to decode changelog row", err))?;
                entry.files = serde_json::from_str(&files)
                    .map_err(|err| WorklogError::json("Failed to parse changelog files", err))?;
                entries.push(entry);
            }
            Ok(entries)
        })
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Schema
    // ─────────────────────────────────────────────────────────────────────────────

    fn init_schema(&self) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute_batch(
                "BEGIN;
                 CREATE TABLE IF NOT EXISTS work_sessions (
                    session_id TEXT PRIMARY KEY,
                    repo_path TEXT NOT NULL DEFAULT '',
                    start_time TEXT NOT NULL,
                    end_time TEXT NOT NULL,
                    duration_seconds INTEGER NOT NULL DEFAULT 0,
                    work_summary TEXT,
                    problems TEXT,
                    solutions TEXT,
                    chat_summary TEXT,
                    next_steps TEXT,
                    files_changed INTEGER NOT NULL DEFAULT 0,
                    lines_added INTEGER NOT NULL DEFAULT 0,
                    lines_deleted INTEGER NOT NULL DEFAULT 0,
                    file_details TEXT NOT NULL DEFAULT '[]',
                    primary_module TEXT,
                    modules_touched TEXT NOT NULL DEFAULT '[]',
                    recorded_at TEXT NOT NULL
                 );
                 CREATE INDEX IF NOT EXISTS idx_work_sessions_start
                    ON work_sessions(start_time);
                 CREATE TABLE IF NOT EXISTS changelog (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    date TEXT NOT NULL,
                    time TEXT NOT NULL,
                    version TEXT NOT NULL,
                    architecture_level TEXT NOT NULL,
                    module TEXT NOT NULL,
                    property TEXT NOT NULL,
                    description TEXT NOT NULL,
                    conclusion TEXT NOT NULL,
                    files TEXT NOT NULL DEFAULT '[]',
                    created_at TEXT,
                    UNIQUE(date, time, module, description)
                 );
                 CREATE INDEX IF NOT EXISTS idx_changelog_date
                    ON changelog(date, time);
                 CREATE TABLE IF NOT EXISTS module_registry (
                    module_name TEXT PRIMARY KEY,
                    category TEXT NOT NULL,
                    description TEXT
                 );
                 CREATE TABLE IF NOT EXISTS property_registry (
                    property_name TEXT PRIMARY KEY,
                    color TEXT,
                    priority INTEGER NOT NULL DEFAULT 100
                 );
                 COMMIT;",
            )
            .map_err(|err| WorklogError::database("Failed to initialize schema", err))?;
            ensure_work_session_columns(conn)?;
            seed_registries(conn)?;
            Ok(())
        })
    }

    fn with_connection<T>(&self, op: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut conn = self.open()?;
        op(&mut conn)
    }

    fn open(&self) -> Result<Connection> {
        if let Some(parent) = self.path.parent() {
            fs_err::create_dir_all(parent)
                .map_err(|err| WorklogError::io("Failed to create worklog data dir", err))?;
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;

        let conn = Connection::open_with_flags(&self.path, flags)
            .map_err(|err| WorklogError::database("Failed to open sqlite db", err))?;

        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|err| WorklogError::database("Failed to enable WAL", err))?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(|err| WorklogError::database("Failed to set synchronous", err))?;
        conn.pragma_update(None, "busy_timeout", 5000)
            .map_err(|err| WorklogError::database("Failed to set busy_timeout", err))?;

        Ok(conn)
    }
}

const CHANGELOG_COLUMNS: &str = "id, date, time, version, architecture_level, module, property, \
     description, conclusion, files, created_at";

/// Columns added after the first release; older stores gain them in place.
fn ensure_work_session_columns(conn: &Connection) -> Result<()> {
    let mut stmt = conn
        .prepare("PRAGMA table_info(work_sessions)")
        .map_err(|err| WorklogError::database("Failed to read work_sessions schema", err))?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .map_err(|err| WorklogError::database("Failed to read work_sessions schema rows", err))?;

    let mut columns = Vec::new();
    for row in rows {
        columns.push(row.map_err(|err| WorklogError::database("Failed to decode schema row", err))?);
    }

    if !columns.iter().any(|name| name == "repo_path") {
        conn.execute(
            "ALTER TABLE work_sessions ADD COLUMN repo_path TEXT NOT NULL DEFAULT ''",
            [],
        )
        .map_err(|err| WorklogError::database("Failed to add repo_path column", err))?;
    }

    if !columns.iter().any(|name| name == "recorded_at") {
        conn.execute("ALTER TABLE work_sessions ADD COLUMN recorded_at TEXT", [])
            .map_err(|err| WorklogError::database("Failed to add recorded_at column", err))?;
    }

    Ok(())
}

fn seed_registries(conn: &Connection) -> Result<()> {
    for (pattern, module) in builtin_rules() {
        let category = match pattern.split('/').next() {
            Some("aoem") => "aoem",
            Some("src") => "core",
            Some("plugins") => "plugins",
            _ => "repository",
        };
        conn.execute(
            "INSERT OR IGNORE INTO module_registry (module_name, category, description) \
             VALUES (?1, ?2, ?3)",
            params![module, category, format!("Paths matching {pattern}")],
        )
        .map_err(|err| WorklogError::database("Failed to seed module registry", err))?;
    }

    for (name, color, priority) in DEFAULT_PROPERTIES {
        conn.execute(
            "INSERT OR IGNORE INTO property_registry (property_name, color, priority) \
             VALUES (?1, ?2, ?3)",
            params![name, color, priority],
        )
        .map_err(|err| WorklogError::database("Failed to seed property registry", err))?;
    }
    Ok(())
}

fn grouped_counts(conn: &Connection, column: &str) -> Result<Vec<(String, i64)>> {
    let sql = format!(
        "SELECT {column}, COUNT(*) FROM changelog GROUP BY {column} ORDER BY COUNT(*) DESC, {column} ASC"
    );
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|err| WorklogError::database("Failed to prepare changelog counts", err))?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
        .map_err(|err| WorklogError::database("Failed to read changelog counts", err))?;
    let mut counts = Vec::new();
    for row in rows {
        counts.push(row.map_err(|err| WorklogError::database("Failed to decode count row", err))?);
    }
    Ok(counts)
}

/// `LIKE` pattern matching `needle` literally anywhere; pair with `ESCAPE '\'`.
fn contains_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for ch in needle.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

/// Primary key or unique-index collisions only; NOT NULL and CHECK failures
/// stay database errors.
fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(inner, _)
            if inner.code == ErrorCode::ConstraintViolation
                && matches!(
                    inner.extended_code,
                    ffi::SQLITE_CONSTRAINT_PRIMARYKEY | ffi::SQLITE_CONSTRAINT_UNIQUE
                )
    )
}

fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_rfc3339(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| WorklogError::InvalidInput(format!("Bad timestamp {value:?}: {err}")))
}

struct RawSessionRow {
    session_id: String,
    repo_path: String,
    start_time: String,
    end_time: String,
    duration_seconds: i64,
    work_summary: Option<String>,
    problems: Option<String>,
    solutions: Option<String>,
    chat_summary: Option<String>,
    next_steps: Option<String>,
    files_changed: i64,
    lines_added: i64,
    lines_deleted: i64,
    file_details: String,
    primary_module: Option<String>,
    modules_touched: String,
    recorded_at: Option<String>,
}

impl RawSessionRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            session_id: row.get(0)?,
            repo_path: row.get(1)?,
            start_time: row.get(2)?,
            end_time: row.get(3)?,
            duration_seconds: row.get(4)?,
            work_summary: row.get(5)?,
            problems: row.get(6)?,
            solutions: row.get(7)?,
            chat_summary: row.get(8)?,
            next_steps: row.get(9)?,
            files_changed: row.get(10)?,
            lines_added: row.get(11)?,
            lines_deleted: row.get(12)?,
            file_details: row.get(13)?,
            primary_module: row.get(14)?,
            modules_touched: row.get(15)?,
            recorded_at: row.get(16)?,
        })
    }

    fn into_record(self) -> Result<PersistedSession> {
        Ok(PersistedSession {
            start_time: parse_rfc3339(&self.start_time)?,
            end_time: parse_rfc3339(&self.end_time)?,
            recorded_at: self.recorded_at.as_deref().map(parse_rfc3339).transpose()?,
            file_details: serde_json::from_str(&self.file_details)
                .map_err(|err| WorklogError::json("Failed to parse file details", err))?,
            modules_touched: serde_json::from_str(&self.modules_touched)
                .map_err(|err| WorklogError::json("Failed to parse modules", err))?,
            session_id: self.session_id,
            repo_path: self.repo_path,
            duration_seconds: self.duration_seconds,
            work_summary: self.work_summary,
            problems: self.problems,
            solutions: self.solutions,
            chat_summary: self.chat_summary,
            next_steps: self.next_steps,
            files_changed: self.files_changed,
            lines_added: self.lines_added,
            lines_deleted: self.lines_deleted,
            primary_module: self.primary_module,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimator::Magnitude;
    use crate::session::ChangeType;
    use crate::writer::FileDetail;

    fn db(temp: &tempfile::TempDir) -> Db {
        Db::new(temp.path().join("worklog.db")).expect("db init")
    }

    fn record(session_id: &str, start: &str, primary: &str) -> PersistedSession {
        let start_time = parse_rfc3339(start).expect("start");
        PersistedSession {
            session_id: session_id.to_string(),
            repo_path: "/work/repo".to_string(),
            start_time,
            end_time: start_time + chrono::Duration::minutes(30),
            duration_seconds: 1800,
            work_summary: Some(format!("Worked on {primary}")),
            problems: None,
            solutions: Some("Added GPU fallback".to_string()),
            chat_summary: None,
            next_steps: None,
            files_changed: 1,
            lines_added: 12,
            lines_deleted: 3,
            file_details: vec![FileDetail {
                file: format!("{primary}/lib.rs"),
                module: primary.to_string(),
                language: "Rust".to_string(),
                lines_added: 12,
                lines_deleted: 3,
                change_type: ChangeType::Modified,
                magnitude: Magnitude::Medium,
            }],
            primary_module: Some(primary.to_string()),
            modules_touched: vec![primary.to_string()],
            recorded_at: Some(start_time + chrono::Duration::minutes(31)),
        }
    }

    fn entry(date: &str, time: &str, module: &str, property: &str) -> ChangelogEntry {
        ChangelogEntry {
            id: None,
            date: date.to_string(),
            time: time.to_string(),
            version: "0.5.0".to_string(),
            architecture_level: "L1".to_string(),
            module: module.to_string(),
            property: property.to_string(),
            description: format!("{module} change at {time}"),
            conclusion: "ok".to_string(),
            files: vec!["src/lib.rs".to_string()],
            created_at: None,
        }
    }

    #[test]
    fn schema_includes_all_tables() {
        let temp = tempfile::tempdir().expect("temp dir");
        let db = db(&temp);
        let tables = db
            .with_connection(|conn| {
                let mut stmt = conn
                    .prepare("SELECT name FROM sqlite_master WHERE type = 'table'")
                    .map_err(|err| WorklogError::database("query", err))?;
                let rows = stmt
                    .query_map([], |row| row.get::<_, String>(0))
                    .map_err(|err| WorklogError::database("rows", err))?;
                let mut names = Vec::new();
                for row in rows {
                    names.push(row.map_err(|err| WorklogError::database("row", err))?);
                }
                Ok(names)
            })
            .expect("tables");

        for table in ["work_sessions", "changelog", "module_registry", "property_registry"] {
            assert!(tables.contains(&table.to_string()), "missing {table}");
        }
    }

    #[test]
    fn reopening_does_not_duplicate_registry_rows() {
        let temp = tempfile::tempdir().expect("temp dir");
        let first = db(&temp).list_modules().expect("modules").len();
        let second = db(&temp).list_modules().expect("modules").len();
        assert_eq!(first, second);
        assert_eq!(first, builtin_rules().len());
        assert_eq!(
            db(&temp).list_properties().expect("properties").len(),
            DEFAULT_PROPERTIES.len()
        );
    }

    #[test]
    fn duplicate_session_insert_is_already_recorded() {
        let temp = tempfile::tempdir().expect("temp dir");
        let db = db(&temp);
        let original = record("s1", "2026-03-01T09:00:00Z", "aoem-core");
        db.insert_work_session(&original).expect("first insert");

        let mut altered = original.clone();
        altered.work_summary = Some("overwritten".to_string());
        let err = db.insert_work_session(&altered).expect_err("duplicate");
        assert!(matches!(err, WorklogError::AlreadyRecorded { .. }));

        let stored = db.get_work_session("s1").expect("get").expect("row");
        assert_eq!(stored, original);
    }

    #[test]
    fn session_queries_filter_and_order() {
        let temp = tempfile::tempdir().expect("temp dir");
        let db = db(&temp);
        db.insert_work_session(&record("old", "2026-02-01T09:00:00Z", "docs"))
            .expect("old");
        db.insert_work_session(&record("new", "2026-03-02T09:00:00Z", "aoem-core"))
            .expect("new");
        db.insert_work_session(&record("newer", "2026-03-03T09:00:00Z", "aoem-core-extra"))
            .expect("newer");

        let recent: Vec<_> = db
            .sessions_since("2026-03-01")
            .expect("recent")
            .into_iter()
            .map(|row| row.session_id)
            .collect();
        assert_eq!(recent, vec!["newer", "new"]);

        let by_module = db.sessions_by_module("aoem-core", 10).expect("module");
        assert_eq!(by_module.len(), 1);
        assert_eq!(by_module[0].session_id, "new");
        assert!(db.sessions_by_module("aoem_core", 10).expect("underscore").is_empty());
        assert!(db.sessions_by_module("%", 10).expect("percent").is_empty());

        let found = db.search_sessions("GPU", 10).expect("search");
        assert_eq!(found.len(), 3);

        let totals = db.session_totals().expect("totals");
        assert_eq!(totals.total_sessions, 3);
        assert_eq!(totals.total_seconds, 5400);
        assert_eq!(totals.first_session.as_deref(), Some("2026-02-01"));
        assert_eq!(totals.by_module.len(), 3);

        let daily = db.daily_summary("2026-03-01").expect("daily");
        assert_eq!(daily.len(), 2);
        assert_eq!(daily[0].date, "2026-03-03");
        assert_eq!(daily[0].modules, vec!["aoem-core-extra".to_string()]);
    }

    #[test]
    fn changelog_insert_query_and_duplicates() {
        let temp = tempfile::tempdir().expect("temp dir");
        let db = db(&temp);
        db.insert_changelog(&entry("2026-02-06", "14:30", "aoem-core", "test"))
            .expect("a");
        db.insert_changelog(&entry("2026-02-07", "09:00", "docs", "docs"))
            .expect("b");
        db.insert_changelog(&entry("2026-02-07", "10:15", "aoem-core", "fix"))
            .expect("c");

        let err = db
            .insert_changelog(&entry("2026-02-06", "14:30", "aoem-core", "test"))
            .expect_err("duplicate");
        assert!(matches!(err, WorklogError::DuplicateEntry(_)));

        let all = db.query_changelog(&ChangelogFilter::default()).expect("all");
        let times: Vec<_> = all.iter().map(|e| e.time.as_str()).collect();
        assert_eq!(times, vec!["10:15", "09:00", "14:30"]);
        assert_eq!(all[0].files, vec!["src/lib.rs".to_string()]);

        let filtered = db
            .query_changelog(&ChangelogFilter {
                module: Some("aoem-core".to_string()),
                since: Some("2026-02-07".to_string()),
                ..Default::default()
            })
            .expect("filtered");
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].property, "fix");

        let stats = db.changelog_stats().expect("stats");
        assert_eq!(stats.total, 3);
        assert_eq!(stats.by_module[0], ("aoem-core".to_string(), 2));
        assert_eq!(stats.latest.len(), 3);
    }

    #[test]
    fn search_treats_wildcards_literally() {
        let temp = tempfile::tempdir().expect("temp dir");
        let db = db(&temp);
        let mut percent = record("pct", "2026-03-01T09:00:00Z", "aoem-core");
        percent.work_summary = Some("Cut latency by 40%".to_string());
        db.insert_work_session(&percent).expect("pct");
        db.insert_work_session(&record("plain", "2026-03-02T09:00:00Z", "docs"))
            .expect("plain");

        let found = db.search_sessions("40%", 10).expect("percent");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].session_id, "pct");
        assert!(db.search_sessions("_", 10).expect("underscore").is_empty());
        assert_eq!(contains_pattern(r"a_b%c\d"), r"%a\_b\%c\\d%");
    }

    #[test]
    fn only_key_collisions_count_as_duplicates() {
        let conn = Connection::open_in_memory().expect("memory db");
        conn.execute_batch(
            "CREATE TABLE t (id TEXT PRIMARY KEY, name TEXT NOT NULL UNIQUE, \
                n INTEGER CHECK (n >= 0));
             INSERT INTO t VALUES ('a', 'x', 1);",
        )
        .expect("schema");

        let pk = conn
            .execute("INSERT INTO t VALUES ('a', 'y', 1)", [])
            .expect_err("pk");
        assert!(is_constraint_violation(&pk));
        let unique = conn
            .execute("INSERT INTO t VALUES ('b', 'x', 1)", [])
            .expect_err("unique");
        assert!(is_constraint_violation(&unique));
        let not_null = conn
            .execute("INSERT INTO t VALUES ('c', NULL, 1)", [])
            .expect_err("not null");
        assert!(!is_constraint_violation(&not_null));
        let check = conn
            .execute("INSERT INTO t VALUES ('d', 'z', -1)", [])
            .expect_err("check");
        assert!(!is_constraint_violation(&check));
    }

    #[test]
    fn reset_clears_rows() {
        let temp = tempfile::tempdir().expect("temp dir");
        let path = temp.path().join("worklog.db");
        let db = Db::new(path.clone()).expect("db");
        db.insert_work_session(&record("s1", "2026-03-01T09:00:00Z", "docs"))
            .expect("insert");

        let db = Db::reset(path).expect("reset");
        assert_eq!(db.count_work_sessions().expect("count"), 0);
    }
}
