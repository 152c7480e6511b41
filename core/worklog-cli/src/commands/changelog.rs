use chrono::Local;
use clap::{Args, Subcommand};
use std::path::PathBuf;

use worklog_core::changelog::{self, ExportFormat};
use worklog_core::{ChangelogEntry, ChangelogFilter, Db, Result, WorklogError};

use super::{print_json, print_rows, truncate, Context, OutputFormat};

#[derive(Subcommand)]
pub enum ChangelogCommand {
    /// Add an entry
    Add(AddArgs),

    /// Query entries, newest first
    Query {
        #[command(flatten)]
        filter: FilterArgs,

        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Export entries as markdown, csv or json
    Export {
        #[command(flatten)]
        filter: FilterArgs,

        #[arg(long, default_value = "markdown")]
        format: String,

        /// Write to a file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Entry counts and the latest entries
    Stats {
        #[arg(long)]
        by_module: bool,

        #[arg(long)]
        by_property: bool,
    },

    /// Registered module names
    ListModules,

    /// Registered property tags
    ListProperties,
}

#[derive(Args)]
pub struct AddArgs {
    /// YYYY-MM-DD, defaults to today
    #[arg(long)]
    date: Option<String>,

    /// HH:MM, defaults to now
    #[arg(long)]
    time: Option<String>,

    /// Release version the change lands in
    #[arg(long = "ver")]
    release: String,

    /// Architecture level, e.g. L0..L3
    #[arg(long)]
    level: String,

    #[arg(long)]
    module: String,

    #[arg(long)]
    property: String,

    #[arg(long)]
    description: String,

    #[arg(long, default_value = "")]
    conclusion: String,

    /// Comma-separated list of touched files
    #[arg(long, value_delimiter = ',')]
    files: Vec<String>,
}

#[derive(Args)]
pub struct FilterArgs {
    #[arg(long)]
    module: Option<String>,

    #[arg(long)]
    property: Option<String>,

    #[arg(long)]
    level: Option<String>,

    #[arg(long = "ver")]
    release: Option<String>,

    /// Inclusive start date, YYYY-MM-DD
    #[arg(long)]
    since: Option<String>,

    /// Inclusive end date, YYYY-MM-DD
    #[arg(long)]
    until: Option<String>,

    #[arg(long)]
    limit: Option<usize>,
}

impl FilterArgs {
    fn is_empty(&self) -> bool {
        self.module.is_none()
            && self.property.is_none()
            && self.level.is_none()
            && self.release.is_none()
            && self.since.is_none()
            && self.until.is_none()
            && self.limit.is_none()
    }

    fn into_filter(self) -> ChangelogFilter {
        ChangelogFilter {
            module: self.module,
            property: self.property,
            level: self.level,
            version: self.release,
            since: self.since,
            until: self.until,
            limit: self.limit,
        }
    }
}

pub fn run(command: ChangelogCommand) -> Result<()> {
    let ctx = Context::load()?;
    let db = ctx.open_db()?;

    match command {
        ChangelogCommand::Add(args) => add(&db, args),
        ChangelogCommand::Query { filter, format } => {
            let entries = db.query_changelog(&filter.into_filter())?;
            print_entries(&entries, format)
        }
        ChangelogCommand::Export {
            filter,
            format,
            output,
        } => {
            let format: ExportFormat = format.parse()?;
            let entries = if filter.is_empty() {
                db.all_changelog()?
            } else {
                db.query_changelog(&filter.into_filter())?
            };
            let rendered = changelog::export(&entries, format)?;
            match output {
                Some(path) => {
                    fs_err::write(&path, rendered)
                        .map_err(|err| WorklogError::io("Failed to write export", err))?;
                    println!("Exported {} entries to {}", entries.len(), path.display());
                }
                None => print!("{rendered}"),
            }
            Ok(())
        }
        ChangelogCommand::Stats {
            by_module,
            by_property,
        } => {
            let stats = db.changelog_stats()?;
            println!("Total entries: {}", stats.total);
            if by_module {
                println!();
                let rows: Vec<Vec<String>> = stats
                    .by_module
                    .iter()
                    .map(|(module, count)| vec![module.clone(), count.to_string()])
                    .collect();
                print_rows(OutputFormat::Table, &["module", "entries"], &rows);
            }
            if by_property {
                println!();
                let rows: Vec<Vec<String>> = stats
                    .by_property
                    .iter()
                    .map(|(property, count)| vec![property.clone(), count.to_string()])
                    .collect();
                print_rows(OutputFormat::Table, &["property", "entries"], &rows);
            }
            if !stats.latest.is_empty() {
                println!();
                println!("Latest:");
                print_entries(&stats.latest, OutputFormat::Table)?;
            }
            Ok(())
        }
        ChangelogCommand::ListModules => {
            let rows: Vec<Vec<String>> = db
                .list_modules()?
                .into_iter()
                .map(|module| {
                    vec![
                        module.category,
                        module.module_name,
                        module.description.unwrap_or_default(),
                    ]
                })
                .collect();
            print_rows(OutputFormat::Table, &["category", "module", "description"], &rows);
            Ok(())
        }
        ChangelogCommand::ListProperties => {
            let rows: Vec<Vec<String>> = db
                .list_properties()?
                .into_iter()
                .map(|property| {
                    vec![
                        property.priority.to_string(),
                        property.property_name,
                        property.color.unwrap_or_default(),
                    ]
                })
                .collect();
            print_rows(OutputFormat::Table, &["priority", "property", "color"], &rows);
            Ok(())
        }
    }
}

fn add(db: &Db, args: AddArgs) -> Result<()> {
    let now = Local::now();
    let entry = ChangelogEntry {
        id: None,
        date: args
            .date
            .unwrap_or_else(|| now.format("%Y-%m-%d").to_string()),
        time: args.time.unwrap_or_else(|| now.format("%H:%M").to_string()),
        version: args.release,
        architecture_level: args.level,
        module: args.module,
        property: args.property,
        description: args.description,
        conclusion: args.conclusion,
        files: args
            .files
            .into_iter()
            .map(|file| file.trim().to_string())
            .filter(|file| !file.is_empty())
            .collect(),
        created_at: None,
    };

    let id = db.insert_changelog(&entry)?;
    tracing::info!(id, module = %entry.module, property = %entry.property, "Changelog entry added");
    println!("Added changelog entry #{id}");
    Ok(())
}

fn print_entries(entries: &[ChangelogEntry], format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        return print_json(entries);
    }
    let rows: Vec<Vec<String>> = entries
        .iter()
        .map(|entry| {
            vec![
                entry.date.clone(),
                entry.time.clone(),
                entry.version.clone(),
                entry.architecture_level.clone(),
                entry.module.clone(),
                entry.property.clone(),
                truncate(&entry.description, 48),
            ]
        })
        .collect();
    print_rows(
        format,
        &["date", "time", "version", "level", "module", "property", "description"],
        &rows,
    );
    Ok(())
}
