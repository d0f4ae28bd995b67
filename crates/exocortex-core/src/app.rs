use crate::config::{ConfigStore, ExoConfig, DEFAULT_TODAY_FORMAT};
use crate::db::Database;
use crate::error::ExoResult;
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, NaiveDate, Utc};
use std::fmt::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const BACKUP_PREFIX: &str = "exocortex-";
const BACKUP_SUFFIX: &str = ".db";
const BACKUP_STAMP: &str = "%Y%m%d%H%M%S";
const BACKUPS_KEPT: usize = 3;

/// Name of the tag that collects notes for `date`, e.g. "January 02 2006".
///
/// A format that cannot render a plain date falls back to the default one.
pub fn today_tag_name(date: NaiveDate, format: &str) -> String {
    let parsable = !format.is_empty()
        && !StrftimeItems::new(format).any(|item| matches!(item, Item::Error));
    let mut name = String::new();
    if parsable && write!(name, "{}", date.format(format)).is_ok() {
        return name;
    }
    date.format(DEFAULT_TODAY_FORMAT).to_string()
}

/// Loads the user config and opens the database it points at.
pub fn open_configured_database() -> ExoResult<(ExoConfig, Database)> {
    let store = ConfigStore::default_store()?;
    let config = store.load()?;
    let db = open_database(&store.database_path(&config), &config)?;
    Ok((config, db))
}

pub fn open_database(db_path: &Path, config: &ExoConfig) -> ExoResult<Database> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let db = Database::open(db_path, config.busy_timeout_ms)?;
    backup_before_migration(db_path, &db)?;
    db.run_migrations()?;
    Ok(db)
}

pub fn backup_before_migration(db_path: &Path, db: &Database) -> ExoResult<Option<PathBuf>> {
    backup_before_migration_at(db_path, db, Utc::now())
}

pub fn backup_before_migration_at(
    db_path: &Path,
    db: &Database,
    now: DateTime<Utc>,
) -> ExoResult<Option<PathBuf>> {
    backup_if_behind(db_path, db, Database::latest_migration_version(), now)
}

/// Copies the database aside when its schema is older than `target_version`.
/// A brand new database has nothing worth keeping and is not copied.
fn backup_if_behind(
    db_path: &Path,
    db: &Database,
    target_version: i64,
    now: DateTime<Utc>,
) -> ExoResult<Option<PathBuf>> {
    let current_version = db.current_schema_version()?;
    if current_version == 0 || current_version >= target_version {
        return Ok(None);
    }
    let backup_path = write_backup(db_path, db, now)?;
    info!(
        path = %backup_path.display(),
        from = current_version,
        to = target_version,
        "backed up database before migration"
    );
    Ok(Some(backup_path))
}

pub fn write_backup(db_path: &Path, db: &Database, now: DateTime<Utc>) -> ExoResult<PathBuf> {
    let backup_dir = backup_dir_for(db_path);
    std::fs::create_dir_all(&backup_dir)?;
    db.checkpoint()?;
    let backup_path = backup_dir.join(backup_file_name(now));
    std::fs::copy(db_path, &backup_path)?;

    if let Err(err) = rotate_backups(&backup_dir, BACKUPS_KEPT) {
        warn!(error = %err, "could not rotate old backups");
    }
    Ok(backup_path)
}

pub fn backup_dir_for(db_path: &Path) -> PathBuf {
    db_path
        .parent()
        .map(|parent| parent.join("backups"))
        .unwrap_or_else(|| PathBuf::from("backups"))
}

fn backup_file_name(now: DateTime<Utc>) -> String {
    format!("{BACKUP_PREFIX}{}{BACKUP_SUFFIX}", now.format(BACKUP_STAMP))
}

/// Only names `backup_file_name` could have produced; anything else in the
/// directory is left alone.
fn is_backup_file_name(name: &str) -> bool {
    name.strip_prefix(BACKUP_PREFIX)
        .and_then(|rest| rest.strip_suffix(BACKUP_SUFFIX))
        .is_some_and(|stamp| stamp.len() == 14 && stamp.bytes().all(|b| b.is_ascii_digit()))
}

/// Deletes all but the `keep` newest backups in `backup_dir`.
pub fn rotate_backups(backup_dir: &Path, keep: usize) -> ExoResult<()> {
    let mut names: Vec<String> = std::fs::read_dir(backup_dir)?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| is_backup_file_name(name))
        .collect();
    // Fixed-width stamps sort oldest first.
    names.sort_unstable();

    let stale = names.len().saturating_sub(keep);
    for name in &names[..stale] {
        std::fs::remove_file(backup_dir.join(name))?;
        debug!(name = %name, "removed old backup");
    }
    Ok(())
}
