mod refs;
mod rows;
mod tags;
mod unit_of_work;

pub use refs::{BacklinkGroup, Backlinks};
pub use rows::Row;
pub use tags::Tag;
pub use unit_of_work::UnitOfWork;

use crate::error::ExoResult;
use crate::state::Snapshot;
use chrono::Utc;
use rusqlite::{params, Connection};
use std::cell::Cell;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

pub struct Database {
    conn: Connection,
    clock: Clock,
}

pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub up: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "init",
    up: "CREATE TABLE IF NOT EXISTS tag (
            id INTEGER PRIMARY KEY,
            name TEXT UNIQUE NOT NULL,
            updated_ts INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS row (
            id INTEGER PRIMARY KEY,
            tag_id INTEGER NOT NULL,
            rank INTEGER NOT NULL,
            text TEXT NOT NULL,
            parent_row_id INTEGER,
            updated_ts INTEGER NOT NULL,
            FOREIGN KEY (tag_id) REFERENCES tag(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS ref (
            tag_id INTEGER NOT NULL,
            row_id INTEGER NOT NULL,
            PRIMARY KEY (tag_id, row_id),
            FOREIGN KEY (tag_id) REFERENCES tag(id) ON DELETE CASCADE,
            FOREIGN KEY (row_id) REFERENCES row(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS tag_updated
          ON tag(updated_ts);
        CREATE INDEX IF NOT EXISTS row_tag_rank
          ON row(tag_id, rank);
        CREATE INDEX IF NOT EXISTS row_parent
          ON row(parent_row_id);
        CREATE INDEX IF NOT EXISTS ref_row
          ON ref(row_id);",
}];

/// Issues strictly increasing Unix-nanosecond timestamps so recency order is total.
pub(crate) struct Clock {
    last: Cell<i64>,
}

impl Clock {
    fn new() -> Self {
        Self { last: Cell::new(0) }
    }

    pub(crate) fn next(&self) -> i64 {
        let now = Utc::now().timestamp_nanos_opt().unwrap_or(0);
        let next = now.max(self.last.get() + 1);
        self.last.set(next);
        next
    }
}

impl Database {
    pub fn open(path: &Path, busy_timeout_ms: u32) -> rusqlite::Result<Self> {
        let conn = Connection::open(path)?;
        Self::configure(conn, busy_timeout_ms)
    }

    pub fn new_in_memory() -> rusqlite::Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure(conn, crate::config::DEFAULT_BUSY_TIMEOUT_MS)
    }

    fn configure(conn: Connection, busy_timeout_ms: u32) -> rusqlite::Result<Self> {
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA temp_store = MEMORY;",
        )?;
        conn.busy_timeout(Duration::from_millis(u64::from(busy_timeout_ms)))?;
        Ok(Self {
            conn,
            clock: Clock::new(),
        })
    }

    pub fn latest_migration_version() -> i64 {
        MIGRATIONS.iter().map(|m| m.version).max().unwrap_or(0)
    }

    pub fn current_schema_version(&self) -> rusqlite::Result<i64> {
        let has_table: bool = self.conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'schema_migrations'
             )",
            [],
            |row| row.get(0),
        )?;
        if !has_table {
            return Ok(0);
        }
        self.conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
    }

    pub fn run_migrations(&self) -> rusqlite::Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TEXT DEFAULT CURRENT_TIMESTAMP
            );",
        )?;

        let current_version = self.current_schema_version()?;

        for migration in MIGRATIONS {
            if migration.version > current_version {
                let tx = self.conn.unchecked_transaction()?;
                tx.execute_batch(migration.up)?;
                tx.execute(
                    "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
                    params![migration.version, migration.name],
                )?;
                tx.commit()?;
                info!(version = migration.version, name = migration.name, "applied migration");
            }
        }

        Ok(())
    }

    /// Flushes the write-ahead log into the main file so it can be copied.
    pub fn checkpoint(&self) -> rusqlite::Result<()> {
        self.conn
            .query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_row| Ok(()))
    }

    /// Opens a unit of work. Dropping it without [`UnitOfWork::end`] rolls back.
    pub fn begin(&self) -> ExoResult<UnitOfWork<'_>> {
        UnitOfWork::begin(&self.conn, &self.clock)
    }

    /// Runs `f` in a fresh unit of work: commit on `Ok`, roll back on `Err`.
    pub fn with_unit_of_work<T>(
        &self,
        f: impl FnOnce(&UnitOfWork<'_>) -> ExoResult<T>,
    ) -> ExoResult<T> {
        let uow = self.begin()?;
        match f(&uow) {
            Ok(value) => {
                uow.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = uow.rollback() {
                    warn!(error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
        }
    }

    /// Creates the tag, or returns the existing one with that name unchanged.
    pub fn add_tag(&self, name: &str) -> ExoResult<Tag> {
        self.with_unit_of_work(|uow| uow.add_tag(name))
    }

    pub fn get_tag_by_id(&self, id: i64) -> ExoResult<Tag> {
        self.with_unit_of_work(|uow| uow.get_tag_by_id(id))
    }

    pub fn get_tag_by_name(&self, name: &str) -> ExoResult<Tag> {
        self.with_unit_of_work(|uow| uow.get_tag_by_name(name))
    }

    /// Most recently touched first.
    pub fn get_all_tags(&self) -> ExoResult<Vec<Tag>> {
        self.with_unit_of_work(|uow| uow.get_all_tags())
    }

    /// Renames the tag and rewrites `[[old]]` to `[[new]]` in every row that links to it.
    pub fn rename_tag(&self, old_name: &str, new_name: &str) -> ExoResult<Tag> {
        self.with_unit_of_work(|uow| uow.rename_tag(old_name, new_name))
    }

    pub fn touch_tag(&self, id: i64) -> ExoResult<()> {
        self.with_unit_of_work(|uow| uow.touch_tag(id))
    }

    /// Unconditional. Rows owned by the tag and refs pointing at it go with it.
    pub fn delete_tag_by_id(&self, id: i64) -> ExoResult<()> {
        self.with_unit_of_work(|uow| uow.delete_tag_by_id(id))
    }

    /// Deletes the tag if it owns no rows and nothing links to it.
    pub fn delete_tag_if_empty(&self, id: i64) -> ExoResult<bool> {
        self.with_unit_of_work(|uow| uow.delete_tag_if_empty(id))
    }

    /// Inserts a row at `rank` (appending when past the end).
    ///
    /// Every `[[Name]]` in `text` that names an unknown tag creates that tag.
    pub fn add_row(
        &self,
        tag_id: i64,
        text: &str,
        parent_row_id: Option<i64>,
        rank: usize,
    ) -> ExoResult<Row> {
        self.with_unit_of_work(|uow| uow.add_row(tag_id, text, parent_row_id, rank))
    }

    pub fn get_row_by_id(&self, id: i64) -> ExoResult<Row> {
        self.with_unit_of_work(|uow| uow.get_row_by_id(id))
    }

    pub fn get_rows_for_tag_id(&self, tag_id: i64) -> ExoResult<Vec<Row>> {
        self.with_unit_of_work(|uow| uow.get_rows_for_tag_id(tag_id))
    }

    /// Like [`Database::add_row`], may create tags named by new links.
    pub fn update_row_text(&self, row_id: i64, text: &str) -> ExoResult<()> {
        self.with_unit_of_work(|uow| uow.update_row_text(row_id, text))
    }

    pub fn update_row_rank(&self, row_id: i64, rank: usize) -> ExoResult<()> {
        self.with_unit_of_work(|uow| uow.update_row_rank(row_id, rank))
    }

    pub fn delete_row_by_id(&self, row_id: i64) -> ExoResult<()> {
        self.with_unit_of_work(|uow| uow.delete_row_by_id(row_id))
    }

    pub fn get_refs_to_tag_by_tag_id(&self, tag_id: i64) -> ExoResult<Backlinks> {
        self.with_unit_of_work(|uow| uow.get_refs_to_tag_by_tag_id(tag_id))
    }

    pub fn get_refs_to_tag_by_tag_name(&self, name: &str) -> ExoResult<Backlinks> {
        self.with_unit_of_work(|uow| uow.get_refs_to_tag_by_tag_name(name))
    }

    pub fn snapshot(&self, tag_id: i64) -> ExoResult<Snapshot> {
        self.with_unit_of_work(|uow| uow.snapshot(tag_id))
    }
}

#[cfg(test)]
mod tests {
    use super::{Clock, Database};
    use crate::error::ExoError;

    pub(crate) fn setup_db() -> Database {
        let db = Database::new_in_memory().expect("db init");
        db.run_migrations().expect("migrations");
        db
    }

    fn table_exists(db: &Database, name: &str) -> bool {
        db.conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [name],
                |_row| Ok(1),
            )
            .is_ok()
    }

    fn table_columns(db: &Database, name: &str) -> Vec<String> {
        let allowed = match name {
            "tag" | "row" | "ref" => name,
            _ => panic!("unsupported table name"),
        };
        let query = format!("PRAGMA table_info({})", allowed);
        let mut stmt = db.conn.prepare(&query).expect("table info");
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .expect("table info rows");
        rows.collect::<rusqlite::Result<Vec<String>>>()
            .expect("table info collect")
    }

    #[test]
    fn migrations_create_schema() {
        let db = setup_db();

        for table in ["tag", "row", "ref", "schema_migrations"] {
            assert!(table_exists(&db, table), "missing table {table}");
        }
        assert_eq!(
            db.current_schema_version().expect("version"),
            Database::latest_migration_version()
        );
    }

    #[test]
    fn migrations_are_idempotent() {
        let db = setup_db();
        db.run_migrations().expect("second run");
        let applied: i64 = db
            .conn
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| row.get(0))
            .expect("count");
        assert_eq!(applied, 1);
    }

    #[test]
    fn fresh_database_reports_version_zero() {
        let db = Database::new_in_memory().expect("db init");
        assert_eq!(db.current_schema_version().expect("version"), 0);
    }

    #[test]
    fn row_table_has_columns() {
        let db = setup_db();
        let columns = table_columns(&db, "row");
        for column in ["id", "tag_id", "rank", "text", "parent_row_id", "updated_ts"] {
            assert!(columns.contains(&column.to_string()), "missing {column}");
        }
        let columns = table_columns(&db, "ref");
        assert_eq!(columns, vec!["tag_id".to_string(), "row_id".to_string()]);
    }

    #[test]
    fn clock_is_strictly_increasing() {
        let clock = Clock::new();
        let mut last = clock.next();
        for _ in 0..1000 {
            let next = clock.next();
            assert!(next > last);
            last = next;
        }
    }

    #[test]
    fn failed_unit_of_work_leaves_no_trace() {
        let db = setup_db();
        let result: Result<(), ExoError> = db.with_unit_of_work(|uow| {
            uow.add_tag("Draft")?;
            Err(ExoError::Integrity("abort".to_string()))
        });
        assert!(result.is_err());
        assert!(db.get_tag_by_name("Draft").expect_err("rolled back").is_not_found());
    }

    #[test]
    fn explicit_end_commits_or_rolls_back() {
        let db = setup_db();

        let uow = db.begin().expect("begin");
        uow.add_tag("Kept").expect("add");
        uow.end(true).expect("commit");

        let uow = db.begin().expect("begin");
        uow.add_tag("Dropped").expect("add");
        uow.end(false).expect("rollback");

        let uow = db.begin().expect("begin");
        uow.add_tag("Abandoned").expect("add");
        drop(uow);

        let names: Vec<String> = db
            .get_all_tags()
            .expect("tags")
            .into_iter()
            .map(|tag| tag.name)
            .collect();
        assert_eq!(names, vec!["Kept".to_string()]);
    }

    #[test]
    fn second_begin_on_same_connection_fails() {
        let db = setup_db();
        let _outer = db.begin().expect("begin");
        let inner = db.begin();
        assert!(matches!(inner, Err(ExoError::Db(_))));
    }

    #[test]
    fn composite_operations_share_one_unit_of_work() {
        let db = setup_db();
        let tag = db
            .with_unit_of_work(|uow| {
                let tag = uow.add_tag("Monday")?;
                uow.add_row(tag.id, "first", None, 0)?;
                uow.add_row(tag.id, "see [[Tuesday]]", None, 1)?;
                Ok(tag)
            })
            .expect("batch");

        assert_eq!(db.get_rows_for_tag_id(tag.id).expect("rows").len(), 2);
        assert!(db.get_tag_by_name("Tuesday").is_ok());
    }
}
