//! Read model for front ends.
//!
//! A [`Snapshot`] is a whole, consistent picture of one tag: every tag by
//! recency, the tag's rows in rank order, and its backlinks. Front ends
//! re-pull a snapshot after each mutation instead of patching view state.
//! [`Session`] owns the engine handle and the current snapshot.

use crate::app::today_tag_name;
use crate::config::DEFAULT_TODAY_FORMAT;
use crate::db::{Backlinks, Database, Row, Tag, UnitOfWork};
use crate::error::{ExoError, ExoResult};
use chrono::{Local, NaiveDate};
use serde::Serialize;
use tracing::debug;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub all_tags: Vec<Tag>,
    pub current_tag: Tag,
    pub current_rows: Vec<Row>,
    pub current_refs: Backlinks,
    /// Source tags of `current_refs`, by name then id.
    pub sorted_ref_tags: Vec<Tag>,
}

impl UnitOfWork<'_> {
    pub fn snapshot(&self, tag_id: i64) -> ExoResult<Snapshot> {
        let current_tag = self.get_tag_by_id(tag_id)?;
        let all_tags = self.get_all_tags()?;
        let current_rows = self.get_rows_for_tag_id(tag_id)?;
        let current_refs = self.get_refs_to_tag_by_tag_id(tag_id)?;

        let mut sorted_ref_tags = current_refs.source_tags();
        sorted_ref_tags.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));

        Ok(Snapshot {
            all_tags,
            current_tag,
            current_rows,
            current_refs,
            sorted_ref_tags,
        })
    }
}

pub struct Session {
    db: Database,
    snapshot: Snapshot,
    today_format: String,
    /// Names of the tags switched away from, most recent last.
    history: Vec<String>,
}

impl Session {
    pub fn open(db: Database, tag_id: i64) -> ExoResult<Self> {
        let snapshot = db.snapshot(tag_id)?;
        Ok(Self {
            db,
            snapshot,
            today_format: DEFAULT_TODAY_FORMAT.to_string(),
            history: Vec::new(),
        })
    }

    /// Opens on the tag for `date`, creating it if needed.
    pub fn open_today(db: Database, date: NaiveDate, today_format: &str) -> ExoResult<Self> {
        let tag = db.add_tag(&today_tag_name(date, today_format))?;
        let mut session = Self::open(db, tag.id)?;
        session.today_format = today_format.to_string();
        Ok(session)
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn current_tag(&self) -> &Tag {
        &self.snapshot.current_tag
    }

    pub fn refresh(&mut self) -> ExoResult<&Snapshot> {
        self.snapshot = self.db.snapshot(self.snapshot.current_tag.id)?;
        Ok(&self.snapshot)
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }

    /// Leaves the current tag (collecting it if it ended up empty) for `tag_id`
    /// and remembers it for [`Session::pop_tag`].
    ///
    /// The target is checked first, so a bad id leaves the session where it was.
    pub fn switch_tag(&mut self, tag_id: i64) -> ExoResult<&Snapshot> {
        let target = self.db.get_tag_by_id(tag_id)?;
        if target.id != self.snapshot.current_tag.id {
            self.history.push(self.snapshot.current_tag.name.clone());
        }
        self.enter(target)
    }

    /// Goes back to the tag last switched away from, re-creating it if it
    /// was collected in the meantime.
    pub fn pop_tag(&mut self) -> ExoResult<&Snapshot> {
        let name = self.history.last().ok_or(ExoError::HistoryEmpty)?;
        let target = self.db.add_tag(name)?;
        self.history.pop();
        self.enter(target)
    }

    fn enter(&mut self, target: Tag) -> ExoResult<&Snapshot> {
        let leaving = self.snapshot.current_tag.id;
        if leaving != target.id && self.db.delete_tag_if_empty(leaving)? {
            debug!(tag_id = leaving, "left an empty tag behind");
        }
        self.snapshot = self.db.snapshot(target.id)?;
        Ok(&self.snapshot)
    }

    pub fn switch_to_name(&mut self, name: &str) -> ExoResult<&Snapshot> {
        let tag = self.db.add_tag(name)?;
        self.switch_tag(tag.id)
    }

    pub fn go_to_today(&mut self, date: NaiveDate) -> ExoResult<&Snapshot> {
        let name = today_tag_name(date, &self.today_format);
        self.switch_to_name(&name)
    }

    /// Appends a row to the current tag.
    pub fn append_row(&mut self, text: &str) -> ExoResult<&Snapshot> {
        let tag_id = self.snapshot.current_tag.id;
        let rank = self.snapshot.current_rows.len();
        self.db.add_row(tag_id, text, None, rank)?;
        self.refresh()
    }

    pub fn delete_row(&mut self, row_id: i64) -> ExoResult<&Snapshot> {
        self.delete_row_at(row_id, Local::now().date_naive())
    }

    /// Deletes a row shown in the snapshot, then collects the row's owner and
    /// the current tag if either ended up empty. When that removes the
    /// current tag the session moves to the tag for `today`.
    pub fn delete_row_at(&mut self, row_id: i64, today: NaiveDate) -> ExoResult<&Snapshot> {
        let row = self.db.get_row_by_id(row_id)?;
        self.db.delete_row_by_id(row_id)?;
        let current = self.snapshot.current_tag.id;
        self.db.delete_tag_if_empty(row.tag_id)?;
        if row.tag_id != current {
            self.db.delete_tag_if_empty(current)?;
        }
        match self.db.get_tag_by_id(current) {
            Ok(_) => self.refresh(),
            Err(err) if err.is_not_found() => self.go_to_today(today),
            Err(err) => Err(err),
        }
    }

    pub fn into_database(self) -> Database {
        self.db
    }
}
