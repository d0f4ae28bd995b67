use super::{Row, Tag, UnitOfWork};
use crate::error::ExoResult;
use crate::links::link_names;
use rusqlite::params;
use serde::Serialize;
use tracing::debug;

/// Rows that link to one tag, all owned by `tag`, in rank order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BacklinkGroup {
    pub tag: Tag,
    pub rows: Vec<Row>,
}

/// Everything that links to a tag, grouped by the linking row's owner.
/// Groups are ordered by owner name, then owner id.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Backlinks {
    groups: Vec<BacklinkGroup>,
}

impl Backlinks {
    pub fn groups(&self) -> &[BacklinkGroup] {
        &self.groups
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Number of distinct source tags.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn row_count(&self) -> usize {
        self.groups.iter().map(|group| group.rows.len()).sum()
    }

    pub fn rows_from(&self, tag_id: i64) -> Option<&[Row]> {
        self.groups
            .iter()
            .find(|group| group.tag.id == tag_id)
            .map(|group| group.rows.as_slice())
    }

    pub fn source_tags(&self) -> Vec<Tag> {
        self.groups.iter().map(|group| group.tag.clone()).collect()
    }

    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        self.groups.iter().flat_map(|group| group.rows.iter())
    }

    fn push(&mut self, tag: Tag, row: Row) {
        match self.groups.last_mut() {
            Some(group) if group.tag.id == tag.id => group.rows.push(row),
            _ => self.groups.push(BacklinkGroup {
                tag,
                rows: vec![row],
            }),
        }
    }
}

impl UnitOfWork<'_> {
    /// Clears the row's refs and records one per distinct `[[Name]]` in its
    /// current text, creating tags that do not exist yet.
    pub fn rebuild_refs_for_row(&self, row_id: i64) -> ExoResult<()> {
        let row = self.get_row_by_id(row_id)?;
        self.conn()
            .execute("DELETE FROM ref WHERE row_id = ?1", [row_id])?;

        let names = link_names(&row.text);
        for name in &names {
            let tag = self.add_tag(name)?;
            self.conn().execute(
                "INSERT OR IGNORE INTO ref (tag_id, row_id) VALUES (?1, ?2)",
                params![tag.id, row_id],
            )?;
        }
        debug!(row_id, refs = names.len(), "rebuilt refs");
        Ok(())
    }

    pub fn get_refs_to_tag_by_tag_id(&self, tag_id: i64) -> ExoResult<Backlinks> {
        self.get_tag_by_id(tag_id)?;

        let mut stmt = self.conn().prepare(
            "SELECT t.id, t.name, t.updated_ts,
                    r.id, r.tag_id, r.rank, r.text, r.parent_row_id, r.updated_ts
             FROM ref
             JOIN row AS r ON r.id = ref.row_id
             JOIN tag AS t ON t.id = r.tag_id
             WHERE ref.tag_id = ?1
             ORDER BY t.name, t.id, r.rank, r.id",
        )?;
        let pairs = stmt.query_map([tag_id], |sql_row| {
            let tag = Tag {
                id: sql_row.get(0)?,
                name: sql_row.get(1)?,
                updated_ts: sql_row.get(2)?,
            };
            Ok((tag, Row::from_sql_at(sql_row, 3)?))
        })?;

        let mut backlinks = Backlinks::default();
        for pair in pairs {
            let (tag, row) = pair?;
            backlinks.push(tag, row);
        }
        Ok(backlinks)
    }

    pub fn get_refs_to_tag_by_tag_name(&self, name: &str) -> ExoResult<Backlinks> {
        let tag = self.get_tag_by_name(name)?;
        self.get_refs_to_tag_by_tag_id(tag.id)
    }

    pub(crate) fn count_refs_to_tag(&self, tag_id: i64) -> ExoResult<usize> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM ref WHERE tag_id = ?1",
            [tag_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}
