use super::UnitOfWork;
use crate::error::{ExoError, ExoResult, Missing};
use crate::links::{is_linkable, rename_links};
use rusqlite::{params, OptionalExtension};
use serde::Serialize;
use tracing::{debug, info};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub updated_ts: i64,
}

const TAG_COLUMNS: &str = "id, name, updated_ts";

impl Tag {
    fn from_sql(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            updated_ts: row.get(2)?,
        })
    }
}

impl UnitOfWork<'_> {
    pub fn add_tag(&self, name: &str) -> ExoResult<Tag> {
        let inserted = self.conn().execute(
            "INSERT OR IGNORE INTO tag (name, updated_ts) VALUES (?1, ?2)",
            params![name, self.now()],
        )?;
        if inserted > 0 {
            debug!(name, "created tag");
        }
        self.get_tag_by_name(name)
    }

    pub fn get_tag_by_id(&self, id: i64) -> ExoResult<Tag> {
        self.conn()
            .query_row(
                &format!("SELECT {TAG_COLUMNS} FROM tag WHERE id = ?1"),
                [id],
                Tag::from_sql,
            )
            .optional()?
            .ok_or(ExoError::NotFound(Missing::TagId(id)))
    }

    pub fn get_tag_by_name(&self, name: &str) -> ExoResult<Tag> {
        self.find_tag_by_name(name)?
            .ok_or_else(|| ExoError::NotFound(Missing::TagName(name.to_string())))
    }

    fn find_tag_by_name(&self, name: &str) -> ExoResult<Option<Tag>> {
        Ok(self
            .conn()
            .query_row(
                &format!("SELECT {TAG_COLUMNS} FROM tag WHERE name = ?1"),
                [name],
                Tag::from_sql,
            )
            .optional()?)
    }

    pub fn get_all_tags(&self) -> ExoResult<Vec<Tag>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {TAG_COLUMNS} FROM tag ORDER BY updated_ts DESC, id DESC"
        ))?;
        let tags = stmt.query_map([], Tag::from_sql)?;
        Ok(tags.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn touch_tag(&self, id: i64) -> ExoResult<()> {
        self.conn().execute(
            "UPDATE tag SET updated_ts = ?1 WHERE id = ?2",
            params![self.now(), id],
        )?;
        Ok(())
    }

    pub fn delete_tag_by_id(&self, id: i64) -> ExoResult<()> {
        self.conn().execute("DELETE FROM tag WHERE id = ?1", [id])?;
        Ok(())
    }

    pub fn delete_tag_if_empty(&self, id: i64) -> ExoResult<bool> {
        let rows = self.count_rows(id)?;
        let refs = self.count_refs_to_tag(id)?;
        if rows > 0 || refs > 0 {
            return Ok(false);
        }
        let deleted = self.conn().execute("DELETE FROM tag WHERE id = ?1", [id])?;
        if deleted > 0 {
            info!(tag_id = id, "collected empty tag");
        }
        Ok(deleted > 0)
    }

    pub fn rename_tag(&self, old_name: &str, new_name: &str) -> ExoResult<Tag> {
        let tag = self.get_tag_by_name(old_name)?;
        if old_name == new_name {
            return Ok(tag);
        }
        if !is_linkable(new_name) {
            return Err(ExoError::InvalidName(new_name.to_string()));
        }
        if self.find_tag_by_name(new_name)?.is_some() {
            return Err(ExoError::NameTaken(new_name.to_string()));
        }

        self.conn().execute(
            "UPDATE tag SET name = ?1, updated_ts = ?2 WHERE id = ?3",
            params![new_name, self.now(), tag.id],
        )?;

        let renamed = self.get_tag_by_name(new_name)?;
        let backlinks = self.get_refs_to_tag_by_tag_id(renamed.id)?;
        for row in backlinks.rows() {
            self.update_row_text(row.id, &rename_links(&row.text, old_name, new_name))?;
        }

        info!(
            tag_id = renamed.id,
            old_name,
            new_name,
            rewritten = backlinks.row_count(),
            "renamed tag"
        );
        self.get_tag_by_id(renamed.id)
    }
}
