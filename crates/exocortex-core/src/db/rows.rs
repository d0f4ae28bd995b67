use super::UnitOfWork;
use crate::error::{ExoError, ExoResult, Missing};
use crate::rank::{insertion_rank, move_to_rank};
use rusqlite::{params, OptionalExtension};
use serde::Serialize;
use tracing::debug;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct Row {
    pub id: i64,
    pub tag_id: i64,
    pub rank: i64,
    pub text: String,
    pub parent_row_id: Option<i64>,
    pub updated_ts: i64,
}

const ROW_COLUMNS: &str = "id, tag_id, rank, text, parent_row_id, updated_ts";

impl Row {
    /// Reads the six `ROW_COLUMNS` starting at column `offset`.
    pub(super) fn from_sql_at(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(offset)?,
            tag_id: row.get(offset + 1)?,
            rank: row.get(offset + 2)?,
            text: row.get(offset + 3)?,
            parent_row_id: row.get(offset + 4)?,
            updated_ts: row.get(offset + 5)?,
        })
    }

    fn from_sql(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Self::from_sql_at(row, 0)
    }
}

impl UnitOfWork<'_> {
    pub fn add_row(
        &self,
        tag_id: i64,
        text: &str,
        parent_row_id: Option<i64>,
        rank: usize,
    ) -> ExoResult<Row> {
        self.get_tag_by_id(tag_id)?;
        if let Some(parent_id) = parent_row_id {
            let parent = self.get_row_by_id(parent_id)?;
            if parent.tag_id != tag_id {
                return Err(ExoError::ParentOutsideTag {
                    parent_row_id: parent_id,
                    tag_id,
                });
            }
        }

        let rank = insertion_rank(rank, self.count_rows(tag_id)?) as i64;
        self.conn().execute(
            "UPDATE row SET rank = rank + 1 WHERE tag_id = ?1 AND rank >= ?2",
            params![tag_id, rank],
        )?;
        self.conn().execute(
            "INSERT INTO row (tag_id, rank, text, parent_row_id, updated_ts)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![tag_id, rank, text, parent_row_id, self.now()],
        )?;
        let row_id = self.conn().last_insert_rowid();
        debug!(row_id, tag_id, rank, "added row");

        self.touch_tag(tag_id)?;
        self.rebuild_refs_for_row(row_id)?;
        self.get_row_by_id(row_id)
    }

    pub fn get_row_by_id(&self, id: i64) -> ExoResult<Row> {
        self.conn()
            .query_row(
                &format!("SELECT {ROW_COLUMNS} FROM row WHERE id = ?1"),
                [id],
                Row::from_sql,
            )
            .optional()?
            .ok_or(ExoError::NotFound(Missing::RowId(id)))
    }

    pub fn get_rows_for_tag_id(&self, tag_id: i64) -> ExoResult<Vec<Row>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {ROW_COLUMNS} FROM row WHERE tag_id = ?1 ORDER BY rank, id"
        ))?;
        let rows = stmt.query_map([tag_id], Row::from_sql)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub(crate) fn count_rows(&self, tag_id: i64) -> ExoResult<usize> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM row WHERE tag_id = ?1",
            [tag_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    pub fn update_row_text(&self, row_id: i64, text: &str) -> ExoResult<()> {
        let row = self.get_row_by_id(row_id)?;
        self.conn().execute(
            "UPDATE row SET text = ?1, updated_ts = ?2 WHERE id = ?3",
            params![text, self.now(), row_id],
        )?;
        self.touch_tag(row.tag_id)?;
        self.rebuild_refs_for_row(row_id)
    }

    /// Moves the row to `rank` among its siblings; the others keep their order.
    pub fn update_row_rank(&self, row_id: i64, rank: usize) -> ExoResult<()> {
        let row = self.get_row_by_id(row_id)?;
        let siblings = self.get_rows_for_tag_id(row.tag_id)?;
        if rank >= siblings.len() {
            return Err(ExoError::RankOutOfRange {
                rank,
                len: siblings.len(),
            });
        }

        let ids: Vec<i64> = siblings.iter().map(|sibling| sibling.id).collect();
        let order = move_to_rank(&ids, row_id, rank).ok_or_else(|| {
            ExoError::Integrity(format!("row {row_id} missing from its own tag"))
        })?;

        for (new_rank, id) in order.iter().enumerate() {
            let new_rank = new_rank as i64;
            let unchanged = siblings
                .iter()
                .any(|sibling| sibling.id == *id && sibling.rank == new_rank);
            if !unchanged {
                self.conn().execute(
                    "UPDATE row SET rank = ?1 WHERE id = ?2",
                    params![new_rank, id],
                )?;
            }
        }
        debug!(row_id, rank, tag_id = row.tag_id, "moved row");
        self.touch_tag(row.tag_id)
    }

    /// Removes the row and its refs, closes the rank gap it leaves, and hands
    /// its children to its own parent.
    pub fn delete_row_by_id(&self, row_id: i64) -> ExoResult<()> {
        let row = self.get_row_by_id(row_id)?;
        self.conn().execute(
            "UPDATE row SET parent_row_id = ?1 WHERE parent_row_id = ?2",
            params![row.parent_row_id, row_id],
        )?;
        self.conn().execute("DELETE FROM row WHERE id = ?1", [row_id])?;
        self.conn().execute(
            "UPDATE row SET rank = rank - 1 WHERE tag_id = ?1 AND rank > ?2",
            params![row.tag_id, row.rank],
        )?;
        debug!(row_id, tag_id = row.tag_id, "deleted row");
        self.touch_tag(row.tag_id)
    }
}

#[cfg(test)]
mod tests {
    use crate::db::tests::setup_db;
    use crate::db::{Database, Row};
    use crate::error::{ExoError, Missing};

    fn texts(rows: &[Row]) -> Vec<&str> {
        rows.iter().map(|row| row.text.as_str()).collect()
    }

    fn assert_dense(db: &Database, tag_id: i64) {
        let ranks: Vec<i64> = db
            .get_rows_for_tag_id(tag_id)
            .expect("rows")
            .iter()
            .map(|row| row.rank)
            .collect();
        let expected: Vec<i64> = (0..ranks.len() as i64).collect();
        assert_eq!(ranks, expected);
    }

    #[test]
    fn add_row_keeps_text_and_owner() {
        let db = setup_db();
        let tag = db.add_tag("test").expect("tag");
        let row = db
            .add_row(tag.id, "test tag [[test2]]", None, 0)
            .expect("row");
        assert_eq!(row.tag_id, tag.id);
        assert_eq!(row.text, "test tag [[test2]]");
        assert_eq!(row.rank, 0);
        assert_eq!(row.parent_row_id, None);
    }

    #[test]
    fn add_row_inserts_at_rank_and_appends_past_the_end() {
        let db = setup_db();
        let tag = db.add_tag("list").expect("tag");
        db.add_row(tag.id, "b", None, 0).expect("b");
        db.add_row(tag.id, "d", None, 1).expect("d");
        db.add_row(tag.id, "a", None, 0).expect("a");
        db.add_row(tag.id, "c", None, 2).expect("c");
        db.add_row(tag.id, "e", None, 99).expect("e");

        let rows = db.get_rows_for_tag_id(tag.id).expect("rows");
        assert_eq!(texts(&rows), vec!["a", "b", "c", "d", "e"]);
        assert_dense(&db, tag.id);
    }

    #[test]
    fn add_row_bumps_owning_tag() {
        let db = setup_db();
        let older = db.add_tag("older").expect("older");
        db.add_tag("newer").expect("newer");

        db.add_row(older.id, "activity", None, 0).expect("row");
        assert_eq!(db.get_all_tags().expect("tags")[0].id, older.id);
    }

    #[test]
    fn add_row_requires_existing_tag_and_parent() {
        let db = setup_db();
        match db.add_row(42, "orphan", None, 0) {
            Err(ExoError::NotFound(Missing::TagId(42))) => {}
            other => panic!("unexpected {other:?}"),
        }

        let tag = db.add_tag("t").expect("tag");
        match db.add_row(tag.id, "child", Some(77), 0) {
            Err(ExoError::NotFound(Missing::RowId(77))) => {}
            other => panic!("unexpected {other:?}"),
        }
        assert!(db.get_rows_for_tag_id(tag.id).expect("rows").is_empty());
    }

    #[test]
    fn parent_must_share_the_tag() {
        let db = setup_db();
        let left = db.add_tag("Left").expect("left");
        let right = db.add_tag("Right").expect("right");
        let parent = db.add_row(left.id, "parent", None, 0).expect("parent");

        match db.add_row(right.id, "child", Some(parent.id), 0) {
            Err(ExoError::ParentOutsideTag {
                parent_row_id,
                tag_id,
            }) => {
                assert_eq!(parent_row_id, parent.id);
                assert_eq!(tag_id, right.id);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(db.get_rows_for_tag_id(right.id).expect("rows").is_empty());

        let child = db
            .add_row(left.id, "child", Some(parent.id), 1)
            .expect("child");
        db.delete_tag_by_id(left.id).expect("delete tag");
        assert!(db.get_row_by_id(child.id).expect_err("gone").is_not_found());
    }

    #[test]
    fn update_row_text_persists() {
        let db = setup_db();
        let tag = db.add_tag("t").expect("tag");
        let row = db.add_row(tag.id, "before", None, 0).expect("row");

        db.update_row_text(row.id, "after").expect("update");
        let updated = db.get_row_by_id(row.id).expect("row");
        assert_eq!(updated.text, "after");
        assert!(updated.updated_ts > row.updated_ts);
        assert!(db.update_row_text(999, "x").expect_err("missing").is_not_found());
    }

    #[test]
    fn move_last_row_to_front() {
        let db = setup_db();
        let tag = db.add_tag("t").expect("tag");
        let a = db.add_row(tag.id, "A", None, 0).expect("a");
        let b = db.add_row(tag.id, "B", None, 1).expect("b");
        let c = db.add_row(tag.id, "C", None, 2).expect("c");

        db.update_row_rank(c.id, 0).expect("move");
        let rows = db.get_rows_for_tag_id(tag.id).expect("rows");
        let ids: Vec<i64> = rows.iter().map(|row| row.id).collect();
        assert_eq!(ids, vec![c.id, a.id, b.id]);
        assert_dense(&db, tag.id);
    }

    #[test]
    fn move_first_row_down() {
        let db = setup_db();
        let tag = db.add_tag("t").expect("tag");
        let a = db.add_row(tag.id, "A", None, 0).expect("a");
        db.add_row(tag.id, "B", None, 1).expect("b");
        db.add_row(tag.id, "C", None, 2).expect("c");
        db.add_row(tag.id, "D", None, 3).expect("d");

        db.update_row_rank(a.id, 2).expect("move");
        let rows = db.get_rows_for_tag_id(tag.id).expect("rows");
        assert_eq!(texts(&rows), vec!["B", "C", "A", "D"]);
        assert_dense(&db, tag.id);
    }

    #[test]
    fn move_out_of_range_changes_nothing() {
        let db = setup_db();
        let tag = db.add_tag("t").expect("tag");
        let a = db.add_row(tag.id, "A", None, 0).expect("a");
        db.add_row(tag.id, "B", None, 1).expect("b");

        match db.update_row_rank(a.id, 2) {
            Err(ExoError::RankOutOfRange { rank: 2, len: 2 }) => {}
            other => panic!("unexpected {other:?}"),
        }
        let rows = db.get_rows_for_tag_id(tag.id).expect("rows");
        assert_eq!(texts(&rows), vec!["A", "B"]);
    }

    #[test]
    fn delete_compacts_ranks_and_removes_refs() {
        let db = setup_db();
        let tag = db.add_tag("t").expect("tag");
        db.add_row(tag.id, "A", None, 0).expect("a");
        let b = db.add_row(tag.id, "B [[Other]]", None, 1).expect("b");
        db.add_row(tag.id, "C", None, 2).expect("c");

        db.delete_row_by_id(b.id).expect("delete");
        let rows = db.get_rows_for_tag_id(tag.id).expect("rows");
        assert_eq!(texts(&rows), vec!["A", "C"]);
        assert_dense(&db, tag.id);

        let other = db.get_tag_by_name("Other").expect("other");
        assert!(db.get_refs_to_tag_by_tag_id(other.id).expect("refs").is_empty());
        assert!(db.delete_row_by_id(b.id).expect_err("gone").is_not_found());
    }

    #[test]
    fn delete_hands_children_to_grandparent() {
        let db = setup_db();
        let tag = db.add_tag("t").expect("tag");
        let top = db.add_row(tag.id, "top", None, 0).expect("top");
        let middle = db.add_row(tag.id, "middle", Some(top.id), 1).expect("middle");
        let leaf = db.add_row(tag.id, "leaf", Some(middle.id), 2).expect("leaf");

        db.delete_row_by_id(middle.id).expect("delete");
        assert_eq!(db.get_row_by_id(leaf.id).expect("leaf").parent_row_id, Some(top.id));

        db.delete_row_by_id(top.id).expect("delete");
        assert_eq!(db.get_row_by_id(leaf.id).expect("leaf").parent_row_id, None);
    }

    #[test]
    fn ranks_stay_dense_through_mixed_edits() {
        let db = setup_db();
        let tag = db.add_tag("t").expect("tag");
        let mut ids = Vec::new();
        for i in 0..6 {
            ids.push(db.add_row(tag.id, &format!("row {i}"), None, i).expect("add").id);
        }
        db.update_row_rank(ids[5], 1).expect("move");
        db.delete_row_by_id(ids[2]).expect("delete");
        db.add_row(tag.id, "inserted", None, 2).expect("insert");
        db.update_row_rank(ids[0], 4).expect("move");
        db.delete_row_by_id(ids[4]).expect("delete");
        assert_dense(&db, tag.id);

        let rows = db.get_rows_for_tag_id(tag.id).expect("rows");
        assert_eq!(
            texts(&rows),
            vec!["row 5", "inserted", "row 1", "row 3", "row 0"]
        );
    }
}
