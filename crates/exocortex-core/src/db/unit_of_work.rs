use super::Clock;
use crate::error::ExoResult;
use rusqlite::{Connection, Transaction};
use tracing::debug;

/// One atomic boundary against the store.
///
/// Every storage helper is a method on `UnitOfWork`, so an operation that is
/// built out of other operations (rename rewriting rows, add row rebuilding
/// refs) runs them on the unit it was handed instead of opening its own.
/// Dropping a unit without ending it rolls back.
pub struct UnitOfWork<'db> {
    tx: Transaction<'db>,
    clock: &'db Clock,
}

impl<'db> UnitOfWork<'db> {
    pub(super) fn begin(conn: &'db Connection, clock: &'db Clock) -> ExoResult<Self> {
        let tx = conn.unchecked_transaction()?;
        Ok(Self { tx, clock })
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.tx
    }

    pub(crate) fn now(&self) -> i64 {
        self.clock.next()
    }

    pub fn commit(self) -> ExoResult<()> {
        self.tx.commit()?;
        Ok(())
    }

    pub fn rollback(self) -> ExoResult<()> {
        debug!("rolling back unit of work");
        self.tx.rollback()?;
        Ok(())
    }

    pub fn end(self, commit: bool) -> ExoResult<()> {
        if commit {
            self.commit()
        } else {
            self.rollback()
        }
    }
}
