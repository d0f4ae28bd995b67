//! Engine for a tag-linked outliner.
//!
//! Rows of text live under named tags; a `[[Name]]` inside a row links it to
//! another tag. [`db::Database`] is the storage engine and its write path,
//! [`state`] is the read model front ends pull after each mutation.

pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod links;
pub mod rank;
pub mod state;

pub use db::{BacklinkGroup, Backlinks, Database, Row, Tag, UnitOfWork};
pub use error::{ExoError, ExoResult, Missing};
pub use state::{Session, Snapshot};
