use crate::config::ConfigError;
use std::fmt;

/// What a failed lookup was looking for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Missing {
    TagId(i64),
    TagName(String),
    RowId(i64),
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Missing::TagId(id) => write!(f, "tag #{id}"),
            Missing::TagName(name) => write!(f, "tag {name:?}"),
            Missing::RowId(id) => write!(f, "row #{id}"),
        }
    }
}

#[derive(Debug)]
pub enum ExoError {
    NotFound(Missing),
    NameTaken(String),
    /// Cannot be written back as a `[[...]]` marker.
    InvalidName(String),
    ParentOutsideTag { parent_row_id: i64, tag_id: i64 },
    HistoryEmpty,
    RankOutOfRange { rank: usize, len: usize },
    Integrity(String),
    Db(rusqlite::Error),
    Io(std::io::Error),
    Config(ConfigError),
}

pub type ExoResult<T> = Result<T, ExoError>;

impl ExoError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ExoError::NotFound(_))
    }

    pub fn is_range_error(&self) -> bool {
        matches!(self, ExoError::RankOutOfRange { .. })
    }
}

impl fmt::Display for ExoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExoError::NotFound(missing) => write!(f, "{missing} not found"),
            ExoError::NameTaken(name) => write!(f, "a tag named {name:?} already exists"),
            ExoError::InvalidName(name) => write!(f, "{name:?} cannot be used as a link name"),
            ExoError::ParentOutsideTag {
                parent_row_id,
                tag_id,
            } => write!(f, "row #{parent_row_id} is not under tag #{tag_id}"),
            ExoError::HistoryEmpty => write!(f, "tag history is empty"),
            ExoError::RankOutOfRange { rank, len } => {
                write!(f, "rank {rank} is out of range for {len} rows")
            }
            ExoError::Integrity(message) => write!(f, "integrity violation: {message}"),
            ExoError::Db(err) => write!(f, "database error: {err}"),
            ExoError::Io(err) => write!(f, "io error: {err}"),
            ExoError::Config(err) => write!(f, "config error: {err}"),
        }
    }
}

impl std::error::Error for ExoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExoError::Db(err) => Some(err),
            ExoError::Io(err) => Some(err),
            ExoError::Config(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for ExoError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Db(err)
    }
}

impl From<std::io::Error> for ExoError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<ConfigError> for ExoError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}
