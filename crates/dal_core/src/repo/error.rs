//! Repository error taxonomy and legacy sentinel accessors.

use crate::db::DbError;
use log::error;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Failure of one repository call.
#[derive(Debug)]
pub enum RepoError {
    /// Opening, bootstrapping or beginning work on a connection failed.
    Connection(DbError),
    /// The statement could not be prepared or its parameters could not be bound.
    Preparation {
        sql: String,
        source: rusqlite::Error,
    },
    /// The store rejected the statement while it ran.
    Execution(rusqlite::Error),
    /// A placeholder was left without a value.
    UnboundParameter(String),
    /// A count query did not yield exactly one integer.
    NotScalar(String),
    InvalidPage {
        page_index: u32,
        page_size: u32,
    },
    /// A property bag could not be built from the supplied value.
    Properties(String),
    /// `Entity::validate` refused the entity before the write.
    Validation(String),
    InvalidData(String),
    /// The call failed and releasing its resources failed too.
    ReleaseFailed {
        cause: Box<RepoError>,
        release: rusqlite::Error,
    },
}

impl RepoError {
    /// Returns the failure that triggered cleanup, skipping release notes.
    pub fn primary(&self) -> &RepoError {
        match self {
            Self::ReleaseFailed { cause, .. } => cause.primary(),
            other => other,
        }
    }

    pub(crate) fn with_release_failure(self, release: rusqlite::Error) -> Self {
        Self::ReleaseFailed {
            cause: Box::new(self),
            release,
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connection(err) => write!(f, "connection failure: {err}"),
            Self::Preparation { sql, source } => {
                write!(f, "failed to prepare statement `{sql}`: {source}")
            }
            Self::Execution(err) => write!(f, "statement execution failed: {err}"),
            Self::UnboundParameter(name) => write!(f, "placeholder `{name}` has no bound value"),
            Self::NotScalar(message) => write!(f, "expected a single scalar result: {message}"),
            Self::InvalidPage {
                page_index,
                page_size,
            } => write!(
                f,
                "invalid page request index={page_index} size={page_size}; both must be >= 1"
            ),
            Self::Properties(message) => write!(f, "invalid query properties: {message}"),
            Self::Validation(message) => write!(f, "entity validation failed: {message}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::ReleaseFailed { cause, release } => {
                write!(f, "{cause} (releasing resources also failed: {release})")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Connection(err) => Some(err),
            Self::Preparation { source, .. } => Some(source),
            Self::Execution(err) => Some(err),
            Self::ReleaseFailed { cause, .. } => Some(cause.as_ref()),
            Self::UnboundParameter(_)
            | Self::NotScalar(_)
            | Self::InvalidPage { .. }
            | Self::Properties(_)
            | Self::Validation(_)
            | Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Connection(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Execution(value)
    }
}

/// Outcome values that map onto the legacy `true`/`false` success flag.
pub trait Affected {
    fn affected(&self) -> bool;
}

impl Affected for usize {
    fn affected(&self) -> bool {
        *self > 0
    }
}

impl<T> Affected for Option<T> {
    fn affected(&self) -> bool {
        self.is_some()
    }
}

/// Compatibility accessors for callers written against the sentinel
/// contract, where `false`, `0` or absent stood in for "failed".
///
/// Errors are logged and discarded.
pub trait Sentinel<T> {
    /// Yields `T::default()` on failure: `0`, empty, or `None`.
    fn or_sentinel(self) -> T
    where
        T: Default;

    /// `false` on failure or when nothing was affected.
    fn flag(self) -> bool
    where
        T: Affected;
}

impl<T> Sentinel<T> for RepoResult<T> {
    fn or_sentinel(self) -> T
    where
        T: Default,
    {
        self.unwrap_or_else(|err| {
            error!("event=repo_sentinel module=repo status=error error={err}");
            T::default()
        })
    }

    fn flag(self) -> bool
    where
        T: Affected,
    {
        match self {
            Ok(value) => value.affected(),
            Err(err) => {
                error!("event=repo_sentinel module=repo status=error error={err}");
                false
            }
        }
    }
}
