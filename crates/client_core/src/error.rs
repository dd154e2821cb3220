use shared::domain::GroupId;
use thiserror::Error;

/// Controller-level failures. No-op drag conditions (same position, unknown
/// ids) are deliberately not errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SortError {
    #[error("reordering requires editor capability")]
    EditorRequired,
    #[error("a {0} session is already active")]
    SessionActive(&'static str),
    #[error("no sort session is active")]
    NoActiveSession,
    #[error("group {} does not exist", .0 .0)]
    UnknownGroup(GroupId),
    #[error("cannot sort an empty collection")]
    EmptyCollection,
    #[error("store rejected the order update")]
    SaveRejected,
}
