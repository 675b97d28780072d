use thiserror::Error;

/// Failures with a defined meaning inside the harvester itself, as opposed
/// to transport or filesystem errors surfaced through `anyhow`.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// A record key whose final path segment is not a base-10 integer.
    /// Sorting depends on that segment, so one bad key fails the whole
    /// merge for its query.
    #[error("record key has no numeric trailing segment: {0}")]
    MalformedKey(String),

    #[error("too many concurrent query groups: {0} (max 5)")]
    TooManyGroups(usize),

    #[error("unknown search category: {0} (expected cpu, gpu or ai)")]
    UnknownCategory(String),
}
