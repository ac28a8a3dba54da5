/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Identifier assigned to a saved test by the persistence collaborator.
pub type TestId = i64;
