/// Row id of `ai3d_tasks` (BIGSERIAL).
pub type DbId = i64;

/// Task timestamps are stored and compared in UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
