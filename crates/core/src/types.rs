/// Shots are identified by the id the plan author gave them.
pub type ShotId = String;

/// Credentials and stored artifacts use random UUIDs.
pub type EntityId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
