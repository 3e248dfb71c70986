use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DbRecord {
    pub namespace: String,
    pub payload: String,
    pub updated_at: DateTime<Utc>,
}
