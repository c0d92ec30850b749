use chrono::{SecondsFormat, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Answers;

/// Recorded response to a form. Never edited after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: String,
    pub form_id: String,
    pub data: Answers,
    /// RFC 3339 timestamp in UTC.
    pub submitted_at: String,
}

impl Submission {
    /// Stamps a new submission with a fresh id and the current time.
    pub fn new(form_id: impl Into<String>, data: Answers) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            form_id: form_id.into(),
            data,
            submitted_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}
