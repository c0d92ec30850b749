use std::collections::{BTreeSet, HashMap};
use std::fmt;

use chrono::Utc;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::spec::field::FormField;

/// Timestamps below this many milliseconds are placeholders, not real dates.
pub const MIN_VALID_CREATED_AT: i64 = 1_000_000;

/// Top-level form definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FormSchema {
    #[serde(default)]
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub fields: Vec<FormField>,
    /// Creation time in milliseconds since the Unix epoch.
    #[serde(default)]
    pub created_at: i64,
}

impl FormSchema {
    pub fn new(id: impl Into<String>, title: impl Into<String>, fields: Vec<FormField>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
            fields,
            created_at: 0,
        }
    }

    pub fn field(&self, id: &str) -> Option<&FormField> {
        self.fields.iter().find(|field| field.id == id)
    }

    pub fn field_index(&self, id: &str) -> Option<usize> {
        self.fields.iter().position(|field| field.id == id)
    }

    pub fn has_valid_created_at(&self) -> bool {
        self.created_at >= MIN_VALID_CREATED_AT
    }

    /// Replaces a missing or placeholder `created_at` with the current time.
    pub fn normalize_created_at(&mut self) {
        if !self.has_valid_created_at() {
            self.created_at = Utc::now().timestamp_millis();
        }
    }

    /// Structural problems worth reporting to the author.
    ///
    /// None of these stop a schema from being stored or evaluated: inert jump
    /// rules are skipped by navigation and unknown kinds fail rule building.
    pub fn issues(&self) -> Vec<SchemaIssue> {
        let mut issues = Vec::new();
        let mut seen = BTreeSet::new();
        let mut first_index: HashMap<&str, usize> = HashMap::new();

        for (index, field) in self.fields.iter().enumerate() {
            if !seen.insert(field.id.as_str()) {
                issues.push(SchemaIssue::DuplicateFieldId {
                    field_id: field.id.clone(),
                });
            }
            first_index.entry(field.id.as_str()).or_insert(index);
            if !field.kind.is_known() {
                issues.push(SchemaIssue::UnknownFieldType {
                    field_id: field.id.clone(),
                    kind: field.kind.to_string(),
                });
            }
            if field.kind.needs_options() && field.options().is_empty() {
                issues.push(SchemaIssue::MissingOptions {
                    field_id: field.id.clone(),
                });
            }
        }

        for (index, field) in self.fields.iter().enumerate() {
            for rule in &field.logic {
                match first_index.get(rule.destination.as_str()) {
                    None => issues.push(SchemaIssue::UnresolvedDestination {
                        field_id: field.id.clone(),
                        destination: rule.destination.clone(),
                    }),
                    Some(&target) if target <= index => {
                        issues.push(SchemaIssue::BackwardDestination {
                            field_id: field.id.clone(),
                            destination: rule.destination.clone(),
                        })
                    }
                    Some(_) => {}
                }
            }
        }

        issues
    }
}

/// Authoring problem found by [`FormSchema::issues`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum SchemaIssue {
    DuplicateFieldId {
        field_id: String,
    },
    UnknownFieldType {
        field_id: String,
        kind: String,
    },
    MissingOptions {
        field_id: String,
    },
    UnresolvedDestination {
        field_id: String,
        destination: String,
    },
    BackwardDestination {
        field_id: String,
        destination: String,
    },
}

impl fmt::Display for SchemaIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaIssue::DuplicateFieldId { field_id } => {
                write!(f, "field id '{}' is used more than once", field_id)
            }
            SchemaIssue::UnknownFieldType { field_id, kind } => {
                write!(f, "field '{}' has unsupported type '{}'", field_id, kind)
            }
            SchemaIssue::MissingOptions { field_id } => {
                write!(f, "choice field '{}' has no options", field_id)
            }
            SchemaIssue::UnresolvedDestination {
                field_id,
                destination,
            } => write!(
                f,
                "field '{}' jumps to unknown field '{}'; the rule never jumps",
                field_id, destination
            ),
            SchemaIssue::BackwardDestination {
                field_id,
                destination,
            } => write!(
                f,
                "field '{}' jumps back to '{}'; only forward jumps are followed",
                field_id, destination
            ),
        }
    }
}
