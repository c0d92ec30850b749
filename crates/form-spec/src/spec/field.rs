use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Closed set of field kinds a schema may declare.
///
/// Anything outside the set deserializes into [`FieldType::Unknown`] so a
/// schema still loads; building validation rules for it is what fails.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum FieldType {
    Text,
    Textarea,
    Number,
    Email,
    Select,
    Checkbox,
    CheckboxGroup,
    Radio,
    Rating,
    Date,
    File,
    #[serde(untagged)]
    #[schemars(skip)]
    Unknown(String),
}

impl FieldType {
    /// Every supported kind, in the order they are advertised to generators.
    pub const SUPPORTED: [FieldType; 11] = [
        FieldType::Text,
        FieldType::Textarea,
        FieldType::Number,
        FieldType::Email,
        FieldType::Select,
        FieldType::Checkbox,
        FieldType::CheckboxGroup,
        FieldType::Radio,
        FieldType::Rating,
        FieldType::Date,
        FieldType::File,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            FieldType::Text => "text",
            FieldType::Textarea => "textarea",
            FieldType::Number => "number",
            FieldType::Email => "email",
            FieldType::Select => "select",
            FieldType::Checkbox => "checkbox",
            FieldType::CheckboxGroup => "checkbox-group",
            FieldType::Radio => "radio",
            FieldType::Rating => "rating",
            FieldType::Date => "date",
            FieldType::File => "file",
            FieldType::Unknown(label) => label,
        }
    }

    /// Kinds whose answers are picked from `options`.
    pub fn needs_options(&self) -> bool {
        matches!(
            self,
            FieldType::Select | FieldType::Radio | FieldType::CheckboxGroup
        )
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, FieldType::Unknown(_))
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Forward jump taken when a field's answer matches `condition`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct JumpRule {
    /// Answer value that triggers the jump; `"*"` or `""` always match.
    #[serde(default)]
    pub condition: String,
    /// Id of the field to continue at.
    pub destination: String,
}

impl JumpRule {
    pub fn is_wildcard(&self) -> bool {
        self.condition.is_empty() || self.condition == "*"
    }
}

/// A single question within a form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FormField {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub kind: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub logic: Vec<JumpRule>,
}

impl FormField {
    pub fn new(id: impl Into<String>, label: impl Into<String>, kind: FieldType) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            kind,
            placeholder: None,
            required: false,
            options: None,
            logic: Vec::new(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = Some(options.into_iter().map(Into::into).collect());
        self
    }

    pub fn jump(mut self, condition: impl Into<String>, destination: impl Into<String>) -> Self {
        self.logic.push(JumpRule {
            condition: condition.into(),
            destination: destination.into(),
        });
        self
    }

    pub fn options(&self) -> &[String] {
        self.options.as_deref().unwrap_or_default()
    }
}
