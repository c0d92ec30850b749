use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use thiserror::Error;

use crate::Answers;
use crate::navigation::visible_fields;
use crate::spec::{FieldType, FormField, FormSchema};

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_'+\-\.]*[A-Za-z0-9_+\-]@([A-Za-z0-9][A-Za-z0-9\-]*\.)+[A-Za-z]{2,}$")
        .expect("email pattern is valid")
});

/// Raised when a schema cannot be turned into validation rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    #[error("field '{field_id}' has unsupported type '{kind}'")]
    UnknownFieldType { field_id: String, kind: String },
}

/// Value shape enforced for a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    /// Plain string: text, textarea, select, radio, date and file fields.
    Text,
    Email,
    Number,
    /// Number in `1..=5`.
    Rating,
    /// Boolean, `false` when absent.
    Checkbox,
    /// List of strings, empty when absent.
    CheckboxGroup,
}

impl RuleKind {
    pub fn for_type(kind: &FieldType) -> Option<Self> {
        let rule = match kind {
            FieldType::Text
            | FieldType::Textarea
            | FieldType::Select
            | FieldType::Radio
            | FieldType::Date
            | FieldType::File => RuleKind::Text,
            FieldType::Email => RuleKind::Email,
            FieldType::Number => RuleKind::Number,
            FieldType::Rating => RuleKind::Rating,
            FieldType::Checkbox => RuleKind::Checkbox,
            FieldType::CheckboxGroup => RuleKind::CheckboxGroup,
            FieldType::Unknown(_) => return None,
        };
        Some(rule)
    }
}

/// Validator derived from one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRule {
    pub field_id: String,
    pub label: String,
    pub kind: RuleKind,
    pub required: bool,
}

/// Rules keyed by field id.
pub type RuleSet = BTreeMap<String, FieldRule>;

/// Builds one rule per field; fails on the first unsupported field type.
pub fn build_rules<'a, I>(fields: I) -> Result<RuleSet, RuleError>
where
    I: IntoIterator<Item = &'a FormField>,
{
    fields
        .into_iter()
        .map(|field| FieldRule::for_field(field).map(|rule| (field.id.clone(), rule)))
        .collect()
}

impl FieldRule {
    pub fn for_field(field: &FormField) -> Result<Self, RuleError> {
        let kind = RuleKind::for_type(&field.kind).ok_or_else(|| RuleError::UnknownFieldType {
            field_id: field.id.clone(),
            kind: field.kind.to_string(),
        })?;
        Ok(Self {
            field_id: field.id.clone(),
            label: field.label.clone(),
            kind,
            required: field.required && kind != RuleKind::Checkbox,
        })
    }

    /// Checks one answer and returns its normalized form.
    ///
    /// `Ok(None)` means the field is optional and was left empty, so nothing
    /// should be stored for it.
    pub fn check(&self, value: Option<&Value>) -> Result<Option<Value>, ValidationError> {
        let value = value.filter(|value| !value.is_null());
        match self.kind {
            RuleKind::Checkbox => self.check_checkbox(value).map(Some),
            RuleKind::CheckboxGroup => self.check_group(value).map(Some),
            RuleKind::Text => self.check_text(value),
            RuleKind::Email => self.check_email(value),
            RuleKind::Number | RuleKind::Rating => self.check_number(value),
        }
    }

    fn check_text(&self, value: Option<&Value>) -> Result<Option<Value>, ValidationError> {
        match value {
            None => self.absent(),
            Some(Value::String(text)) if text.is_empty() && self.required => {
                Err(self.required_error())
            }
            Some(Value::String(text)) => Ok(Some(Value::String(text.clone()))),
            Some(_) => Err(self.error("must be text", "type_mismatch")),
        }
    }

    fn check_email(&self, value: Option<&Value>) -> Result<Option<Value>, ValidationError> {
        match value {
            None => self.absent(),
            Some(Value::String(text)) if text.is_empty() => self.absent(),
            Some(Value::String(text)) if EMAIL.is_match(text) => {
                Ok(Some(Value::String(text.clone())))
            }
            Some(Value::String(_)) => {
                Err(self.error("must be a valid email address", "invalid_email"))
            }
            Some(_) => Err(self.error("must be text", "type_mismatch")),
        }
    }

    fn check_number(&self, value: Option<&Value>) -> Result<Option<Value>, ValidationError> {
        let number = match value {
            None => return self.absent(),
            Some(Value::String(text)) if text.trim().is_empty() => return self.absent(),
            Some(Value::Number(number)) => number.as_f64(),
            Some(Value::String(text)) => text.trim().parse::<f64>().ok(),
            Some(_) => None,
        };
        let number = number
            .filter(|number| number.is_finite())
            .ok_or_else(|| self.error("must be a number", "not_a_number"))?;

        if self.kind == RuleKind::Rating && !(1.0..=5.0).contains(&number) {
            return Err(self.error("must be between 1 and 5", "out_of_range"));
        }

        Ok(Some(number_value(number)))
    }

    fn check_checkbox(&self, value: Option<&Value>) -> Result<Value, ValidationError> {
        match value {
            None => Ok(Value::Bool(false)),
            Some(Value::Bool(flag)) => Ok(Value::Bool(*flag)),
            Some(Value::String(text)) => match text.to_ascii_lowercase().as_str() {
                "true" | "on" | "yes" => Ok(Value::Bool(true)),
                "false" | "off" | "no" | "" => Ok(Value::Bool(false)),
                _ => Err(self.error("must be checked or unchecked", "type_mismatch")),
            },
            Some(_) => Err(self.error("must be checked or unchecked", "type_mismatch")),
        }
    }

    fn check_group(&self, value: Option<&Value>) -> Result<Value, ValidationError> {
        let items = match value {
            None => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| item.as_str().map(|text| Value::String(text.to_string())))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| self.error("must be a list of options", "type_mismatch"))?,
            Some(_) => return Err(self.error("must be a list of options", "type_mismatch")),
        };
        if self.required && items.is_empty() {
            return Err(self.required_error());
        }
        Ok(Value::Array(items))
    }

    fn absent(&self) -> Result<Option<Value>, ValidationError> {
        if self.required {
            Err(self.required_error())
        } else {
            Ok(None)
        }
    }

    fn required_error(&self) -> ValidationError {
        ValidationError {
            field_id: self.field_id.clone(),
            message: format!("{} is required", self.label),
            code: "required".into(),
        }
    }

    fn error(&self, detail: &str, code: &str) -> ValidationError {
        ValidationError {
            field_id: self.field_id.clone(),
            message: format!("{} {}", self.label, detail),
            code: code.into(),
        }
    }
}

fn number_value(number: f64) -> Value {
    if number.fract() == 0.0 && number.abs() < i64::MAX as f64 {
        Value::Number(Number::from(number as i64))
    } else {
        Number::from_f64(number)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

/// A single field-level violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub field_id: String,
    pub message: String,
    pub code: String,
}

/// Outcome of validating an answer map against the visible fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    /// Normalized answers for visible fields, defaults applied.
    pub values: Answers,
}

impl ValidationResult {
    pub fn error_for(&self, field_id: &str) -> Option<&ValidationError> {
        self.errors.iter().find(|error| error.field_id == field_id)
    }
}

/// Validates the answers for the fields currently on the visible path.
///
/// Skipped fields are neither checked nor carried into `values`.
pub fn validate(schema: &FormSchema, answers: &Answers) -> Result<ValidationResult, RuleError> {
    let visible = visible_fields(schema, answers);
    let rules = build_rules(visible.fields())?;

    let mut errors = Vec::new();
    let mut values = Answers::new();

    for field in visible.fields() {
        let Some(rule) = rules.get(&field.id) else {
            continue;
        };
        match rule.check(answers.get(&field.id)) {
            Ok(Some(value)) => {
                values.insert(field.id.clone(), value);
            }
            Ok(None) => {}
            Err(error) => errors.push(error),
        }
    }

    Ok(ValidationResult {
        valid: errors.is_empty(),
        errors,
        values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rule(kind: FieldType, required: bool) -> FieldRule {
        let mut field = FormField::new("f", "Field", kind);
        field.required = required;
        FieldRule::for_field(&field).unwrap()
    }

    #[test]
    fn required_message_embeds_label() {
        let error = rule(FieldType::Text, true).check(None).unwrap_err();
        assert_eq!(error.message, "Field is required");
        assert_eq!(error.code, "required");
        let error = rule(FieldType::Text, true)
            .check(Some(&json!("")))
            .unwrap_err();
        assert_eq!(error.message, "Field is required");
    }

    #[test]
    fn optional_fields_accept_absence() {
        assert_eq!(rule(FieldType::Text, false).check(None), Ok(None));
        assert_eq!(rule(FieldType::Number, false).check(Some(&json!(""))), Ok(None));
        assert_eq!(rule(FieldType::Email, false).check(Some(&json!(""))), Ok(None));
    }

    #[test]
    fn email_syntax_is_checked() {
        let email = rule(FieldType::Email, true);
        assert!(email.check(Some(&json!("ada@example.org"))).is_ok());
        assert_eq!(
            email.check(Some(&json!("not-an-email"))).unwrap_err().code,
            "invalid_email"
        );
    }

    #[test]
    fn numbers_are_coerced() {
        let number = rule(FieldType::Number, true);
        assert_eq!(number.check(Some(&json!("42"))), Ok(Some(json!(42))));
        assert_eq!(number.check(Some(&json!(2.5))), Ok(Some(json!(2.5))));
        assert_eq!(
            number.check(Some(&json!("forty"))).unwrap_err().code,
            "not_a_number"
        );
    }

    #[test]
    fn rating_is_bounded() {
        let rating = rule(FieldType::Rating, false);
        assert_eq!(rating.check(Some(&json!("5"))), Ok(Some(json!(5))));
        assert_eq!(rating.check(Some(&json!(1))), Ok(Some(json!(1))));
        assert_eq!(
            rating.check(Some(&json!(6))).unwrap_err().code,
            "out_of_range"
        );
        assert!(rating.check(Some(&json!(0))).is_err());
    }

    #[test]
    fn checkbox_defaults_false_and_ignores_required() {
        let checkbox = rule(FieldType::Checkbox, true);
        assert!(!checkbox.required);
        assert_eq!(checkbox.check(None), Ok(Some(json!(false))));
        assert_eq!(checkbox.check(Some(&json!("on"))), Ok(Some(json!(true))));
    }

    #[test]
    fn checkbox_group_defaults_to_empty_list() {
        let optional = rule(FieldType::CheckboxGroup, false);
        assert_eq!(optional.check(None), Ok(Some(json!([]))));
        let required = rule(FieldType::CheckboxGroup, true);
        assert_eq!(required.check(Some(&json!([]))).unwrap_err().code, "required");
        assert_eq!(
            required.check(Some(&json!(["a", "b"]))),
            Ok(Some(json!(["a", "b"])))
        );
        assert!(required.check(Some(&json!([1]))).is_err());
    }

    #[test]
    fn unknown_type_names_the_field() {
        let field = FormField::new("sig", "Signature", FieldType::Unknown("signature".into()));
        let err = build_rules([&field]).unwrap_err();
        assert_eq!(
            err,
            RuleError::UnknownFieldType {
                field_id: "sig".into(),
                kind: "signature".into()
            }
        );
    }

    #[test]
    fn build_rules_maps_every_field() {
        let fields = vec![
            FormField::new("a", "A", FieldType::Select).with_options(["x"]),
            FormField::new("b", "B", FieldType::Rating),
        ];
        let rules = build_rules(&fields).unwrap();
        assert_eq!(rules["a"].kind, RuleKind::Text);
        assert_eq!(rules["b"].kind, RuleKind::Rating);
    }
}
