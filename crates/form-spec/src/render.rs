use serde_json::{Map, Value, json};

use crate::{
    Answers,
    navigation::{NavigationPlan, has_value},
    spec::{FieldType, FormSchema},
    validate::{RuleError, validate},
};

/// Status labels returned by the renderers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStatus {
    /// More input is required.
    NeedInput,
    /// Every visible field has an answer.
    Complete,
}

impl RenderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderStatus::NeedInput => "need_input",
            RenderStatus::Complete => "complete",
        }
    }
}

/// Progress counters over the visible path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderProgress {
    pub answered: usize,
    pub total: usize,
}

/// Describes a single visible field for presentation.
#[derive(Debug, Clone)]
pub struct RenderField {
    pub id: String,
    pub label: String,
    pub kind: FieldType,
    pub placeholder: Option<String>,
    pub required: bool,
    pub options: Vec<String>,
    pub current_value: Option<Value>,
    pub error: Option<String>,
}

/// Everything a presentation layer needs to draw the form in its current state.
#[derive(Debug, Clone)]
pub struct RenderPayload {
    pub form_id: String,
    pub form_title: String,
    pub help: Option<String>,
    pub status: RenderStatus,
    pub next_field_id: Option<String>,
    pub progress: RenderProgress,
    /// Visible fields only, in path order.
    pub fields: Vec<RenderField>,
}

impl RenderPayload {
    pub fn field(&self, id: &str) -> Option<&RenderField> {
        self.fields.iter().find(|field| field.id == id)
    }
}

/// Build the render payload for a schema and the current answers.
///
/// Errors are attached only to fields that already hold a value, so a fresh
/// form is not covered in "is required" messages.
pub fn build_render_payload(
    schema: &FormSchema,
    answers: &Answers,
) -> Result<RenderPayload, RuleError> {
    let plan = NavigationPlan::compile(schema);
    let visible = plan.evaluate(answers);
    let validation = validate(schema, answers)?;

    let next_field_id = visible
        .next_unanswered(answers)
        .map(|field| field.id.clone());
    let answered = visible
        .fields()
        .filter(|field| answers.get(&field.id).is_some_and(has_value))
        .count();

    let fields = visible
        .fields()
        .map(|field| {
            let current_value = answers.get(&field.id).filter(|value| has_value(value)).cloned();
            let error = current_value
                .as_ref()
                .and_then(|_| validation.error_for(&field.id))
                .map(|error| error.message.clone());
            RenderField {
                id: field.id.clone(),
                label: field.label.clone(),
                kind: field.kind.clone(),
                placeholder: field.placeholder.clone(),
                required: field.required,
                options: field.options().to_vec(),
                current_value,
                error,
            }
        })
        .collect::<Vec<_>>();

    let status = if next_field_id.is_some() {
        RenderStatus::NeedInput
    } else {
        RenderStatus::Complete
    };

    Ok(RenderPayload {
        form_id: schema.id.clone(),
        form_title: schema.title.clone(),
        help: schema.description.clone(),
        status,
        next_field_id,
        progress: RenderProgress {
            answered,
            total: visible.len(),
        },
        fields,
    })
}

/// Render the payload as a structured JSON-friendly value.
pub fn render_json_ui(payload: &RenderPayload) -> Value {
    let fields = payload
        .fields
        .iter()
        .map(|field| {
            let mut map = Map::new();
            map.insert("id".into(), Value::String(field.id.clone()));
            map.insert("label".into(), Value::String(field.label.clone()));
            map.insert("type".into(), Value::String(field.kind.to_string()));
            map.insert("required".into(), Value::Bool(field.required));
            if let Some(placeholder) = &field.placeholder {
                map.insert("placeholder".into(), Value::String(placeholder.clone()));
            }
            if !field.options.is_empty() {
                map.insert(
                    "options".into(),
                    Value::Array(
                        field
                            .options
                            .iter()
                            .map(|option| Value::String(option.clone()))
                            .collect(),
                    ),
                );
            }
            if let Some(current_value) = &field.current_value {
                map.insert("current_value".into(), current_value.clone());
            }
            if let Some(error) = &field.error {
                map.insert("error".into(), Value::String(error.clone()));
            }
            Value::Object(map)
        })
        .collect::<Vec<_>>();

    json!({
        "form_id": payload.form_id,
        "form_title": payload.form_title,
        "status": payload.status.as_str(),
        "next_field_id": payload.next_field_id,
        "progress": {
            "answered": payload.progress.answered,
            "total": payload.progress.total,
        },
        "help": payload.help,
        "fields": fields,
    })
}

/// Render the payload as human-friendly text.
pub fn render_text(payload: &RenderPayload) -> String {
    let mut lines = Vec::new();
    lines.push(format!(
        "Form: {} ({})",
        payload.form_title, payload.form_id
    ));
    lines.push(format!(
        "Status: {} ({}/{})",
        payload.status.as_str(),
        payload.progress.answered,
        payload.progress.total
    ));
    if let Some(help) = &payload.help {
        lines.push(format!("Help: {}", help));
    }

    if let Some(next_field) = &payload.next_field_id {
        lines.push(format!("Next field: {}", next_field));
    } else {
        lines.push("All visible fields are answered.".to_string());
    }

    lines.push("Visible fields:".to_string());
    for field in &payload.fields {
        let mut entry = format!(" - {} ({}, {})", field.id, field.label, field.kind);
        if field.required {
            entry.push_str(" [required]");
        }
        if let Some(current_value) = &field.current_value {
            entry.push_str(&format!(" = {}", value_to_display(current_value)));
        }
        if let Some(error) = &field.error {
            entry.push_str(&format!(" !! {}", error));
        }
        lines.push(entry);
    }

    lines.join("\n")
}

pub fn value_to_display(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(num) => num.to_string(),
        Value::Array(items) => items
            .iter()
            .map(value_to_display)
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}
