//! Contract with the language-model backend that drafts schemas.

use handlebars::Handlebars;
use serde_json::{Value, json};
use thiserror::Error;
use uuid::Uuid;

use crate::spec::{FieldType, FormSchema};

const SYSTEM_PROMPT_TEMPLATE: &str = "You are a form generation assistant. Output ONLY valid JSON \
describing a single form. The document must match this JSON Schema:
{{schema}}

Rules:
- `id` is a unique UUID; every field `id` is camelCase and unique within the form.
- `type` is one of: {{field_types}}.
- {{choice_types}} fields list their choices in `options`.
- `logic` holds jump rules `{ \"condition\": <option value>, \"destination\": <later field id> }`; \
a condition of \"*\" always jumps. Destinations must come after the field.
- `createdAt` is the current time in milliseconds since the Unix epoch.
Do not include markdown formatting (like ```json). Just the raw JSON string.";

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("generator returned no content")]
    EmptyResponse,
    #[error("generated form is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("generator request failed: {0}")]
    Provider(String),
    #[error("failed to render prompt: {0}")]
    Template(#[from] handlebars::RenderError),
}

/// Opaque text-completion backend.
///
/// Implementations are expected to send [`system_prompt`] ahead of the
/// user's description.
pub trait Generator {
    fn generate(&self, prompt: &str) -> Result<String, GenerateError>;
}

/// JSON Schema of [`FormSchema`] as advertised to generators.
pub fn form_json_schema() -> Value {
    serde_json::to_value(schemars::schema_for!(FormSchema)).unwrap_or(Value::Null)
}

/// Renders the instructions sent ahead of every user prompt.
pub fn system_prompt() -> Result<String, GenerateError> {
    let mut engine = Handlebars::new();
    engine.register_escape_fn(handlebars::no_escape);

    let field_types = FieldType::SUPPORTED
        .iter()
        .map(|kind| format!("'{}'", kind))
        .collect::<Vec<_>>()
        .join(" | ");
    let choice_types = FieldType::SUPPORTED
        .iter()
        .filter(|kind| kind.needs_options())
        .map(|kind| kind.to_string())
        .collect::<Vec<_>>()
        .join("/");
    let schema = serde_json::to_string_pretty(&form_json_schema())?;

    let data = json!({
        "schema": schema,
        "field_types": field_types,
        "choice_types": choice_types,
    });
    Ok(engine.render_template(SYSTEM_PROMPT_TEMPLATE, &data)?)
}

/// Removes an optional markdown code fence around the payload.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

/// Parses generator output into a schema ready to be stored.
///
/// A blank id is replaced with a UUID and a placeholder `createdAt` with the
/// current time.
pub fn parse_generated(raw: &str) -> Result<FormSchema, GenerateError> {
    let body = strip_code_fence(raw);
    if body.is_empty() {
        return Err(GenerateError::EmptyResponse);
    }
    let mut schema: FormSchema = serde_json::from_str(body)?;
    if schema.id.trim().is_empty() {
        schema.id = Uuid::new_v4().to_string();
    }
    schema.normalize_created_at();
    Ok(schema)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"{
        "title": "Coffee survey",
        "fields": [
            { "id": "likesCoffee", "label": "Do you like coffee?", "type": "radio",
              "required": true, "options": ["Yes", "No"],
              "logic": [{ "condition": "No", "destination": "email" }] },
            { "id": "favourite", "label": "Favourite drink", "type": "text" },
            { "id": "email", "label": "Email", "type": "email" }
        ],
        "createdAt": 0
    }"#;

    #[test]
    fn strips_json_fences() {
        let fenced = format!("```json\n{}\n```", DOC);
        assert_eq!(strip_code_fence(&fenced), DOC.trim());
        assert_eq!(strip_code_fence("  {\"a\":1}  "), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n{}\n```"), "{}");
    }

    #[test]
    fn parse_generated_fills_id_and_timestamp() {
        let schema = parse_generated(&format!("```json\n{}\n```", DOC)).unwrap();
        assert!(!schema.id.is_empty());
        assert!(schema.has_valid_created_at());
        assert_eq!(schema.fields.len(), 3);
        assert_eq!(schema.fields[0].logic[0].destination, "email");
    }

    #[test]
    fn parse_generated_rejects_prose() {
        assert!(matches!(
            parse_generated("Sure! Here is your form."),
            Err(GenerateError::Parse(_))
        ));
        assert!(matches!(
            parse_generated("```json\n```"),
            Err(GenerateError::EmptyResponse)
        ));
    }

    #[test]
    fn system_prompt_lists_field_types_and_schema() {
        let prompt = system_prompt().unwrap();
        assert!(prompt.contains("'checkbox-group'"));
        assert!(prompt.contains("select/checkbox-group/radio"));
        assert!(prompt.contains("\"fields\""));
        assert!(!prompt.contains("{{"));
    }
}
