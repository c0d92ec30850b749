use serde_json::{Number, Value};

use form_spec::{FieldType, FormField, RenderField, RenderPayload, RenderProgress, Submission};

/// Controls which bits of state the wizard prints.
#[derive(Copy, Clone, Eq, PartialEq)]
pub enum Verbosity {
    /// Clean output: field prompts only.
    Clean,
    /// Verbose output: status, visible path, choices.
    Verbose,
}

impl Verbosity {
    pub fn from_verbose(verbose: bool) -> Self {
        if verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Clean
        }
    }

    pub fn is_verbose(&self) -> bool {
        matches!(self, Verbosity::Verbose)
    }
}

/// Prints prompts and progress while a form is being filled.
pub struct WizardPresenter {
    verbosity: Verbosity,
    header_printed: bool,
    show_answers_json: bool,
}

impl WizardPresenter {
    pub fn new(verbosity: Verbosity, show_answers_json: bool) -> Self {
        Self {
            verbosity,
            header_printed: false,
            show_answers_json,
        }
    }

    pub fn show_header(&mut self, payload: &RenderPayload) {
        if self.header_printed {
            return;
        }
        println!("Form: {}", payload.form_title);
        if let Some(help) = &payload.help {
            println!("{}", help);
        }
        self.header_printed = true;
    }

    pub fn show_status(&self, payload: &RenderPayload) {
        if !self.verbosity.is_verbose() {
            return;
        }
        println!(
            "Status: {} ({}/{})",
            payload.status.as_str(),
            payload.progress.answered,
            payload.progress.total
        );
        let path = payload
            .fields
            .iter()
            .map(|field| field.id.as_str())
            .collect::<Vec<_>>();
        println!("Path: {}", path.join(" -> "));
    }

    pub fn show_prompt(&self, prompt: &PromptContext) {
        let mut line = if prompt.total > 0 {
            format!("{}/{} {}", prompt.index, prompt.total, prompt.label)
        } else {
            format!("{} {}", prompt.index, prompt.label)
        };
        if prompt.required {
            line.push_str(" *");
        }
        if let Some(hint) = &prompt.hint {
            line.push(' ');
            line.push_str(hint);
        }
        println!("{}", line);
        if let Some(placeholder) = &prompt.placeholder {
            println!("  e.g. {}", placeholder);
        }
        if self.verbosity.is_verbose() && !prompt.choices.is_empty() {
            println!("Choices: {}", prompt.choices.join(", "));
        }
    }

    pub fn show_parse_error(&self, error: &AnswerParseError) {
        eprintln!("Invalid answer: {}", error.user_message);
        if let Some(debug) = &error.debug_message {
            eprintln!("  Expected: {}", debug);
        }
    }

    pub fn show_completion(&self, submission: &Submission) {
        println!("Done ✅");
        println!("Submission {} recorded at {}", submission.id, submission.submitted_at);
        if self.show_answers_json {
            match serde_json::to_string_pretty(&submission.data) {
                Ok(pretty) => println!("{}", pretty),
                Err(err) => eprintln!("Failed to serialize answers to JSON: {}", err),
            }
        }
    }
}

/// Context used to format a single prompt.
pub struct PromptContext {
    pub index: usize,
    pub total: usize,
    pub label: String,
    pub placeholder: Option<String>,
    pub required: bool,
    pub hint: Option<String>,
    pub choices: Vec<String>,
}

impl PromptContext {
    pub fn new(field: &RenderField, progress: &RenderProgress) -> Self {
        Self {
            index: (progress.answered + 1).min(progress.total.max(1)),
            total: progress.total,
            label: field.label.clone(),
            placeholder: field.placeholder.clone(),
            required: field.required && field.kind != FieldType::Checkbox,
            hint: hint(&field.kind, &field.options),
            choices: field.options.clone(),
        }
    }
}

fn hint(kind: &FieldType, options: &[String]) -> Option<String> {
    match kind {
        FieldType::Checkbox => Some("(yes/no)".to_string()),
        FieldType::Number => Some("(number)".to_string()),
        FieldType::Rating => Some("(1-5)".to_string()),
        FieldType::Email => Some("(email)".to_string()),
        FieldType::Date => Some("(YYYY-MM-DD)".to_string()),
        FieldType::Select | FieldType::Radio if !options.is_empty() => {
            Some(format!("({})", options.join("/")))
        }
        FieldType::CheckboxGroup if !options.is_empty() => {
            Some(format!("(comma separated: {})", options.join(", ")))
        }
        _ => None,
    }
}

/// Error produced when parsing answers from the user.
#[derive(Debug)]
pub struct AnswerParseError {
    pub user_message: String,
    pub debug_message: Option<String>,
}

impl AnswerParseError {
    pub fn new(user_message: impl Into<String>, debug_message: Option<String>) -> Self {
        Self {
            user_message: user_message.into(),
            debug_message,
        }
    }
}

/// Turns one line of input into an answer for `field`.
///
/// `Ok(None)` means an optional field was skipped.
pub fn parse_answer(field: &FormField, raw: &str) -> Result<Option<Value>, AnswerParseError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return match field.kind {
            FieldType::Checkbox => Ok(Some(Value::Bool(false))),
            _ if field.required => Err(AnswerParseError::new(
                "This field requires an answer.",
                None,
            )),
            _ => Ok(None),
        };
    }

    let value = match &field.kind {
        FieldType::Checkbox => parse_boolean(raw)?,
        FieldType::Number => parse_number(raw)?,
        FieldType::Rating => parse_rating(raw)?,
        FieldType::Select | FieldType::Radio => parse_choice(field.options(), raw)?,
        FieldType::CheckboxGroup => parse_choices(field.options(), raw)?,
        _ => Value::String(raw.to_string()),
    };
    Ok(Some(value))
}

fn parse_boolean(raw: &str) -> Result<Value, AnswerParseError> {
    match raw.to_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" | "on" => Ok(Value::Bool(true)),
        "false" | "f" | "no" | "n" | "0" | "off" => Ok(Value::Bool(false)),
        _ => Err(AnswerParseError::new(
            "Please enter yes or no.",
            Some("expected boolean (y/n/true/false)".to_string()),
        )),
    }
}

fn parse_number(raw: &str) -> Result<Value, AnswerParseError> {
    if let Ok(whole) = raw.parse::<i64>() {
        return Ok(Value::Number(Number::from(whole)));
    }
    raw.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| {
            AnswerParseError::new(
                "Please enter a number.",
                Some("expected number".to_string()),
            )
        })
}

fn parse_rating(raw: &str) -> Result<Value, AnswerParseError> {
    match raw.parse::<u8>() {
        Ok(stars @ 1..=5) => Ok(Value::Number(Number::from(stars))),
        _ => Err(AnswerParseError::new(
            "Please enter a rating from 1 to 5.",
            Some("expected integer between 1 and 5".to_string()),
        )),
    }
}

fn parse_choice(options: &[String], raw: &str) -> Result<Value, AnswerParseError> {
    options
        .iter()
        .find(|option| option.eq_ignore_ascii_case(raw))
        .map(|option| Value::String(option.clone()))
        .ok_or_else(|| {
            AnswerParseError::new(
                format!("Choose one of: {}.", options.join(", ")),
                Some(format!("allowed values: {}", options.join(", "))),
            )
        })
}

fn parse_choices(options: &[String], raw: &str) -> Result<Value, AnswerParseError> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| parse_choice(options, part))
        .collect::<Result<Vec<_>, _>>()
        .map(Value::Array)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn checkbox_accepts_yes_and_defaults_to_false() {
        let field = FormField::new("ok", "OK?", FieldType::Checkbox).required();
        assert_eq!(parse_answer(&field, "yes").unwrap(), Some(json!(true)));
        assert_eq!(parse_answer(&field, "").unwrap(), Some(json!(false)));
        assert!(parse_answer(&field, "perhaps").is_err());
    }

    #[test]
    fn numbers_prefer_integers() {
        let field = FormField::new("n", "N", FieldType::Number);
        assert_eq!(parse_answer(&field, "42").unwrap(), Some(json!(42)));
        assert_eq!(parse_answer(&field, "2.5").unwrap(), Some(json!(2.5)));
        assert!(parse_answer(&field, "many").is_err());
    }

    #[test]
    fn rating_is_one_to_five() {
        let field = FormField::new("r", "R", FieldType::Rating);
        assert_eq!(parse_answer(&field, "5").unwrap(), Some(json!(5)));
        assert!(parse_answer(&field, "0").is_err());
        assert!(parse_answer(&field, "6").is_err());
    }

    #[test]
    fn choices_match_case_insensitively() {
        let field = FormField::new("c", "C", FieldType::Radio).with_options(["Yes", "No"]);
        assert_eq!(parse_answer(&field, "no").unwrap(), Some(json!("No")));
        assert!(parse_answer(&field, "maybe").is_err());

        let group = FormField::new("g", "G", FieldType::CheckboxGroup)
            .with_options(["Keynote", "Panel"]);
        assert_eq!(
            parse_answer(&group, "panel, keynote").unwrap(),
            Some(json!(["Panel", "Keynote"]))
        );
    }

    #[test]
    fn blank_skips_optional_and_rejects_required() {
        let optional = FormField::new("t", "T", FieldType::Text);
        assert_eq!(parse_answer(&optional, "  ").unwrap(), None);
        let required = FormField::new("t", "T", FieldType::Email).required();
        assert!(parse_answer(&required, "").is_err());
    }
}
