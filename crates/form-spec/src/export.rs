use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_xlsxwriter::{ColNum, RowNum, Workbook, XlsxError};
use serde_json::{Value, json};
use thiserror::Error;

use crate::render::value_to_display;
use crate::spec::{FormSchema, Submission};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("csv export failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("csv writer could not be flushed: {0}")]
    Flush(String),
    #[error("json export failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("xlsx export failed: {0}")]
    Xlsx(#[from] XlsxError),
    #[error("{rows} rows by {columns} columns do not fit in a worksheet")]
    SheetTooLarge { rows: usize, columns: usize },
    #[error("unsupported export format '{0}' (expected csv, json or xlsx)")]
    UnknownFormat(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
    Xlsx,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
            ExportFormat::Xlsx => "xlsx",
        }
    }

    /// Whether the rendered body is UTF-8 text.
    pub fn is_text(&self) -> bool {
        !matches!(self, ExportFormat::Xlsx)
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            "xlsx" | "excel" => Ok(ExportFormat::Xlsx),
            other => Err(ExportError::UnknownFormat(other.to_string())),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

pub const SUBMITTED_AT_HEADER: &str = "Submitted At";
pub const SHEET_NAME: &str = "Submissions";

/// Renders submissions as a table: one column per field label, in schema order.
pub fn export(
    schema: &FormSchema,
    submissions: &[Submission],
    format: ExportFormat,
) -> Result<Vec<u8>, ExportError> {
    match format {
        ExportFormat::Csv => export_csv(schema, submissions),
        ExportFormat::Json => export_json(schema, submissions),
        ExportFormat::Xlsx => export_xlsx(schema, submissions),
    }
}

fn header(schema: &FormSchema) -> Vec<String> {
    let mut header = vec![SUBMITTED_AT_HEADER.to_string()];
    header.extend(schema.fields.iter().map(|field| field.label.clone()));
    header
}

fn rows<'a>(
    schema: &'a FormSchema,
    submissions: &'a [Submission],
) -> impl Iterator<Item = Vec<String>> + 'a {
    submissions.iter().map(move |submission| {
        let mut row = Vec::with_capacity(schema.fields.len() + 1);
        row.push(submission.submitted_at.clone());
        row.extend(
            schema
                .fields
                .iter()
                .map(|field| cell(submission.data.get(&field.id))),
        );
        row
    })
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(value) => value_to_display(value),
    }
}

fn export_csv(schema: &FormSchema, submissions: &[Submission]) -> Result<Vec<u8>, ExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(header(schema))?;
    for row in rows(schema, submissions) {
        writer.write_record(&row)?;
    }
    writer
        .into_inner()
        .map_err(|err| ExportError::Flush(err.to_string()))
}

/// Object keys for the JSON export. Repeated labels get the field id appended.
fn record_keys(schema: &FormSchema) -> Vec<String> {
    let mut keys: Vec<String> = vec![SUBMITTED_AT_HEADER.to_string()];
    for field in &schema.fields {
        let mut key = field.label.clone();
        if keys.contains(&key) {
            key = format!("{} ({})", field.label, field.id);
        }
        let base = key.clone();
        let mut n = 2;
        while keys.contains(&key) {
            key = format!("{} {}", base, n);
            n += 1;
        }
        keys.push(key);
    }
    keys
}

fn export_json(schema: &FormSchema, submissions: &[Submission]) -> Result<Vec<u8>, ExportError> {
    let keys = record_keys(schema);
    let records = rows(schema, submissions)
        .map(|row| {
            let record = keys
                .iter()
                .cloned()
                .zip(row.into_iter().map(Value::String))
                .collect::<serde_json::Map<_, _>>();
            Value::Object(record)
        })
        .collect::<Vec<_>>();
    Ok(serde_json::to_vec_pretty(&json!(records))?)
}

/// A single `Submissions` sheet with the same columns as the CSV export.
/// Numeric answers stay numeric cells.
fn export_xlsx(schema: &FormSchema, submissions: &[Submission]) -> Result<Vec<u8>, ExportError> {
    let too_large = || ExportError::SheetTooLarge {
        rows: submissions.len() + 1,
        columns: schema.fields.len() + 1,
    };
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME)?;

    for (col, title) in header(schema).iter().enumerate() {
        let col = ColNum::try_from(col).map_err(|_| too_large())?;
        sheet.write_string(0, col, title)?;
    }
    for (index, submission) in submissions.iter().enumerate() {
        let row = RowNum::try_from(index + 1).map_err(|_| too_large())?;
        sheet.write_string(row, 0, &submission.submitted_at)?;
        for (offset, field) in schema.fields.iter().enumerate() {
            let col = ColNum::try_from(offset + 1).map_err(|_| too_large())?;
            let value = submission.data.get(&field.id);
            match value.and_then(Value::as_f64) {
                Some(number) => sheet.write_number(row, col, number)?,
                None => sheet.write_string(row, col, cell(value))?,
            };
        }
    }
    Ok(workbook.save_to_buffer()?)
}

const UNSAFE_FILE_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Suggested download name, e.g. `Team_Lunch_submissions_2024-05-01.csv`.
///
/// The title is reduced to a single path component: whitespace runs become
/// `_`, separators and other reserved characters are replaced, and dot runs
/// cannot form `..`.
pub fn export_file_name(schema: &FormSchema, format: ExportFormat, on: NaiveDate) -> String {
    format!(
        "{}_submissions_{}.{}",
        file_stem(&schema.title),
        on.format("%Y-%m-%d"),
        format.extension()
    )
}

fn file_stem(title: &str) -> String {
    let joined = title.split_whitespace().collect::<Vec<_>>().join("_");
    let mut stem = joined
        .chars()
        .map(|c| {
            if c.is_control() || UNSAFE_FILE_CHARS.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .collect::<String>();
    while stem.contains("..") {
        stem = stem.replace("..", "_");
    }
    let stem = stem.trim_start_matches('.');
    if stem.is_empty() {
        "form".to_string()
    } else {
        stem.to_string()
    }
}

/// Today's date in UTC, for [`export_file_name`].
pub fn today() -> NaiveDate {
    let now: DateTime<Utc> = Utc::now();
    now.date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{FieldType, FormField};

    fn schema() -> FormSchema {
        FormSchema::new(
            "f",
            "Team  Lunch",
            vec![
                FormField::new("name", "Name", FieldType::Text),
                FormField::new("diet", "Diet, if any", FieldType::CheckboxGroup)
                    .with_options(["vegan", "halal"]),
                FormField::new("stars", "Stars", FieldType::Rating),
            ],
        )
    }

    fn submission(data: Value) -> Submission {
        Submission {
            id: "s1".into(),
            form_id: "f".into(),
            data: data.as_object().cloned().unwrap(),
            submitted_at: "2024-05-01T12:00:00.000Z".into(),
        }
    }

    fn text(bytes: Vec<u8>) -> String {
        String::from_utf8(bytes).unwrap()
    }

    fn titled(title: &str) -> FormSchema {
        FormSchema::new("f", title, Vec::new())
    }

    #[test]
    fn csv_has_labels_and_joined_lists() {
        let subs = vec![submission(json!({ "name": "Ada", "diet": ["vegan", "halal"], "stars": 4 }))];
        let csv = text(export(&schema(), &subs, ExportFormat::Csv).unwrap());
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("Submitted At,Name,\"Diet, if any\",Stars"));
        assert_eq!(
            lines.next(),
            Some("2024-05-01T12:00:00.000Z,Ada,\"vegan, halal\",4")
        );
    }

    #[test]
    fn missing_answers_are_blank() {
        let subs = vec![submission(json!({ "name": "Bo" }))];
        let json_out = export(&schema(), &subs, ExportFormat::Json).unwrap();
        let parsed: Value = serde_json::from_slice(&json_out).unwrap();
        assert_eq!(parsed[0]["Name"], "Bo");
        assert_eq!(parsed[0]["Stars"], "");
    }

    #[test]
    fn json_keeps_fields_sharing_a_label() {
        let form = FormSchema::new(
            "f",
            "Contacts",
            vec![
                FormField::new("home", "Phone", FieldType::Text),
                FormField::new("work", "Phone", FieldType::Text),
            ],
        );
        let subs = vec![submission(json!({ "home": "111", "work": "222" }))];
        let parsed: Value =
            serde_json::from_slice(&export(&form, &subs, ExportFormat::Json).unwrap()).unwrap();
        let record = parsed[0].as_object().unwrap();
        assert_eq!(record.len(), 3);
        assert_eq!(record["Phone"], "111");
        assert_eq!(record["Phone (work)"], "222");
    }

    #[test]
    fn xlsx_is_a_workbook() {
        let subs = vec![submission(json!({ "name": "Ada", "stars": 4 }))];
        let bytes = export(&schema(), &subs, ExportFormat::Xlsx).unwrap();
        assert!(bytes.starts_with(b"PK\x03\x04"));
        let empty = export(&schema(), &[], ExportFormat::Xlsx).unwrap();
        assert!(empty.starts_with(b"PK"));
        assert!(!ExportFormat::Xlsx.is_text());
    }

    #[test]
    fn file_name_collapses_whitespace() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        assert_eq!(
            export_file_name(&schema(), ExportFormat::Csv, date),
            "Team_Lunch_submissions_2024-05-01.csv"
        );
        assert_eq!(
            export_file_name(&schema(), ExportFormat::Xlsx, date),
            "Team_Lunch_submissions_2024-05-01.xlsx"
        );
        assert_eq!("JSON".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert_eq!("xlsx".parse::<ExportFormat>().unwrap(), ExportFormat::Xlsx);
        assert!("pdf".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn file_name_is_a_single_path_component() {
        let date = NaiveDate::from_ymd_opt(2026, 10, 17).unwrap();
        let name = |title: &str| export_file_name(&titled(title), ExportFormat::Csv, date);

        assert_eq!(name("Q1/Q2 survey"), "Q1_Q2_survey_submissions_2026-10-17.csv");
        assert_eq!(name("a\\b:c"), "a_b_c_submissions_2026-10-17.csv");
        assert_eq!(name("   "), "form_submissions_2026-10-17.csv");

        let escape = name("../../escape me");
        assert!(!escape.contains('/'));
        assert!(!escape.contains(".."));
        assert!(escape.ends_with("escape_me_submissions_2026-10-17.csv"));
        assert_eq!(std::path::Path::new(&escape).components().count(), 1);
    }
}
