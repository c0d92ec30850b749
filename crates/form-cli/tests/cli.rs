use std::fs;
use std::path::Path;

use assert_cmd::Command;
use assert_fs::TempDir;
use assert_fs::prelude::*;
use serde_json::{Value, json};

const FORM: &str = r#"{
    "id": "lunch",
    "title": "Team Lunch",
    "fields": [
        { "id": "coming", "label": "Coming?", "type": "radio", "required": true,
          "options": ["Yes", "No"],
          "logic": [{ "condition": "No", "destination": "email" }] },
        { "id": "guests", "label": "Guests", "type": "number", "required": true },
        { "id": "diet", "label": "Diet", "type": "text" },
        { "id": "email", "label": "Email", "type": "email", "required": true }
    ],
    "createdAt": 0
}"#;

fn formsmith(data: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("formsmith").expect("binary");
    cmd.env("FORMSMITH_DATA_DIR", data.path())
        .env_remove("OPENAI_API_KEY")
        .env_remove("FORMSMITH_PROVIDER")
        .env_remove("FORMSMITH_BASE_URL")
        .env_remove("FORMSMITH_MODEL")
        .env_remove("RUST_LOG");
    cmd
}

fn import(data: &TempDir, schema: &str) {
    let file = data.child("form.json");
    file.write_str(schema).unwrap();
    formsmith(data)
        .arg("import")
        .arg(file.path())
        .assert()
        .success();
}

fn import_lunch(data: &TempDir) {
    import(data, FORM);
}

fn submit(data: &TempDir, answers: &str) {
    formsmith(data)
        .args(["submit", "lunch", "--data", answers])
        .assert()
        .success();
}

fn stdout(cmd: &mut Command) -> String {
    let output = cmd.output().expect("run");
    assert!(output.status.success(), "{:?}", output);
    String::from_utf8(output.stdout).expect("utf8")
}

#[test]
fn visible_follows_skip_logic() {
    let data = TempDir::new().unwrap();
    import_lunch(&data);
    let out = stdout(
        formsmith(&data)
            .args(["visible", "lunch", "--data"])
            .arg(r#"{"coming":"No"}"#),
    );
    assert_eq!(out.lines().collect::<Vec<_>>(), vec!["coming", "email"]);
}

#[test]
fn submit_then_export_csv() {
    let data = TempDir::new().unwrap();
    import_lunch(&data);
    submit(&data, r#"{"coming":"No","guests":3,"email":"ada@example.org"}"#);

    let csv = stdout(formsmith(&data).args(["export", "lunch", "--stdout"]));
    let mut lines = csv.lines();
    assert_eq!(lines.next(), Some("Submitted At,Coming?,Guests,Diet,Email"));
    assert!(lines.next().unwrap().ends_with(",No,,,ada@example.org"));
}

#[test]
fn export_xlsx_writes_a_workbook() {
    let data = TempDir::new().unwrap();
    import_lunch(&data);
    submit(&data, r#"{"coming":"Yes","guests":2,"email":"ada@example.org"}"#);

    let out_dir = data.child("exports");
    let printed = stdout(
        formsmith(&data)
            .args(["export", "lunch", "--format", "xlsx", "--out"])
            .arg(out_dir.path()),
    );
    let path = Path::new(printed.trim());
    assert_eq!(path.parent(), Some(out_dir.path()));
    let name = path.file_name().unwrap().to_str().unwrap();
    assert!(name.starts_with("Team_Lunch_submissions_"));
    assert!(name.ends_with(".xlsx"));
    assert!(fs::read(path).unwrap().starts_with(b"PK"));
}

#[test]
fn export_stays_inside_out_dir() {
    let data = TempDir::new().unwrap();
    import(
        &data,
        r#"{ "id": "lunch", "title": "../../Q1/Q2 escape", "createdAt": 0,
             "fields": [{ "id": "coming", "label": "Coming?", "type": "text" }] }"#,
    );

    let out_dir = data.child("nested/exports");
    let printed = stdout(
        formsmith(&data)
            .args(["export", "lunch", "--out"])
            .arg(out_dir.path()),
    );
    let path = Path::new(printed.trim());
    assert_eq!(path.parent(), Some(out_dir.path()));
    assert!(path.is_file());
    assert_eq!(fs::read_dir(out_dir.path()).unwrap().count(), 1);
}

#[test]
fn invalid_submission_fails() {
    let data = TempDir::new().unwrap();
    import_lunch(&data);
    formsmith(&data)
        .args(["submit", "lunch", "--data"])
        .arg(r#"{"coming":"Yes","email":"ada@example.org"}"#)
        .assert()
        .failure();
    let out = stdout(formsmith(&data).args(["submissions", "lunch"]));
    assert_eq!(serde_json::from_str::<Value>(&out).unwrap(), json!([]));
}

#[test]
fn fill_walks_the_visible_path() {
    let data = TempDir::new().unwrap();
    import_lunch(&data);
    formsmith(&data)
        .args(["fill", "lunch"])
        .write_stdin("yes\n2\n\nada@example.org\n")
        .assert()
        .success();

    let out = stdout(formsmith(&data).args(["submissions", "lunch"]));
    let submissions: Value = serde_json::from_str(&out).unwrap();
    assert_eq!(submissions[0]["data"]["coming"], "Yes");
    assert_eq!(submissions[0]["data"]["guests"], 2);
    assert!(submissions[0]["data"].get("diet").is_none());
}

#[test]
fn delete_removes_form() {
    let data = TempDir::new().unwrap();
    import_lunch(&data);
    formsmith(&data).args(["delete", "lunch"]).assert().success();
    formsmith(&data).args(["show", "lunch"]).assert().failure();
    let out = stdout(formsmith(&data).arg("list"));
    assert!(out.contains("No forms stored."));
}

#[test]
fn settings_set_and_show() {
    let data = TempDir::new().unwrap();
    formsmith(&data)
        .args(["settings", "set", "provider", "ollama"])
        .assert()
        .success();
    let out = stdout(formsmith(&data).args(["settings", "show"]));
    assert!(out.contains("provider: ollama"));
    assert!(out.contains("resolved: ollama llama3"));
    let stored = fs::read_to_string(data.child("settings.json").path()).unwrap();
    assert!(stored.contains("\"ollama\""));
}
